//! Smoke-occlusion geometry: a ray-vs-capped-cylinder test used to
//! decide whether a smoke grenade blocks a sightline between two
//! points.

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Point { x, y, z }
    }

    fn add_z(self, dz: f64) -> Self {
        Point {
            x: self.x,
            y: self.y,
            z: self.z + dz,
        }
    }
}

/// Does the segment `a -> b` pass through the vertical capped cylinder of
/// `radius` and `height`, standing with its base centered at `axis_base`?
pub fn segment_intersects_cylinder(a: Point, b: Point, axis_base: Point, radius: f64, height: f64) -> bool {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let dz = b.z - a.z;
    let fx = a.x - axis_base.x;
    let fy = a.y - axis_base.y;

    let aq = dx * dx + dy * dy;
    let (t_lo, t_hi) = if aq.abs() < 1e-12 {
        let c = fx * fx + fy * fy - radius * radius;
        if c > 0.0 {
            return false;
        }
        (0.0, 1.0)
    } else {
        let bq = 2.0 * (fx * dx + fy * dy);
        let cq = fx * fx + fy * fy - radius * radius;
        let disc = bq * bq - 4.0 * aq * cq;
        if disc < 0.0 {
            return false;
        }
        let sqrt_disc = disc.sqrt();
        let t1 = (-bq - sqrt_disc) / (2.0 * aq);
        let t2 = (-bq + sqrt_disc) / (2.0 * aq);
        let lo = t1.max(0.0);
        let hi = t2.min(1.0);
        if lo > hi {
            return false;
        }
        (lo, hi)
    };

    let z_lo = a.z + t_lo * dz;
    let z_hi = a.z + t_hi * dz;
    let (z_min, z_max) = if z_lo <= z_hi { (z_lo, z_hi) } else { (z_hi, z_lo) };
    let cyl_min = axis_base.z;
    let cyl_max = axis_base.z + height;
    z_max >= cyl_min && z_min <= cyl_max
}

pub const SMOKE_RADIUS: f64 = 140.0;
pub const SMOKE_HEIGHT: f64 = 130.0;
pub const PLAYER_HEIGHT: f64 = 72.0;
pub const PLAYER_CROUCH_HEIGHT: f64 = 50.0;

/// Returns the smoke centers (spec's §4.8 occlusion test) that block the
/// line of sight from the shooter at foot position `shooter` to the
/// victim at foot position `victim`. Credit requires both the foot-level
/// and head-level sightlines to pass through the same smoke.
pub fn occluding_smokes(shooter: Point, victim: Point, smokes: &[Point]) -> Vec<Point> {
    let eye = shooter.add_z(PLAYER_CROUCH_HEIGHT);
    let head = victim.add_z(PLAYER_HEIGHT);
    smokes
        .iter()
        .copied()
        .filter(|&c| {
            segment_intersects_cylinder(eye, victim, c, SMOKE_RADIUS, SMOKE_HEIGHT)
                && segment_intersects_cylinder(eye, head, c, SMOKE_RADIUS, SMOKE_HEIGHT)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_smoke_blocks_sightline() {
        let shooter = Point::new(0.0, 0.0, 0.0);
        let victim = Point::new(300.0, 0.0, 0.0);
        let smoke = Point::new(150.0, 0.0, 0.0);
        let blocked = occluding_smokes(shooter, victim, &[smoke]);
        assert_eq!(blocked.len(), 1);
    }

    #[test]
    fn offline_smoke_does_not_block() {
        let shooter = Point::new(0.0, 0.0, 0.0);
        let victim = Point::new(300.0, 0.0, 0.0);
        let smoke = Point::new(150.0, 300.0, 0.0);
        let blocked = occluding_smokes(shooter, victim, &[smoke]);
        assert!(blocked.is_empty());
    }
}
