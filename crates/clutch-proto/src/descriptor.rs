//! Send-property descriptors and the raw send-table schema (data
//! model). These are the pre-flatten, hierarchical shapes
//! parsed straight off the `SendTable` stream; [`crate::flatten`] turns a
//! tree of these into the flat per-class vector the rest of the pipeline
//! indexes into.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PropFlags: u32 {
        const UNSIGNED      = 0x0001;
        const COORD         = 0x0002;
        const NOSCALE       = 0x0004;
        const ROUND_DOWN    = 0x0008;
        const ROUND_UP      = 0x0010;
        const NORMAL        = 0x0020;
        const EXCLUDE       = 0x0040;
        const VARINT        = 0x0080;
        const INSIDE_ARRAY  = 0x0100;
        const COLLAPSIBLE   = 0x0400;
        const COORD_MP      = 0x1000;
        const COORD_MP_LOW  = 0x2000;
        const COORD_MP_INT  = 0x4000;
        const CELL_COORD    = 0x8000;
        const CELL_COORD_LOW = 0x0001_0000;
        const CELL_COORD_INT = 0x0002_0000;
        const CHANGES_OFTEN = 0x0004_0000;
    }
}

/// Priority value that also absorbs every [`PropFlags::CHANGES_OFTEN`]
/// descriptor during the flattener's stable partition pass, regardless
/// of that descriptor's nominal priority.
pub const CHANGES_OFTEN_PRIORITY: u32 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropType {
    Int,
    Float,
    Vector,
    VectorXY,
    String,
    Array,
    DataTable,
    Int64,
}

/// A single leaf (or `DataTable`-typed) entry from a `SendTable` message.
/// For `Array` entries, `element` is a self-index into the *same* table's
/// `props` list of the immediately preceding non-array descriptor;
/// flattening resolves this into an owned [`crate::flatten::FlatProp`].
#[derive(Clone, Debug)]
pub struct SendProp {
    pub var_name: String,
    pub dt_name: String,
    pub prop_type: PropType,
    pub flags: PropFlags,
    pub low_value: f32,
    pub high_value: f32,
    pub num_bits: u32,
    pub priority: u32,
    pub element_count: u32,
    /// Index, within the owning [`SendTable::props`], of the element
    /// descriptor when `prop_type == Array`.
    pub array_element_prop: Option<usize>,
}

impl SendProp {
    pub fn is_excluded(&self) -> bool {
        self.flags.contains(PropFlags::EXCLUDE)
    }

    pub fn is_inside_array(&self) -> bool {
        self.flags.contains(PropFlags::INSIDE_ARRAY)
    }

    pub fn is_collapsible(&self) -> bool {
        self.flags.contains(PropFlags::COLLAPSIBLE)
    }
}

/// One `SendTable` message as parsed off the wire: a net-table name and
/// its ordered property list.
#[derive(Clone, Debug)]
pub struct SendTable {
    pub net_table_name: String,
    pub props: Vec<SendProp>,
}

/// `(class_id, name, dt_name)` triple read after the `SendTable` stream.
#[derive(Clone, Debug)]
pub struct ServerClassEntry {
    pub class_id: u16,
    pub name: String,
    pub dt_name: String,
}
