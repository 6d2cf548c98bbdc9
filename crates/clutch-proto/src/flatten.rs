//! The flattener: walks a server class's send-table tree and
//! produces the flat, priority-sorted property vector the rest of the
//! pipeline indexes by field index. Grounded on
//! `GatherExcludes`/`GatherProps`/`FlattenDataTable` in
//! the reference C++ dumper `demofiledump.cpp`.

use std::collections::HashSet;

use clutch_core::error::{DemoError, DemoResult};

use crate::descriptor::{PropFlags, PropType, SendProp, ServerClassEntry};
use crate::sendtable::SendTableStore;

/// A leaf property after exclude/collapse/priority-sort, addressed by its
/// position in [`FlattenedClass::props`] — that position *is* the field
/// index the wire protocol uses.
#[derive(Clone, Debug)]
pub struct FlatProp {
    pub var_name: String,
    pub prop_type: PropType,
    pub flags: PropFlags,
    pub low_value: f32,
    pub high_value: f32,
    pub num_bits: u32,
    pub priority: u32,
    pub element_count: u32,
    /// For `Array` props: the element type, embedded by value rather than
    /// referenced by pointer or by index into this same vector (the
    /// element's own `SendProp` carries `INSIDE_ARRAY` and is never itself
    /// a flattened leaf, so there is no live index to point at).
    pub array_element: Option<Box<ElementDescriptor>>,
}

#[derive(Clone, Debug)]
pub struct ElementDescriptor {
    pub prop_type: PropType,
    pub flags: PropFlags,
    pub low_value: f32,
    pub high_value: f32,
    pub num_bits: u32,
}

pub struct FlattenedClass {
    pub class_id: u16,
    pub props: Vec<FlatProp>,
}

#[derive(Clone, Debug, Default)]
struct TempProp {
    src: SendProp,
    array_element: Option<SendProp>,
}

fn gather_excludes(
    store: &SendTableStore,
    table_name: &str,
    out: &mut HashSet<(String, String)>,
) -> DemoResult<()> {
    let table = store
        .get(table_name)
        .ok_or(DemoError::PropertyDecodeError {
            class_id: 0,
            field_index: -1,
        })?;
    for prop in &table.props {
        if prop.is_excluded() {
            out.insert((prop.dt_name.clone(), prop.var_name.clone()));
        }
        if prop.prop_type == PropType::DataTable {
            gather_excludes(store, &prop.dt_name, out)?;
        }
    }
    Ok(())
}

fn gather_props(
    store: &SendTableStore,
    table_name: &str,
    excludes: &HashSet<(String, String)>,
    out: &mut Vec<TempProp>,
) -> DemoResult<()> {
    let table = store
        .get(table_name)
        .ok_or(DemoError::PropertyDecodeError {
            class_id: 0,
            field_index: -1,
        })?;
    for (i, prop) in table.props.iter().enumerate() {
        if prop.is_inside_array() || prop.is_excluded() {
            continue;
        }
        if excludes.contains(&(table.net_table_name.clone(), prop.var_name.clone())) {
            continue;
        }
        if prop.prop_type == PropType::DataTable {
            if prop.is_collapsible() {
                gather_props(store, &prop.dt_name, excludes, out)?;
            } else {
                gather_props(store, &prop.dt_name, excludes, out)?;
            }
            continue;
        }
        let array_element = if prop.prop_type == PropType::Array {
            i.checked_sub(1).map(|idx| table.props[idx].clone())
        } else {
            None
        };
        out.push(TempProp {
            src: prop.clone(),
            array_element,
        });
    }
    Ok(())
}

/// Flattens one server class's root table into its ordered leaf vector,
/// applying exclude gathering, collapse inlining, and a stable
/// priority-sort pass. Every descriptor flagged `CHANGES_OFTEN` is moved
/// into the priority-64 bucket regardless of its nominal priority.
pub fn flatten_class(
    store: &SendTableStore,
    class: &ServerClassEntry,
) -> DemoResult<FlattenedClass> {
    let mut excludes = HashSet::new();
    gather_excludes(store, &class.dt_name, &mut excludes)?;

    let mut temp = Vec::new();
    gather_props(store, &class.dt_name, &excludes, &mut temp)?;

    // Priority set always includes the CHANGES_OFTEN sentinel bucket even
    // if no descriptor nominally carries it, then every nominal priority
    // actually observed, sorted ascending.
    let mut priorities: Vec<u32> = vec![64];
    for t in &temp {
        if !priorities.contains(&t.src.priority) {
            priorities.push(t.src.priority);
        }
    }
    priorities.sort_unstable();

    let mut start = 0usize;
    for &priority in &priorities {
        loop {
            let mut found = None;
            for idx in start..temp.len() {
                let prop = &temp[idx].src;
                if prop.priority == priority
                    || (priority == 64 && prop.flags.contains(PropFlags::CHANGES_OFTEN))
                {
                    found = Some(idx);
                    break;
                }
            }
            match found {
                Some(idx) => {
                    temp.swap(start, idx);
                    start += 1;
                }
                None => break,
            }
        }
    }

    let props = temp
        .into_iter()
        .map(|t| FlatProp {
            var_name: t.src.var_name,
            prop_type: t.src.prop_type,
            flags: t.src.flags,
            low_value: t.src.low_value,
            high_value: t.src.high_value,
            num_bits: t.src.num_bits,
            priority: t.src.priority,
            element_count: t.src.element_count,
            array_element: t.array_element.map(|e| {
                Box::new(ElementDescriptor {
                    prop_type: e.prop_type,
                    flags: e.flags,
                    low_value: e.low_value,
                    high_value: e.high_value,
                    num_bits: e.num_bits,
                })
            }),
        })
        .collect();

    Ok(FlattenedClass {
        class_id: class.class_id,
        props,
    })
}

/// `ceil(log2(n)) + 1`, the server-class bit width used to read
/// `class_id` fields off the wire.
pub fn server_class_bits(n_server_classes: usize) -> u32 {
    let mut bits = 0u32;
    let mut n = n_server_classes;
    while n > 1 {
        n >>= 1;
        bits += 1;
    }
    // Round up for non-power-of-two counts, then add the sentinel bit.
    if (1usize << bits) < n_server_classes {
        bits += 1;
    }
    bits + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SendTable;

    fn prop(name: &str, ty: PropType, priority: u32, flags: PropFlags) -> SendProp {
        SendProp {
            var_name: name.to_string(),
            dt_name: String::new(),
            prop_type: ty,
            flags,
            low_value: 0.0,
            high_value: 0.0,
            num_bits: 8,
            priority,
            element_count: 0,
            array_element_prop: None,
        }
    }

    #[test]
    fn flattens_single_table_sorted_by_priority() {
        let table = SendTable {
            net_table_name: "DT_Test".into(),
            props: vec![
                prop("b", PropType::Int, 32, PropFlags::empty()),
                prop("a", PropType::Int, 16, PropFlags::empty()),
                prop("c", PropType::Int, 64, PropFlags::empty()),
            ],
        };
        let store = SendTableStore::new(vec![table]);
        let class = ServerClassEntry {
            class_id: 1,
            name: "Test".into(),
            dt_name: "DT_Test".into(),
        };
        let flat = flatten_class(&store, &class).unwrap();
        let names: Vec<_> = flat.props.iter().map(|p| p.var_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn changes_often_flag_moves_into_64_bucket() {
        let table = SendTable {
            net_table_name: "DT_Test".into(),
            props: vec![
                prop("low_prio_often", PropType::Int, 8, PropFlags::CHANGES_OFTEN),
                prop("mid", PropType::Int, 32, PropFlags::empty()),
            ],
        };
        let store = SendTableStore::new(vec![table]);
        let class = ServerClassEntry {
            class_id: 1,
            name: "Test".into(),
            dt_name: "DT_Test".into(),
        };
        let flat = flatten_class(&store, &class).unwrap();
        assert_eq!(flat.props[0].var_name, "low_prio_often");
        assert_eq!(flat.props[1].var_name, "mid");
    }

    #[test]
    fn excludes_remove_matching_subtable_prop() {
        let sub = SendTable {
            net_table_name: "DT_Sub".into(),
            props: vec![prop("hidden", PropType::Int, 0, PropFlags::empty())],
        };
        let mut root_exclude = prop("hidden", PropType::Int, 0, PropFlags::EXCLUDE);
        root_exclude.dt_name = "DT_Sub".into();
        let root = SendTable {
            net_table_name: "DT_Root".into(),
            props: vec![
                root_exclude,
                {
                    let mut p = prop("sub", PropType::DataTable, 0, PropFlags::COLLAPSIBLE);
                    p.dt_name = "DT_Sub".into();
                    p
                },
            ],
        };
        let store = SendTableStore::new(vec![root, sub]);
        let class = ServerClassEntry {
            class_id: 1,
            name: "Root".into(),
            dt_name: "DT_Root".into(),
        };
        let flat = flatten_class(&store, &class).unwrap();
        assert!(flat.props.iter().all(|p| p.var_name != "hidden"));
    }

    #[test]
    fn server_class_bits_matches_reference_formula() {
        assert_eq!(server_class_bits(256), 9);
        assert_eq!(server_class_bits(300), 10);
    }
}
