//! String tables, player-info records, and the entity registry.
//! Depends on `clutch-core` for bit reading and errors and on
//! `clutch-proto` for flattened class descriptors.

pub mod entity;
pub mod playerinfo;
pub mod stringtable;

pub use entity::{Entity, EntityRegistry, EntityUpdate, UpdateKind, MAX_EDICTS};
pub use playerinfo::PlayerInfo;
pub use stringtable::{DecodedEntry, StringTable};
