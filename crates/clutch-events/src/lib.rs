//! Game-event binding and the semantic derived-state layer.
//! Depends on `clutch-proto` for decoded property values and
//! `clutch-state` for the entity registry and player-info records.

pub mod descriptor;
pub mod geometry;
pub mod session;

pub use descriptor::{
    EventDescriptor, EventValue, GameEventTable, KeyDescriptor, KeyType, RawGameEvent, RawKeyValue,
};
pub use geometry::{occluding_smokes, Point};
pub use session::{ClassIndices, MmRankUpdate, NormalizedEvent, Session, SessionConfig};
