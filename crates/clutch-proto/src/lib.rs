//! Send-table flattening and property decoding. Depends only
//! on `clutch-core` (bit reader, wire reader, error types).

pub mod decode;
pub mod descriptor;
pub mod flatten;
pub mod sendtable;
pub mod value;

pub use decode::decode_prop;
pub use flatten::{flatten_class, server_class_bits, FlattenedClass};
pub use sendtable::{parse_data_tables_block, SendTableStore};
pub use value::DecodedValue;
