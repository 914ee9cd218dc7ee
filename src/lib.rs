#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod hash_map;
pub mod hash_set;
pub mod hash_table;

pub use hash_map::HashMap;
pub use hash_set::HashSet;
pub use hash_table::CapacityError;
pub use hash_table::DEFAULT_DELTA;
pub use hash_table::Error;
pub use hash_table::HashTable;
