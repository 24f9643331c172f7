//! Fixed-shape containers and their backing storage

mod array;
mod id;
mod storage;

pub use array::StaticArray;
pub use id::NodeId;
pub use storage::Storage;
