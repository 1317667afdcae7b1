pub mod queries;
pub mod store;

pub use store::{open, Change, Collection, KvStore, SharedStore};
