//! Session-scoped in-memory layout caching with fetch bookkeeping.

pub mod store;

pub use store::{LayoutCache, MountId};
