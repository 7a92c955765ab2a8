//! Layer merging on raw TOML trees.
//!
//! Merging works on [`toml::Value`] rather than deserialized structs so that
//! a key missing from an overlay never resets the value below it.

mod deep;
mod enforce;
mod path;
mod restrict;
mod types;

pub(crate) use deep::record_leaves;
pub use deep::deep_merge_tracking;
pub use restrict::enforce_restrictions;
pub use types::{ConfigLayer, FieldSources};
