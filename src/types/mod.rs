//! Core domain types.

pub mod ids;

pub use ids::{ImageId, MediaId, PostId, StatusId};
