//! `reprsim-core`: shared building blocks for the similarity explorer.
//!
//! This crate contains **pure** value types (no async, no IO): identifiers,
//! the tile grid and the user's selection.

pub mod error;
pub mod grid;
pub mod id;
pub mod selection;

pub use error::{CoreError, CoreResult};
pub use grid::{GridShape, Tile};
pub use id::{JobId, SubjectId};
pub use selection::{Selection, WorkItemKey};
