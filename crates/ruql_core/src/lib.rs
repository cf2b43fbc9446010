//! Core utilities for ruql.
//!
//! This crate provides foundational types used throughout ruql:
//! - `span`: Byte spans and line/column locations
//! - `line_index`: Offset to line/column conversion

pub mod line_index;
pub mod span;

pub use line_index::LineIndex;
pub use span::{Location, Span};
