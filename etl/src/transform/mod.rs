//! Transformation module.
//!
//! This module handles raw record to relational row transformation:
//! - Normalize: Field coercions (numeric, integer, flag, text)
//! - Denormalize: Validated properties to per-table fact rows
//! - Pipeline: Extract, transform, load orchestration

pub mod denormalize;
pub mod normalize;
pub mod pipeline;

pub use denormalize::{collect_dimensions, denormalize, denormalize_all, DimensionCounts, Dimensions};
pub use normalize::{normalize_flag, normalize_integer, normalize_numeric, normalize_text};
pub use pipeline::*;
