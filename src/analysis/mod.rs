//! Analysis core.
//!
//! Everything here is synchronous and free of I/O: validation of raw
//! records, grouped aggregation, the endpoint trend and pairwise comparison.

pub mod aggregator;
pub mod compare;
pub mod trend;
pub mod validate;

pub use aggregator::{aggregate_sharded, aggregate_with_top};
pub use compare::compare_all;
pub use trend::temporal_trend;
pub use validate::ShapeError;
