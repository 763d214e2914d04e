//! Report output: JSON, text and CSV renderers.

pub mod csv;
pub mod generator;

pub use csv::generate_csv;
pub use generator::{
    render_aggregate, render_comparisons, render_trend, render_validation, write_output,
};
