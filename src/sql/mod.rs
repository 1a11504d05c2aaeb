//! Safe SQL builder: identifiers quoted here only, values as parameters.

mod builder;
pub mod params;
pub mod row;
pub use builder::*;
pub use params::*;
pub use row::{column_names, raw_row_to_json, row_to_json};
