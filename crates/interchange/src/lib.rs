//! sqexport-interchange: converts tagged engine results into the plain JSON
//! written to the export file.

pub mod flatten;

pub use flatten::{flatten, number_to_json, to_json_string};
