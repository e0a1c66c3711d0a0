//! Storage collaborators of the pipeline: scan records and artifact files.

pub mod db;
pub mod store;
