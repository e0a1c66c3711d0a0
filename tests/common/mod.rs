#![allow(dead_code, unused_imports)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from dsasim for tests
pub use dsasim::core::db::{NewScan, ScanDb, ScanRecord, ScanRepository};
pub use dsasim::core::store::{ArtifactKind, ArtifactStore};
pub use dsasim::{
    InputRole, OutputFormat, PipelineError, ScanService, ServiceConfig, ServiceError,
    SubtractionParams, SubtractionPipeline,
};
