//! Digital subtraction of angiography-style image pairs.
//!
//! - `subtraction` - the mask/contrast differencing pipeline
//! - `pipeline` - the composable step runner it is built on
//! - `core` - scan records and fixed-name artifact storage
//! - `service` - upload workflow tying the two together

pub mod core;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod service;
pub mod subtraction;

pub use error::{InputRole, PipelineError, ServiceError};
pub use models::{EncodedResult, SubtractionResult};
pub use pipeline::{FrameSet, Pipeline, PipelineContext, PipelineStep};
pub use service::{ScanService, ServiceConfig};
pub use subtraction::SubtractionPipeline;
pub use subtraction::params::{InputLimits, OutputFormat, SubtractionParams};

/// Install the global tracing subscriber. `RUST_LOG` overrides `default_level`.
///
/// Meant to be called once by the binary.
pub fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
