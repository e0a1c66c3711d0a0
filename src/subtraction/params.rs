use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PipelineError, Result};

/// Encoding used for the subtracted image and the edge map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg { quality: u8 },
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg { .. } => "jpeg",
            OutputFormat::Png => "png",
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Jpeg { quality: 95 }
    }
}

/// Upper bounds applied while decoding uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputLimits {
    pub max_bytes: usize,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_bytes: 64 * 1024 * 1024,
            max_width: 16_384,
            max_height: 16_384,
        }
    }
}

/// Fixed parameters of the subtraction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtractionParams {
    /// Side of the square Gaussian kernel; must be odd.
    pub blur_kernel: u32,
    /// Gaussian sigma; zero or negative derives it from `blur_kernel`.
    pub blur_sigma: f32,
    pub clahe_clip_limit: f32,
    /// Tile grid as `[columns, rows]`.
    pub clahe_tile_grid: [u32; 2],
    pub canny_low: f32,
    pub canny_high: f32,
    pub output: OutputFormat,
    pub limits: InputLimits,
}

impl Default for SubtractionParams {
    fn default() -> Self {
        Self {
            blur_kernel: 5,
            blur_sigma: 0.0,
            clahe_clip_limit: 2.0,
            clahe_tile_grid: [8, 8],
            canny_low: 50.0,
            canny_high: 150.0,
            output: OutputFormat::default(),
            limits: InputLimits::default(),
        }
    }
}

impl SubtractionParams {
    /// Load parameters from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read parameter file {:?}", path))?;
        let params: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse parameter file {:?}", path))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::InvalidParams(msg));

        if self.blur_kernel == 0 || self.blur_kernel % 2 == 0 {
            return invalid(format!("blur_kernel must be odd, got {}", self.blur_kernel));
        }
        if self.clahe_tile_grid.contains(&0) {
            return invalid(format!(
                "clahe_tile_grid must be positive, got {:?}",
                self.clahe_tile_grid
            ));
        }
        if !(self.canny_low >= 0.0 && self.canny_low <= self.canny_high) {
            return invalid(format!(
                "canny thresholds must satisfy 0 <= low <= high, got {} / {}",
                self.canny_low, self.canny_high
            ));
        }
        if let OutputFormat::Jpeg { quality } = self.output {
            if !(1..=100).contains(&quality) {
                return invalid(format!("jpeg quality must be in 1..=100, got {}", quality));
            }
        }
        if self.limits.max_bytes == 0 || self.limits.max_width == 0 || self.limits.max_height == 0 {
            return invalid("input limits must be positive".to_string());
        }
        Ok(())
    }
}
