pub mod clahe;
pub mod codec;
pub mod difference;
pub mod edges;
pub mod params;
pub mod preprocessing;
pub mod steps;

use image::GrayImage;
use std::path::Path;
use std::sync::Arc;

use crate::error::{InputRole, PipelineError, Result};
use crate::models::{EncodedResult, SubtractionResult};
use crate::pipeline::{FrameSet, Pipeline};
use clahe::Clahe;
use params::SubtractionParams;
use steps::*;

/// Digital subtraction of a mask/contrast pair.
///
/// Holds only fixed parameters, so one instance can be shared between
/// threads and invoked concurrently.
#[derive(Clone)]
pub struct SubtractionPipeline {
    params: SubtractionParams,
    pipeline: Pipeline,
}

impl SubtractionPipeline {
    pub fn new(params: SubtractionParams) -> Result<Self> {
        params.validate()?;
        let pipeline = build_standard_pipeline(&params);
        Ok(Self { params, pipeline })
    }

    /// Dump every intermediate image into `dir`, which must be empty or absent.
    pub fn with_debug(mut self, dir: impl AsRef<Path>) -> Result<Self> {
        self.pipeline = self.pipeline.with_debug(dir)?;
        Ok(self)
    }

    pub fn params(&self) -> &SubtractionParams {
        &self.params
    }

    /// Decode both uploads, subtract, and encode the subtracted image and edge map.
    pub fn run(&self, mask_bytes: &[u8], contrast_bytes: &[u8]) -> Result<EncodedResult> {
        let limits = &self.params.limits;
        let mask = codec::decode_gray(mask_bytes, InputRole::Mask, limits)?;
        let contrast = codec::decode_gray(contrast_bytes, InputRole::Contrast, limits)?;

        let result = self.process(mask, contrast)?;

        Ok(EncodedResult {
            subtracted: codec::encode_gray(&result.subtracted, self.params.output)?,
            edges: codec::encode_gray(&result.edges, self.params.output)?,
        })
    }

    /// Same as [`run`](Self::run) on already decoded grayscale images.
    pub fn process(&self, mask: GrayImage, contrast: GrayImage) -> Result<SubtractionResult> {
        for (input, img) in [(InputRole::Mask, &mask), (InputRole::Contrast, &contrast)] {
            if img.width() == 0 || img.height() == 0 {
                return Err(PipelineError::EmptyImage { input });
            }
        }

        let span = tracing::info_span!(
            "subtraction",
            width = mask.width(),
            height = mask.height()
        );
        let _enter = span.enter();

        let out = self.pipeline.run(FrameSet::new(mask, contrast))?;
        let subtracted = out.require_subtracted("output")?.clone();
        let edges = out.edges.ok_or_else(|| PipelineError::MissingFrame {
            step: "output".to_string(),
            missing: "an edge map",
        })?;

        tracing::info!("subtraction finished");
        Ok(SubtractionResult { subtracted, edges })
    }
}

/// Build the standard align → blur → CLAHE → difference → normalize → edges sequence
pub fn build_standard_pipeline(params: &SubtractionParams) -> Pipeline {
    let [tiles_x, tiles_y] = params.clahe_tile_grid;

    Pipeline::new()
        .add_step(Arc::new(AlignStep))
        .add_step(Arc::new(BlurStep {
            kernel_size: params.blur_kernel,
            sigma: params.blur_sigma,
        }))
        .add_step(Arc::new(ClaheStep {
            clahe: Clahe::new(params.clahe_clip_limit, tiles_x, tiles_y),
        }))
        .add_step(Arc::new(DifferenceStep))
        .add_step(Arc::new(NormalizeStep))
        .add_step(Arc::new(EdgeDetectionStep {
            low_threshold: params.canny_low,
            high_threshold: params.canny_high,
        }))
}
