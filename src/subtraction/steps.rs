use crate::error::Result;
use crate::pipeline::{FrameSet, PipelineContext, PipelineStep};
use crate::subtraction::clahe::Clahe;
use crate::subtraction::{difference, edges, preprocessing};

/// Resample the contrast image to the mask's size
pub struct AlignStep;

impl PipelineStep for AlignStep {
    fn process(&self, mut data: FrameSet, _context: &PipelineContext) -> Result<FrameSet> {
        let (width, height) = data.mask.dimensions();
        if data.contrast.dimensions() != (width, height) {
            tracing::debug!(
                from = ?data.contrast.dimensions(),
                to = ?(width, height),
                "resampling contrast image"
            );
        }
        data.contrast = preprocessing::align_to(&data.contrast, width, height)?;
        Ok(data)
    }

    fn name(&self) -> &str {
        "Align"
    }
}

/// Smooth mask and contrast with a Gaussian kernel
pub struct BlurStep {
    pub kernel_size: u32,
    pub sigma: f32,
}

impl PipelineStep for BlurStep {
    fn process(&self, data: FrameSet, _context: &PipelineContext) -> Result<FrameSet> {
        Ok(data.map_inputs(|img| preprocessing::gaussian_blur(img, self.kernel_size, self.sigma)))
    }

    fn name(&self) -> &str {
        "Gaussian Blur"
    }
}

/// Local contrast enhancement of mask and contrast
pub struct ClaheStep {
    pub clahe: Clahe,
}

impl PipelineStep for ClaheStep {
    fn process(&self, data: FrameSet, _context: &PipelineContext) -> Result<FrameSet> {
        Ok(data.map_inputs(|img| self.clahe.apply(img)))
    }

    fn name(&self) -> &str {
        "CLAHE"
    }
}

/// Absolute difference between the enhanced contrast and mask images
pub struct DifferenceStep;

impl PipelineStep for DifferenceStep {
    fn process(&self, mut data: FrameSet, _context: &PipelineContext) -> Result<FrameSet> {
        data.subtracted = Some(difference::absolute_difference(&data.contrast, &data.mask)?);
        Ok(data)
    }

    fn name(&self) -> &str {
        "Difference"
    }
}

/// Min-max stretch of the subtracted image
pub struct NormalizeStep;

impl PipelineStep for NormalizeStep {
    fn process(&self, mut data: FrameSet, _context: &PipelineContext) -> Result<FrameSet> {
        let normalized = difference::normalize_min_max(data.require_subtracted(self.name())?);
        data.subtracted = Some(normalized);
        Ok(data)
    }

    fn name(&self) -> &str {
        "Normalize"
    }
}

/// Detect edges in the subtracted image using Canny
pub struct EdgeDetectionStep {
    pub low_threshold: f32,
    pub high_threshold: f32,
}

impl PipelineStep for EdgeDetectionStep {
    fn process(&self, mut data: FrameSet, _context: &PipelineContext) -> Result<FrameSet> {
        let subtracted = data.require_subtracted(self.name())?;
        let edge_map = edges::canny(subtracted, self.low_threshold, self.high_threshold);
        data.edges = Some(edge_map);
        Ok(data)
    }

    fn name(&self) -> &str {
        "Edge Detection"
    }
}
