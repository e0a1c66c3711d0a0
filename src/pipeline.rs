use image::GrayImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{PipelineError, Result};

/// Images that flow through the pipeline.
///
/// `mask` and `contrast` are always present. The derived images are filled
/// in by the difference and edge steps.
#[derive(Clone, Debug)]
pub struct FrameSet {
    pub mask: GrayImage,
    pub contrast: GrayImage,
    pub subtracted: Option<GrayImage>,
    pub edges: Option<GrayImage>,
}

impl FrameSet {
    pub fn new(mask: GrayImage, contrast: GrayImage) -> Self {
        Self {
            mask,
            contrast,
            subtracted: None,
            edges: None,
        }
    }

    /// Replace mask and contrast with the output of `f`, applied to each independently.
    pub fn map_inputs(mut self, f: impl Fn(&GrayImage) -> GrayImage) -> Self {
        self.mask = f(&self.mask);
        self.contrast = f(&self.contrast);
        self
    }

    /// The subtracted image, or an error naming the step that needed it.
    pub fn require_subtracted(&self, step: &str) -> Result<&GrayImage> {
        self.subtracted.as_ref().ok_or_else(|| PipelineError::MissingFrame {
            step: step.to_string(),
            missing: "a subtracted image",
        })
    }

    /// Every image currently present, with the file stem used in debug output.
    pub fn named_frames(&self) -> Vec<(&'static str, &GrayImage)> {
        let mut frames = vec![("mask", &self.mask), ("contrast", &self.contrast)];
        if let Some(img) = &self.subtracted {
            frames.push(("subtracted", img));
        }
        if let Some(img) = &self.edges {
            frames.push(("edges", img));
        }
        frames
    }
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

impl DebugConfig {
    /// Write every frame of `data` into `<output_dir>/<dir_name>/`.
    fn dump(&self, dir_name: &str, data: &FrameSet) -> Result<()> {
        let step_dir = self.output_dir.join(dir_name);
        std::fs::create_dir_all(&step_dir)
            .map_err(|e| PipelineError::Debug(format!("{}: {}", step_dir.display(), e)))?;

        for (stem, img) in data.named_frames() {
            let path = step_dir.join(format!("{}.png", stem));
            img.save(&path)
                .map_err(|e| PipelineError::Debug(format!("{}: {}", path.display(), e)))?;
        }
        tracing::debug!(dir = %step_dir.display(), "saved debug frames");
        Ok(())
    }
}

/// Context available to all pipeline steps
#[derive(Clone, Debug, Default)]
pub struct PipelineContext {
    pub debug: Option<DebugConfig>,
}

/// Trait that all pipeline steps must implement
pub trait PipelineStep: Send + Sync {
    /// Transform the frame set. Steps must not keep state between calls.
    fn process(&self, data: FrameSet, context: &PipelineContext) -> Result<FrameSet>;

    /// Human-readable name for this step (used in logs and debug directory names)
    fn name(&self) -> &str;
}

fn step_dir_name(index: usize, name: &str) -> String {
    format!("{:02}_{}", index, name.to_lowercase().replace(' ', "_"))
}

/// Composable pipeline builder
#[derive(Clone)]
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
}

impl Pipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            context: PipelineContext::default(),
        }
    }

    /// Enable debug mode with output directory.
    /// The directory must be empty or non-existent.
    pub fn with_debug(mut self, output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        if output_dir.exists() {
            let mut entries = std::fs::read_dir(&output_dir)
                .map_err(|e| PipelineError::Debug(format!("{}: {}", output_dir.display(), e)))?;
            if entries.next().is_some() {
                return Err(PipelineError::Debug(format!(
                    "debug directory is not empty: {}",
                    output_dir.display()
                )));
            }
        } else {
            std::fs::create_dir_all(&output_dir)
                .map_err(|e| PipelineError::Debug(format!("{}: {}", output_dir.display(), e)))?;
        }

        self.context.debug = Some(DebugConfig { output_dir });
        Ok(self)
    }

    /// Add a processing step to the pipeline
    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Helper method to add a step from a Box (for convenience)
    pub fn add_step_boxed(mut self, step: Box<dyn PipelineStep>) -> Self {
        self.steps.push(Arc::from(step));
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Run every step in order.
    pub fn run(&self, input: FrameSet) -> Result<FrameSet> {
        self.run_partial(input, self.steps.len())
    }

    /// Run the pipeline but stop after `num_steps` steps (useful for debugging)
    pub fn run_partial(&self, input: FrameSet, num_steps: usize) -> Result<FrameSet> {
        if let Some(debug) = &self.context.debug {
            debug.dump("00_input", &input)?;
        }

        let mut data = input;
        for (idx, step) in self.steps.iter().take(num_steps).enumerate() {
            let span = tracing::debug_span!("step", index = idx + 1, name = step.name());
            let _enter = span.enter();

            let started = Instant::now();
            data = step.process(data, &self.context)?;
            tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "step finished");

            if let Some(debug) = &self.context.debug {
                debug.dump(&step_dir_name(idx + 1, step.name()), &data)?;
            }
        }

        Ok(data)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
