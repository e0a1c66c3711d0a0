use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{GrayImage, ImageError, ImageReader};
use std::io::Cursor;

use crate::error::{InputRole, PipelineError, Result};
use crate::subtraction::params::{InputLimits, OutputFormat};

/// Decode an uploaded buffer to an 8-bit grayscale grid.
///
/// Color inputs are converted to luma; channel information is discarded.
pub fn decode_gray(bytes: &[u8], input: InputRole, limits: &InputLimits) -> Result<GrayImage> {
    if bytes.len() > limits.max_bytes {
        return Err(PipelineError::InputTooLarge {
            input,
            reason: format!("{} bytes, limit is {}", bytes.len(), limits.max_bytes),
        });
    }

    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PipelineError::Decode {
            input,
            source: ImageError::IoError(e),
        })?;

    let mut decode_limits = image::Limits::default();
    decode_limits.max_image_width = Some(limits.max_width);
    decode_limits.max_image_height = Some(limits.max_height);
    reader.limits(decode_limits);

    let decoded = reader.decode().map_err(|e| match e {
        ImageError::Limits(err) => PipelineError::InputTooLarge {
            input,
            reason: err.to_string(),
        },
        source => PipelineError::Decode { input, source },
    })?;

    let gray = decoded.into_luma8();
    if gray.width() == 0 || gray.height() == 0 {
        return Err(PipelineError::EmptyImage { input });
    }

    tracing::debug!(%input, width = gray.width(), height = gray.height(), "decoded input");
    Ok(gray)
}

/// Encode a grayscale grid in the configured output format.
pub fn encode_gray(img: &GrayImage, format: OutputFormat) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let written = match format {
        OutputFormat::Jpeg { quality } => {
            img.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        }
        OutputFormat::Png => img.write_with_encoder(PngEncoder::new(&mut buf)),
    };
    written.map_err(PipelineError::Encode)?;
    Ok(buf)
}
