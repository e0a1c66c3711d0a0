use image::GrayImage;

/// Pixel-level output of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtractionResult {
    /// Normalized `|contrast - mask|`, same size as the mask.
    pub subtracted: GrayImage,
    /// Binary edge map (0 or 255) of `subtracted`.
    pub edges: GrayImage,
}

impl SubtractionResult {
    pub fn dimensions(&self) -> (u32, u32) {
        self.subtracted.dimensions()
    }
}

/// Encoded output of one pipeline run, ready to be stored.
#[derive(Debug, Clone)]
pub struct EncodedResult {
    pub subtracted: Vec<u8>,
    pub edges: Vec<u8>,
}
