use dsasim::core::db::ScanDb;
use dsasim::core::store::ArtifactStore;
use dsasim::{OutputFormat, ScanService, ServiceConfig, SubtractionParams, SubtractionPipeline};
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use std::io::Cursor;
use std::time::Duration;

/// Encode a grayscale image as PNG bytes, as an upload would arrive.
pub fn png_bytes(img: &GrayImage) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(img.clone())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("Failed to encode test image");
    buf
}

/// Decode pipeline output back to a pixel grid.
pub fn decode(bytes: &[u8]) -> GrayImage {
    image::load_from_memory(bytes)
        .expect("Failed to decode pipeline output")
        .to_luma8()
}

pub fn uniform(width: u32, height: u32, value: u8) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([value]))
}

/// A 128x128 mask with a horizontal intensity ramp, and the same scene with
/// a dark horizontal "vessel" band across rows 60..68.
pub fn vessel_pair() -> (GrayImage, GrayImage) {
    let mask = GrayImage::from_fn(128, 128, |x, _| Luma([80 + (x / 2) as u8]));
    let contrast = GrayImage::from_fn(128, 128, |x, y| {
        let base = 80 + (x / 2) as u8;
        Luma([if (60..68).contains(&y) { base - 60 } else { base }])
    });
    (mask, contrast)
}

/// Default parameters with lossless output, so decoded outputs match pixel grids exactly.
pub fn png_params() -> SubtractionParams {
    SubtractionParams {
        output: OutputFormat::Png,
        ..Default::default()
    }
}

pub fn png_pipeline() -> SubtractionPipeline {
    SubtractionPipeline::new(png_params()).expect("Default parameters are valid")
}

/// A service backed by a temporary directory.
/// Returns both the service and the temp directory (which must be kept alive).
pub async fn create_test_service(config: ServiceConfig) -> (ScanService, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let db = ScanDb::open(dir.path().join("scans.db"))
        .await
        .expect("Failed to open test database");
    let store = ArtifactStore::new(dir.path().join("results"), OutputFormat::Png)
        .expect("Failed to create artifact store");
    (ScanService::new(png_pipeline(), db, store, config), dir)
}

pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        workers: 2,
        timeout: Duration::from_secs(120),
    }
}
