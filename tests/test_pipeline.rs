//! Integration tests for the subtraction pipeline.
//!
//! Tests cover:
//! - Alignment of differently sized inputs and the output dimensions
//! - Determinism of repeated runs
//! - Min-max normalization and the constant-difference case
//! - Binary edge output
//! - Decode failures

mod common;

use common::*;
use dsasim::subtraction::preprocessing::align_to;

#[test]
fn test_alignment_is_identity_for_matching_sizes() {
    let (_, contrast) = vessel_pair();
    let aligned = align_to(&contrast, 128, 128).unwrap();
    assert_eq!(aligned, contrast);
}

#[test]
fn test_outputs_take_mask_dimensions() -> anyhow::Result<()> {
    let pipeline = png_pipeline();
    let mask = image::GrayImage::from_fn(64, 48, |x, y| image::Luma([(x * 3 + y) as u8]));
    let contrast = image::GrayImage::from_fn(30, 20, |x, y| image::Luma([(x * 5 + y * 2) as u8]));

    let result = pipeline.run(&png_bytes(&mask), &png_bytes(&contrast))?;

    assert_eq!(decode(&result.subtracted).dimensions(), (64, 48));
    assert_eq!(decode(&result.edges).dimensions(), (64, 48));
    Ok(())
}

#[test]
fn test_repeated_runs_are_identical() -> anyhow::Result<()> {
    let pipeline = png_pipeline();
    let (mask, contrast) = vessel_pair();

    let first = pipeline.process(mask.clone(), contrast.clone())?;
    let second = pipeline.process(mask.clone(), contrast.clone())?;
    assert_eq!(first, second);

    let encoded_a = pipeline.run(&png_bytes(&mask), &png_bytes(&contrast))?;
    let encoded_b = pipeline.run(&png_bytes(&mask), &png_bytes(&contrast))?;
    assert_eq!(decode(&encoded_a.subtracted), decode(&encoded_b.subtracted));
    assert_eq!(decode(&encoded_a.edges), decode(&encoded_b.edges));

    // Lossless output decodes to exactly the pixel-level result.
    assert_eq!(decode(&encoded_a.subtracted), first.subtracted);
    assert_eq!(decode(&encoded_a.edges), first.edges);
    Ok(())
}

#[test]
fn test_varying_difference_spans_full_range() -> anyhow::Result<()> {
    let (mask, contrast) = vessel_pair();
    let result = png_pipeline().process(mask, contrast)?;

    let min = result.subtracted.pixels().map(|p| p[0]).min().unwrap();
    let max = result.subtracted.pixels().map(|p| p[0]).max().unwrap();
    assert_eq!(min, 0);
    assert_eq!(max, 255);

    // The band lights up, the rows far away from it stay dark.
    assert_eq!(result.subtracted.get_pixel(64, 5)[0], 0);
    assert!(result.subtracted.get_pixel(64, 63)[0] > 128);
    Ok(())
}

#[test]
fn test_vessel_band_produces_edges() -> anyhow::Result<()> {
    let (mask, contrast) = vessel_pair();
    let result = png_pipeline().process(mask, contrast)?;

    assert!(result.edges.pixels().any(|p| p[0] == 255));
    assert!(result.edges.pixels().all(|p| p[0] == 0 || p[0] == 255));
    // No edges in the region that is identical in both inputs.
    for y in 0..20 {
        for x in 0..128 {
            assert_eq!(result.edges.get_pixel(x, y)[0], 0);
        }
    }
    Ok(())
}

#[test]
fn test_identical_inputs_give_empty_outputs() -> anyhow::Result<()> {
    let (mask, _) = vessel_pair();
    let result = png_pipeline().process(mask.clone(), mask)?;

    assert!(result.subtracted.pixels().all(|p| p[0] == 0));
    assert!(result.edges.pixels().all(|p| p[0] == 0));
    Ok(())
}

#[test]
fn test_uniform_gray_with_smaller_contrast() -> anyhow::Result<()> {
    let pipeline = png_pipeline();
    let result = pipeline.run(&png_bytes(&uniform(100, 100, 128)), &png_bytes(&uniform(50, 50, 128)))?;

    let subtracted = decode(&result.subtracted);
    let edges = decode(&result.edges);
    assert_eq!(subtracted.dimensions(), (100, 100));
    assert!(subtracted.pixels().all(|p| p[0] == 0));
    assert!(edges.pixels().all(|p| p[0] == 0));
    Ok(())
}

#[test]
fn test_black_against_white_is_a_constant_difference() -> anyhow::Result<()> {
    let pipeline = png_pipeline();
    let result = pipeline.run(&png_bytes(&uniform(100, 100, 0)), &png_bytes(&uniform(100, 100, 255)))?;

    assert!(decode(&result.subtracted).pixels().all(|p| p[0] == 0));
    assert!(decode(&result.edges).pixels().all(|p| p[0] == 0));
    Ok(())
}

#[test]
fn test_empty_mask_buffer_is_a_decode_error() {
    let pipeline = png_pipeline();
    let err = pipeline
        .run(&[], &png_bytes(&uniform(10, 10, 1)))
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Decode {
            input: InputRole::Mask,
            ..
        }
    ));
}

#[test]
fn test_bad_contrast_buffer_names_the_contrast() {
    let pipeline = png_pipeline();
    let err = pipeline
        .run(&png_bytes(&uniform(10, 10, 1)), b"not an image")
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Decode {
            input: InputRole::Contrast,
            ..
        }
    ));
}

#[test]
fn test_empty_grid_is_rejected() {
    let err = png_pipeline()
        .process(image::GrayImage::new(0, 0), uniform(4, 4, 9))
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::EmptyImage {
            input: InputRole::Mask
        }
    ));
}

#[test]
fn test_jpeg_output_by_default() -> anyhow::Result<()> {
    let pipeline = SubtractionPipeline::new(SubtractionParams::default())?;
    let (mask, contrast) = vessel_pair();
    let result = pipeline.run(&png_bytes(&mask), &png_bytes(&contrast))?;

    assert_eq!(&result.subtracted[..2], &[0xFF, 0xD8]);
    assert_eq!(&result.edges[..2], &[0xFF, 0xD8]);
    assert_eq!(decode(&result.edges).dimensions(), (128, 128));
    Ok(())
}

#[test]
fn test_debug_mode_dumps_every_step() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let debug_dir = dir.path().join("debug");
    let pipeline = png_pipeline().with_debug(&debug_dir)?;
    let (mask, contrast) = vessel_pair();

    pipeline.process(mask, contrast)?;

    for step in [
        "00_input",
        "01_align",
        "02_gaussian_blur",
        "03_clahe",
        "04_difference",
        "05_normalize",
        "06_edge_detection",
    ] {
        assert!(debug_dir.join(step).join("mask.png").is_file(), "{}", step);
    }
    assert!(debug_dir.join("06_edge_detection").join("edges.png").is_file());
    assert!(!debug_dir.join("03_clahe").join("subtracted.png").exists());
    Ok(())
}

#[test]
fn test_invalid_params_are_rejected() {
    let params = SubtractionParams {
        clahe_tile_grid: [0, 8],
        ..Default::default()
    };
    assert!(matches!(
        SubtractionPipeline::new(params),
        Err(PipelineError::InvalidParams(_))
    ));
}
