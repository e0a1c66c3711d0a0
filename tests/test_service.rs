//! Integration tests for the upload workflow.
//!
//! Tests cover:
//! - Uploads storing the four fixed-name artifacts and a scan record
//! - Later uploads replacing the artifacts but keeping history
//! - Clearing results while keeping mask and contrast
//! - Latest-scan lookup hiding scans with missing files
//! - Failed runs writing nothing
//! - Reprocessing from retained inputs
//! - Per-run timeout

mod common;

use common::*;
use std::time::Duration;

const OWNER: i64 = 7;

fn vessel_upload() -> (Vec<u8>, Vec<u8>) {
    let (mask, contrast) = vessel_pair();
    (png_bytes(&mask), png_bytes(&contrast))
}

#[tokio::test]
async fn test_upload_stores_artifacts_and_records_scan() -> anyhow::Result<()> {
    let (service, _dir) = create_test_service(test_config()).await;
    let (mask, contrast) = vessel_upload();

    let scan = service.upload(OWNER, mask.clone(), contrast).await?;

    assert!(scan.id > 0);
    assert_eq!(scan.owner_id, OWNER);
    assert_eq!(scan.mask_ref, "7/mask.jpeg");
    assert_eq!(scan.contrast_ref, "7/contrast.jpeg");
    assert_eq!(scan.result_ref.as_deref(), Some("7/subtracted_result.png"));
    assert_eq!(scan.edge_ref.as_deref(), Some("7/vessels_edges.png"));

    let store = service.store();
    assert_eq!(store.read(&scan.mask_ref).await?, mask);
    let subtracted = decode(&store.read(scan.result_ref.as_deref().unwrap()).await?);
    assert_eq!(subtracted.dimensions(), (128, 128));

    let latest = service.latest_complete(OWNER).await?;
    assert_eq!(latest.map(|s| s.id), Some(scan.id));
    Ok(())
}

#[tokio::test]
async fn test_second_upload_replaces_artifacts_and_extends_history() -> anyhow::Result<()> {
    let (service, _dir) = create_test_service(test_config()).await;
    let (mask, contrast) = vessel_upload();

    let first = service.upload(OWNER, mask, contrast).await?;
    let gray = png_bytes(&uniform(40, 40, 128));
    let second = service.upload(OWNER, gray.clone(), gray.clone()).await?;

    assert_eq!(first.result_ref, second.result_ref);
    let subtracted = decode(&service.store().read(second.result_ref.as_deref().unwrap()).await?);
    assert_eq!(subtracted.dimensions(), (40, 40));
    assert!(subtracted.pixels().all(|p| p[0] == 0));
    assert_eq!(service.store().read(&second.mask_ref).await?, gray);

    let history = service.history(OWNER).await?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.id);
    assert_eq!(history[1].id, first.id);
    Ok(())
}

#[tokio::test]
async fn test_clear_results_keeps_inputs() -> anyhow::Result<()> {
    let (service, _dir) = create_test_service(test_config()).await;
    let (mask, contrast) = vessel_upload();
    service.upload(OWNER, mask.clone(), contrast.clone()).await?;
    let scan = service.upload(OWNER, mask, contrast).await?;

    let cleared = service.clear_results(OWNER).await?;
    assert_eq!(cleared, 2);

    let store = service.store();
    assert!(store.exists(&scan.mask_ref).await?);
    assert!(store.exists(&scan.contrast_ref).await?);
    assert!(!store.exists(scan.result_ref.as_deref().unwrap()).await?);
    assert!(!store.exists(scan.edge_ref.as_deref().unwrap()).await?);

    for record in service.history(OWNER).await? {
        assert!(record.result_ref.is_none());
        assert!(record.edge_ref.is_none());
    }
    assert!(service.latest_complete(OWNER).await?.is_none());

    // Nothing left to clear.
    assert_eq!(service.clear_results(OWNER).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_latest_complete_requires_files_on_disk() -> anyhow::Result<()> {
    let (service, _dir) = create_test_service(test_config()).await;
    let (mask, contrast) = vessel_upload();
    let scan = service.upload(OWNER, mask, contrast).await?;

    std::fs::remove_file(service.store().path_of(scan.edge_ref.as_deref().unwrap()))?;

    assert!(service.latest_complete(OWNER).await?.is_none());
    assert_eq!(service.history(OWNER).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_upload_writes_nothing() -> anyhow::Result<()> {
    let (service, _dir) = create_test_service(test_config()).await;
    let (_, contrast) = vessel_upload();

    let result = service.upload(OWNER, Vec::new(), contrast).await;

    assert!(matches!(
        result,
        Err(ServiceError::Pipeline(PipelineError::Decode {
            input: InputRole::Mask,
            ..
        }))
    ));
    assert!(service.history(OWNER).await?.is_empty());
    let mask_ref = service.store().reference(OWNER, ArtifactKind::Mask);
    assert!(!service.store().exists(&mask_ref).await?);
    Ok(())
}

#[tokio::test]
async fn test_reprocess_restores_cleared_results() -> anyhow::Result<()> {
    let (service, _dir) = create_test_service(test_config()).await;
    let (mask, contrast) = vessel_upload();
    let original = service.upload(OWNER, mask, contrast).await?;
    let original_pixels =
        decode(&service.store().read(original.result_ref.as_deref().unwrap()).await?);

    service.clear_results(OWNER).await?;
    let redone = service.reprocess(OWNER).await?;

    assert!(redone.id > original.id);
    let redone_pixels = decode(&service.store().read(redone.result_ref.as_deref().unwrap()).await?);
    assert_eq!(redone_pixels, original_pixels);
    assert_eq!(service.latest_complete(OWNER).await?.map(|s| s.id), Some(redone.id));
    Ok(())
}

#[tokio::test]
async fn test_reprocess_without_inputs_fails() -> anyhow::Result<()> {
    let (service, _dir) = create_test_service(test_config()).await;

    let result = service.reprocess(OWNER).await;

    assert!(matches!(
        result,
        Err(ServiceError::NothingToReprocess { owner: OWNER })
    ));
    Ok(())
}

#[tokio::test]
async fn test_owners_are_isolated() -> anyhow::Result<()> {
    let (service, _dir) = create_test_service(test_config()).await;
    let (mask, contrast) = vessel_upload();
    service.upload(1, mask.clone(), contrast.clone()).await?;
    service.upload(2, mask, contrast).await?;

    service.clear_results(1).await?;

    assert!(service.latest_complete(1).await?.is_none());
    assert!(service.latest_complete(2).await?.is_some());
    assert_eq!(service.history(2).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_run_exceeding_timeout_is_reported() -> anyhow::Result<()> {
    let config = ServiceConfig {
        workers: 1,
        timeout: Duration::ZERO,
    };
    let (service, _dir) = create_test_service(config).await;
    let big = png_bytes(&image::GrayImage::from_fn(512, 512, |x, y| {
        image::Luma([((x ^ y) % 256) as u8])
    }));

    let result = service.upload(OWNER, big.clone(), big).await;

    assert!(matches!(result, Err(ServiceError::Timeout(_))));
    assert!(service.history(OWNER).await?.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_uploads_for_one_owner_stay_consistent() -> anyhow::Result<()> {
    let (service, _dir) = create_test_service(test_config()).await;
    let (vessel_mask, vessel_contrast) = vessel_upload();
    let gray = png_bytes(&uniform(40, 40, 128));

    let (first, second) = tokio::join!(
        service.upload(OWNER, vessel_mask.clone(), vessel_contrast),
        service.upload(OWNER, gray.clone(), gray.clone()),
    );
    first?;
    second?;

    let latest = service
        .latest_complete(OWNER)
        .await?
        .expect("both uploads recorded a complete scan");
    let store = service.store();
    let mask = store.read(&latest.mask_ref).await?;
    let subtracted = decode(&store.read(latest.result_ref.as_deref().unwrap()).await?);

    // The stored mask and the stored result belong to the same upload.
    if mask == vessel_mask {
        assert_eq!(subtracted.dimensions(), (128, 128));
    } else {
        assert_eq!(mask, gray);
        assert_eq!(subtracted.dimensions(), (40, 40));
    }
    assert_eq!(service.history(OWNER).await?.len(), 2);
    Ok(())
}
