//! Upload workflow: run the pipeline on a bounded worker pool, then store
//! the artifacts under their fixed names and record the scan.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};

use crate::core::db::{NewScan, ScanDb, ScanRecord, ScanRepository};
use crate::core::store::{ArtifactKind, ArtifactStore};
use crate::error::ServiceError;
use crate::models::EncodedResult;
use crate::subtraction::SubtractionPipeline;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Maximum number of pipeline runs executing at once.
    pub workers: usize,
    /// Wall-clock limit for one pipeline run.
    pub timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct ScanService {
    pipeline: Arc<SubtractionPipeline>,
    db: ScanDb,
    store: ArtifactStore,
    permits: Arc<Semaphore>,
    timeout: Duration,
    owner_locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl ScanService {
    pub fn new(
        pipeline: SubtractionPipeline,
        db: ScanDb,
        store: ArtifactStore,
        config: ServiceConfig,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            db,
            store,
            permits: Arc::new(Semaphore::new(config.workers.max(1))),
            timeout: config.timeout,
            owner_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn db(&self) -> &ScanDb {
        &self.db
    }

    /// Process a new upload. Nothing is written unless the pipeline succeeds;
    /// on success the owner's previous artifacts are replaced.
    pub async fn upload(
        &self,
        owner_id: i64,
        mask: Vec<u8>,
        contrast: Vec<u8>,
    ) -> Result<ScanRecord, ServiceError> {
        let mask: Arc<[u8]> = mask.into();
        let contrast: Arc<[u8]> = contrast.into();

        let result = self.run_pipeline(mask.clone(), contrast.clone()).await?;

        let lock = self.owner_lock(owner_id);
        let _guard = lock.lock().await;
        let [mask_ref, contrast_ref, result_ref, edge_ref] = self
            .store
            .write_all(
                owner_id,
                [
                    (ArtifactKind::Mask, &mask[..]),
                    (ArtifactKind::Contrast, &contrast[..]),
                    (ArtifactKind::Subtracted, &result.subtracted[..]),
                    (ArtifactKind::Edges, &result.edges[..]),
                ],
            )
            .await?;
        self.record(NewScan::now(owner_id, mask_ref, contrast_ref, result_ref, edge_ref))
            .await
    }

    /// Rerun the pipeline on the owner's retained mask and contrast images.
    pub async fn reprocess(&self, owner_id: i64) -> Result<ScanRecord, ServiceError> {
        let lock = self.owner_lock(owner_id);
        let _guard = lock.lock().await;

        let mask_ref = self.store.reference(owner_id, ArtifactKind::Mask);
        let contrast_ref = self.store.reference(owner_id, ArtifactKind::Contrast);
        if !self.store.exists(&mask_ref).await? || !self.store.exists(&contrast_ref).await? {
            return Err(ServiceError::NothingToReprocess { owner: owner_id });
        }

        let mask = self.store.read(&mask_ref).await?;
        let contrast = self.store.read(&contrast_ref).await?;
        let result = self.run_pipeline(mask.into(), contrast.into()).await?;
        let (result_ref, edge_ref) = self.store.write_results(owner_id, &result).await?;
        self.record(NewScan::now(owner_id, mask_ref, contrast_ref, result_ref, edge_ref))
            .await
    }

    /// Delete the subtracted and edge artifacts of every scan of the owner.
    /// Mask and contrast images stay. Returns the number of scans updated.
    pub async fn clear_results(&self, owner_id: i64) -> Result<u64, ServiceError> {
        let lock = self.owner_lock(owner_id);
        let _guard = lock.lock().await;

        let mut removed = 0usize;
        for scan in self.db.list_scans(owner_id).await? {
            for reference in [&scan.result_ref, &scan.edge_ref].into_iter().flatten() {
                if self.store.remove(reference).await? {
                    removed += 1;
                }
            }
        }

        let cleared = self.db.clear_results(owner_id).await?;
        tracing::info!(owner_id, cleared, files_removed = removed, "cleared results");
        Ok(cleared)
    }

    /// The newest scan of the owner, provided it still has all four artifacts on disk.
    pub async fn latest_complete(&self, owner_id: i64) -> Result<Option<ScanRecord>, ServiceError> {
        let Some(scan) = self.db.latest_scan(owner_id).await? else {
            return Ok(None);
        };
        let Some(refs) = scan.all_refs() else {
            return Ok(None);
        };
        for reference in refs {
            if !self.store.exists(reference).await? {
                tracing::debug!(owner_id, reference, "latest scan is missing an artifact");
                return Ok(None);
            }
        }
        Ok(Some(scan))
    }

    /// Every scan of the owner, newest first.
    pub async fn history(&self, owner_id: i64) -> Result<Vec<ScanRecord>, ServiceError> {
        Ok(self.db.list_scans(owner_id).await?)
    }

    /// Writers of one owner's artifacts take this lock so the four files of
    /// a scan always come from the same run.
    fn owner_lock(&self, owner_id: i64) -> Arc<AsyncMutex<()>> {
        let mut locks = self.owner_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(owner_id).or_default().clone()
    }

    async fn record(&self, scan: NewScan) -> Result<ScanRecord, ServiceError> {
        let scan = self.db.record_scan(scan).await?;
        tracing::info!(owner_id = scan.owner_id, scan_id = scan.id, "recorded scan");
        Ok(scan)
    }

    /// Run the pipeline on a blocking thread once a worker permit is free.
    ///
    /// The permit travels with the blocking task, so a run that outlives
    /// the timeout keeps its slot until it actually finishes.
    async fn run_pipeline(
        &self,
        mask: Arc<[u8]>,
        contrast: Arc<[u8]>,
    ) -> Result<EncodedResult, ServiceError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ServiceError::WorkerFailed(e.to_string()))?;

        let pipeline = self.pipeline.clone();
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            pipeline.run(&mask, &contrast)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "pipeline run timed out");
                Err(ServiceError::Timeout(self.timeout))
            }
            Ok(Err(join_err)) => Err(ServiceError::WorkerFailed(join_err.to_string())),
            Ok(Ok(result)) => Ok(result?),
        }
    }
}
