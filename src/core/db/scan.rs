use time::OffsetDateTime;

/// One processed upload of an owner.
///
/// The `*_ref` fields are artifact references understood by
/// [`ArtifactStore`](crate::core::store::ArtifactStore). `result_ref` and
/// `edge_ref` become `None` once results are cleared.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    pub id: i64,
    pub owner_id: i64,
    pub created_at: OffsetDateTime,
    pub mask_ref: String,
    pub contrast_ref: String,
    pub result_ref: Option<String>,
    pub edge_ref: Option<String>,
}

impl ScanRecord {
    pub fn has_results(&self) -> bool {
        self.result_ref.is_some() && self.edge_ref.is_some()
    }

    /// All four references, or `None` if any derived one was cleared.
    pub fn all_refs(&self) -> Option<[&str; 4]> {
        Some([
            self.mask_ref.as_str(),
            self.contrast_ref.as_str(),
            self.result_ref.as_deref()?,
            self.edge_ref.as_deref()?,
        ])
    }
}

#[derive(Debug, Clone)]
pub struct NewScan {
    pub owner_id: i64,
    pub created_at: OffsetDateTime,
    pub mask_ref: String,
    pub contrast_ref: String,
    pub result_ref: Option<String>,
    pub edge_ref: Option<String>,
}

impl NewScan {
    /// A scan stamped with the current UTC time.
    pub fn now(
        owner_id: i64,
        mask_ref: String,
        contrast_ref: String,
        result_ref: String,
        edge_ref: String,
    ) -> Self {
        Self {
            owner_id,
            created_at: OffsetDateTime::now_utc(),
            mask_ref,
            contrast_ref,
            result_ref: Some(result_ref),
            edge_ref: Some(edge_ref),
        }
    }
}

pub trait ScanRepository {
    fn record_scan(&self, scan: NewScan) -> impl Future<Output = anyhow::Result<ScanRecord>>;
    fn get_scan(&self, id: i64) -> impl Future<Output = anyhow::Result<Option<ScanRecord>>>;
    /// Newest scan of `owner_id`, ties broken by insertion order.
    fn latest_scan(&self, owner_id: i64) -> impl Future<Output = anyhow::Result<Option<ScanRecord>>>;
    /// All scans of `owner_id`, newest first.
    fn list_scans(&self, owner_id: i64) -> impl Future<Output = anyhow::Result<Vec<ScanRecord>>>;
    /// Drop the result and edge references of every scan of `owner_id`.
    /// Returns how many scans had references to drop.
    fn clear_results(&self, owner_id: i64) -> impl Future<Output = anyhow::Result<u64>>;
}
