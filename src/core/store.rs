use anyhow::Context;
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use uuid::Uuid;

use crate::models::EncodedResult;
use crate::subtraction::params::OutputFormat;

/// The four files kept per owner. Every upload overwrites them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Mask,
    Contrast,
    Subtracted,
    Edges,
}

impl ArtifactKind {
    fn stem(&self) -> &'static str {
        match self {
            ArtifactKind::Mask => "mask",
            ArtifactKind::Contrast => "contrast",
            ArtifactKind::Subtracted => "subtracted_result",
            ArtifactKind::Edges => "vessels_edges",
        }
    }
}

/// Fixed-name artifact files under `<root>/<owner_id>/`.
///
/// References handed out (and stored in scan records) are paths relative
/// to the root, e.g. `7/subtracted_result.jpeg`. Uploaded inputs are kept
/// byte for byte under `mask.jpeg` and `contrast.jpeg`, whatever their
/// actual format; readers sniff the content.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    result_extension: &'static str,
}

impl ArtifactStore {
    pub fn new(root: impl AsRef<Path>, output: OutputFormat) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create artifact directory {:?}", root))?;
        Ok(Self {
            root,
            result_extension: output.extension(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reference(&self, owner_id: i64, kind: ArtifactKind) -> String {
        let extension = match kind {
            ArtifactKind::Mask | ArtifactKind::Contrast => "jpeg",
            ArtifactKind::Subtracted | ArtifactKind::Edges => self.result_extension,
        };
        format!("{}/{}.{}", owner_id, kind.stem(), extension)
    }

    pub fn path_of(&self, reference: &str) -> PathBuf {
        self.root.join(reference)
    }

    /// Write `bytes` as the owner's artifact of `kind`, replacing any previous one.
    pub async fn write(
        &self,
        owner_id: i64,
        kind: ArtifactKind,
        bytes: &[u8],
    ) -> anyhow::Result<String> {
        let [reference] = self.write_all(owner_id, [(kind, bytes)]).await?;
        Ok(reference)
    }

    /// Write several artifacts of one owner together.
    ///
    /// Every file is first written to a uniquely named temp file next to its
    /// destination; the renames only start once all of them are on disk, so a
    /// failed write leaves the previous artifacts in place.
    pub async fn write_all<const N: usize>(
        &self,
        owner_id: i64,
        items: [(ArtifactKind, &[u8]); N],
    ) -> anyhow::Result<[String; N]> {
        let dir = self.root.join(owner_id.to_string());
        async_fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create owner directory {:?}", dir))?;

        let mut staged = Vec::with_capacity(N);
        for (kind, bytes) in items {
            match self.stage(&dir, owner_id, kind, bytes).await {
                Ok(artifact) => staged.push(artifact),
                Err(e) => {
                    discard(&staged).await;
                    return Err(e);
                }
            }
        }

        let mut references = Vec::with_capacity(N);
        for (i, artifact) in staged.iter().enumerate() {
            if let Err(e) = async_fs::rename(&artifact.tmp, &artifact.dest).await {
                discard(&staged[i..]).await;
                return Err(e).with_context(|| {
                    format!("Failed to move {:?} to {:?}", artifact.tmp, artifact.dest)
                });
            }
            tracing::debug!(reference = %artifact.reference, "stored artifact");
            references.push(artifact.reference.clone());
        }

        references
            .try_into()
            .map_err(|_| anyhow::anyhow!("artifact count mismatch for owner {}", owner_id))
    }

    async fn stage(
        &self,
        dir: &Path,
        owner_id: i64,
        kind: ArtifactKind,
        bytes: &[u8],
    ) -> anyhow::Result<StagedArtifact> {
        let reference = self.reference(owner_id, kind);
        let dest = self.path_of(&reference);
        let tmp = dir.join(format!(".{}.{}.tmp", kind.stem(), Uuid::new_v4()));
        if let Err(e) = async_fs::write(&tmp, bytes).await {
            let _ = async_fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("Failed to write {:?}", tmp));
        }
        Ok(StagedArtifact {
            tmp,
            dest,
            reference,
        })
    }

    /// Store both pipeline outputs, returning `(result_ref, edge_ref)`.
    pub async fn write_results(
        &self,
        owner_id: i64,
        result: &EncodedResult,
    ) -> anyhow::Result<(String, String)> {
        let [result_ref, edge_ref] = self
            .write_all(
                owner_id,
                [
                    (ArtifactKind::Subtracted, result.subtracted.as_slice()),
                    (ArtifactKind::Edges, result.edges.as_slice()),
                ],
            )
            .await?;
        Ok((result_ref, edge_ref))
    }

    pub async fn read(&self, reference: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.path_of(reference);
        async_fs::read(&path)
            .await
            .with_context(|| format!("Failed to read artifact {:?}", path))
    }

    pub async fn exists(&self, reference: &str) -> anyhow::Result<bool> {
        let path = self.path_of(reference);
        async_fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to check artifact {:?}", path))
    }

    /// Delete an artifact. Returns `false` if it was already gone.
    pub async fn remove(&self, reference: &str) -> anyhow::Result<bool> {
        let path = self.path_of(reference);
        match async_fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to delete artifact {:?}", path)),
        }
    }
}

struct StagedArtifact {
    tmp: PathBuf,
    dest: PathBuf,
    reference: String,
}

async fn discard(staged: &[StagedArtifact]) {
    for artifact in staged {
        if let Err(e) = async_fs::remove_file(&artifact.tmp).await {
            tracing::warn!(path = ?artifact.tmp, error = %e, "failed to remove temp artifact");
        }
    }
}
