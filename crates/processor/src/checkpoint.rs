//! Partition checkpointing and recovery
//!
//! Each partition periodically persists `{watermark, input offset, open
//! window states, stats accumulators}` so a restart resumes without
//! reprocessing closed windows. Checkpoints are bincode envelopes with a
//! checksum; a file that fails validation is skipped in favor of the next
//! older one, and corruption with no valid fallback is fatal for that
//! partition only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregate::OpenWindow;
use crate::error::{CheckpointError, CheckpointResult};
use crate::stats::StatsSnapshot;

/// Checkpoint format version
const CHECKPOINT_VERSION: u32 = 1;

/// File extension for checkpoint files
const CHECKPOINT_EXT: &str = "ckpt";

/// Everything one partition needs to resume after a restart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionCheckpoint {
    /// Partition this checkpoint belongs to
    pub partition: u32,
    /// When the checkpoint was taken
    pub created_at: DateTime<Utc>,
    /// Partition watermark at checkpoint time
    pub watermark: Option<DateTime<Utc>>,
    /// Highest input offset folded into this checkpoint
    pub offset: Option<u64>,
    /// Open (not yet closed) window states
    pub open_windows: Vec<OpenWindow>,
    /// Statistics engine snapshot
    pub stats: StatsSnapshot,
}

/// On-disk envelope wrapping a checkpoint payload with integrity metadata
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointEnvelope {
    checkpoint_id: String,
    version: u32,
    checksum: String,
    payload: Vec<u8>,
}

fn checksum(payload: &[u8]) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    payload.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// Directory-backed checkpoint store with retention
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    max_retained: usize,
}

impl CheckpointStore {
    /// Create a store rooted at `dir`, keeping `max_retained` files per
    /// partition
    pub fn new(dir: impl Into<PathBuf>, max_retained: usize) -> Self {
        assert!(max_retained > 0, "must retain at least one checkpoint");
        Self {
            dir: dir.into(),
            max_retained,
        }
    }

    /// Checkpoint directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_prefix(partition: u32) -> String {
        format!("partition-{:04}-", partition)
    }

    fn file_name(checkpoint: &PartitionCheckpoint) -> String {
        // Zero-padded millis keep lexical order == chronological order.
        format!(
            "{}{:020}-{}.{}",
            Self::file_prefix(checkpoint.partition),
            checkpoint.created_at.timestamp_millis(),
            &Uuid::new_v4().simple().to_string()[..8],
            CHECKPOINT_EXT,
        )
    }

    /// Persist a checkpoint and prune old files beyond the retention limit
    pub async fn save(&self, checkpoint: &PartitionCheckpoint) -> CheckpointResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            CheckpointError::WriteFailed {
                partition: checkpoint.partition,
                reason: format!("failed to create {}: {}", self.dir.display(), e),
            }
        })?;

        let payload = bincode::serialize(checkpoint)?;
        let envelope = CheckpointEnvelope {
            checkpoint_id: Uuid::new_v4().to_string(),
            version: CHECKPOINT_VERSION,
            checksum: checksum(&payload),
            payload,
        };
        let bytes = bincode::serialize(&envelope)?;

        let path = self.dir.join(Self::file_name(checkpoint));
        tokio::fs::write(&path, &bytes).await.map_err(|e| {
            CheckpointError::WriteFailed {
                partition: checkpoint.partition,
                reason: format!("failed to write {}: {}", path.display(), e),
            }
        })?;

        debug!(
            partition = checkpoint.partition,
            path = %path.display(),
            open_windows = checkpoint.open_windows.len(),
            "checkpoint saved"
        );

        self.prune(checkpoint.partition).await?;
        Ok(path)
    }

    /// Load the newest valid checkpoint for a partition
    ///
    /// Corrupt files are skipped with a warning; if files exist but none
    /// validates, the partition must not silently restart from scratch and
    /// the corruption is surfaced as an error.
    pub async fn load_latest(
        &self,
        partition: u32,
    ) -> CheckpointResult<Option<PartitionCheckpoint>> {
        let mut files = self.partition_files(partition).await?;
        if files.is_empty() {
            return Ok(None);
        }
        files.sort();
        files.reverse();

        let mut first_error: Option<CheckpointError> = None;
        for path in files {
            match Self::read_one(&path).await {
                Ok(checkpoint) => {
                    info!(
                        partition,
                        path = %path.display(),
                        watermark = ?checkpoint.watermark,
                        "restored checkpoint"
                    );
                    return Ok(Some(checkpoint));
                }
                Err(err) => {
                    warn!(
                        partition,
                        path = %path.display(),
                        error = %err,
                        "skipping unreadable checkpoint"
                    );
                    first_error.get_or_insert(err);
                }
            }
        }

        // Files existed but none validated.
        Err(first_error.unwrap_or(CheckpointError::ReadFailed {
            path: self.dir.display().to_string(),
            reason: "no readable checkpoint".to_string(),
        }))
    }

    async fn read_one(path: &Path) -> CheckpointResult<PartitionCheckpoint> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| CheckpointError::ReadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let envelope: CheckpointEnvelope =
            bincode::deserialize(&bytes).map_err(|e| CheckpointError::Corrupted {
                path: path.display().to_string(),
                reason: format!("envelope decode failed: {}", e),
            })?;

        if envelope.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::Corrupted {
                path: path.display().to_string(),
                reason: format!(
                    "unsupported version {} (expected {})",
                    envelope.version, CHECKPOINT_VERSION
                ),
            });
        }

        let actual = checksum(&envelope.payload);
        if actual != envelope.checksum {
            return Err(CheckpointError::Corrupted {
                path: path.display().to_string(),
                reason: format!(
                    "checksum mismatch: expected {}, got {}",
                    envelope.checksum, actual
                ),
            });
        }

        bincode::deserialize(&envelope.payload).map_err(|e| CheckpointError::Corrupted {
            path: path.display().to_string(),
            reason: format!("payload decode failed: {}", e),
        })
    }

    async fn partition_files(&self, partition: u32) -> CheckpointResult<Vec<PathBuf>> {
        let prefix = Self::file_prefix(partition);
        let mut files = Vec::new();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => {
                return Err(CheckpointError::ReadFailed {
                    path: self.dir.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };

        loop {
            let entry = entries
                .next_entry()
                .await
                .map_err(|e| CheckpointError::ReadFailed {
                    path: self.dir.display().to_string(),
                    reason: e.to_string(),
                })?;
            let Some(entry) = entry else { break };

            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&prefix) && name.ends_with(CHECKPOINT_EXT) {
                files.push(entry.path());
            }
        }

        Ok(files)
    }

    async fn prune(&self, partition: u32) -> CheckpointResult<()> {
        let mut files = self.partition_files(partition).await?;
        if files.len() <= self.max_retained {
            return Ok(());
        }
        files.sort();
        let excess = files.len() - self.max_retained;
        for path in files.into_iter().take(excess) {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "failed to prune checkpoint");
            }
        }
        Ok(())
    }
}
