// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The durable file queue.
//!
//! [`FileQueue`] stages one file per record in a flat directory and hands
//! bounded batches back to a transmitter. The directory is the only state:
//! nothing about pending files is remembered between calls, so files left by a
//! crashed process, or written by another queue instance on the same path,
//! show up on the next listing.
//!
//! ## Usage
//!
//! ```ignore
//! let queue = QueueBuilder::new("/var/spool/traces").build(JsonCodec::new(|b: &SpanBatch| b.id.clone()))?;
//!
//! // Producer: spill a flushed buffer
//! queue.enqueue(&batches, &cancel).await?;
//!
//! // Transmitter loop
//! if queue.has_pending_data().await? {
//!     let batch = queue.dequeue_batch(&cancel).await?;
//!     send(batch).await; // fire-and-forget: the files are already gone
//! }
//! ```
//!
//! ## Delivery
//!
//! A staged file is claimed by rename, read, decoded, then deleted. If the
//! transmitter then fails, the record is lost. Delivery is at most once per
//! file and no ordering is promised unless [`DequeueOrder::SortedByKey`] is
//! configured.

use std::{marker::PhantomData, path::Path};

use snafu::{IntoError, ResultExt, ensure};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    DequeueOrder, QueueConfig, Result, StagingCodec,
    error::{CancelledSnafu, CodecSnafu, EmptyBatchSnafu, IoSnafu, QueueError},
    file::{self, Claim, ClaimOutcome, ReadOutcome, StagedWrite},
    metrics::{STAGED_FILES_CONSUMED, STAGED_FILES_SKIPPED, STAGED_FILES_WRITTEN},
    path::{self, StagedFile, corrupt_file_path, validate_key},
};

/// A directory-backed queue of `T` records.
///
/// All methods take `&self`; share the queue behind an `Arc` to enqueue and
/// dequeue from several tasks. No lock is taken: concurrent consumers race on
/// individual files and exactly one of them wins each file.
pub struct FileQueue<T, C> {
    config:  QueueConfig,
    codec:   C,
    _record: PhantomData<fn() -> T>,
}

impl<T, C: StagingCodec<T>> FileQueue<T, C> {
    /// Open a queue over `config.storage_path`, creating the directory if it
    /// does not exist.
    pub fn open(config: QueueConfig, codec: C) -> Result<Self> {
        config.validate()?;

        std::fs::create_dir_all(&config.storage_path).context(IoSnafu {
            path: config.storage_path.clone(),
        })?;

        if config.sweep_partial_on_open {
            let removed = path::sweep_partial_files(&config.storage_path).context(IoSnafu {
                path: config.storage_path.clone(),
            })?;
            let restored = path::restore_claimed_files(&config.storage_path).context(IoSnafu {
                path: config.storage_path.clone(),
            })?;
            if removed > 0 || restored > 0 {
                info!(
                    path = ?config.storage_path,
                    removed,
                    restored,
                    "Recovered interrupted writes and dequeues"
                );
            }
        }

        info!(
            path = ?config.storage_path,
            max_batch_size = config.max_batch_size,
            order = ?config.order,
            "Staging queue opened"
        );

        Ok(Self {
            config,
            codec,
            _record: PhantomData,
        })
    }

    /// Whether at least one staged file exists right now.
    ///
    /// Reads the live directory and stops at the first staged file.
    pub async fn has_pending_data(&self) -> Result<bool> {
        path::has_staged_files(self.storage_path())
            .await
            .context(IoSnafu {
                path: self.storage_path(),
            })
    }

    /// Number of staged files right now. Reads the full listing.
    pub async fn pending_count(&self) -> Result<usize> {
        path::count_staged_files(self.storage_path())
            .await
            .context(IoSnafu {
                path: self.storage_path(),
            })
    }

    /// Remove and return up to `max_batch_size` staged records.
    ///
    /// Each listed file is first claimed by renaming it out of the listing;
    /// when several consumers race for a file, exactly one claim succeeds
    /// and the others skip it. Files that vanish, are busy, or are empty are
    /// skipped; empty files go back under their staged name. A file the codec
    /// cannot decode is renamed to `<key>.corrupt` and skipped. Once `cancel`
    /// fires no further file is claimed; records already taken stay taken.
    ///
    /// Any other I/O failure stops the scan and puts the offending file back.
    /// It is returned as an error when nothing was collected yet, otherwise
    /// logged and the partial batch is returned.
    pub async fn dequeue_batch(&self, cancel: &CancellationToken) -> Result<Vec<T>> {
        if cancel.is_cancelled() || !self.has_pending_data().await? {
            return Ok(Vec::new());
        }

        let candidates = path::scan_staged_files(
            self.storage_path(),
            self.config.max_batch_size,
            self.config.order,
        )
        .await
        .context(IoSnafu {
            path: self.storage_path(),
        })?;

        self.take(candidates, cancel).await
    }

    async fn take(
        &self,
        candidates: Vec<StagedFile>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>> {
        let mut batch = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if cancel.is_cancelled() {
                debug!(taken = batch.len(), "Dequeue cancelled");
                break;
            }

            let claim = match file::claim(self.storage_path(), &candidate).await {
                Ok(ClaimOutcome::Claimed(claim)) => claim,
                Ok(ClaimOutcome::Skipped(_)) => continue,
                Err(source) => {
                    return finish_early(batch, IoSnafu { path: candidate.path }.into_error(source));
                }
            };

            let read = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                read = claim.read() => Some(read),
            };
            let Some(read) = read else {
                release(&claim).await;
                debug!(taken = batch.len(), "Dequeue cancelled");
                break;
            };

            let payload = match read {
                Ok(ReadOutcome::Data(payload)) => payload,
                Ok(ReadOutcome::Skipped(_)) => {
                    release(&claim).await;
                    continue;
                }
                Err(source) => {
                    release(&claim).await;
                    return finish_early(batch, IoSnafu { path: candidate.path }.into_error(source));
                }
            };

            let record = match self.codec.deserialize(payload, &candidate.key) {
                Ok(record) => record,
                Err(e) => {
                    self.quarantine(&claim, &candidate.key, &e).await;
                    continue;
                }
            };

            if let Err(source) = claim.complete().await {
                // Drop the decoded copy and put the file back so it is
                // delivered once, later.
                release(&claim).await;
                return finish_early(batch, IoSnafu { path: candidate.path }.into_error(source));
            }
            batch.push(record);
        }

        STAGED_FILES_CONSUMED.inc_by(batch.len() as u64);
        debug!(count = batch.len(), "Dequeued staged records");
        Ok(batch)
    }

    /// Stage every record of `batch` as its own file.
    ///
    /// Records are written one at a time; there is no batch transaction. The
    /// first failure aborts the call and records written before it remain
    /// staged. Retrying the whole batch is safe when keys derive from record
    /// content, since a rewrite replaces the file with the same key.
    pub async fn enqueue(&self, batch: &[T], cancel: &CancellationToken) -> Result<()> {
        ensure!(!batch.is_empty(), EmptyBatchSnafu);

        let dir = self.storage_path();
        let total = batch.len();
        for (written, record) in batch.iter().enumerate() {
            ensure!(!cancel.is_cancelled(), CancelledSnafu { written, total });

            let key = self.codec.encode_key(record);
            validate_key(&key)?;
            let bytes = self
                .codec
                .serialize(record)
                .context(CodecSnafu { key: key.as_str() })?;

            let write = StagedWrite::new(dir, &key);
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    write.discard().await;
                    return CancelledSnafu { written, total }.fail();
                }
                res = write.commit(&bytes, self.config.flush_mode) => {
                    res.context(IoSnafu { path: write.target() })?;
                }
            }
            STAGED_FILES_WRITTEN.inc();
        }

        debug!(count = total, "Staged records");
        Ok(())
    }

    async fn quarantine(&self, claim: &Claim, key: &str, err: &crate::CodecError) {
        let to = corrupt_file_path(self.storage_path(), key);
        warn!(
            key,
            error = %err,
            to = %to.display(),
            "Staged file could not be decoded, moving it aside"
        );
        STAGED_FILES_SKIPPED.with_label_values(&["corrupt"]).inc();
        if let Err(e) = claim.quarantine(&to).await {
            warn!(key, error = %e, "Failed to move undecodable file aside");
        }
    }

    #[must_use]
    pub fn storage_path(&self) -> &Path { &self.config.storage_path }

    #[must_use]
    pub const fn config(&self) -> &QueueConfig { &self.config }

    #[must_use]
    pub const fn order(&self) -> DequeueOrder { self.config.order }
}

async fn release(claim: &Claim) {
    if let Err(e) = claim.release().await {
        warn!(
            path = %claim.path().display(),
            to = %claim.staged_path().display(),
            error = %e,
            "Failed to return claimed file to the queue"
        );
    }
}

fn finish_early<T>(batch: Vec<T>, err: QueueError) -> Result<Vec<T>> {
    if batch.is_empty() {
        return Err(err);
    }
    warn!(error = %err, path = ?err.path(), taken = batch.len(), "Dequeue stopped early");
    STAGED_FILES_CONSUMED.inc_by(batch.len() as u64);
    Ok(batch)
}
