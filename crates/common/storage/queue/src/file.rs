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

//! Single-file operations with race tolerance.
//!
//! Concurrent consumers share the directory without locks, so a file listed a
//! moment ago may be gone or held open by someone else. Those outcomes are
//! classified explicitly and turned into a skip. A consumer first claims a
//! file by renaming it, so two consumers never both read the same record.
//! Every other error kind
//! (permissions, disk full, ...) is returned to the caller.

use std::{
    io,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::trace;

use crate::{
    FlushMode,
    metrics::STAGED_FILES_SKIPPED,
    path::{StagedFile, claimed_file_path, partial_file_path, staged_file_path},
};

/// Why a listed file contributed nothing to a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Deleted by another consumer after it was listed.
    Missing,
    /// Locked or busy.
    InUse,
    /// Zero bytes on disk.
    Empty,
}

impl SkipReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::InUse => "in_use",
            Self::Empty => "empty",
        }
    }
}

/// Outcome of reading one staged file.
#[derive(Debug)]
pub enum ReadOutcome {
    Data(Bytes),
    Skipped(SkipReason),
}

/// Maps the error kinds that are expected under concurrent access to a skip
/// reason. Returns `None` for genuine failures.
#[must_use]
pub fn tolerated(err: &io::Error) -> Option<SkipReason> {
    match err.kind() {
        io::ErrorKind::NotFound => Some(SkipReason::Missing),
        io::ErrorKind::ResourceBusy | io::ErrorKind::WouldBlock => Some(SkipReason::InUse),
        _ if is_sharing_violation(err) => Some(SkipReason::InUse),
        _ => None,
    }
}

#[cfg(windows)]
fn is_sharing_violation(err: &io::Error) -> bool {
    // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
    matches!(err.raw_os_error(), Some(32 | 33))
}

#[cfg(not(windows))]
const fn is_sharing_violation(_err: &io::Error) -> bool { false }

/// Outcome of trying to take one listed file.
#[derive(Debug)]
pub enum ClaimOutcome {
    Claimed(Claim),
    Skipped(SkipReason),
}

/// Takes `file` out of the listing by renaming it to a name only this caller
/// knows.
///
/// The rename is the point where concurrent consumers race: exactly one of
/// them succeeds, the others see `NotFound` and skip the file.
pub async fn claim(dir: &Path, file: &StagedFile) -> io::Result<ClaimOutcome> {
    let claimed = claimed_file_path(dir, &file.key, &owner_tag());
    match tokio::fs::rename(&file.path, &claimed).await {
        Ok(()) => Ok(ClaimOutcome::Claimed(Claim {
            staged: file.path.clone(),
            claimed,
        })),
        Err(e) => match tolerated(&e) {
            Some(reason) => {
                note_skip(&file.path, reason);
                Ok(ClaimOutcome::Skipped(reason))
            }
            None => Err(e),
        },
    }
}

/// A staged file owned by one consumer until it is completed or released.
#[derive(Debug)]
pub struct Claim {
    staged:  PathBuf,
    claimed: PathBuf,
}

impl Claim {
    /// Current location of the claimed file.
    pub fn path(&self) -> &Path { &self.claimed }

    /// Name the file had in the listing.
    pub fn staged_path(&self) -> &Path { &self.staged }

    /// Reads the whole claimed file.
    pub async fn read(&self) -> io::Result<ReadOutcome> {
        let outcome = match tokio::fs::read(&self.claimed).await {
            Ok(bytes) if bytes.is_empty() => ReadOutcome::Skipped(SkipReason::Empty),
            Ok(bytes) => ReadOutcome::Data(Bytes::from(bytes)),
            Err(e) => match tolerated(&e) {
                Some(reason) => ReadOutcome::Skipped(reason),
                None => return Err(e),
            },
        };
        if let ReadOutcome::Skipped(reason) = outcome {
            note_skip(&self.staged, reason);
        }
        Ok(outcome)
    }

    /// Deletes the consumed file.
    pub async fn complete(&self) -> io::Result<()> {
        match tokio::fs::remove_file(&self.claimed).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    /// Puts the file back under its staged name so a later dequeue sees it.
    pub async fn release(&self) -> io::Result<()> {
        match tokio::fs::rename(&self.claimed, &self.staged).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    /// Moves an undecodable file to `to`, out of the listing.
    pub async fn quarantine(&self, to: &Path) -> io::Result<()> {
        match tokio::fs::rename(&self.claimed, to).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

fn note_skip(path: &Path, reason: SkipReason) {
    trace!(path = %path.display(), reason = reason.as_str(), "Skipping staged file");
    STAGED_FILES_SKIPPED
        .with_label_values(&[reason.as_str()])
        .inc();
}

static OWNER_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// `<pid>-<n>`, unique among the writers and claims of every live process.
fn owner_tag() -> String {
    format!(
        "{}-{}",
        std::process::id(),
        OWNER_SEQUENCE.fetch_add(1, Ordering::Relaxed)
    )
}

/// A whole-file write of one record.
///
/// Bytes go to a private `.partial` sibling first and are renamed onto
/// `<key>.tmp` only once complete, so readers never see a torn record.
#[derive(Debug)]
pub struct StagedWrite {
    partial: PathBuf,
    target:  PathBuf,
}

impl StagedWrite {
    pub fn new(dir: &Path, key: &str) -> Self {
        Self {
            partial: partial_file_path(dir, key, &owner_tag()),
            target:  staged_file_path(dir, key),
        }
    }

    pub fn target(&self) -> &Path { &self.target }

    /// Writes `bytes` and publishes the file, replacing any file with the same
    /// key.
    pub async fn commit(&self, bytes: &[u8], flush: FlushMode) -> io::Result<()> {
        if let Err(e) = self.write_partial(bytes, flush).await {
            self.discard().await;
            return Err(e);
        }
        tokio::fs::rename(&self.partial, &self.target).await
    }

    async fn write_partial(&self, bytes: &[u8], flush: FlushMode) -> io::Result<()> {
        let mut file = tokio::fs::File::create(&self.partial).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        if flush == FlushMode::Sync {
            file.sync_all().await?;
        }
        Ok(())
    }

    /// Best-effort removal of the in-flight file after a failed or abandoned
    /// write.
    pub async fn discard(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.partial).await
            && e.kind() != io::ErrorKind::NotFound
        {
            trace!(path = %self.partial.display(), error = %e, "Failed to discard partial write");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerated_kinds() {
        let missing = io::Error::from(io::ErrorKind::NotFound);
        assert_eq!(tolerated(&missing), Some(SkipReason::Missing));

        let busy = io::Error::from(io::ErrorKind::ResourceBusy);
        assert_eq!(tolerated(&busy), Some(SkipReason::InUse));

        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(tolerated(&denied), None);

        let full = io::Error::from(io::ErrorKind::StorageFull);
        assert_eq!(tolerated(&full), None);
    }

    fn listed(dir: &Path, key: &str) -> StagedFile {
        StagedFile {
            path: staged_file_path(dir, key),
            key:  key.to_owned(),
        }
    }

    async fn claimed(dir: &Path, key: &str) -> Claim {
        match claim(dir, &listed(dir, key)).await.unwrap() {
            ClaimOutcome::Claimed(claim) => claim,
            ClaimOutcome::Skipped(reason) => panic!("unexpected skip: {reason:?}"),
        }
    }

    #[tokio::test]
    async fn test_claim_hides_file_from_listing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();
        std::fs::write(staged_file_path(dir, "data"), b"payload").unwrap();

        let claim = claimed(dir, "data").await;
        assert!(!staged_file_path(dir, "data").exists());
        assert!(claim.path().exists());
        assert_eq!(claim.staged_path(), staged_file_path(dir, "data"));
        match claim.read().await.unwrap() {
            ReadOutcome::Data(bytes) => assert_eq!(bytes, Bytes::from_static(b"payload")),
            ReadOutcome::Skipped(reason) => panic!("unexpected skip: {reason:?}"),
        }

        claim.complete().await.unwrap();
        claim.complete().await.unwrap();
        assert_eq!(std::fs::read_dir(dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_second_claim_loses() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();
        std::fs::write(staged_file_path(dir, "x"), b"x").unwrap();

        let _winner = claimed(dir, "x").await;
        assert!(matches!(
            claim(dir, &listed(dir, "x")).await.unwrap(),
            ClaimOutcome::Skipped(SkipReason::Missing)
        ));
    }

    #[tokio::test]
    async fn test_release_restores_empty_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();
        std::fs::write(staged_file_path(dir, "empty"), b"").unwrap();

        let claim = claimed(dir, "empty").await;
        assert!(matches!(
            claim.read().await.unwrap(),
            ReadOutcome::Skipped(SkipReason::Empty)
        ));
        claim.release().await.unwrap();
        assert!(staged_file_path(dir, "empty").exists());
        assert!(!claim.path().exists());
    }

    #[tokio::test]
    async fn test_read_directory_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();
        std::fs::create_dir(staged_file_path(dir, "dir")).unwrap();

        let claim = claimed(dir, "dir").await;
        let err = claim.read().await.unwrap_err();
        assert_eq!(tolerated(&err), None);
        claim.release().await.unwrap();
        assert!(staged_file_path(dir, "dir").is_dir());
    }

    #[tokio::test]
    async fn test_commit_replaces_and_leaves_no_partial() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();

        StagedWrite::new(dir, "k")
            .commit(b"first", FlushMode::Async)
            .await
            .unwrap();
        let write = StagedWrite::new(dir, "k");
        write.commit(b"second", FlushMode::Sync).await.unwrap();

        assert_eq!(std::fs::read(write.target()).unwrap(), b"second");
        let names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_into_missing_directory_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let gone = temp_dir.path().join("gone");

        let err = StagedWrite::new(&gone, "k")
            .commit(b"x", FlushMode::Async)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
