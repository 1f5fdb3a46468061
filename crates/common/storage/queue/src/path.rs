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

//! Staged file naming and directory listing.
//!
//! ```text
//! storage_path/
//! ├── <key>.tmp                     # one pending record
//! ├── <key>.tmp.<pid>-<n>.partial   # write in flight, never listed
//! ├── <key>.tmp.<pid>-<n>.claimed   # taken by one consumer, never listed
//! └── <key>.corrupt                 # undecodable record, kept for inspection
//! ```
//!
//! Listings are never cached. Every call walks the live directory.

use std::{
    io,
    path::{Path, PathBuf},
};

use snafu::ensure;

use crate::{DequeueOrder, Result, error::InvalidArgumentSnafu};

/// Extension of a staged, not-yet-delivered record.
pub const STAGED_EXTENSION: &str = "tmp";

/// Extension of an in-flight write.
pub const PARTIAL_EXTENSION: &str = "partial";

/// Extension of a staged file one consumer has taken out of the listing.
pub const CLAIMED_EXTENSION: &str = "claimed";

/// Extension given to a staged file the codec could not decode.
pub const CORRUPT_EXTENSION: &str = "corrupt";

/// A pending record as seen in one directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    pub key:  String,
}

/// `<key>.tmp`
pub fn staged_file_name(key: &str) -> String { format!("{key}.{STAGED_EXTENSION}") }

/// `dir/<key>.tmp`
pub fn staged_file_path<P: AsRef<Path>>(dir: P, key: &str) -> PathBuf {
    dir.as_ref().join(staged_file_name(key))
}

/// `dir/<key>.tmp.<writer>.partial`, where `writer` distinguishes concurrent
/// writes of the same key.
pub fn partial_file_path<P: AsRef<Path>>(dir: P, key: &str, writer: &str) -> PathBuf {
    dir.as_ref().join(format!(
        "{key}.{STAGED_EXTENSION}.{writer}.{PARTIAL_EXTENSION}"
    ))
}

/// `dir/<key>.tmp.<owner>.claimed`, where `owner` identifies the consumer.
pub fn claimed_file_path<P: AsRef<Path>>(dir: P, key: &str, owner: &str) -> PathBuf {
    dir.as_ref().join(format!(
        "{key}.{STAGED_EXTENSION}.{owner}.{CLAIMED_EXTENSION}"
    ))
}

/// Returns the key of `path` if it names a claimed file.
pub fn claimed_key(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    let rest = name.strip_suffix(CLAIMED_EXTENSION)?.strip_suffix('.')?;
    let (key, _owner) = rest.rsplit_once(&format!(".{STAGED_EXTENSION}."))?;
    (!key.is_empty()).then_some(key)
}

/// `dir/<key>.corrupt`
pub fn corrupt_file_path<P: AsRef<Path>>(dir: P, key: &str) -> PathBuf {
    dir.as_ref().join(format!("{key}.{CORRUPT_EXTENSION}"))
}

/// Returns the key of `path` if it names a staged file.
pub fn staged_key(path: &Path) -> Option<&str> {
    if path.extension()? != STAGED_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()
}

/// Rejects keys that would not map to exactly one file inside the storage
/// directory.
pub fn validate_key(key: &str) -> Result<()> {
    ensure!(
        !key.trim().is_empty(),
        InvalidArgumentSnafu {
            message: "record key is empty",
        }
    );
    ensure!(
        key != "." && key != "..",
        InvalidArgumentSnafu {
            message: format!("record key {key:?} is a relative path"),
        }
    );
    ensure!(
        !key.contains(['/', '\\', '\0']),
        InvalidArgumentSnafu {
            message: format!("record key {key:?} contains a path separator or NUL"),
        }
    );
    Ok(())
}

/// Whether at least one staged file exists. Stops at the first hit.
///
/// A missing directory counts as empty.
pub async fn has_staged_files<P: AsRef<Path>>(dir: P) -> io::Result<bool> {
    let mut entries = match tokio::fs::read_dir(dir.as_ref()).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        if as_staged(&entry).await?.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Lists up to `limit` staged files.
///
/// With [`DequeueOrder::Listing`] the walk stops after `limit` hits and the
/// filesystem's enumeration order is kept. With [`DequeueOrder::SortedByKey`]
/// the whole directory is read, sorted by key, then truncated.
pub async fn scan_staged_files<P: AsRef<Path>>(
    dir: P,
    limit: usize,
    order: DequeueOrder,
) -> io::Result<Vec<StagedFile>> {
    let mut files = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir.as_ref()).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        if order == DequeueOrder::Listing && files.len() >= limit {
            break;
        }
        if let Some(file) = as_staged(&entry).await? {
            files.push(file);
        }
    }

    if order == DequeueOrder::SortedByKey {
        files.sort_by(|a, b| a.key.cmp(&b.key));
        files.truncate(limit);
    }
    Ok(files)
}

/// Counts every staged file in the directory.
pub async fn count_staged_files<P: AsRef<Path>>(dir: P) -> io::Result<usize> {
    let mut count = 0;
    let mut entries = match tokio::fs::read_dir(dir.as_ref()).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        if as_staged(&entry).await?.is_some() {
            count += 1;
        }
    }
    Ok(count)
}

/// Removes leftover in-flight writes. Runs synchronously at queue open.
pub fn sweep_partial_files<P: AsRef<Path>>(dir: P) -> io::Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == PARTIAL_EXTENSION) {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(removed)
}

/// Puts claimed files left by a crashed consumer back under their staged
/// name. A claim whose key has been staged again meanwhile is left alone.
pub fn restore_claimed_files<P: AsRef<Path>>(dir: P) -> io::Result<usize> {
    let dir = dir.as_ref();
    let mut restored = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(key) = claimed_key(&path) else {
            continue;
        };
        let target = staged_file_path(dir, key);
        if target.exists() {
            continue;
        }
        match std::fs::rename(&path, &target) {
            Ok(()) => restored += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(restored)
}

async fn as_staged(entry: &tokio::fs::DirEntry) -> io::Result<Option<StagedFile>> {
    let path = entry.path();
    let Some(key) = staged_key(&path).map(str::to_owned) else {
        return Ok(None);
    };

    match entry.file_type().await {
        Ok(file_type) if file_type.is_file() => Ok(Some(StagedFile { path, key })),
        Ok(_) => Ok(None),
        // Removed by a concurrent consumer between readdir and stat.
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
