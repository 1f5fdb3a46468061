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

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::ensure;

use crate::{Result, error::ConfigurationSnafu};

/// Upper bound on records returned by one dequeue.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct QueueConfig {
    /// Flat directory holding the staged files. Created on open.
    #[default(PathBuf::from("./telespool"))]
    pub storage_path:          PathBuf,
    #[default(DEFAULT_MAX_BATCH_SIZE)]
    pub max_batch_size:        usize,
    pub order:                 DequeueOrder,
    pub flush_mode:            FlushMode,
    /// When the queue opens, delete `*.partial` leftovers of crashed writes
    /// and return `*.claimed` leftovers of crashed dequeues to the listing.
    /// Leave off when several processes share the directory.
    pub sweep_partial_on_open: bool,
}

impl QueueConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.storage_path.to_string_lossy().trim().is_empty(),
            ConfigurationSnafu {
                message: "storage path must not be empty",
            }
        );
        ensure!(
            self.max_batch_size > 0,
            ConfigurationSnafu {
                message: "max batch size must be at least 1",
            }
        );
        Ok(())
    }
}

/// Which staged files a dequeue picks when more than a batch is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DequeueOrder {
    /// First entries of the directory enumeration. No ordering promise.
    ///
    /// Zero-byte `.tmp` files are listed like any other and take a slot in
    /// the batch. If `max_batch_size` or more of them come first in the
    /// enumeration, every dequeue returns empty and the records behind them
    /// are not reached until the empty files are written or removed.
    /// [`SortedByKey`](Self::SortedByKey) behaves the same when the empty
    /// files hold the lowest keys.
    #[default]
    Listing,
    /// Lowest keys first. Reads the full listing on every dequeue; pair with
    /// sortable keys such as [`SequentialKeyGenerator`](crate::SequentialKeyGenerator)
    /// for FIFO delivery.
    SortedByKey,
}

/// Durability of each staged write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Hand the bytes to the OS and return.
    #[default]
    Async,
    /// `fsync` every file before publishing it.
    Sync,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.max_batch_size, 100);
        assert_eq!(config.order, DequeueOrder::Listing);
        assert_eq!(config.flush_mode, FlushMode::Async);
        assert!(!config.sweep_partial_on_open);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_path() {
        let config = QueueConfig {
            storage_path: PathBuf::from("  "),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(crate::QueueError::Configuration { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = QueueConfig {
            max_batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(crate::QueueError::Configuration { .. })
        ));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: QueueConfig = serde_json::from_str(
            r#"{"storage_path": "/var/spool/traces", "order": "sorted_by_key"}"#,
        )
        .unwrap();
        assert_eq!(config.storage_path, PathBuf::from("/var/spool/traces"));
        assert_eq!(config.order, DequeueOrder::SortedByKey);
        assert_eq!(config.max_batch_size, DEFAULT_MAX_BATCH_SIZE);
    }
}
