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

use crate::{DequeueOrder, FileQueue, FlushMode, QueueConfig, Result, StagingCodec};

pub struct QueueBuilder {
    config: QueueConfig,
}

impl QueueBuilder {
    pub fn new<P: Into<PathBuf>>(storage_path: P) -> Self {
        Self {
            config: QueueConfig {
                storage_path: storage_path.into(),
                ..Default::default()
            },
        }
    }

    #[must_use]
    pub fn from_config(config: QueueConfig) -> Self { Self { config } }

    #[must_use]
    pub const fn max_batch_size(mut self, size: usize) -> Self {
        self.config.max_batch_size = size;
        self
    }

    #[must_use]
    pub const fn order(mut self, order: DequeueOrder) -> Self {
        self.config.order = order;
        self
    }

    #[must_use]
    pub const fn flush_mode(mut self, mode: FlushMode) -> Self {
        self.config.flush_mode = mode;
        self
    }

    #[must_use]
    pub const fn sweep_partial_on_open(mut self, sweep: bool) -> Self {
        self.config.sweep_partial_on_open = sweep;
        self
    }

    /// Validates the configuration, creates the directory and opens the queue.
    pub fn build<T, C: StagingCodec<T>>(self, codec: C) -> Result<FileQueue<T, C>> {
        FileQueue::open(self.config, codec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RawCodec;

    #[test]
    fn test_builder_default_config() {
        let builder = QueueBuilder::new("/tmp/test_spool");
        assert_eq!(builder.config.storage_path, PathBuf::from("/tmp/test_spool"));
        assert_eq!(builder.config.max_batch_size, 100);
        assert_eq!(builder.config.order, DequeueOrder::Listing);
        assert!(!builder.config.sweep_partial_on_open);
    }

    #[test]
    fn test_builder_custom_config() {
        let builder = QueueBuilder::new("/tmp/test_spool")
            .max_batch_size(10)
            .order(DequeueOrder::SortedByKey)
            .flush_mode(FlushMode::Sync)
            .sweep_partial_on_open(true);

        assert_eq!(builder.config.max_batch_size, 10);
        assert_eq!(builder.config.order, DequeueOrder::SortedByKey);
        assert_eq!(builder.config.flush_mode, FlushMode::Sync);
        assert!(builder.config.sweep_partial_on_open);
    }

    #[test]
    fn test_build_creates_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("spool");

        let queue = QueueBuilder::new(&path).build(RawCodec).unwrap();
        assert!(path.is_dir());
        assert_eq!(queue.storage_path(), path.as_path());
    }

    #[test]
    fn test_build_rejects_empty_path() {
        let result = QueueBuilder::new("").build(RawCodec);
        assert!(matches!(
            result,
            Err(crate::QueueError::Configuration { .. })
        ));
    }
}
