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

//! Sortable record keys.
//!
//! Keys have the form `YYYYMMDDTHHMMSSffffff-<pid:08x>-<seq:010>`. Every field
//! is zero-padded, so lexicographic order equals creation order within one
//! process as long as the wall clock does not step backwards.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

/// Generates unique, lexicographically sortable keys.
///
/// Assign the key to a record when it is created and return it from the
/// codec's `encode_key`. Together with
/// [`DequeueOrder::SortedByKey`](crate::DequeueOrder::SortedByKey) this gives
/// FIFO dequeue.
#[derive(Debug)]
pub struct SequentialKeyGenerator {
    pid:      u32,
    sequence: AtomicU64,
}

impl Default for SequentialKeyGenerator {
    fn default() -> Self { Self::new() }
}

impl SequentialKeyGenerator {
    #[must_use]
    pub fn new() -> Self { Self::with_pid(std::process::id()) }

    #[must_use]
    pub const fn with_pid(pid: u32) -> Self {
        Self {
            pid,
            sequence: AtomicU64::new(0),
        }
    }

    /// Key stamped with the current time.
    pub fn next_key(&self) -> String { self.key_at(Utc::now()) }

    /// Key stamped with `time`. The sequence still advances.
    pub fn key_at(&self, time: DateTime<Utc>) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}-{:08x}-{:010}",
            time.format("%Y%m%dT%H%M%S%6f"),
            self.pid,
            seq
        )
    }
}
