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

use std::sync::LazyLock;

use prometheus::{IntCounter, IntCounterVec, register_int_counter, register_int_counter_vec};

pub const REASON_LABEL: &str = "reason";

pub static STAGED_FILES_WRITTEN: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "telespool_staged_files_written_total",
        "Total number of staged files written by enqueue"
    )
    .unwrap()
});

pub static STAGED_FILES_CONSUMED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "telespool_staged_files_consumed_total",
        "Total number of staged files read and deleted by dequeue"
    )
    .unwrap()
});

pub static STAGED_FILES_SKIPPED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "telespool_staged_files_skipped_total",
        "Total number of listed staged files that contributed nothing to a batch",
        &[REASON_LABEL]
    )
    .unwrap()
});

pub static TRANSMIT_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "telespool_transmit_errors_total",
        "Total number of dequeued batches the transmitter failed to deliver"
    )
    .unwrap()
});
