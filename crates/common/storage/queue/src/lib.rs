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

//! Durable, directory-backed staging queue for telemetry batches.
//!
//! Producers spill records with [`FileQueue::enqueue`]; a transmitter loop
//! polls [`FileQueue::has_pending_data`] and takes bounded batches with
//! [`FileQueue::dequeue_batch`]. Each record is one `<key>.tmp` file, and the
//! directory listing is the only source of truth, which makes the queue
//! survive restarts and tolerate several instances on one path.

pub mod builder;
pub mod codec;
pub mod config;
pub mod drain;
pub mod error;
pub mod file;
pub mod key;
pub mod metrics;
pub mod path;
pub mod queue;

pub use builder::QueueBuilder;
pub use codec::{CodecError, FnCodec, JsonCodec, RawCodec, StagedRecord, StagingCodec};
pub use config::{DEFAULT_MAX_BATCH_SIZE, DequeueOrder, FlushMode, QueueConfig};
pub use drain::{DrainConfig, Drainer, TransmitError, TransmitSeverity, Transmitter};
pub use error::{DrainError, QueueError, Result};
pub use key::SequentialKeyGenerator;
pub use path::{STAGED_EXTENSION, StagedFile};
pub use queue::FileQueue;
