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

use std::{io, path::PathBuf};

use snafu::{Location, Snafu};

use crate::{codec::CodecError, drain::TransmitError};

/// Queue operation errors.
///
/// "No data" is never an error: an empty batch or `false` signals it.
#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum QueueError {
    /// Invalid or missing storage configuration. Raised at construction.
    #[snafu(display("Invalid queue configuration: {message}"))]
    Configuration {
        message: String,
        #[snafu(implicit)]
        loc:     Location,
    },

    /// Caller misuse on enqueue, such as a key that is not a safe file name.
    #[snafu(display("Invalid argument: {message}"))]
    InvalidArgument {
        message: String,
        #[snafu(implicit)]
        loc:     Location,
    },

    /// Enqueue was called with zero records.
    #[snafu(display("Cannot enqueue an empty batch"))]
    EmptyBatch {
        #[snafu(implicit)]
        loc: Location,
    },

    /// Filesystem failure that is not a tolerated race.
    #[snafu(display("IO error on {}", path.display()))]
    Io {
        path:   PathBuf,
        source: io::Error,
        #[snafu(implicit)]
        loc:    Location,
    },

    /// The codec could not serialize a record.
    #[snafu(display("Failed to encode record with key {key}"))]
    Codec {
        key:    String,
        source: CodecError,
        #[snafu(implicit)]
        loc:    Location,
    },

    /// Enqueue observed cancellation. Records written before it stay staged.
    #[snafu(display("Enqueue cancelled after {written} of {total} records"))]
    Cancelled {
        written: usize,
        total:   usize,
        #[snafu(implicit)]
        loc:     Location,
    },
}

impl QueueError {
    /// The path involved in an I/O failure, if any.
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Io { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors surfaced by a [`Drainer`](crate::Drainer) run.
#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum DrainError {
    #[snafu(display("Failed to dequeue staged records"))]
    Dequeue {
        source: QueueError,
        #[snafu(implicit)]
        loc:    Location,
    },

    #[snafu(display("Transmitter failed fatally"))]
    Transmit {
        source: TransmitError,
        #[snafu(implicit)]
        loc:    Location,
    },
}
