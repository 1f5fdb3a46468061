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

//! Periodic hand-off from the queue to a transmitter.
//!
//! The queue deletes staged files at dequeue time, so a [`Transmitter`]
//! receives each batch exactly once: fire-and-forget. Retries and backoff
//! belong to the transmitter; a failed batch is not put back.

use std::{fmt, sync::Arc, time::Duration};

use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    FileQueue, StagingCodec,
    error::{DequeueSnafu, DrainError, TransmitSnafu},
    metrics::TRANSMIT_ERRORS,
};

/// Severity of a transmission failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitSeverity {
    /// The batch is lost but draining continues on the next tick.
    Transient,
    /// Draining stops.
    Fatal,
}

/// Error returned by a [`Transmitter`].
#[derive(Debug)]
pub struct TransmitError {
    severity: TransmitSeverity,
    message:  String,
    source:   Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransmitError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            severity: TransmitSeverity::Transient,
            message:  message.into(),
            source:   None,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            severity: TransmitSeverity::Fatal,
            message:  message.into(),
            source:   None,
        }
    }

    pub fn transient_with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            severity: TransmitSeverity::Transient,
            message:  message.into(),
            source:   Some(Box::new(source)),
        }
    }

    #[must_use]
    pub const fn severity(&self) -> TransmitSeverity { self.severity }

    #[must_use]
    pub fn is_fatal(&self) -> bool { self.severity == TransmitSeverity::Fatal }
}

impl fmt::Display for TransmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            TransmitSeverity::Transient => write!(f, "transient: {}", self.message),
            TransmitSeverity::Fatal => write!(f, "fatal: {}", self.message),
        }
    }
}

impl std::error::Error for TransmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Delivers dequeued batches to a remote backend.
#[async_trait::async_trait]
pub trait Transmitter<T>: Send + Sync {
    async fn transmit(&self, batch: Vec<T>) -> Result<(), TransmitError>;
}

#[derive(Debug, Clone, bon::Builder)]
pub struct DrainConfig {
    /// Time between drain passes.
    #[builder(default = Duration::from_secs(1), into)]
    interval:             Duration,
    /// Upper bound on batches handed over in one pass, so a large backlog
    /// cannot starve the runtime.
    #[builder(default = 16)]
    max_batches_per_pass: usize,
}

impl Default for DrainConfig {
    fn default() -> Self { Self::builder().build() }
}

/// Drives `has_pending_data` / `dequeue_batch` / `transmit` on a timer.
pub struct Drainer<T, C, X> {
    queue:       Arc<FileQueue<T, C>>,
    transmitter: X,
    config:      DrainConfig,
}

impl<T, C, X> Drainer<T, C, X>
where
    T: Send,
    C: StagingCodec<T>,
    X: Transmitter<T>,
{
    pub const fn new(queue: Arc<FileQueue<T, C>>, transmitter: X, config: DrainConfig) -> Self {
        Self {
            queue,
            transmitter,
            config,
        }
    }

    #[must_use]
    pub const fn transmitter(&self) -> &X {
        &self.transmitter
    }

    /// Run until `cancel` fires or the transmitter reports a fatal error.
    ///
    /// Dequeue errors and transient transmit errors are logged and the loop
    /// carries on with the next tick.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), DrainError> {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval = ?self.config.interval, "Drainer started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.drain_pass(&cancel).await {
                Ok(sent) if sent > 0 => debug!(sent, "Drain pass complete"),
                Ok(_) => {}
                Err(e @ DrainError::Transmit { .. }) => {
                    warn!(error = %e, "Drainer stopping");
                    return Err(e);
                }
                Err(e) => warn!(error = %e, "Drain pass failed"),
            }
        }

        info!("Drainer stopped");
        Ok(())
    }

    /// One pass: hand over batches until the queue is empty, a batch comes
    /// back short, a transmit fails, or `max_batches_per_pass` is reached.
    /// Returns the number of records handed to the transmitter.
    pub async fn drain_pass(&self, cancel: &CancellationToken) -> Result<usize, DrainError> {
        let max_batch_size = self.queue.config().max_batch_size;
        let mut sent = 0;

        for _ in 0..self.config.max_batches_per_pass {
            if cancel.is_cancelled() || !self.queue.has_pending_data().await.context(DequeueSnafu)? {
                break;
            }

            let batch = self.queue.dequeue_batch(cancel).await.context(DequeueSnafu)?;
            let len = batch.len();
            if len == 0 {
                break;
            }

            match self.transmitter.transmit(batch).await {
                Ok(()) => sent += len,
                Err(e) if e.is_fatal() => {
                    TRANSMIT_ERRORS.inc();
                    return Err(e).context(TransmitSnafu);
                }
                Err(e) => {
                    TRANSMIT_ERRORS.inc();
                    warn!(error = %e, lost = len, "Transmit failed, batch dropped");
                    break;
                }
            }

            if len < max_batch_size {
                break;
            }
        }
        Ok(sent)
    }
}
