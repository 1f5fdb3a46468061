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

//! Record codecs.
//!
//! The queue never looks inside a record. A [`StagingCodec`] supplies the
//! three functions it needs:
//! - `encode_key`: record to file stem (should be unique, ideally sortable)
//! - `serialize`: record to file contents
//! - `deserialize`: file contents plus stem back to a record
//!
//! Round-tripping through `serialize` and `deserialize` must reproduce an
//! equivalent record. The queue does not check this.

use std::{error::Error as StdError, fmt};

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

/// Error raised by a codec while encoding or decoding a record.
#[derive(Debug)]
pub struct CodecError {
    message: String,
    source:  Option<Box<dyn StdError + Send + Sync>>,
}

impl CodecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source:  None,
        }
    }

    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source:  Some(Box::new(source)),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str { &self.message }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.message) }
}

impl StdError for CodecError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

/// Serializer and key encoder for one record type.
pub trait StagingCodec<T>: Send + Sync {
    /// File stem for `record`. Must be a single filesystem-safe path
    /// component.
    fn encode_key(&self, record: &T) -> String;

    fn serialize(&self, record: &T) -> Result<Bytes, CodecError>;

    /// Rebuild a record from the contents of the staged file named `key`.
    fn deserialize(&self, payload: Bytes, key: &str) -> Result<T, CodecError>;
}

/// A codec assembled from three caller closures.
///
/// ```
/// use bytes::Bytes;
/// use telespool_queue::{CodecError, FnCodec, StagingCodec};
///
/// let codec = FnCodec::new(
///     |line: &String| line.replace(' ', "_"),
///     |line: &String| -> Result<Bytes, CodecError> { Ok(Bytes::from(line.clone())) },
///     |payload: Bytes, _key: &str| -> Result<String, CodecError> {
///         Ok(String::from_utf8_lossy(&payload).into_owned())
///     },
/// );
/// assert_eq!(codec.encode_key(&"span batch".to_string()), "span_batch");
/// ```
pub struct FnCodec<K, S, D> {
    encode_key:  K,
    serialize:   S,
    deserialize: D,
}

impl<K, S, D> FnCodec<K, S, D> {
    pub const fn new(encode_key: K, serialize: S, deserialize: D) -> Self {
        Self {
            encode_key,
            serialize,
            deserialize,
        }
    }
}

impl<T, K, S, D> StagingCodec<T> for FnCodec<K, S, D>
where
    K: Fn(&T) -> String + Send + Sync,
    S: Fn(&T) -> Result<Bytes, CodecError> + Send + Sync,
    D: Fn(Bytes, &str) -> Result<T, CodecError> + Send + Sync,
{
    fn encode_key(&self, record: &T) -> String { (self.encode_key)(record) }

    fn serialize(&self, record: &T) -> Result<Bytes, CodecError> { (self.serialize)(record) }

    fn deserialize(&self, payload: Bytes, key: &str) -> Result<T, CodecError> {
        (self.deserialize)(payload, key)
    }
}

/// Stores any serde record as JSON; the key comes from a caller function.
pub struct JsonCodec<K> {
    encode_key: K,
}

impl<K> JsonCodec<K> {
    pub const fn new(encode_key: K) -> Self { Self { encode_key } }
}

impl<T, K> StagingCodec<T> for JsonCodec<K>
where
    T: Serialize + DeserializeOwned,
    K: Fn(&T) -> String + Send + Sync,
{
    fn encode_key(&self, record: &T) -> String { (self.encode_key)(record) }

    fn serialize(&self, record: &T) -> Result<Bytes, CodecError> {
        serde_json::to_vec(record)
            .map(Bytes::from)
            .map_err(|e| CodecError::with_source("json encode failed", e))
    }

    fn deserialize(&self, payload: Bytes, key: &str) -> Result<T, CodecError> {
        serde_json::from_slice(&payload)
            .map_err(|e| CodecError::with_source(format!("json decode failed for {key}"), e))
    }
}

/// An uninterpreted staged record: the file stem and its raw contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRecord {
    pub key:     String,
    pub payload: Bytes,
}

impl StagedRecord {
    pub fn new(key: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            key:     key.into(),
            payload: payload.into(),
        }
    }
}

/// Identity codec for [`StagedRecord`]; used by tooling that moves bytes
/// without knowing the record schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl StagingCodec<StagedRecord> for RawCodec {
    fn encode_key(&self, record: &StagedRecord) -> String { record.key.clone() }

    fn serialize(&self, record: &StagedRecord) -> Result<Bytes, CodecError> {
        Ok(record.payload.clone())
    }

    fn deserialize(&self, payload: Bytes, key: &str) -> Result<StagedRecord, CodecError> {
        Ok(StagedRecord::new(key, payload))
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct SpanBatch {
        id:    String,
        spans: Vec<String>,
    }

    #[test]
    fn test_json_codec_round_trip() {
        let codec = JsonCodec::new(|batch: &SpanBatch| batch.id.clone());
        let batch = SpanBatch {
            id:    "0001".into(),
            spans: vec!["GET /".into(), "db.query".into()],
        };

        assert_eq!(codec.encode_key(&batch), "0001");
        let bytes = codec.serialize(&batch).unwrap();
        let decoded: SpanBatch = codec.deserialize(bytes, "0001").unwrap();
        assert_eq!(decoded, batch);
    }

    #[test]
    fn test_json_codec_rejects_garbage() {
        let codec = JsonCodec::new(|batch: &SpanBatch| batch.id.clone());
        let err = StagingCodec::<SpanBatch>::deserialize(&codec, Bytes::from("{oops"), "k")
            .unwrap_err();
        assert!(err.message().contains('k'));
        assert!(err.source().is_some());
    }

    fn counter_codec() -> impl StagingCodec<u32> {
        FnCodec::new(
            |n: &u32| format!("{n:08}"),
            |n: &u32| -> Result<Bytes, CodecError> { Ok(Bytes::copy_from_slice(&n.to_le_bytes())) },
            |_payload: Bytes, key: &str| -> Result<u32, CodecError> {
                key.parse::<u32>()
                    .map_err(|e| CodecError::with_source("bad key", e))
            },
        )
    }

    #[test]
    fn test_fn_codec_uses_key_on_decode() {
        let codec = counter_codec();

        assert_eq!(codec.encode_key(&42), "00000042");
        let bytes = codec.serialize(&42).unwrap();
        assert_eq!(codec.deserialize(bytes, "00000042").unwrap(), 42);
    }

    #[test]
    fn test_raw_codec_keeps_bytes() {
        let record = StagedRecord::new("a", Bytes::from_static(b"\x00\x01raw"));
        let bytes = RawCodec.serialize(&record).unwrap();
        assert_eq!(RawCodec.deserialize(bytes, "a").unwrap(), record);
    }
}
