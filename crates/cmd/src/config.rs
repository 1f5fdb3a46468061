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

use std::path::Path;

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Whatever};
use telespool_common_telemetry::LoggingOptions;
use telespool_queue::QueueConfig;

/// Contents of the `--config` TOML file.
///
/// ```toml
/// [queue]
/// max_batch_size = 50
/// order = "sorted_by_key"
/// flush_mode = "sync"
///
/// [logging]
/// level = "info,telespool_queue=debug"
/// log_format = "json"
/// ```
///
/// Both tables are optional. The directory given on the command line always
/// replaces `queue.storage_path`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoolConfig {
    pub queue:   QueueConfig,
    pub logging: LoggingOptions,
}

impl SpoolConfig {
    pub fn load(path: &Path) -> Result<Self, Whatever> {
        let text = std::fs::read_to_string(path)
            .with_whatever_context(|_| format!("failed to read config {}", path.display()))?;
        Self::parse(&text)
            .with_whatever_context(|_| format!("invalid config {}", path.display()))
    }

    fn parse(text: &str) -> Result<Self, toml::de::Error> { toml::from_str(text) }
}

#[cfg(test)]
mod tests {
    use telespool_common_telemetry::LogFormat;
    use telespool_queue::{DequeueOrder, FlushMode};

    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(SpoolConfig::parse("").unwrap(), SpoolConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let config = SpoolConfig::parse(
            r#"
            [queue]
            storage_path = "/var/spool/traces"
            max_batch_size = 50
            order = "sorted_by_key"
            flush_mode = "sync"

            [logging]
            level = "debug"
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.queue.storage_path, Path::new("/var/spool/traces"));
        assert_eq!(config.queue.max_batch_size, 50);
        assert_eq!(config.queue.order, DequeueOrder::SortedByKey);
        assert_eq!(config.queue.flush_mode, FlushMode::Sync);
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert_eq!(config.logging.log_format, LogFormat::Json);
        assert!(config.logging.append_console);
    }

    #[test]
    fn test_unknown_order_is_rejected() {
        assert!(SpoolConfig::parse("[queue]\norder = \"random\"").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(SpoolConfig::load(&temp_dir.path().join("absent.toml")).is_err());
    }
}
