use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{Error, InternalResult};

/// Engine-wide limits and defaults. Individual nodes may override the
/// parallel/batch/race values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_keyword_depth")]
    pub max_keyword_depth: usize,

    #[serde(default = "default_max_while_iterations")]
    pub max_while_iterations: usize,

    #[serde(default)]
    pub parallel: ParallelConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub race: RaceConfig,

    /// Append `set`/`let`/`return` steps to the result log as well.
    #[serde(default)]
    pub record_control_steps: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_keyword_depth: default_max_keyword_depth(),
            max_while_iterations: default_max_while_iterations(),
            parallel: ParallelConfig::default(),
            batch: BatchConfig::default(),
            race: RaceConfig::default(),
            record_control_steps: false,
        }
    }
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> InternalResult<Self> {
        from_file(path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_operation_timeout", with = "duration_ms")]
    pub timeout: Duration,

    #[serde(default = "default_true")]
    pub fail_fast: bool,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            timeout: default_operation_timeout(),
            fail_fast: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub size: usize,

    /// Pause between chunks.
    #[serde(default, with = "duration_ms")]
    pub delay: Duration,

    #[serde(default)]
    pub max_retries: u32,

    /// First backoff delay; doubled on every further attempt.
    #[serde(default = "default_retry_delay", with = "duration_ms")]
    pub retry_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            delay: Duration::ZERO,
            max_retries: 0,
            retry_delay: default_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceConfig {
    #[serde(default = "default_operation_timeout", with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            timeout: default_operation_timeout(),
        }
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let file = File::open(path)
        .map_err(|e| Error::Internal(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| Error::Internal(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| Error::Internal(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

fn default_max_keyword_depth() -> usize {
    10
}
fn default_max_while_iterations() -> usize {
    10_000
}
fn default_max_concurrency() -> usize {
    5
}
fn default_operation_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_true() -> bool {
    true
}
fn default_batch_size() -> usize {
    10
}
fn default_retry_delay() -> Duration {
    Duration::from_millis(100)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
