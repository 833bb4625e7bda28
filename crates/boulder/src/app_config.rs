//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every operator at 3am) 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! Layers, lowest to highest priority:
//! 1. `BOULDER_*` environment variables (`__` separates nesting: `BOULDER_RUNTIME__BATCH_SIZE`)
//! 2. the TOML file, when one is given
//! 3. command-line overrides for the `[runtime]` table

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::backends::{
    FileQueueConfig, FileSinkConfig, InMemoryQueueConfig, InMemorySinkConfig, InfluxSinkConfig,
};

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 📬 Where the failed writes are waiting.
    pub queue_config: QueueConfig,
    /// 📡 Where they are going back to.
    pub sink_config: SinkConfig,
    #[serde(default)]
    pub runtime: RunConfig,
}

/// 🎭 Queue backends, externally tagged: `[queue_config.File]`.
#[derive(Debug, Deserialize, Clone)]
pub enum QueueConfig {
    File(FileQueueConfig),
    InMemory(InMemoryQueueConfig),
}

/// 🎭 Sink backends, externally tagged: `[sink_config.Influx]`.
#[derive(Debug, Deserialize, Clone)]
pub enum SinkConfig {
    Influx(InfluxSinkConfig),
    File(FileSinkConfig),
    InMemory(InMemorySinkConfig),
}

/// 🪨 The knobs for one run of the poll loop.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// 📦 Max records per outgoing write.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 🧱 Max records processed per run. Lifted to `batch_size` if configured below it.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// 💤 Seconds without a new record before the run calls it a day.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// 🔡 Lower-case every message before re-writing it.
    #[serde(default)]
    pub normalize: bool,
    /// ⏱️ Timestamp precision for the write endpoint. `u` keeps VictoriaMetrics happy.
    #[serde(default = "default_precision")]
    pub precision: String,
}

fn default_batch_size() -> usize {
    250
}

// -- 20 million. Big enough that a run usually ends on the idle timeout, not the ceiling.
fn default_chunk_size() -> usize {
    20_000_000
}

fn default_idle_timeout_secs() -> u64 {
    30
}

fn default_precision() -> String {
    "u".to_string()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            chunk_size: default_chunk_size(),
            idle_timeout_secs: default_idle_timeout_secs(),
            normalize: false,
            precision: default_precision(),
        }
    }
}

/// 🖥️ Command-line overrides for `[runtime]`. `None` means "leave it to the lower layers".
#[derive(Debug, Default, Clone, Serialize)]
pub struct RuntimeOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalize: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<String>,
}

/// 🚀 Load the config from env vars, an optional TOML file, and the command line.
///
/// 📐 If `config_file_name` is None → env vars (+ overrides) only. No file. No assumptions.
///
/// 💀 Returns an error if config is unparseable, with a message that says which layers we read.
pub fn load_config(
    config_file_name: Option<&Path>,
    overrides: &RuntimeOverrides,
) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("BOULDER_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let config = config.merge(Serialized::default("runtime", overrides));

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}', environment variables (BOULDER_*) \
             and command-line flags. The file exists in our hearts, but apparently not on disk, \
             or it is missing a [queue_config.*] / [sink_config.*] table.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (BOULDER_*) and \
                 command-line flags. No file was provided, so this one's all on the environment."
            .to_string(),
    };

    config.extract().context(context_msg)
}
