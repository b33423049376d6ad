//! Scheduler configuration
//!
//! # Configuration sources
//!
//! ```text
//! Priority (high → low):
//! 1. Environment variables (ADAPTJOB_*)
//! 2. RON document passed to `SchedulerConfig::from_ron`
//! 3. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use adaptjob::runtime::scheduler::{ExecutionMode, SchedulerConfig};
//!
//! let config = SchedulerConfig::from_ron("(mode: Cooperative, batch_divisor: 8)").unwrap();
//! assert_eq!(config.mode, ExecutionMode::Cooperative);
//! ```

use std::env;
use std::fmt;
use std::str::FromStr;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::runtime::error::{Result, ScheduleError};
use crate::runtime::handle::WaitStrategy;

/// Default divisor for automatic batch sizing: work is spread over ~32 units.
pub const DEFAULT_BATCH_DIVISOR: usize = 32;

/// Environment variable selecting the execution mode.
pub const ENV_MODE: &str = "ADAPTJOB_MODE";
/// Environment variable setting the worker thread count.
pub const ENV_WORKERS: &str = "ADAPTJOB_WORKERS";
/// Environment variable setting the automatic batch divisor.
pub const ENV_BATCH_DIVISOR: &str = "ADAPTJOB_BATCH_DIVISOR";
/// Environment variable selecting the wait strategy.
pub const ENV_WAIT: &str = "ADAPTJOB_WAIT";

/// Execution substrate, chosen once per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Genuine multi-threaded dispatch on a worker pool.
    Threaded,
    /// Single logical thread; work advances in slices across host ticks.
    Cooperative,
}

impl ExecutionMode {
    /// Mode matching the build target: cooperative on `wasm` targets or with
    /// the `cooperative` feature, threaded otherwise.
    pub const fn platform_default() -> Self {
        if cfg!(any(target_family = "wasm", feature = "cooperative")) {
            ExecutionMode::Cooperative
        } else {
            ExecutionMode::Threaded
        }
    }
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::platform_default()
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Threaded => f.write_str("threaded"),
            ExecutionMode::Cooperative => f.write_str("cooperative"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "threaded" | "thread" | "parallel" => Ok(ExecutionMode::Threaded),
            "cooperative" | "coop" | "single" => Ok(ExecutionMode::Cooperative),
            other => Err(ScheduleError::InvalidConfig(format!(
                "unknown execution mode `{other}`"
            ))),
        }
    }
}

impl FromStr for WaitStrategy {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poll" | "poll_per_tick" | "tick" => Ok(WaitStrategy::PollPerTick),
            "block" => Ok(WaitStrategy::Block),
            other => Err(ScheduleError::InvalidConfig(format!(
                "unknown wait strategy `{other}`"
            ))),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Execution substrate.
    pub mode: ExecutionMode,
    /// Number of worker threads (threaded mode).
    pub num_workers: usize,
    /// Automatic batch size is `len / batch_divisor`, at least 1.
    pub batch_divisor: usize,
    /// Worker thread name prefix.
    pub thread_name_prefix: String,
    /// How handles observe completion while suspended.
    pub wait_strategy: WaitStrategy,
    /// Statistics collection enabled.
    pub enable_stats: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let num_cpus = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            mode: ExecutionMode::platform_default(),
            num_workers: num_cpus,
            batch_divisor: DEFAULT_BATCH_DIVISOR,
            thread_name_prefix: "adapt-worker".to_string(),
            wait_strategy: WaitStrategy::PollPerTick,
            enable_stats: false,
        }
    }
}

impl SchedulerConfig {
    /// Defaults with a specific execution mode.
    pub fn with_mode(mode: ExecutionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Parse a RON document; missing fields keep their defaults.
    pub fn from_ron(source: &str) -> Result<Self> {
        let config: Self = ron::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `ADAPTJOB_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `ADAPTJOB_*` environment variables on top of `self`.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides looked up by environment variable name.
    pub fn with_overrides<F>(
        mut self,
        lookup: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup(ENV_MODE) {
            self.mode = mode.parse()?;
        }
        if let Some(workers) = lookup(ENV_WORKERS) {
            self.num_workers = parse_count(ENV_WORKERS, &workers)?;
        }
        if let Some(divisor) = lookup(ENV_BATCH_DIVISOR) {
            self.batch_divisor = parse_count(ENV_BATCH_DIVISOR, &divisor)?;
        }
        if let Some(wait) = lookup(ENV_WAIT) {
            self.wait_strategy = wait.parse()?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject unusable settings.
    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(ScheduleError::InvalidConfig(
                "num_workers must be at least 1".to_string(),
            ));
        }
        if self.batch_divisor == 0 {
            return Err(ScheduleError::InvalidConfig(
                "batch_divisor must be at least 1".to_string(),
            ));
        }
        if self.mode == ExecutionMode::Cooperative && self.wait_strategy == WaitStrategy::Block {
            return Err(ScheduleError::InvalidConfig(
                "the block wait strategy needs the threaded mode".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_count(
    key: &str,
    value: &str,
) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|e| ScheduleError::InvalidConfig(format!("{key}={value}: {e}")))
}
