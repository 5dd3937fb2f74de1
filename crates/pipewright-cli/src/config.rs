//! CLI configuration.

use std::path::PathBuf;
use std::time::Duration;

use pipewright_engine::{RunnerConfig, DEFAULT_RECLAIM_AFTER};

/// CLI configuration.
pub struct Config {
    /// Directory holding `tasks/` and `runs/`.
    pub state_dir: PathBuf,

    /// Claude CLI binary, resolved through PATH when not absolute.
    pub claude_path: String,

    /// Age after which a pending effect may be reclaimed (seconds).
    pub reclaim_after_secs: u64,

    /// Per-task dispatch timeout (seconds). None waits indefinitely.
    pub dispatch_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".pipewright"),
            claude_path: "claude".to_string(),
            reclaim_after_secs: DEFAULT_RECLAIM_AFTER.as_secs(),
            dispatch_timeout_secs: None,
        }
    }
}

impl Config {
    pub fn runner_config(&self) -> RunnerConfig {
        let config = RunnerConfig::default().with_reclaim_after(Duration::from_secs(self.reclaim_after_secs));
        match self.dispatch_timeout_secs {
            Some(secs) => config.with_dispatch_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.state_dir, PathBuf::from(".pipewright"));
        assert_eq!(config.claude_path, "claude");

        let runner = config.runner_config();
        assert_eq!(runner.reclaim_after, DEFAULT_RECLAIM_AFTER);
        assert_eq!(runner.dispatch_timeout, None);
    }

    #[test]
    fn test_dispatch_timeout() {
        let config = Config {
            dispatch_timeout_secs: Some(90),
            ..Config::default()
        };
        assert_eq!(config.runner_config().dispatch_timeout, Some(Duration::from_secs(90)));
    }
}
