// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Index-level settings.
//!
//! ```toml
//! result_window = 10000
//! commit_watermark_low = 10000
//! commit_watermark_high = 50000
//! default_author = "system"
//! lock_timeout_ms = 60000
//! ```

use crate::error::{Result, RevisionError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_RESULT_WINDOW: usize = 10_000;
pub const DEFAULT_COMMIT_WATERMARK_LOW: usize = 10_000;
pub const DEFAULT_COMMIT_WATERMARK_HIGH: usize = 50_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Maximum number of hits a single query may ask for.
    #[serde(default = "default_result_window")]
    pub result_window: usize,

    /// Commits with more changes than this log a warning.
    #[serde(default = "default_watermark_low")]
    pub commit_watermark_low: usize,

    /// Commits with more changes than this log an error.
    #[serde(default = "default_watermark_high")]
    pub commit_watermark_high: usize,

    /// Author recorded when a write does not name one.
    #[serde(default = "default_author")]
    pub default_author: String,

    /// How long a commit waits for the branch lock.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_result_window() -> usize {
    DEFAULT_RESULT_WINDOW
}

fn default_watermark_low() -> usize {
    DEFAULT_COMMIT_WATERMARK_LOW
}

fn default_watermark_high() -> usize {
    DEFAULT_COMMIT_WATERMARK_HIGH
}

fn default_author() -> String {
    "system".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    60_000
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            result_window: default_result_window(),
            commit_watermark_low: default_watermark_low(),
            commit_watermark_high: default_watermark_high(),
            default_author: default_author(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl IndexConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| RevisionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RevisionError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), "Loaded index config");
        Ok(config)
    }

    pub fn with_watermarks(mut self, low: usize, high: usize) -> Self {
        self.commit_watermark_low = low;
        self.commit_watermark_high = high;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.result_window == 0 {
            return Err(RevisionError::Config(
                "result_window must be positive".to_string(),
            ));
        }
        if self.commit_watermark_low > self.commit_watermark_high {
            return Err(RevisionError::Config(format!(
                "commit_watermark_low ({}) exceeds commit_watermark_high ({})",
                self.commit_watermark_low, self.commit_watermark_high
            )));
        }
        Ok(())
    }
}
