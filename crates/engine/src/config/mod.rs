//! Session configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) yields a working
//! session:
//!
//! ```toml
//! [undo]
//! enabled = true
//! byte_limit = 268435456
//! max_items = 100
//!
//! [history]
//! capacity = 300
//!
//! [dispatch]
//! thread_name = "lamina-dispatch"
//! resource_wait_timeout_ms = 30000
//! event_capacity = 256
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// The file is not valid TOML or has wrongly typed fields.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// A value parsed but is out of range.
	#[error("invalid value for {field}: {reason}")]
	Invalid {
		field: &'static str,
		reason: &'static str,
	},
}

/// Top-level configuration for one [`crate::Session`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
	pub undo: UndoConfig,
	pub history: HistoryConfig,
	pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UndoConfig {
	/// When false, undoable actions push nothing and the buffer stays empty.
	pub enabled: bool,
	/// Byte budget for checkpoint data held by undo items.
	pub byte_limit: usize,
	/// Maximum number of undo items regardless of size.
	pub max_items: usize,
}

impl Default for UndoConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			byte_limit: 256 * 1024 * 1024,
			max_items: 100,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistoryConfig {
	pub capacity: usize,
}

impl Default for HistoryConfig {
	fn default() -> Self {
		Self { capacity: 300 }
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
	/// Name of the dispatch thread.
	pub thread_name: String,
	/// How long a suspended action waits for a busy layer before it is
	/// concluded as unavailable. `None` waits indefinitely.
	pub resource_wait_timeout_ms: Option<u64>,
	/// Buffer size of the session event broadcast channel.
	pub event_capacity: usize,
}

impl Default for DispatchConfig {
	fn default() -> Self {
		Self {
			thread_name: "lamina-dispatch".to_string(),
			resource_wait_timeout_ms: None,
			event_capacity: 256,
		}
	}
}

impl DispatchConfig {
	pub fn resource_wait_timeout(&self) -> Option<Duration> {
		self.resource_wait_timeout_ms.map(Duration::from_millis)
	}
}

impl SessionConfig {
	/// Parses configuration from TOML text.
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(text)?;
		config.check()?;
		Ok(config)
	}

	/// Reads and parses a configuration file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&text)
	}

	/// Like [`Self::load`], but a missing file yields the defaults.
	pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
		match Self::load(path) {
			Err(ConfigError::Io { error, .. }) if error.kind() == std::io::ErrorKind::NotFound => {
				tracing::debug!(path = %path.display(), "config.missing_using_defaults");
				Ok(Self::default())
			}
			other => other,
		}
	}

	pub(crate) fn check(&self) -> Result<(), ConfigError> {
		if self.undo.max_items == 0 {
			return Err(ConfigError::Invalid {
				field: "undo.max_items",
				reason: "must be at least 1",
			});
		}
		if self.history.capacity == 0 {
			return Err(ConfigError::Invalid {
				field: "history.capacity",
				reason: "must be at least 1",
			});
		}
		if self.dispatch.event_capacity == 0 {
			return Err(ConfigError::Invalid {
				field: "dispatch.event_capacity",
				reason: "must be at least 1",
			});
		}
		if self.dispatch.thread_name.is_empty() {
			return Err(ConfigError::Invalid {
				field: "dispatch.thread_name",
				reason: "must not be empty",
			});
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests;
