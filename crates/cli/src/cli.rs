//! Command-line schema for the `lamina` binary.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "lamina")]
#[command(about = "Run a script of Lamina actions against a fresh document")]
#[command(version)]
/// Command-line arguments.
pub struct Cli {
	/// Script to run, one command per line; `-` reads stdin.
	#[arg(value_name = "SCRIPT")]
	pub script: PathBuf,

	/// Configuration file (defaults to the user config directory).
	#[arg(short, long, value_name = "PATH")]
	pub config: Option<PathBuf>,

	/// Write the provenance ledger as JSON after the script ran.
	#[arg(long, value_name = "PATH")]
	pub provenance: Option<PathBuf>,

	/// Keep running after a command fails.
	#[arg(short, long)]
	pub keep_going: bool,

	/// Fail immediately when a layer is busy instead of waiting for it.
	#[arg(long)]
	pub fail_fast: bool,

	/// Verbose logging
	#[arg(short, long)]
	pub verbose: bool,
}

impl Cli {
	/// The explicit `--config` path, or `lamina/config.toml` under the user
	/// config directory.
	pub fn config_path(&self) -> Option<PathBuf> {
		self.config
			.clone()
			.or_else(|| dirs::config_dir().map(|dir| dir.join("lamina").join("config.toml")))
	}

	pub fn reads_stdin(&self) -> bool {
		self.script.as_os_str() == "-"
	}
}

#[cfg(test)]
mod tests;
