//! Lamina script runner.

mod cli;
mod script;

use std::io::Read;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use lamina_engine::{Session, SessionConfig};
use script::{RunOptions, run_script};

fn main() -> anyhow::Result<ExitCode> {
	let cli = Cli::parse();
	setup_tracing(cli.verbose);

	let config = match cli.config_path() {
		Some(path) => SessionConfig::load_or_default(&path).with_context(|| format!("loading {}", path.display()))?,
		None => SessionConfig::default(),
	};
	let text = if cli.reads_stdin() {
		let mut text = String::new();
		std::io::stdin().read_to_string(&mut text)?;
		text
	} else {
		std::fs::read_to_string(&cli.script).with_context(|| format!("reading {}", cli.script.display()))?
	};

	let session = Session::open(config)?;
	let options = RunOptions {
		keep_going: cli.keep_going,
		fail_fast: cli.fail_fast,
	};
	let summary = run_script(&session, &text, options, &mut std::io::stdout().lock())?;
	tracing::info!(succeeded = summary.succeeded, failed = summary.failed, "script.done");

	if let Some(path) = &cli.provenance {
		let json = session.handle().inspect(|view| view.provenance.export_to_string())??;
		std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
	}
	session.close();

	Ok(if summary.failed == 0 {
		ExitCode::SUCCESS
	} else {
		ExitCode::FAILURE
	})
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("lamina_engine=debug,lamina_worker=debug,lamina=debug,info")
		} else {
			EnvFilter::new("warn")
		}
	});
	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
