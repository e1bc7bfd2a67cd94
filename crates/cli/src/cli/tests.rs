use std::path::PathBuf;

use clap::Parser;

use super::Cli;

#[test]
fn explicit_config_wins() {
	let cli = Cli::try_parse_from(["lamina", "run.lam", "--config", "/tmp/lamina.toml", "-k"]).unwrap();
	assert_eq!(cli.script, PathBuf::from("run.lam"));
	assert_eq!(cli.config_path(), Some(PathBuf::from("/tmp/lamina.toml")));
	assert!(cli.keep_going);
	assert!(!cli.fail_fast);
	assert!(!cli.reads_stdin());
}

#[test]
fn dash_reads_stdin() {
	let cli = Cli::try_parse_from(["lamina", "-", "--provenance", "out.json"]).unwrap();
	assert!(cli.reads_stdin());
	assert_eq!(cli.provenance, Some(PathBuf::from("out.json")));
}

#[test]
fn script_is_required() {
	assert!(Cli::try_parse_from(["lamina"]).is_err());
}
