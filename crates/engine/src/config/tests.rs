use std::io::Write;
use std::time::Duration;

use pretty_assertions::assert_eq;

use super::*;

#[test]
fn empty_text_yields_defaults() {
	let config = SessionConfig::from_toml_str("").unwrap();
	assert_eq!(config, SessionConfig::default());
	assert_eq!(config.undo.max_items, 100);
	assert!(config.dispatch.resource_wait_timeout().is_none());
}

#[test]
fn partial_sections_keep_other_defaults() {
	let config = SessionConfig::from_toml_str(
		r#"
[undo]
byte_limit = 1024

[dispatch]
resource_wait_timeout_ms = 250
"#,
	)
	.unwrap();
	assert_eq!(config.undo.byte_limit, 1024);
	assert!(config.undo.enabled);
	assert_eq!(config.history.capacity, 300);
	assert_eq!(config.dispatch.resource_wait_timeout(), Some(Duration::from_millis(250)));
}

#[test]
fn unknown_fields_are_rejected() {
	let err = SessionConfig::from_toml_str("[undo]\nbudget = 3\n").unwrap_err();
	assert!(matches!(err, ConfigError::Toml(_)), "{err}");
}

#[test]
fn zero_capacity_is_invalid() {
	let err = SessionConfig::from_toml_str("[history]\ncapacity = 0\n").unwrap_err();
	assert!(matches!(err, ConfigError::Invalid { field: "history.capacity", .. }));
}

#[test]
fn load_from_file_and_missing_file() {
	let dir = tempfile::tempdir().expect("tempdir");
	let path = dir.path().join("config.toml");
	let mut file = std::fs::File::create(&path).expect("create");
	writeln!(file, "[undo]\nenabled = false").expect("write");
	drop(file);

	let config = SessionConfig::load(&path).expect("load");
	assert!(!config.undo.enabled);

	let missing = dir.path().join("nope.toml");
	assert!(matches!(SessionConfig::load(&missing), Err(ConfigError::Io { .. })));
	assert_eq!(SessionConfig::load_or_default(&missing).expect("defaults"), SessionConfig::default());
}
