#![allow(unused_crate_dependencies)]

mod common;

use common::{run, session, snapshot};
use lamina_engine::actions::CreateLayer;
use lamina_engine::{ActionContext, ActionStatus, Session, SessionConfig, SessionError};
use pretty_assertions::assert_eq;

#[test]
fn sandbox_works_on_a_private_copy() {
	let main = session();
	run(&main, "create_layer a 2 2 fill=1.0");
	let sandbox = main.sandbox().unwrap();

	let copy = snapshot(&sandbox);
	assert_eq!(copy.sandbox(), Some(1));
	assert!(copy.same_content(&snapshot(&main)));

	run(&sandbox, "scale_layer a 4.0");
	run(&sandbox, "create_layer scratch 1 1 sandbox=1");
	assert_eq!(snapshot(&sandbox).len(), 2);
	assert_eq!(snapshot(&main).len(), 1);
	assert_eq!(
		main.handle().inspect(|view| view.undo.undo_len()).unwrap(),
		1,
		"sandbox work never reaches the parent's undo buffer"
	);

	let context = ActionContext::scripted();
	let status = main
		.handle()
		.post_and_wait(Box::new(CreateLayer::new("scratch", 1, 1).in_sandbox(1)), &context)
		.unwrap();
	assert_eq!(status, ActionStatus::Invalid);
	assert_eq!(context.errors(), vec!["not running in sandbox 1".to_string()]);

	let second = main.sandbox().unwrap();
	assert_eq!(snapshot(&second).sandbox(), Some(2));
}

#[test]
fn sandbox_parameter_is_not_recorded() {
	let main = session();
	let sandbox = main.sandbox().unwrap();
	run(&sandbox, "create_layer scratch 1 1 sandbox=1");
	let commands = sandbox
		.handle()
		.inspect(|view| view.provenance.iter().map(|step| step.command.to_string()).collect::<Vec<_>>())
		.unwrap();
	assert_eq!(commands, vec!["create_layer scratch 1 1".to_string()]);
}

#[test]
fn configuration_limits_are_applied() {
	let config = SessionConfig::from_toml_str(
		r#"
		[undo]
		max_items = 2

		[history]
		capacity = 3
		"#,
	)
	.unwrap();
	let session = Session::open(config).unwrap();
	for name in ["a", "b", "c", "d"] {
		run(&session, &format!("create_layer {name} 1 1"));
	}
	let (undo, history) = session
		.handle()
		.inspect(|view| (view.undo.undo_tags(), view.history.len()))
		.unwrap();
	assert_eq!(undo, vec!["create_layer d 1 1".to_string(), "create_layer c 1 1".to_string()]);
	assert_eq!(history, 3);
}

#[test]
fn invalid_configuration_is_rejected_before_starting() {
	let mut config = SessionConfig::default();
	config.history.capacity = 0;
	let err = Session::open(config).unwrap_err();
	assert!(matches!(err, SessionError::Config(_)));
	assert_eq!(err.to_string(), "invalid value for history.capacity: must be at least 1");
}
