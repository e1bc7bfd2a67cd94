use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::broadcast::error::TryRecvError;

use crate::action::{Action, ActionContext, ActionResult, ActionSource, ActionSpec, ActionStatus, Param, RunCx, ValidateCx, WaitPolicy};
use crate::actions::{CreateLayer, DeleteLayer, LayerInfo, RenameLayer, ScaleLayer};
use crate::config::SessionConfig;
use crate::document::{LayerData, LayerId};
use crate::error::ActionError;
use crate::events::SessionEvent;
use crate::lock::LockMode;
use crate::session::Session;

static EXPLODE: ActionSpec = ActionSpec {
	name: "explode",
	description: "panics while running",
	undoable: true,
	mutates_document: true,
};

#[derive(Clone)]
struct Explode;

impl Action for Explode {
	fn spec(&self) -> &'static ActionSpec {
		&EXPLODE
	}

	fn params(&self) -> Vec<Param> {
		Vec::new()
	}

	fn validate(&mut self, _cx: &mut ValidateCx<'_>) -> Result<(), ActionError> {
		Ok(())
	}

	fn run(&mut self, _cx: &mut RunCx<'_>) -> Result<Option<ActionResult>, ActionError> {
		panic!("boom");
	}
}

fn open() -> Session {
	Session::open(SessionConfig::default()).expect("session opens")
}

fn create(session: &Session, name: &str) -> LayerId {
	let context = ActionContext::programmatic();
	let status = session
		.handle()
		.post_and_wait(Box::new(CreateLayer::new(name, 2, 2)), &context)
		.expect("posted");
	assert_eq!(status, ActionStatus::Success);
	match context.result() {
		Some(ActionResult::Layer(id)) => id,
		other => panic!("create returned {other:?}"),
	}
}

fn layer_name(session: &Session, id: LayerId) -> Option<String> {
	session
		.handle()
		.inspect(move |view| view.document.get(id).map(|layer| layer.name.clone()))
		.expect("inspect")
}

fn wait_for_status(context: &ActionContext, status: ActionStatus) {
	let deadline = std::time::Instant::now() + Duration::from_secs(5);
	while context.status() != status {
		assert!(std::time::Instant::now() < deadline, "context stuck at {:?}", context.status());
		std::thread::sleep(Duration::from_millis(2));
	}
}

fn event_name(event: &SessionEvent) -> &'static str {
	match event {
		SessionEvent::PreAction { .. } => "pre",
		SessionEvent::PostAction { .. } => "post",
		SessionEvent::ResourceWaiting { .. } => "waiting",
		SessionEvent::DocumentChanged { .. } => "document",
		SessionEvent::UndoStackChanged { .. } => "undo_stack",
		SessionEvent::UndoEvicted { .. } => "evicted",
		SessionEvent::UndoReplayFailed { .. } => "undo_failed",
		SessionEvent::HistoryChanged { .. } => "history",
		SessionEvent::FilterProgress { .. } => "progress",
	}
}

#[test]
fn rename_undo_redo_round_trip() {
	let session = open();
	let handle = session.handle();
	let id = create(&session, "a");

	let context = ActionContext::interactive();
	assert_eq!(
		handle.post_and_wait(Box::new(RenameLayer::new(id, "b")), &context).unwrap(),
		ActionStatus::Success
	);
	assert_eq!(layer_name(&session, id).as_deref(), Some("b"));

	assert!(handle.undo(&context).unwrap());
	assert_eq!(layer_name(&session, id).as_deref(), Some("a"));
	let (undo, redo, steps) = handle
		.inspect(|view| (view.undo.undo_len(), view.undo.redo_len(), view.provenance.len()))
		.unwrap();
	assert_eq!((undo, redo, steps), (1, 1, 1));

	assert!(handle.redo(&context).unwrap());
	assert_eq!(layer_name(&session, id).as_deref(), Some("b"));
	let (undo, redo, steps) = handle
		.inspect(|view| (view.undo.undo_len(), view.undo.redo_len(), view.provenance.len()))
		.unwrap();
	assert_eq!((undo, redo, steps), (2, 0, 2));
}

#[test]
fn new_action_clears_redo() {
	let session = open();
	let handle = session.handle();
	let id = create(&session, "a");
	let context = ActionContext::interactive();
	handle.post_and_wait(Box::new(RenameLayer::new(id, "b")), &context).unwrap();
	assert!(handle.undo(&context).unwrap());

	handle.post_and_wait(Box::new(RenameLayer::new(id, "c")), &context).unwrap();
	let redo = handle.inspect(|view| view.undo.redo_len()).unwrap();
	assert_eq!(redo, 0);
	assert!(!handle.redo(&context).unwrap());
	assert_eq!(context.errors().last().map(String::as_str), Some("redo list is empty"));
}

#[test]
fn undo_with_nothing_recorded_is_invalid() {
	let session = open();
	let context = ActionContext::interactive();
	assert!(!session.handle().undo(&context).unwrap());
	assert_eq!(context.status(), ActionStatus::Invalid);
	assert_eq!(context.errors(), vec!["undo list is empty".to_string()]);
}

#[test]
fn busy_context_is_refused_until_its_work_finishes() {
	let session = open();
	let handle = session.handle();
	let id = create(&session, "a");
	let held = handle.locks().unwrap().acquire(id, LockMode::Exclusive).unwrap();

	let context = ActionContext::interactive();
	handle.post(Box::new(DeleteLayer::new(id)), &context).unwrap();
	wait_for_status(&context, ActionStatus::Waiting);
	assert_eq!(context.notifier().map(|n| n.layer()), Some(id));
	assert!(handle.is_busy());
	assert!(matches!(
		handle.post(Box::new(LayerInfo::new(id)), &context),
		Err(ActionError::ContextBusy)
	));

	drop(held);
	assert_eq!(context.wait_done(Some(Duration::from_secs(5))), ActionStatus::Success);
	let len = handle.inspect(|view| view.document.len()).unwrap();
	assert_eq!(len, 0);
}

#[test]
fn parked_work_runs_before_later_posts() {
	let session = open();
	let handle = session.handle();
	let id = create(&session, "a");
	let held = handle.locks().unwrap().acquire(id, LockMode::Exclusive).unwrap();

	let first = ActionContext::interactive();
	handle.post(Box::new(RenameLayer::new(id, "first")), &first).unwrap();
	wait_for_status(&first, ActionStatus::Waiting);
	let second = ActionContext::interactive();
	handle.post(Box::new(RenameLayer::new(id, "second")), &second).unwrap();
	assert!(!second.is_done());

	drop(held);
	assert_eq!(second.wait_done(Some(Duration::from_secs(5))), ActionStatus::Success);
	assert!(first.is_done());
	assert_eq!(layer_name(&session, id).as_deref(), Some("second"));
}

#[test]
fn fail_fast_concludes_unavailable_with_a_notifier() {
	let session = open();
	let handle = session.handle();
	let id = create(&session, "a");
	let held = handle.locks().unwrap().acquire(id, LockMode::Exclusive).unwrap();

	let context = ActionContext::with_policy(ActionSource::Scripted, WaitPolicy::FailFast);
	let status = handle.post_and_wait(Box::new(DeleteLayer::new(id)), &context).unwrap();
	assert_eq!(status, ActionStatus::Unavailable);
	assert_eq!(context.errors(), vec!["layer #1 is busy".to_string()]);

	let notifier = context.notifier().expect("notifier set");
	assert!(!notifier.is_available());
	drop(held);
	assert!(notifier.timed_wait(Duration::from_secs(1)));
}

#[test]
fn suspended_work_gives_up_after_the_configured_timeout() {
	let mut config = SessionConfig::default();
	config.dispatch.resource_wait_timeout_ms = Some(30);
	let session = Session::open(config).unwrap();
	let handle = session.handle();
	let id = create(&session, "a");
	let held = handle.locks().unwrap().acquire(id, LockMode::Exclusive).unwrap();

	let context = ActionContext::interactive();
	let status = handle.post_and_wait(Box::new(DeleteLayer::new(id)), &context).unwrap();
	assert_eq!(status, ActionStatus::Unavailable);
	assert_eq!(context.errors(), vec!["layer #1 stayed busy".to_string()]);

	drop(held);
	let info = ActionContext::interactive();
	assert_eq!(
		handle.post_and_wait(Box::new(LayerInfo::new(id)), &info).unwrap(),
		ActionStatus::Success
	);
}

#[test]
fn blocking_waits_from_the_dispatch_thread_are_refused() {
	let session = open();
	let handle = session.handle();
	let inner = handle.clone();
	let refused = handle
		.inspect(move |_| {
			let posted = inner.post_and_wait(Box::new(CreateLayer::new("x", 1, 1)), &ActionContext::programmatic());
			let batch = inner.post_actions_and_wait(
				vec![Box::new(CreateLayer::new("y", 1, 1)) as Box<dyn Action>],
				&ActionContext::programmatic(),
			);
			let nested = inner.inspect(|view| view.document.len());
			(
				matches!(posted, Err(ActionError::Deadlock)),
				matches!(batch, Err(ActionError::Deadlock)),
				matches!(nested, Err(ActionError::Deadlock)),
			)
		})
		.unwrap();
	assert_eq!(refused, (true, true, true));
}

#[test]
fn a_batch_stops_at_the_first_failure() {
	let session = open();
	let handle = session.handle();
	let context = ActionContext::scripted();
	let status = handle
		.post_actions_and_wait(
			vec![
				Box::new(CreateLayer::new("a", 1, 1)),
				Box::new(RenameLayer::new("missing", "b")),
				Box::new(CreateLayer::new("c", 1, 1)),
			],
			&context,
		)
		.unwrap();
	assert_eq!(status, ActionStatus::Invalid);
	assert_eq!(context.errors(), vec!["unknown layer 'missing'".to_string()]);
	let names = handle
		.inspect(|view| view.document.iter().map(|layer| layer.name.clone()).collect::<Vec<_>>())
		.unwrap();
	assert_eq!(names, vec!["a".to_string()]);
}

#[test]
fn panicking_action_becomes_an_execution_error() {
	let session = open();
	let handle = session.handle();
	let context = ActionContext::programmatic();
	assert_eq!(handle.post_and_wait(Box::new(Explode), &context).unwrap(), ActionStatus::Error);
	assert_eq!(context.errors(), vec!["action panicked: boom".to_string()]);

	let (undo, steps) = handle.inspect(|view| (view.undo.undo_len(), view.provenance.len())).unwrap();
	assert_eq!((undo, steps), (0, 0));
	create(&session, "still alive");
}

#[test]
fn events_follow_dispatch_order() {
	let session = open();
	let handle = session.handle();
	let mut events = handle.subscribe().unwrap();
	create(&session, "a");

	let mut seen = Vec::new();
	loop {
		match events.try_recv() {
			Ok(event) => seen.push(event),
			Err(TryRecvError::Empty) => break,
			Err(other) => panic!("event feed broke: {other:?}"),
		}
	}
	let names: Vec<_> = seen.iter().map(event_name).collect();
	assert_eq!(names, vec!["pre", "post", "document", "undo_stack", "history"]);
	assert!(matches!(
		&seen[1],
		SessionEvent::PostAction {
			status: ActionStatus::Success,
			result: Some(ActionResult::Layer(LayerId(1))),
			..
		}
	));
	assert!(matches!(&seen[3], SessionEvent::UndoStackChanged { undo: 1, redo: 0, .. }));
}

#[test]
fn shrinking_the_byte_budget_evicts_and_drops_provenance() {
	let session = open();
	let handle = session.handle();
	let id = create(&session, "a");
	let context = ActionContext::programmatic();
	for factor in [2.0, 3.0] {
		handle.post_and_wait(Box::new(ScaleLayer::new(id, factor)), &context).unwrap();
	}
	let mut events = handle.subscribe().unwrap();

	handle.set_undo_byte_limit(16).unwrap();
	let (undo, bytes, steps) = handle
		.inspect(|view| {
			let steps: Vec<_> = view.provenance.iter().map(|step| step.action_type.clone()).collect();
			(view.undo.undo_tags(), view.undo.total_bytes(), steps)
		})
		.unwrap();
	assert_eq!(undo, vec!["scale_layer #1 3.0".to_string()]);
	assert_eq!(bytes, 16);
	// The create step held no checkpoint and stays recorded.
	assert_eq!(steps, vec!["create_layer".to_string(), "scale_layer".to_string()]);

	let mut evicted = Vec::new();
	while let Ok(event) = events.try_recv() {
		if let SessionEvent::UndoEvicted { tag, byte_size } = event {
			evicted.push((tag, byte_size));
		}
	}
	assert_eq!(
		evicted,
		vec![("create_layer a 2 2".to_string(), 0), ("scale_layer #1 2.0".to_string(), 16)]
	);
}

#[test]
fn a_push_over_the_byte_budget_evicts_the_oldest_checkpoint() {
	let mut config = SessionConfig::default();
	config.undo.byte_limit = 16;
	let session = Session::open(config).expect("session opens");
	let handle = session.handle();
	let context = ActionContext::programmatic();
	handle
		.post_and_wait(Box::new(CreateLayer::new("a", 2, 2).with_fill(1.0)), &context)
		.unwrap();
	let id = LayerId(1);

	handle.post_and_wait(Box::new(ScaleLayer::new(id, 2.0)), &context).unwrap();
	assert!(context.warnings().is_empty());
	assert_eq!(
		handle.inspect(|view| view.undo.undo_tags()).unwrap(),
		vec!["scale_layer #1 2.0".to_string(), "create_layer a 2 2 fill=1.0".to_string()]
	);

	let status = handle.post_and_wait(Box::new(ScaleLayer::new(id, 3.0)), &context).unwrap();
	assert_eq!(status, ActionStatus::Success);
	assert_eq!(
		context.warnings(),
		vec![
			"undo step 'create_layer a 2 2 fill=1.0' dropped to stay within the undo budget".to_string(),
			"undo step 'scale_layer #1 2.0' dropped to stay within the undo budget".to_string(),
		]
	);
	let (undo, bytes, commands) = handle
		.inspect(|view| {
			let commands: Vec<_> = view.provenance.iter().map(|step| step.command.to_string()).collect();
			(view.undo.undo_tags(), view.undo.total_bytes(), commands)
		})
		.unwrap();
	assert_eq!(undo, vec!["scale_layer #1 3.0".to_string()]);
	assert_eq!(bytes, 16);
	assert_eq!(
		commands,
		vec!["create_layer a 2 2 fill=1.0".to_string(), "scale_layer #1 3.0".to_string()]
	);

	assert!(handle.undo(&context).unwrap());
	let data = handle
		.inspect(move |view| view.document.get(id).map(|layer| layer.data.clone()))
		.unwrap();
	assert_eq!(data, Some(LayerData::filled(2, 2, 2.0)));
	assert!(!handle.undo(&context).unwrap());
	assert_eq!(context.errors(), vec!["undo list is empty".to_string()]);
}

#[test]
fn history_capacity_can_shrink_at_runtime() {
	let session = open();
	let handle = session.handle();
	for name in ["a", "b", "c"] {
		create(&session, name);
	}
	handle.set_history_capacity(2).unwrap();
	let commands = handle
		.inspect(|view| view.history.iter().map(|entry| entry.action.export_to_string()).collect::<Vec<_>>())
		.unwrap();
	assert_eq!(commands, vec!["create_layer c 2 2".to_string(), "create_layer b 2 2".to_string()]);
	assert!(handle.last_action_completed().is_some());

	handle.clear_history().unwrap();
	assert_eq!(handle.inspect(|view| view.history.len()).unwrap(), 0);
}

#[test]
fn disabling_undo_empties_the_buffer() {
	let session = open();
	let handle = session.handle();
	create(&session, "a");
	handle.set_undo_enabled(false).unwrap();
	create(&session, "b");
	let (undo, steps) = handle.inspect(|view| (view.undo.undo_len(), view.provenance.len())).unwrap();
	assert_eq!((undo, steps), (0, 2));
}

#[test]
fn handles_outliving_the_session_report_it_closed() {
	let session = open();
	let handle = session.handle();
	session.close();
	let context = ActionContext::programmatic();
	assert!(matches!(
		handle.post(Box::new(CreateLayer::new("a", 1, 1)), &context),
		Err(ActionError::SessionClosed)
	));
	assert!(!handle.is_busy());
	assert!(matches!(handle.subscribe(), Err(ActionError::SessionClosed)));
}

#[test]
fn commands_are_built_through_the_session_registry() {
	let session = open();
	let handle = session.handle();
	let context = ActionContext::scripted();
	handle.post_command("create_layer base 3 1 fill=0.5", &context).unwrap();
	assert_eq!(context.wait_done(None), ActionStatus::Success);
	handle.post_command("layer_info base", &context).unwrap();
	context.wait_done(None);
	assert_eq!(context.result(), Some(ActionResult::Text("#1 base 3x1 mean=0.500".into())));

	assert!(matches!(
		handle.post_command("paint base", &context),
		Err(ActionError::UnknownAction(name)) if name == "paint"
	));
}
