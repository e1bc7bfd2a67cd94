#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use lamina_engine::filter::BoxBlur;
use lamina_engine::{
	ActionContext, ActionResult, ActionStatus, Document, FilterHandle, FilterJob, Kernel, KernelError, KernelParams, LayerData, LayerId,
	Session, SessionConfig,
};
use parking_lot::{Condvar, Mutex};

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

/// Latch a test opens to let gated kernels finish.
#[derive(Default)]
pub struct Gate {
	state: Mutex<GateState>,
	changed: Condvar,
}

#[derive(Default)]
struct GateState {
	open: bool,
	entered: usize,
}

impl Gate {
	pub fn open(&self) {
		self.state.lock().open = true;
		self.changed.notify_all();
	}

	/// Blocks until `count` kernels have entered the gate.
	pub fn wait_entered(&self, count: usize) {
		let deadline = Instant::now() + Duration::from_secs(5);
		let mut state = self.state.lock();
		while state.entered < count {
			assert!(!self.changed.wait_until(&mut state, deadline).timed_out(), "kernel never started");
		}
	}
}

/// Box blur that holds until its gate opens or its job is interrupted.
pub struct GatedBlur {
	pub gate: Arc<Gate>,
}

impl Kernel for GatedBlur {
	fn execute(&self, input: &LayerData, params: &KernelParams, job: &FilterJob) -> Result<LayerData, KernelError> {
		{
			let mut state = self.gate.state.lock();
			state.entered += 1;
			self.gate.changed.notify_all();
			while !state.open {
				if job.interrupted() {
					return Err(KernelError::Interrupted);
				}
				self.gate.changed.wait_for(&mut state, Duration::from_millis(5));
			}
		}
		BoxBlur.execute(input, params, job)
	}
}

pub fn gated_session(config: SessionConfig) -> (Session, Arc<Gate>) {
	init_tracing();
	let gate = Arc::new(Gate::default());
	let session = Session::builder()
		.config(config)
		.kernel(BoxBlur::NAME, Arc::new(GatedBlur { gate: Arc::clone(&gate) }))
		.open()
		.expect("session opens");
	(session, gate)
}

pub fn session() -> Session {
	init_tracing();
	Session::open(SessionConfig::default()).expect("session opens")
}

/// Runs one textual command and returns the layer it produced, if any.
pub fn run(session: &Session, command: &str) -> Option<LayerId> {
	let context = ActionContext::scripted();
	session.handle().post_command(command, &context).expect("posted");
	let status = context.wait_done(Some(Duration::from_secs(10)));
	assert_eq!(status, ActionStatus::Success, "{command}: {:?}", context.errors());
	match context.result() {
		Some(ActionResult::Layer(id)) => Some(id),
		_ => None,
	}
}

pub fn snapshot(session: &Session) -> Document {
	session.handle().inspect(|view| view.document.clone()).expect("inspect")
}

pub fn wait_for_status(context: &ActionContext, status: ActionStatus) {
	let deadline = Instant::now() + Duration::from_secs(5);
	while context.status() != status {
		assert!(Instant::now() < deadline, "context stuck at {:?}", context.status());
		std::thread::sleep(Duration::from_millis(2));
	}
}

/// Polls until the context's action handed its work to a filter.
pub fn filter_of(context: &ActionContext) -> FilterHandle {
	let deadline = Instant::now() + Duration::from_secs(5);
	loop {
		if let Some(filter) = context.filter() {
			return filter;
		}
		assert!(Instant::now() < deadline, "no filter was started");
		std::thread::sleep(Duration::from_millis(2));
	}
}
