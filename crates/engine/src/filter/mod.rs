//! Background filters: cancellable, progress-reporting work run off the
//! dispatch thread.
//!
//! # Architecture
//!
//! An action's `run` hands a [`BackgroundFilter`] to the dispatcher through
//! [`crate::RunCx::start_filter`]. The dispatcher starts it on the shared
//! blocking pool and keeps the action, its context and its locks aside. The
//! filter computes into a private [`LayerData`]; when it returns, the outcome
//! is posted back onto the dispatch channel as a completion message and
//! applied there, in order with every other mutation.
//!
//! # Invariants
//!
//! * Filter output is never visible in the document before its completion is
//!   processed on the dispatch thread.
//! * Locks taken by the owning action are released only after the completion
//!   was processed, so a non-interruptable filter is always awaited first.
//! * The completion sink holds the dispatcher weakly; a filter outliving its
//!   session drops its result.

mod kernel;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lamina_worker::{InterruptToken, JobRecord, JobState, TaskClass, WorkerRegistry, panic_message};
use parking_lot::{Condvar, Mutex};
use tokio::sync::{broadcast, watch};

pub use kernel::{BoxBlur, Kernel, KernelFilter, KernelParams, KernelTable};

use crate::document::{LayerData, LayerId};
use crate::error::{ActionError, KernelError};
use crate::events::SessionEvent;

/// A unit of work run on a worker thread.
pub trait BackgroundFilter: Send + 'static {
	fn name(&self) -> &str;

	/// Filters that never poll [`FilterJob::interrupted`] must return false.
	fn is_interruptable(&self) -> bool {
		true
	}

	/// Computes the output raster.
	fn run(&mut self, job: &FilterJob) -> Result<LayerData, KernelError>;
}

/// Where a filter's output lands when its completion is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutput {
	/// Swap the output into an existing layer.
	Replace(LayerId),
	/// Insert a new layer under an id reserved when the filter started.
	NewLayer { id: LayerId, name: String },
}

impl FilterOutput {
	pub fn layer(&self) -> LayerId {
		match self {
			Self::Replace(id) | Self::NewLayer { id, .. } => *id,
		}
	}
}

/// Latest-value progress slot: a mutex-guarded scalar plus a change signal.
#[derive(Debug)]
pub struct ProgressSink {
	value: Mutex<f32>,
	signal: watch::Sender<f32>,
}

impl Default for ProgressSink {
	fn default() -> Self {
		Self::new()
	}
}

impl ProgressSink {
	pub fn new() -> Self {
		let (signal, _) = watch::channel(0.0);
		Self {
			value: Mutex::new(0.0),
			signal,
		}
	}

	/// Stores `fraction` clamped to `[0, 1]` and returns the previous value.
	pub fn set(&self, fraction: f32) -> f32 {
		let fraction = fraction.clamp(0.0, 1.0);
		let previous = std::mem::replace(&mut *self.value.lock(), fraction);
		self.signal.send_replace(fraction);
		previous
	}

	pub fn get(&self) -> f32 {
		*self.value.lock()
	}

	pub fn subscribe(&self) -> watch::Receiver<f32> {
		self.signal.subscribe()
	}
}

/// View of the running job handed to [`BackgroundFilter::run`].
pub struct FilterJob {
	job: u64,
	interruptable: bool,
	token: InterruptToken,
	progress: Arc<ProgressSink>,
	events: broadcast::Sender<SessionEvent>,
	workers: WorkerRegistry,
}

impl FilterJob {
	pub fn job(&self) -> u64 {
		self.job
	}

	/// Reports fractional progress.
	pub fn on_progress(&self, fraction: f32) {
		let previous = self.progress.set(fraction);
		let current = self.progress.get();
		if (current - previous).abs() < 0.01 && current < 1.0 {
			return;
		}
		self.workers.update(self.job, |record| record.progress = current);
		let _ = self.events.send(SessionEvent::FilterProgress {
			job: self.job,
			fraction: current,
			interruptable: self.interruptable,
		});
	}

	/// Poll point for cooperative interruption.
	pub fn interrupted(&self) -> bool {
		self.token.is_interrupted()
	}
}

#[derive(Debug)]
struct FilterShared {
	job: u64,
	name: String,
	interruptable: bool,
	token: InterruptToken,
	progress: Arc<ProgressSink>,
	done: Mutex<bool>,
	done_cv: Condvar,
	workers: WorkerRegistry,
}

/// Caller-side handle to a running filter.
#[derive(Debug, Clone)]
pub struct FilterHandle {
	shared: Arc<FilterShared>,
}

impl FilterHandle {
	pub fn job(&self) -> u64 {
		self.shared.job
	}

	pub fn name(&self) -> &str {
		&self.shared.name
	}

	pub fn is_interruptable(&self) -> bool {
		self.shared.interruptable
	}

	/// Asks the filter to stop at its next poll point.
	///
	/// Returns false, and does nothing, for non-interruptable filters.
	pub fn request_interrupt(&self) -> bool {
		if !self.shared.interruptable {
			return false;
		}
		tracing::debug!(job = self.shared.job, filter = %self.shared.name, "filter.interrupt");
		self.shared.workers.update(self.shared.job, |record| record.state = JobState::Interrupting);
		self.shared.token.interrupt();
		true
	}

	pub fn progress(&self) -> f32 {
		self.shared.progress.get()
	}

	pub fn subscribe_progress(&self) -> watch::Receiver<f32> {
		self.shared.progress.subscribe()
	}

	/// True once the worker returned and its completion was posted.
	pub fn is_done(&self) -> bool {
		*self.shared.done.lock()
	}

	/// Blocks until the worker returned.
	pub fn wait(&self) {
		let mut done = self.shared.done.lock();
		while !*done {
			self.shared.done_cv.wait(&mut done);
		}
	}

	/// Blocks until the worker returned or `timeout` elapsed; false on timeout.
	pub fn wait_timeout(&self, timeout: Duration) -> bool {
		let deadline = Instant::now() + timeout;
		let mut done = self.shared.done.lock();
		while !*done {
			if self.shared.done_cv.wait_until(&mut done, deadline).timed_out() {
				return *done;
			}
		}
		true
	}

	/// Requests an interrupt (if supported) and waits for the worker to return.
	pub fn abort_and_wait(&self) {
		self.request_interrupt();
		self.wait();
	}

	fn mark_done(&self) {
		*self.shared.done.lock() = true;
		self.shared.done_cv.notify_all();
	}
}

/// Starts `filter` on the blocking pool.
///
/// `on_complete` runs on the worker thread with the outcome, after the job
/// left `workers` and before the handle reports done.
pub(crate) fn start(
	mut filter: Box<dyn BackgroundFilter>,
	job: u64,
	events: broadcast::Sender<SessionEvent>,
	workers: WorkerRegistry,
	on_complete: impl FnOnce(u64, Result<LayerData, KernelError>) + Send + 'static,
) -> Result<FilterHandle, ActionError> {
	let name = filter.name().to_string();
	let interruptable = filter.is_interruptable();
	let token = InterruptToken::new(job);
	let progress = Arc::new(ProgressSink::new());
	let handle = FilterHandle {
		shared: Arc::new(FilterShared {
			job,
			name: name.clone(),
			interruptable,
			token: token.clone(),
			progress: Arc::clone(&progress),
			done: Mutex::new(false),
			done_cv: Condvar::new(),
			workers: workers.clone(),
		}),
	};

	workers.upsert(JobRecord {
		job,
		name: name.clone(),
		class: TaskClass::CpuBlocking,
		state: JobState::Running,
		progress: 0.0,
	});
	let filter_job = FilterJob {
		job,
		interruptable,
		token,
		progress,
		events,
		workers: workers.clone(),
	};
	let worker_handle = handle.clone();
	let spawned = lamina_worker::spawn_blocking(TaskClass::CpuBlocking, move || {
		let started = Instant::now();
		let outcome = catch_unwind(AssertUnwindSafe(|| filter.run(&filter_job)))
			.unwrap_or_else(|payload| Err(KernelError::Panicked(panic_message(payload.as_ref()))));
		tracing::debug!(
			job,
			filter = %worker_handle.name(),
			ok = outcome.is_ok(),
			elapsed_ms = started.elapsed().as_millis() as u64,
			"filter.finished"
		);
		workers.remove(job);
		on_complete(job, outcome);
		worker_handle.mark_done();
	});
	if let Err(err) = spawned {
		handle.shared.workers.remove(job);
		return Err(ActionError::execution(format!("failed to start filter {name}: {err}")));
	}
	tracing::debug!(job, filter = %name, interruptable, "filter.start");
	Ok(handle)
}

#[cfg(test)]
mod tests;
