use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::ActionResult;
use crate::error::ActionError;
use crate::filter::FilterHandle;
use crate::lock::AvailabilityNotifier;

/// Lifecycle status of the action(s) reporting into a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
	/// Posted but not yet picked up by the dispatcher.
	Pending,
	/// Suspended on a busy layer.
	Waiting,
	Running,
	Success,
	/// `run` failed.
	Error,
	/// `validate` rejected the action.
	Invalid,
	/// The needed layer stayed busy; see [`ActionContext::notifier`].
	Unavailable,
}

impl ActionStatus {
	pub const fn is_terminal(self) -> bool {
		matches!(self, Self::Success | Self::Error | Self::Invalid | Self::Unavailable)
	}

	pub const fn is_failure(self) -> bool {
		matches!(self, Self::Error | Self::Invalid | Self::Unavailable)
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Waiting => "waiting",
			Self::Running => "running",
			Self::Success => "success",
			Self::Error => "error",
			Self::Invalid => "invalid",
			Self::Unavailable => "unavailable",
		}
	}
}

/// Where an action came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionSource {
	Interactive,
	Scripted,
	Programmatic,
	/// Rebuilt from a provenance record.
	Replay,
	/// Run by the undo buffer, either as an undo step or as a redo.
	UndoBuffer,
}

impl ActionSource {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Interactive => "interactive",
			Self::Scripted => "scripted",
			Self::Programmatic => "programmatic",
			Self::Replay => "replay",
			Self::UndoBuffer => "undo_buffer",
		}
	}
}

/// What the dispatcher does when a needed layer is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
	/// Suspend the action until the layer frees up.
	#[default]
	Suspend,
	/// Conclude immediately as [`ActionStatus::Unavailable`] with the notifier set.
	FailFast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
	Error,
	Warning,
	Message,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextMessage {
	pub level: MessageLevel,
	pub text: String,
}

#[derive(Debug)]
struct ContextState {
	status: ActionStatus,
	messages: Vec<ContextMessage>,
	result: Option<ActionResult>,
	notifier: Option<AvailabilityNotifier>,
	filter: Option<FilterHandle>,
	/// Claims plus pending filter completions still reporting here.
	outstanding: usize,
}

#[derive(Debug)]
struct ContextInner {
	source: ActionSource,
	policy: WaitPolicy,
	state: Mutex<ContextState>,
	done: Condvar,
}

/// Reporting channel shared between a caller and the dispatcher.
///
/// A context may be reused for consecutive actions, but only one action
/// (or one batch) may be in flight on it at a time. Messages describe the
/// most recent claim only.
#[derive(Debug, Clone)]
pub struct ActionContext {
	inner: Arc<ContextInner>,
}

impl ActionContext {
	pub fn new(source: ActionSource) -> Self {
		Self::with_policy(source, WaitPolicy::default())
	}

	pub fn with_policy(source: ActionSource, policy: WaitPolicy) -> Self {
		Self {
			inner: Arc::new(ContextInner {
				source,
				policy,
				state: Mutex::new(ContextState {
					status: ActionStatus::Pending,
					messages: Vec::new(),
					result: None,
					notifier: None,
					filter: None,
					outstanding: 0,
				}),
				done: Condvar::new(),
			}),
		}
	}

	pub fn interactive() -> Self {
		Self::new(ActionSource::Interactive)
	}

	pub fn scripted() -> Self {
		Self::new(ActionSource::Scripted)
	}

	pub fn programmatic() -> Self {
		Self::new(ActionSource::Programmatic)
	}

	pub fn source(&self) -> ActionSource {
		self.inner.source
	}

	pub fn policy(&self) -> WaitPolicy {
		self.inner.policy
	}

	pub fn status(&self) -> ActionStatus {
		self.inner.state.lock().status
	}

	pub fn result(&self) -> Option<ActionResult> {
		self.inner.state.lock().result.clone()
	}

	/// Notifier for the layer this context last waited on.
	pub fn notifier(&self) -> Option<AvailabilityNotifier> {
		self.inner.state.lock().notifier.clone()
	}

	/// Handle of the last background filter started from this context.
	pub fn filter(&self) -> Option<FilterHandle> {
		self.inner.state.lock().filter.clone()
	}

	pub fn messages(&self) -> Vec<ContextMessage> {
		self.inner.state.lock().messages.clone()
	}

	pub fn errors(&self) -> Vec<String> {
		self.texts(MessageLevel::Error)
	}

	pub fn warnings(&self) -> Vec<String> {
		self.texts(MessageLevel::Warning)
	}

	fn texts(&self, level: MessageLevel) -> Vec<String> {
		let state = self.inner.state.lock();
		state.messages.iter().filter(|m| m.level == level).map(|m| m.text.clone()).collect()
	}

	pub fn report_error(&self, text: impl Into<String>) {
		self.push(MessageLevel::Error, text.into());
	}

	pub fn report_warning(&self, text: impl Into<String>) {
		self.push(MessageLevel::Warning, text.into());
	}

	pub fn report_message(&self, text: impl Into<String>) {
		self.push(MessageLevel::Message, text.into());
	}

	fn push(&self, level: MessageLevel, text: String) {
		self.inner.state.lock().messages.push(ContextMessage { level, text });
	}

	/// True when nothing is in flight and a terminal status was reached.
	pub fn is_done(&self) -> bool {
		let state = self.inner.state.lock();
		state.outstanding == 0 && state.status.is_terminal()
	}

	/// Blocks until the in-flight work concludes, or `timeout` elapses.
	///
	/// Returns the status observed when the wait ended. Must not be called
	/// from the dispatch thread.
	pub fn wait_done(&self, timeout: Option<Duration>) -> ActionStatus {
		let deadline = timeout.map(|t| Instant::now() + t);
		let mut state = self.inner.state.lock();
		while !(state.outstanding == 0 && state.status.is_terminal()) {
			match deadline {
				Some(deadline) => {
					if self.inner.done.wait_until(&mut state, deadline).timed_out() {
						break;
					}
				}
				None => self.inner.done.wait(&mut state),
			}
		}
		state.status
	}

	/// Marks the context in flight, resetting status, result, notifier and
	/// messages.
	pub(crate) fn claim(&self) -> Result<(), ActionError> {
		let mut state = self.inner.state.lock();
		if state.outstanding > 0 {
			return Err(ActionError::ContextBusy);
		}
		state.outstanding = 1;
		state.status = ActionStatus::Pending;
		state.result = None;
		state.notifier = None;
		state.messages.clear();
		Ok(())
	}

	/// Keeps the context in flight for one more pending completion.
	pub(crate) fn retain(&self) {
		self.inner.state.lock().outstanding += 1;
	}

	pub(crate) fn set_waiting(&self, notifier: AvailabilityNotifier) {
		let mut state = self.inner.state.lock();
		state.messages.push(ContextMessage {
			level: MessageLevel::Message,
			text: format!("waiting on resource {}", notifier.layer()),
		});
		state.status = ActionStatus::Waiting;
		state.notifier = Some(notifier);
	}

	pub(crate) fn set_running(&self) {
		self.inner.state.lock().status = ActionStatus::Running;
	}

	pub(crate) fn set_notifier(&self, notifier: AvailabilityNotifier) {
		self.inner.state.lock().notifier = Some(notifier);
	}

	pub(crate) fn set_result(&self, result: Option<ActionResult>) {
		if result.is_some() {
			self.inner.state.lock().result = result;
		}
	}

	pub(crate) fn set_filter(&self, handle: FilterHandle) {
		self.inner.state.lock().filter = Some(handle);
	}

	/// Records an outcome. A failure is not overwritten by a later success
	/// while the same claim is in flight.
	pub(crate) fn conclude(&self, status: ActionStatus) {
		let mut state = self.inner.state.lock();
		if !(state.status.is_failure() && !status.is_failure()) {
			state.status = status;
		}
	}

	/// Drops one outstanding reference and wakes waiters once none remain.
	pub(crate) fn finish(&self) {
		let mut state = self.inner.state.lock();
		state.outstanding = state.outstanding.saturating_sub(1);
		if state.outstanding == 0 {
			self.inner.done.notify_all();
		}
	}
}
