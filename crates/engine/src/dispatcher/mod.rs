//! The serialized dispatch stream.
//!
//! # Architecture
//!
//! Every mutation of a session's document happens on one named dispatch
//! thread that owns the document, undo buffer, provenance ledger and history.
//! Callers on any thread submit work through a [`DispatcherHandle`]; work is
//! queued on a crossbeam channel and processed strictly in arrival order.
//!
//! Background filters complete by posting a message onto the same channel,
//! so their results are applied in the same total order as everything else.
//!
//! # Suspension
//!
//! When an action's validate step finds a layer busy, the whole work item
//! (the rest of a batch, an undo, a replay) is parked. Later work items stay
//! queued behind it, while filter completions and wake-ups keep being
//! processed. The parked item resumes as soon as its layer becomes available,
//! before any later-posted work.
//!
//! # Invariants
//!
//! * At most one work item is parked at a time, and nothing posted after it
//!   runs before it.
//! * Locks taken during validate are released on every exit path: after run,
//!   after a failed run, after a busy validate, or after a filter completion
//!   was applied.
//! * A context is claimed when work is posted and finished exactly once per
//!   claim plus once per filter started under it.

mod exec;
mod run_loop;
mod undo;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::ThreadId;

use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use lamina_invocation::{Invocation, parse_invocation};
use lamina_worker::{JobRecord, WorkerRegistry};
use parking_lot::Mutex;
use tokio::sync::broadcast;

pub(crate) use run_loop::{Dispatcher, DispatcherParts};

use crate::action::{Action, ActionContext, ActionRegistry, ActionSource, ActionStatus};
use crate::document::{Document, LayerData};
use crate::error::{ActionError, KernelError};
use crate::events::SessionEvent;
use crate::history::ActionHistory;
use crate::lock::ResourceLocks;
use crate::provenance::{ProvenanceLedger, ReplayStep};
use crate::undo::UndoBuffer;

/// Read access to session state, handed to [`DispatcherHandle::inspect`].
#[derive(Debug)]
pub struct SessionView<'a> {
	pub document: &'a Document,
	pub undo: &'a UndoBuffer,
	pub provenance: &'a ProvenanceLedger,
	pub history: &'a ActionHistory,
}

type InspectFn = Box<dyn FnOnce(&SessionView<'_>) + Send>;

/// Settings applied in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
	UndoByteLimit(usize),
	UndoMaxItems(usize),
	UndoEnabled(bool),
	ResetUndo,
	HistoryCapacity(usize),
	ClearHistory,
}

/// Actions posted together and run back to back.
pub(crate) struct Batch {
	pub actions: VecDeque<Box<dyn Action>>,
	pub context: ActionContext,
	pub source: ActionSource,
}

/// A provenance replay in progress.
pub(crate) struct ReplayRun {
	pub steps: VecDeque<ReplayStep>,
	pub context: ActionContext,
	/// Recorded layer id to the id produced by this replay.
	pub ids: HashMap<u64, u64>,
}

pub(crate) enum Work {
	Actions(Batch),
	Undo(ActionContext),
	Redo(ActionContext),
	Replay(ReplayRun),
	Control(Control),
	Inspect(InspectFn),
}

impl Work {
	pub fn context(&self) -> Option<&ActionContext> {
		match self {
			Self::Actions(batch) => Some(&batch.context),
			Self::Undo(context) | Self::Redo(context) => Some(context),
			Self::Replay(replay) => Some(&replay.context),
			Self::Control(_) | Self::Inspect(_) => None,
		}
	}
}

pub(crate) enum Msg {
	Work(Work),
	FilterDone { job: u64, outcome: Result<LayerData, KernelError> },
	/// A lock was released somewhere; re-check the parked item.
	Wake,
	Shutdown,
}

/// Counters readable from any thread.
#[derive(Debug, Default)]
pub(crate) struct DispatchStatus {
	/// Queued or parked work items plus running filters.
	busy: AtomicUsize,
	last_completed: Mutex<Option<DateTime<Utc>>>,
}

impl DispatchStatus {
	pub fn enter(&self) {
		self.busy.fetch_add(1, Ordering::AcqRel);
	}

	pub fn leave(&self) {
		let _ = self.busy.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)));
	}

	pub fn is_busy(&self) -> bool {
		self.busy.load(Ordering::Acquire) > 0
	}

	pub fn touch(&self) {
		*self.last_completed.lock() = Some(Utc::now());
	}

	pub fn last_completed(&self) -> Option<DateTime<Utc>> {
		*self.last_completed.lock()
	}
}

/// Shared between the session, its handles, the dispatch thread and filter
/// completion sinks. Only the session holds it strongly.
pub(crate) struct DispatchLink {
	pub tx: Sender<Msg>,
	pub status: Arc<DispatchStatus>,
	pub events: broadcast::Sender<SessionEvent>,
	pub workers: WorkerRegistry,
	pub registry: Arc<ActionRegistry>,
	pub locks: ResourceLocks,
	pub thread: OnceLock<ThreadId>,
}

impl DispatchLink {
	fn on_dispatch_thread(&self) -> bool {
		self.thread.get() == Some(&std::thread::current().id())
	}

	fn send(&self, work: Work) -> Result<(), ActionError> {
		self.status.enter();
		if let Err(crossbeam_channel::SendError(Msg::Work(work))) = self.tx.send(Msg::Work(work)) {
			self.status.leave();
			if let Some(context) = work.context() {
				context.report_error(ActionError::SessionClosed.to_string());
				context.conclude(ActionStatus::Error);
				context.finish();
			}
			return Err(ActionError::SessionClosed);
		}
		Ok(())
	}
}

/// Cloneable submission handle for one session.
///
/// Handles do not keep the session alive; once it is closed every call
/// returns [`ActionError::SessionClosed`].
#[derive(Clone)]
pub struct DispatcherHandle {
	link: Weak<DispatchLink>,
}

impl std::fmt::Debug for DispatcherHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DispatcherHandle").field("open", &(self.link.strong_count() > 0)).finish()
	}
}

impl DispatcherHandle {
	pub(crate) fn new(link: Weak<DispatchLink>) -> Self {
		Self { link }
	}

	fn link(&self) -> Result<Arc<DispatchLink>, ActionError> {
		self.link.upgrade().ok_or(ActionError::SessionClosed)
	}

	/// Queues one action. Returns once it is queued, not once it ran.
	pub fn post(&self, action: Box<dyn Action>, context: &ActionContext) -> Result<(), ActionError> {
		self.post_actions(vec![action], context)
	}

	/// Queues actions that run back to back; the batch stops at the first
	/// action that fails.
	pub fn post_actions(&self, actions: Vec<Box<dyn Action>>, context: &ActionContext) -> Result<(), ActionError> {
		if actions.is_empty() {
			return Err(ActionError::invalid("nothing to post"));
		}
		let link = self.link()?;
		context.claim()?;
		tracing::debug!(
			first = actions[0].type_tag(),
			count = actions.len(),
			source = context.source().as_str(),
			"dispatch.post"
		);
		link.send(Work::Actions(Batch {
			actions: actions.into(),
			context: context.clone(),
			source: context.source(),
		}))
	}

	/// Builds an action through the session registry and queues it.
	pub fn post_invocation(&self, invocation: &Invocation, context: &ActionContext) -> Result<(), ActionError> {
		let action = self.link()?.registry.build(invocation)?;
		self.post(action, context)
	}

	/// Parses a textual command and queues the action it names.
	pub fn post_command(&self, text: &str, context: &ActionContext) -> Result<(), ActionError> {
		self.post_invocation(&parse_invocation(text)?, context)
	}

	/// Queues an action and blocks until it, and any filter it started, is done.
	pub fn post_and_wait(&self, action: Box<dyn Action>, context: &ActionContext) -> Result<ActionStatus, ActionError> {
		self.post_actions_and_wait(vec![action], context)
	}

	/// Blocking form of [`Self::post_actions`].
	pub fn post_actions_and_wait(&self, actions: Vec<Box<dyn Action>>, context: &ActionContext) -> Result<ActionStatus, ActionError> {
		self.refuse_dispatch_thread()?;
		self.post_actions(actions, context)?;
		Ok(context.wait_done(None))
	}

	/// Queues an undo of the most recent undo item.
	pub fn post_undo(&self, context: &ActionContext) -> Result<(), ActionError> {
		let link = self.link()?;
		context.claim()?;
		link.send(Work::Undo(context.clone()))
	}

	/// Queues a redo of the most recently undone item.
	pub fn post_redo(&self, context: &ActionContext) -> Result<(), ActionError> {
		let link = self.link()?;
		context.claim()?;
		link.send(Work::Redo(context.clone()))
	}

	/// Undoes the most recent item and waits; true on success.
	pub fn undo(&self, context: &ActionContext) -> Result<bool, ActionError> {
		self.refuse_dispatch_thread()?;
		self.post_undo(context)?;
		Ok(context.wait_done(None) == ActionStatus::Success)
	}

	/// Redoes the most recently undone item and waits; true on success.
	pub fn redo(&self, context: &ActionContext) -> Result<bool, ActionError> {
		self.refuse_dispatch_thread()?;
		self.post_redo(context)?;
		Ok(context.wait_done(None) == ActionStatus::Success)
	}

	/// Queues a replay of recorded steps against this session's document.
	///
	/// Layer ids in each command are remapped to the layers produced by
	/// earlier replayed steps. Replayed actions are not re-recorded in this
	/// session's provenance ledger.
	pub fn replay(&self, steps: Vec<ReplayStep>, context: &ActionContext) -> Result<(), ActionError> {
		let link = self.link()?;
		context.claim()?;
		tracing::debug!(steps = steps.len(), "dispatch.replay");
		link.send(Work::Replay(ReplayRun {
			steps: steps.into(),
			context: context.clone(),
			ids: HashMap::new(),
		}))
	}

	/// Runs `f` on the dispatch thread after everything posted before it.
	pub fn inspect<R: Send + 'static>(&self, f: impl FnOnce(&SessionView<'_>) -> R + Send + 'static) -> Result<R, ActionError> {
		self.refuse_dispatch_thread()?;
		let link = self.link()?;
		let (tx, rx) = crossbeam_channel::bounded(1);
		link.send(Work::Inspect(Box::new(move |view: &SessionView<'_>| {
			let _ = tx.send(f(view));
		})))?;
		drop(link);
		rx.recv().map_err(|_| ActionError::SessionClosed)
	}

	/// Observer feed of dispatch events.
	pub fn subscribe(&self) -> Result<broadcast::Receiver<SessionEvent>, ActionError> {
		Ok(self.link()?.events.subscribe())
	}

	/// True while work is queued, parked, running, or a filter is in flight.
	pub fn is_busy(&self) -> bool {
		self.link.upgrade().is_some_and(|link| link.status.is_busy())
	}

	pub fn last_action_completed(&self) -> Option<DateTime<Utc>> {
		self.link.upgrade().and_then(|link| link.status.last_completed())
	}

	/// Snapshots of filters currently running for this session.
	pub fn running_filters(&self) -> Vec<JobRecord> {
		self.link.upgrade().map(|link| link.workers.snapshots()).unwrap_or_default()
	}

	pub fn registry(&self) -> Result<Arc<ActionRegistry>, ActionError> {
		Ok(Arc::clone(&self.link()?.registry))
	}

	/// The session's lock table, for holders outside the dispatcher.
	pub fn locks(&self) -> Result<ResourceLocks, ActionError> {
		Ok(self.link()?.locks.clone())
	}

	pub fn set_undo_byte_limit(&self, bytes: usize) -> Result<(), ActionError> {
		self.control(Control::UndoByteLimit(bytes))
	}

	pub fn set_undo_max_items(&self, items: usize) -> Result<(), ActionError> {
		self.control(Control::UndoMaxItems(items))
	}

	pub fn set_undo_enabled(&self, enabled: bool) -> Result<(), ActionError> {
		self.control(Control::UndoEnabled(enabled))
	}

	pub fn reset_undo(&self) -> Result<(), ActionError> {
		self.control(Control::ResetUndo)
	}

	pub fn set_history_capacity(&self, capacity: usize) -> Result<(), ActionError> {
		self.control(Control::HistoryCapacity(capacity))
	}

	pub fn clear_history(&self) -> Result<(), ActionError> {
		self.control(Control::ClearHistory)
	}

	fn control(&self, control: Control) -> Result<(), ActionError> {
		self.link()?.send(Work::Control(control))
	}

	fn refuse_dispatch_thread(&self) -> Result<(), ActionError> {
		if self.link()?.on_dispatch_thread() {
			tracing::warn!("dispatch.deadlock_refused");
			return Err(ActionError::Deadlock);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests;
