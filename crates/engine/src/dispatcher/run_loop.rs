use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use lamina_worker::{SequenceClock, WorkerRegistry};
use tokio::sync::broadcast;

use super::exec::PendingFilter;
use super::{DispatchLink, DispatchStatus, Msg, SessionView, Work};
use crate::action::{ActionContext, ActionRegistry, ActionStatus, WaitPolicy};
use crate::document::Document;
use crate::error::ActionError;
use crate::events::SessionEvent;
use crate::filter::KernelTable;
use crate::history::ActionHistory;
use crate::lock::{AvailabilityNotifier, ResourceLocks};
use crate::provenance::ProvenanceLedger;
use crate::undo::UndoBuffer;

/// What a parked work item waits for.
pub(super) enum WaitOn {
	Resource(AvailabilityNotifier),
	/// A replay waits for the filter its previous step started.
	Filter(u64),
}

pub(super) struct Parked {
	pub work: Work,
	pub wait: WaitOn,
	pub since: Instant,
}

/// State owned by the dispatch thread.
pub(crate) struct Dispatcher {
	pub(super) doc: Document,
	pub(super) undo: UndoBuffer,
	pub(super) ledger: ProvenanceLedger,
	pub(super) history: ActionHistory,
	pub(super) locks: ResourceLocks,
	pub(super) kernels: KernelTable,
	pub(super) registry: Arc<ActionRegistry>,
	pub(super) events: broadcast::Sender<SessionEvent>,
	pub(super) workers: WorkerRegistry,
	pub(super) status: Arc<DispatchStatus>,
	pub(super) link: Weak<DispatchLink>,
	pub(super) jobs: SequenceClock,
	pub(super) seq: u64,
	pub(super) pending: HashMap<u64, PendingFilter>,
	pub(super) parked: Option<Parked>,
	pub(super) queued: VecDeque<Work>,
	wait_timeout: Option<Duration>,
	rx: Receiver<Msg>,
}

/// Everything the dispatch thread starts with.
pub(crate) struct DispatcherParts {
	pub doc: Document,
	pub undo: UndoBuffer,
	pub ledger: ProvenanceLedger,
	pub history: ActionHistory,
	pub kernels: KernelTable,
	pub wait_timeout: Option<Duration>,
	pub rx: Receiver<Msg>,
}

impl Dispatcher {
	pub(crate) fn new(parts: DispatcherParts, link: &Arc<DispatchLink>) -> Self {
		Self {
			doc: parts.doc,
			undo: parts.undo,
			ledger: parts.ledger,
			history: parts.history,
			locks: link.locks.clone(),
			kernels: parts.kernels,
			registry: Arc::clone(&link.registry),
			events: link.events.clone(),
			workers: link.workers.clone(),
			status: Arc::clone(&link.status),
			link: Arc::downgrade(link),
			jobs: SequenceClock::new(),
			seq: 0,
			pending: HashMap::new(),
			parked: None,
			queued: VecDeque::new(),
			wait_timeout: parts.wait_timeout,
			rx: parts.rx,
		}
	}

	/// Runs until shutdown or until every sender is gone.
	pub(crate) fn run(mut self) {
		tracing::debug!(layers = self.doc.len(), sandbox = ?self.doc.sandbox(), "dispatch.start");
		loop {
			let received = match self.parked_deadline() {
				Some(deadline) => self.rx.recv_deadline(deadline),
				None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
			};
			match received {
				Ok(Msg::Work(work)) => self.queued.push_back(work),
				Ok(Msg::FilterDone { job, outcome }) => self.complete_filter(job, outcome),
				Ok(Msg::Wake) => {}
				Ok(Msg::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
				Err(RecvTimeoutError::Timeout) => self.expire_parked(),
			}
			self.pump();
		}
		self.shutdown();
	}

	/// Resumes the parked item if it can proceed, then drains queued work
	/// until something parks again.
	fn pump(&mut self) {
		if let Some(parked) = self.parked.take() {
			if !self.is_ready(&parked.wait) {
				self.parked = Some(parked);
				return;
			}
			tracing::debug!("dispatch.resume");
			if let Some(context) = parked.work.context() {
				context.set_running();
			}
			self.process(parked.work);
		}
		while self.parked.is_none()
			&& let Some(work) = self.queued.pop_front()
		{
			self.process(work);
		}
	}

	fn is_ready(&self, wait: &WaitOn) -> bool {
		match wait {
			WaitOn::Resource(notifier) => notifier.is_available(),
			WaitOn::Filter(job) => !self.pending.contains_key(job),
		}
	}

	fn process(&mut self, work: Work) {
		match work {
			Work::Actions(batch) => self.run_batch(batch),
			Work::Undo(context) => self.run_undo(context),
			Work::Redo(context) => self.run_redo(context),
			Work::Replay(replay) => self.run_replay(replay),
			Work::Control(control) => {
				self.apply_control(control);
				self.status.leave();
			}
			Work::Inspect(f) => {
				f(&SessionView {
					document: &self.doc,
					undo: &self.undo,
					provenance: &self.ledger,
					history: &self.history,
				});
				self.status.leave();
			}
		}
	}

	/// Handles a busy layer for `context`.
	///
	/// Returns true when the caller should park its work; otherwise the
	/// context was concluded as unavailable.
	pub(super) fn on_busy(&self, context: &ActionContext, action_type: &'static str, notifier: &AvailabilityNotifier) -> bool {
		match context.policy() {
			WaitPolicy::FailFast => {
				tracing::debug!(action = action_type, layer = %notifier.layer(), "dispatch.unavailable");
				context.set_notifier(notifier.clone());
				context.report_error(format!("layer {} is busy", notifier.layer()));
				context.conclude(ActionStatus::Unavailable);
				false
			}
			WaitPolicy::Suspend => {
				tracing::debug!(action = action_type, layer = %notifier.layer(), "dispatch.suspend");
				context.set_waiting(notifier.clone());
				let _ = self.events.send(SessionEvent::ResourceWaiting {
					action_type,
					layer: notifier.layer(),
				});
				true
			}
		}
	}

	pub(super) fn park(&mut self, work: Work, wait: WaitOn) {
		self.parked = Some(Parked {
			work,
			wait,
			since: Instant::now(),
		});
	}

	/// Concludes a work item's context and drops its busy count.
	pub(super) fn close_work(&self, context: &ActionContext, status: ActionStatus) {
		context.conclude(status);
		context.finish();
		self.status.leave();
	}

	fn parked_deadline(&self) -> Option<Instant> {
		let timeout = self.wait_timeout?;
		match self.parked.as_ref()? {
			Parked {
				wait: WaitOn::Resource(_),
				since,
				..
			} => Some(*since + timeout),
			_ => None,
		}
	}

	fn expire_parked(&mut self) {
		let Some(parked) = self.parked.take() else {
			return;
		};
		let WaitOn::Resource(notifier) = &parked.wait else {
			self.parked = Some(parked);
			return;
		};
		if notifier.is_available() {
			self.parked = Some(parked);
			return;
		}
		tracing::info!(layer = %notifier.layer(), "dispatch.wait_timeout");
		if let Some(context) = parked.work.context() {
			context.report_error(format!("layer {} stayed busy", notifier.layer()));
			self.close_work(context, ActionStatus::Unavailable);
		} else {
			self.status.leave();
		}
	}

	fn shutdown(mut self) {
		let pending = std::mem::take(&mut self.pending);
		tracing::debug!(filters = pending.len(), queued = self.queued.len(), "dispatch.shutdown");
		for (_, filter) in pending {
			filter.handle.abort_and_wait();
			filter.context.report_error(ActionError::SessionClosed.to_string());
			filter.context.conclude(ActionStatus::Error);
			filter.context.finish();
			self.status.leave();
		}
		let parked = self.parked.take().map(|parked| parked.work);
		let mut leftover: Vec<Work> = parked.into_iter().chain(self.queued.drain(..)).collect();
		leftover.extend(self.rx.try_iter().filter_map(|msg| match msg {
			Msg::Work(work) => Some(work),
			_ => None,
		}));
		for work in leftover {
			match work.context() {
				Some(context) => {
					context.report_error(ActionError::SessionClosed.to_string());
					self.close_work(context, ActionStatus::Error);
				}
				None => self.status.leave(),
			}
		}
	}
}
