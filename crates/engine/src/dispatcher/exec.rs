use std::panic::{AssertUnwindSafe, catch_unwind};

use chrono::Utc;
use lamina_worker::panic_message;

use super::run_loop::{Dispatcher, WaitOn};
use super::{Batch, Msg, Work};
use crate::action::{Action, ActionContext, ActionResult, ActionSource, ActionStatus, FilterLaunch, RunCx, ValidateCx};
use crate::actions::{DeleteLayer, RestoreLayerData};
use crate::document::{Layer, LayerCheckpoint, LayerData, LayerId};
use crate::error::{ActionError, KernelError};
use crate::events::SessionEvent;
use crate::filter::{self, FilterHandle, FilterOutput};
use crate::history::HistoryEntry;
use crate::lock::{AvailabilityNotifier, LockHandle};
use crate::provenance::{ProvenanceIo, StepId};
use crate::undo::{EvictionReport, UndoBufferItem};

/// Whether an action runs as a step of an undo item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Phase {
	Normal,
	/// Undo steps are neither pushed to the undo buffer nor recorded in
	/// provenance.
	Undo,
}

pub(super) enum Exec {
	Completed { outputs: Vec<LayerId> },
	Failed { status: ActionStatus, error: ActionError },
	/// A filter was started; the action completes with it.
	Pending { job: u64, outputs: Vec<LayerId> },
	/// Validate found a layer busy. The action is handed back untouched.
	Busy { action: Box<dyn Action>, notifier: AvailabilityNotifier },
}

/// An action whose filter is still running.
pub(super) struct PendingFilter {
	pub action: Box<dyn Action>,
	pub context: ActionContext,
	pub source: ActionSource,
	pub command: String,
	pub output: FilterOutput,
	pub undo: Vec<Box<dyn Action>>,
	pub io: ProvenanceIo,
	pub result: Option<ActionResult>,
	pub handle: FilterHandle,
	/// Released once the completion was applied.
	pub held: Vec<LockHandle>,
	/// Replay step that started the filter; prefixes its failure.
	pub step: Option<StepId>,
}

/// What a successful action hands to [`Dispatcher::finalize`].
struct Finished {
	action: Box<dyn Action>,
	source: ActionSource,
	command: String,
	result: Option<ActionResult>,
	undo: Vec<Box<dyn Action>>,
	io: ProvenanceIo,
}

fn guarded<T>(f: impl FnOnce() -> Result<T, ActionError>) -> Result<T, ActionError> {
	catch_unwind(AssertUnwindSafe(f))
		.unwrap_or_else(|payload| Err(ActionError::execution(format!("action panicked: {}", panic_message(payload.as_ref())))))
}

impl Dispatcher {
	/// Runs a batch until it finishes, fails, or parks on a busy layer.
	pub(super) fn run_batch(&mut self, mut batch: Batch) {
		while let Some(action) = batch.actions.pop_front() {
			match self.execute(action, &batch.context, batch.source, Phase::Normal) {
				Exec::Completed { .. } => batch.context.conclude(ActionStatus::Success),
				Exec::Pending { .. } => {}
				Exec::Failed { status, error } => {
					batch.context.report_error(error.to_string());
					if !batch.actions.is_empty() {
						tracing::debug!(skipped = batch.actions.len(), "dispatch.batch_aborted");
					}
					self.close_work(&batch.context, status);
					return;
				}
				Exec::Busy { action, notifier } => {
					let action_type = action.type_tag();
					batch.actions.push_front(action);
					if self.on_busy(&batch.context, action_type, &notifier) {
						self.park(Work::Actions(batch), WaitOn::Resource(notifier));
					} else {
						batch.context.finish();
						self.status.leave();
					}
					return;
				}
			}
		}
		batch.context.finish();
		self.status.leave();
	}

	/// Validates and runs one action, recording it on success.
	///
	/// Errors are returned, not reported; callers decide how they reach the
	/// context.
	pub(super) fn execute(&mut self, mut action: Box<dyn Action>, context: &ActionContext, source: ActionSource, phase: Phase) -> Exec {
		let action_type = action.type_tag();
		let (validated, held) = {
			let mut cx = ValidateCx::new(&self.doc, &self.locks, context, source);
			let validated = guarded(|| action.validate(&mut cx));
			(validated, std::mem::take(&mut cx.held))
		};
		match validated {
			Ok(()) => {}
			Err(ActionError::ResourceBusy { notifier, .. }) if phase == Phase::Normal => {
				drop(held);
				action.clear_cache();
				return Exec::Busy { action, notifier };
			}
			Err(error) => {
				tracing::debug!(action = action_type, %error, "dispatch.invalid");
				action.clear_cache();
				let status = if error.kind() == crate::error::ErrorKind::ResourceBusy {
					ActionStatus::Unavailable
				} else {
					ActionStatus::Invalid
				};
				return Exec::Failed { status, error };
			}
		}

		let command = action.export_to_string();
		let _ = self.events.send(SessionEvent::PreAction {
			action_type,
			command: command.clone(),
			source,
		});
		context.set_running();
		tracing::trace!(action = action_type, source = source.as_str(), "dispatch.run");

		let (ran, undo, io, launch) = {
			let mut cx = RunCx::new(&mut self.doc, context, source, &self.kernels);
			let ran = guarded(|| action.run(&mut cx));
			(ran, std::mem::take(&mut cx.undo), std::mem::take(&mut cx.io), cx.filter.take())
		};
		let result = match ran {
			Ok(result) => result,
			Err(error) => {
				tracing::warn!(action = action_type, %error, "dispatch.run_failed");
				self.post_action_event(action_type, &command, source, ActionStatus::Error, None);
				action.clear_cache();
				return Exec::Failed {
					status: ActionStatus::Error,
					error,
				};
			}
		};

		if let Some(launch) = launch {
			if phase == Phase::Undo {
				let error = ActionError::execution("undo steps cannot start background filters");
				self.post_action_event(action_type, &command, source, ActionStatus::Error, None);
				return Exec::Failed {
					status: ActionStatus::Error,
					error,
				};
			}
			return self.launch_filter(
				Finished {
					action,
					source,
					command,
					result,
					undo,
					io,
				},
				launch,
				context,
				held,
			);
		}

		let outputs = io.outputs.clone();
		if phase == Phase::Normal {
			context.set_result(result.clone());
		}
		self.finalize(
			Finished {
				action,
				source,
				command,
				result,
				undo,
				io,
			},
			context,
			phase,
		);
		drop(held);
		Exec::Completed { outputs }
	}

	/// Records a successful action in provenance, undo and history, and
	/// publishes the resulting events.
	fn finalize(&mut self, finished: Finished, context: &ActionContext, phase: Phase) {
		let Finished {
			mut action,
			source,
			command,
			result,
			undo,
			io,
		} = finished;
		let action_type = action.type_tag();
		let mutates = action.spec().mutates_document;

		let mut steps = Vec::new();
		if phase == Phase::Normal && source != ActionSource::Replay && action.changes_project_data() {
			steps.push(self.ledger.record_step(action_type, action.to_invocation(false), io.clone()));
		}

		let mut undo_changed = false;
		if phase == Phase::Normal && action.spec().undoable && !undo.is_empty() && self.undo.is_enabled() {
			let mut entities: Vec<LayerId> = action.to_invocation(true).entities().into_iter().map(LayerId).collect();
			entities.extend(io.inputs.iter().chain(&io.outputs).chain(&io.deleted).copied());
			let item = UndoBufferItem::new(command.clone(), undo)
				.with_redo(action.boxed_clone())
				.with_provenance(steps)
				.with_entities(entities);
			let report = self.undo.push(item, source);
			self.apply_evictions(report, Some(context));
			undo_changed = true;
		}

		action.clear_cache();
		self.seq += 1;
		self.history.record(HistoryEntry {
			seq: self.seq,
			action,
			result: result.clone(),
			status: ActionStatus::Success,
			source,
			completed_at: Utc::now(),
		});
		self.status.touch();

		self.post_action_event(action_type, &command, source, ActionStatus::Success, result);
		if mutates {
			let _ = self.events.send(SessionEvent::DocumentChanged {
				version: self.doc.version(),
			});
		}
		if undo_changed {
			self.publish_undo_stack();
		}
		let _ = self.events.send(SessionEvent::HistoryChanged { len: self.history.len() });
	}

	fn launch_filter(&mut self, finished: Finished, launch: FilterLaunch, context: &ActionContext, held: Vec<LockHandle>) -> Exec {
		let action_type = finished.action.type_tag();
		let job = self.jobs.next();
		let link = self.link.clone();
		let started = filter::start(launch.filter, job, self.events.clone(), self.workers.clone(), move |job, outcome| {
			// A filter outliving its session drops its result here.
			if let Some(link) = link.upgrade() {
				let _ = link.tx.send(Msg::FilterDone { job, outcome });
			}
		});
		let handle = match started {
			Ok(handle) => handle,
			Err(error) => {
				self.post_action_event(action_type, &finished.command, finished.source, ActionStatus::Error, None);
				return Exec::Failed {
					status: ActionStatus::Error,
					error,
				};
			}
		};
		tracing::debug!(action = action_type, job, output = %launch.output.layer(), "dispatch.filter_started");

		context.set_filter(handle.clone());
		context.retain();
		self.status.enter();
		let outputs = finished.io.outputs.clone();
		self.pending.insert(
			job,
			PendingFilter {
				action: finished.action,
				context: context.clone(),
				source: finished.source,
				command: finished.command,
				output: launch.output,
				undo: finished.undo,
				io: finished.io,
				result: finished.result,
				handle,
				held,
				step: None,
			},
		);
		Exec::Pending { job, outputs }
	}

	/// Applies a filter's outcome in dispatch order.
	pub(super) fn complete_filter(&mut self, job: u64, outcome: Result<LayerData, KernelError>) {
		let Some(pending) = self.pending.remove(&job) else {
			tracing::debug!(job, "dispatch.filter_unknown");
			return;
		};
		let PendingFilter {
			action,
			context,
			source,
			command,
			output,
			mut undo,
			io,
			result,
			held,
			step,
			..
		} = pending;
		let action_type = action.type_tag();

		let applied = outcome.map_err(ActionError::from).and_then(|data| self.apply_output(&output, data));
		match applied {
			Ok(restore) => {
				tracing::debug!(job, action = action_type, "filter.complete");
				undo.push(restore);
				context.set_result(result.clone());
				self.finalize(
					Finished {
						action,
						source,
						command,
						result,
						undo,
						io,
					},
					&context,
					Phase::Normal,
				);
				context.conclude(ActionStatus::Success);
			}
			Err(error) => {
				if matches!(error, ActionError::Kernel(KernelError::Interrupted)) {
					tracing::info!(job, action = action_type, "filter.interrupted");
				} else {
					tracing::warn!(job, action = action_type, %error, "filter.failed");
				}
				match step {
					Some(step) => context.report_error(format!("{step}: {error}")),
					None => context.report_error(error.to_string()),
				}
				self.post_action_event(action_type, &command, source, ActionStatus::Error, None);
				context.conclude(ActionStatus::Error);
			}
		}
		drop(held);
		context.finish();
		self.status.leave();
	}

	/// Swaps filter output into the document and returns its undo step.
	fn apply_output(&mut self, output: &FilterOutput, data: LayerData) -> Result<Box<dyn Action>, ActionError> {
		match output {
			FilterOutput::Replace(id) => {
				let old = self.doc.replace_data(*id, data)?;
				Ok(Box::new(RestoreLayerData::new(LayerCheckpoint::new(*id, old))))
			}
			FilterOutput::NewLayer { id, name } => {
				self.doc.insert(Layer::new(*id, name.clone(), data), None)?;
				Ok(Box::new(DeleteLayer::new(*id)))
			}
		}
	}

	/// Reports evicted undo items and drops provenance they invalidated.
	pub(super) fn apply_evictions(&mut self, report: EvictionReport, context: Option<&ActionContext>) {
		if report.is_empty() {
			return;
		}
		for step in report.invalidated_steps() {
			self.ledger.delete_step(step);
		}
		for evicted in &report.evicted {
			if let Some(context) = context {
				context.report_warning(format!("undo step '{}' dropped to stay within the undo budget", evicted.tag));
			}
			let _ = self.events.send(SessionEvent::UndoEvicted {
				tag: evicted.tag.clone(),
				byte_size: evicted.byte_size,
			});
		}
	}

	pub(super) fn post_action_event(
		&self,
		action_type: &'static str,
		command: &str,
		source: ActionSource,
		status: ActionStatus,
		result: Option<ActionResult>,
	) {
		let _ = self.events.send(SessionEvent::PostAction {
			action_type,
			command: command.to_string(),
			source,
			status,
			result,
		});
	}

	pub(super) fn publish_undo_stack(&self) {
		let _ = self.events.send(SessionEvent::UndoStackChanged {
			undo: self.undo.undo_len(),
			redo: self.undo.redo_len(),
			top_undo: self.undo.peek_undo().map(|item| item.tag().to_string()),
			top_redo: self.undo.peek_redo().map(|item| item.tag().to_string()),
		});
	}
}
