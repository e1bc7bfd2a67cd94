use std::collections::VecDeque;

use super::exec::{Exec, Phase};
use super::run_loop::{Dispatcher, WaitOn};
use super::{Batch, Control, ReplayRun, Work};
use crate::action::{ActionContext, ActionSource, ActionStatus};
use crate::document::LayerId;
use crate::error::ActionError;
use crate::events::SessionEvent;
use crate::lock::{AvailabilityNotifier, LockMode};

impl Dispatcher {
	/// First of `entities` that cannot be taken exclusively right now.
	fn busy_entity(&self, entities: &[LayerId]) -> Option<AvailabilityNotifier> {
		entities
			.iter()
			.find(|id| !self.locks.is_available(**id, LockMode::Exclusive))
			.map(|id| self.locks.notifier_for(*id, LockMode::Exclusive))
	}

	/// Hands `work` back when none of `entities` is busy; otherwise parks it
	/// or concludes it as unavailable.
	fn hold_for_entities(&mut self, work: Work, entities: &[LayerId], label: &'static str) -> Option<Work> {
		let Some(notifier) = self.busy_entity(entities) else {
			return Some(work);
		};
		let Some(context) = work.context() else {
			return Some(work);
		};
		if self.on_busy(context, label, &notifier) {
			self.park(work, WaitOn::Resource(notifier));
		} else {
			context.finish();
			self.status.leave();
		}
		None
	}

	pub(super) fn run_undo(&mut self, context: ActionContext) {
		let Some(entities) = self.undo.peek_undo().map(|item| item.entities().to_vec()) else {
			context.report_error(ActionError::NothingToUndo.to_string());
			self.close_work(&context, ActionStatus::Invalid);
			return;
		};
		let Some(Work::Undo(context)) = self.hold_for_entities(Work::Undo(context), &entities, "undo") else {
			return;
		};
		let Some(mut item) = self.undo.pop_undo() else {
			context.report_error(ActionError::NothingToUndo.to_string());
			self.close_work(&context, ActionStatus::Invalid);
			return;
		};

		let tag = item.tag().to_string();
		let actions = match item.apply_and_clear_undo() {
			Ok(actions) => actions,
			Err(error) => {
				context.report_error(error.to_string());
				self.publish_undo_stack();
				self.close_work(&context, ActionStatus::Error);
				return;
			}
		};
		let total = actions.len();
		tracing::debug!(tag = %tag, steps = total, "undo.apply");

		for (applied, action) in actions.into_iter().enumerate() {
			let reason = match self.execute(action, &context, ActionSource::UndoBuffer, Phase::Undo) {
				Exec::Completed { .. } => continue,
				Exec::Failed { error, .. } => error.to_string(),
				Exec::Busy { notifier, .. } => format!("layer {} is busy", notifier.layer()),
				Exec::Pending { .. } => "undo step left a filter running".to_string(),
			};
			let error = ActionError::UndoReplay {
				tag: tag.clone(),
				applied,
				total,
				reason: reason.clone(),
			};
			tracing::error!(tag = %tag, applied, total, reason = %reason, "undo.replay_failed");
			context.report_error(error.to_string());
			let _ = self.events.send(SessionEvent::UndoReplayFailed {
				tag,
				applied,
				total,
				reason,
			});
			self.publish_undo_stack();
			self.close_work(&context, ActionStatus::Error);
			return;
		}

		for step in item.provenance_steps() {
			self.ledger.delete_step(*step);
		}
		self.undo.push_redo(item);
		self.publish_undo_stack();
		self.close_work(&context, ActionStatus::Success);
	}

	pub(super) fn run_redo(&mut self, context: ActionContext) {
		let Some(entities) = self.undo.peek_redo().map(|item| item.entities().to_vec()) else {
			context.report_error(ActionError::NothingToRedo.to_string());
			self.close_work(&context, ActionStatus::Invalid);
			return;
		};
		let Some(Work::Redo(context)) = self.hold_for_entities(Work::Redo(context), &entities, "redo") else {
			return;
		};
		let Some(action) = self.undo.pop_redo().and_then(|mut item| item.take_redo()) else {
			context.report_error(ActionError::NothingToRedo.to_string());
			self.publish_undo_stack();
			self.close_work(&context, ActionStatus::Invalid);
			return;
		};
		tracing::debug!(action = action.type_tag(), "undo.redo");
		self.publish_undo_stack();
		self.run_batch(Batch {
			actions: VecDeque::from([action]),
			context,
			source: ActionSource::UndoBuffer,
		});
	}

	/// Replays recorded steps one at a time, waiting for each step's filter
	/// before building the next.
	pub(super) fn run_replay(&mut self, mut replay: ReplayRun) {
		while let Some(step) = replay.steps.pop_front() {
			if replay.context.status().is_failure() {
				tracing::debug!(skipped = replay.steps.len() + 1, "replay.aborted");
				break;
			}
			let mut command = step.command.clone();
			command.map_entities(|id| replay.ids.get(&id).copied());
			let action = match self.registry.build(&command) {
				Ok(action) => action,
				Err(error) => {
					replay.context.report_error(format!("{}: {error}", step.step));
					self.close_work(&replay.context, ActionStatus::Invalid);
					return;
				}
			};
			tracing::trace!(step = %step.step, command = %command, "replay.step");

			let (outputs, job) = match self.execute(action, &replay.context, ActionSource::Replay, Phase::Normal) {
				Exec::Completed { outputs } => {
					replay.context.conclude(ActionStatus::Success);
					(outputs, None)
				}
				Exec::Pending { job, outputs } => {
					if let Some(pending) = self.pending.get_mut(&job) {
						pending.step = Some(step.step);
					}
					(outputs, Some(job))
				}
				Exec::Failed { status, error } => {
					replay.context.report_error(format!("{}: {error}", step.step));
					self.close_work(&replay.context, status);
					return;
				}
				Exec::Busy { action, notifier } => {
					let action_type = action.type_tag();
					let context = replay.context.clone();
					replay.steps.push_front(step);
					if self.on_busy(&context, action_type, &notifier) {
						self.park(Work::Replay(replay), WaitOn::Resource(notifier));
					} else {
						context.finish();
						self.status.leave();
					}
					return;
				}
			};
			for (recorded, produced) in step.outputs.iter().zip(outputs) {
				replay.ids.insert(recorded.0, produced.0);
			}
			if let Some(job) = job
				&& !replay.steps.is_empty()
			{
				self.park(Work::Replay(replay), WaitOn::Filter(job));
				return;
			}
		}
		// Conclusion of a trailing filter step is left to its completion.
		replay.context.finish();
		self.status.leave();
	}

	pub(super) fn apply_control(&mut self, control: Control) {
		tracing::debug!(?control, "dispatch.control");
		match control {
			Control::UndoByteLimit(bytes) => {
				let report = self.undo.set_byte_limit(bytes);
				self.apply_evictions(report, None);
				self.publish_undo_stack();
			}
			Control::UndoMaxItems(items) => {
				let report = self.undo.set_max_items(items);
				self.apply_evictions(report, None);
				self.publish_undo_stack();
			}
			Control::UndoEnabled(enabled) => {
				self.undo.set_enabled(enabled);
				self.publish_undo_stack();
			}
			Control::ResetUndo => {
				self.undo.reset();
				self.publish_undo_stack();
			}
			Control::HistoryCapacity(capacity) => {
				self.history.set_capacity(capacity);
				let _ = self.events.send(SessionEvent::HistoryChanged { len: self.history.len() });
			}
			Control::ClearHistory => {
				self.history.clear();
				let _ = self.events.send(SessionEvent::HistoryChanged { len: 0 });
			}
		}
	}
}
