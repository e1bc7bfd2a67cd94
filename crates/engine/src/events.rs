//! Observer feed published by the dispatcher.

use crate::action::{ActionResult, ActionSource, ActionStatus};
use crate::document::LayerId;

/// Events broadcast to [`crate::DispatcherHandle::subscribe`] receivers.
///
/// Slow receivers may lag and miss events; the feed is for presentation,
/// never for correctness.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
	/// Validation passed and `run` is about to start.
	PreAction { action_type: &'static str, command: String, source: ActionSource },
	/// An action concluded after running, successfully or not.
	PostAction {
		action_type: &'static str,
		command: String,
		source: ActionSource,
		status: ActionStatus,
		result: Option<ActionResult>,
	},
	/// An action is suspended until `layer` frees up.
	ResourceWaiting { action_type: &'static str, layer: LayerId },
	DocumentChanged { version: u64 },
	UndoStackChanged { undo: usize, redo: usize, top_undo: Option<String>, top_redo: Option<String> },
	/// An undo item fell out of the byte or count budget.
	UndoEvicted { tag: String, byte_size: usize },
	/// A stored undo sequence failed partway.
	UndoReplayFailed { tag: String, applied: usize, total: usize, reason: String },
	HistoryChanged { len: usize },
	FilterProgress { job: u64, fraction: f32, interruptable: bool },
}
