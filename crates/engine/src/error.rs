use lamina_invocation::ParseError;
use thiserror::Error;

use crate::document::{DocumentError, LayerId};
use crate::lock::AvailabilityNotifier;

/// Coarse error categories surfaced to callers and observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// Bad or missing parameter, unresolved reference. No side effects.
	Validation,
	/// Target locked; recoverable by waiting.
	ResourceBusy,
	/// `run` failed after validation succeeded.
	Execution,
	/// A stored undo sequence failed partway.
	UndoReplay,
	/// The session refused or could not accept the request.
	Dispatch,
}

/// Errors produced by actions and the dispatcher.
#[derive(Debug, Clone, Error)]
pub enum ActionError {
	#[error("{0}")]
	Invalid(String),
	#[error("unknown layer '{0}'")]
	UnknownLayer(String),
	#[error("missing argument '{0}'")]
	MissingArgument(&'static str),
	#[error("parameter '{name}' expects {expected}, got {found}")]
	ParamType {
		name: &'static str,
		expected: &'static str,
		found: &'static str,
	},
	#[error("unknown action '{0}'")]
	UnknownAction(String),
	#[error(transparent)]
	Parse(#[from] ParseError),
	#[error("layer {layer} is busy")]
	ResourceBusy { layer: LayerId, notifier: AvailabilityNotifier },
	#[error("{0}")]
	Execution(String),
	#[error(transparent)]
	Kernel(#[from] KernelError),
	#[error(transparent)]
	Document(#[from] DocumentError),
	#[error("undo of '{tag}' failed after {applied} of {total} steps: {reason}")]
	UndoReplay {
		tag: String,
		applied: usize,
		total: usize,
		reason: String,
	},
	#[error("undo list is empty")]
	NothingToUndo,
	#[error("redo list is empty")]
	NothingToRedo,
	#[error("undo state was already applied")]
	UndoConsumed,
	#[error("action context is already in use by another action")]
	ContextBusy,
	#[error("blocking wait requested from the dispatch thread")]
	Deadlock,
	#[error("session is closed")]
	SessionClosed,
}

impl ActionError {
	pub fn invalid(msg: impl Into<String>) -> Self {
		Self::Invalid(msg.into())
	}

	pub fn execution(msg: impl Into<String>) -> Self {
		Self::Execution(msg.into())
	}

	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Invalid(_)
			| Self::UnknownLayer(_)
			| Self::MissingArgument(_)
			| Self::ParamType { .. }
			| Self::UnknownAction(_)
			| Self::Parse(_)
			| Self::NothingToUndo
			| Self::NothingToRedo => ErrorKind::Validation,
			Self::ResourceBusy { .. } => ErrorKind::ResourceBusy,
			Self::Execution(_) | Self::Kernel(_) | Self::Document(_) => ErrorKind::Execution,
			Self::UndoReplay { .. } | Self::UndoConsumed => ErrorKind::UndoReplay,
			Self::ContextBusy | Self::Deadlock | Self::SessionClosed => ErrorKind::Dispatch,
		}
	}
}

/// Failures reported by numeric kernels and the filters driving them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
	#[error("interrupted")]
	Interrupted,
	#[error("unknown kernel '{0}'")]
	UnknownKernel(String),
	#[error("invalid kernel parameter: {0}")]
	BadParam(String),
	#[error("kernel panicked: {0}")]
	Panicked(String),
	#[error("{0}")]
	Failed(String),
}
