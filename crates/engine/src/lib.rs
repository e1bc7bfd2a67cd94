#![cfg_attr(test, allow(unused_crate_dependencies))]

//! Lamina engine: serialized action dispatch over a layer document, with
//! undo/redo, provenance recording and replay, and background filters.
//!
//! A [`Session`] owns one [`Document`] and a dispatch thread. Callers build
//! [`Action`]s (directly, or from text through the [`ActionRegistry`]) and
//! submit them through a [`DispatcherHandle`] with an [`ActionContext`] that
//! collects messages, the result and the final [`ActionStatus`].

pub mod action;
pub mod actions;
pub mod config;
mod dispatcher;
pub mod document;
pub mod error;
pub mod events;
pub mod filter;
pub mod history;
pub mod lock;
pub mod provenance;
mod session;
pub mod undo;

pub use action::{
	Action, ActionContext, ActionRegistry, ActionResult, ActionSource, ActionSpec, ActionStatus, ArgReader, Param, ParamRole,
	RunCx, ValidateCx, WaitPolicy,
};
pub use config::{ConfigError, SessionConfig};
pub use dispatcher::{DispatcherHandle, SessionView};
pub use document::{Document, Layer, LayerData, LayerId, LayerRef};
pub use error::{ActionError, ErrorKind, KernelError};
pub use events::SessionEvent;
pub use filter::{BackgroundFilter, FilterHandle, FilterJob, FilterOutput, Kernel, KernelParams, KernelTable};
pub use history::{ActionHistory, HistoryEntry};
pub use lock::{AvailabilityNotifier, LockHandle, LockMode, ResourceLocks};
pub use provenance::{ProvenanceLedger, ProvenanceStep, ReplayStep, StepId};
pub use session::{Session, SessionBuilder, SessionError};
pub use undo::{UndoBuffer, UndoBufferItem};
