//! The action protocol.
//!
//! An [`Action`] is a typed value describing one intended mutation (or query)
//! of the document. The dispatcher drives it through two phases:
//!
//! 1. [`Action::validate`] sees the document read-only. It resolves layer
//!    references, caches what `run` needs, and acquires resource locks. A
//!    busy lock surfaces as [`ActionError::ResourceBusy`] and suspends the
//!    action instead of failing it.
//! 2. [`Action::run`] sees the document mutably and may record undo steps,
//!    provenance inputs and outputs, or hand work to a background filter.
//!
//! Both phases return `Result`s; the dispatcher converts errors into context
//! reports and a status, so nothing escapes the dispatch thread as a panic.

mod context;
mod registry;

use std::fmt;

use lamina_invocation::{Invocation, Value};

pub use context::{ActionContext, ActionSource, ActionStatus, ContextMessage, MessageLevel, WaitPolicy};
pub use registry::{ActionRegistry, ArgReader};

use crate::document::{Document, LayerId, LayerRef};
use crate::error::ActionError;
use crate::filter::{BackgroundFilter, FilterOutput, KernelTable};
use crate::lock::{LockHandle, LockMode, ResourceLocks};
use crate::provenance::ProvenanceIo;

/// Static description of an action type.
#[derive(Debug)]
pub struct ActionSpec {
	/// Type tag used for registration, scripts and provenance.
	pub name: &'static str,
	pub description: &'static str,
	pub undoable: bool,
	pub mutates_document: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRole {
	/// Required, positional.
	Argument,
	/// Optional `key=value` with a default.
	Option,
}

/// One named parameter value of an action instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
	pub name: &'static str,
	pub value: Value,
	pub role: ParamRole,
	/// Non-persistent parameters are stripped from provenance records.
	pub persistent: bool,
}

impl Param {
	pub fn arg(name: &'static str, value: impl Into<Value>) -> Self {
		Self {
			name,
			value: value.into(),
			role: ParamRole::Argument,
			persistent: true,
		}
	}

	pub fn option(name: &'static str, value: impl Into<Value>) -> Self {
		Self {
			name,
			value: value.into(),
			role: ParamRole::Option,
			persistent: true,
		}
	}

	/// Marks the parameter as session-only.
	pub fn transient(mut self) -> Self {
		self.persistent = false;
		self
	}
}

/// Value produced by a successful run.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
	Layer(LayerId),
	Text(String),
	Value(Value),
}

impl fmt::Display for ActionResult {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Layer(id) => write!(f, "{id}"),
			Self::Text(text) => f.write_str(text),
			Self::Value(value) => write!(f, "{value}"),
		}
	}
}

/// Clone support for boxed actions.
pub trait ActionClone {
	fn boxed_clone(&self) -> Box<dyn Action>;
}

impl<T: Action + Clone> ActionClone for T {
	fn boxed_clone(&self) -> Box<dyn Action> {
		Box::new(self.clone())
	}
}

impl Clone for Box<dyn Action> {
	fn clone(&self) -> Self {
		self.boxed_clone()
	}
}

pub trait Action: ActionClone + Send + 'static {
	fn spec(&self) -> &'static ActionSpec;

	/// Current parameter values in declaration order.
	fn params(&self) -> Vec<Param>;

	/// Checks parameters against the document and acquires locks.
	///
	/// Must not mutate the document.
	fn validate(&mut self, cx: &mut ValidateCx<'_>) -> Result<(), ActionError>;

	/// Performs the mutation. Only called after a successful `validate`.
	fn run(&mut self, cx: &mut RunCx<'_>) -> Result<Option<ActionResult>, ActionError>;

	/// Drops state cached by `validate`.
	fn clear_cache(&mut self) {}

	/// Whether a successful run is recorded in the provenance ledger.
	fn changes_project_data(&self) -> bool {
		self.spec().mutates_document
	}

	/// Checkpoint bytes held by this action when it sits in the undo buffer.
	fn byte_size(&self) -> usize {
		0
	}

	fn type_tag(&self) -> &'static str {
		self.spec().name
	}

	/// Textual form, optionally without non-persistent parameters.
	fn to_invocation(&self, include_transient: bool) -> Invocation {
		let mut invocation = Invocation::new(self.spec().name);
		for param in self.params() {
			if !param.persistent && !include_transient {
				continue;
			}
			match param.role {
				ParamRole::Argument => invocation.args.push(param.value),
				ParamRole::Option => invocation.options.push((param.name.to_string(), param.value)),
			}
		}
		invocation
	}

	/// Full textual form; the inverse of [`ActionRegistry::import_from_string`].
	fn export_to_string(&self) -> String {
		self.to_invocation(true).to_string()
	}
}

impl fmt::Debug for dyn Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Action({})", self.export_to_string())
	}
}

/// Read-only view handed to [`Action::validate`].
pub struct ValidateCx<'a> {
	pub(crate) doc: &'a Document,
	pub(crate) locks: &'a ResourceLocks,
	pub(crate) held: Vec<LockHandle>,
	pub(crate) context: &'a ActionContext,
	pub(crate) source: ActionSource,
}

impl<'a> ValidateCx<'a> {
	pub(crate) fn new(doc: &'a Document, locks: &'a ResourceLocks, context: &'a ActionContext, source: ActionSource) -> Self {
		Self {
			doc,
			locks,
			held: Vec::new(),
			context,
			source,
		}
	}

	pub fn document(&self) -> &Document {
		self.doc
	}

	pub fn context(&self) -> &ActionContext {
		self.context
	}

	pub fn source(&self) -> ActionSource {
		self.source
	}

	/// Resolves a layer reference to the id of an existing layer.
	pub fn resolve(&self, layer: &LayerRef) -> Result<LayerId, ActionError> {
		layer.resolve(self.doc).ok_or_else(|| ActionError::UnknownLayer(layer.to_string()))
	}

	/// Acquires `layer` for the rest of this action's lifetime.
	pub fn lock(&mut self, layer: LayerId, mode: LockMode) -> Result<(), ActionError> {
		let handle = self.locks.acquire(layer, mode)?;
		self.held.push(handle);
		Ok(())
	}
}

/// A filter start request recorded by [`RunCx::start_filter`].
pub(crate) struct FilterLaunch {
	pub filter: Box<dyn BackgroundFilter>,
	pub output: FilterOutput,
}

/// Mutable view handed to [`Action::run`].
pub struct RunCx<'a> {
	pub(crate) doc: &'a mut Document,
	pub(crate) context: &'a ActionContext,
	pub(crate) source: ActionSource,
	pub(crate) kernels: &'a KernelTable,
	pub(crate) undo: Vec<Box<dyn Action>>,
	pub(crate) io: ProvenanceIo,
	pub(crate) filter: Option<FilterLaunch>,
}

impl<'a> RunCx<'a> {
	pub(crate) fn new(doc: &'a mut Document, context: &'a ActionContext, source: ActionSource, kernels: &'a KernelTable) -> Self {
		Self {
			doc,
			context,
			source,
			kernels,
			undo: Vec::new(),
			io: ProvenanceIo::default(),
			filter: None,
		}
	}

	pub fn document(&self) -> &Document {
		&*self.doc
	}

	pub fn document_mut(&mut self) -> &mut Document {
		&mut *self.doc
	}

	pub fn context(&self) -> &ActionContext {
		self.context
	}

	pub fn source(&self) -> ActionSource {
		self.source
	}

	pub fn kernels(&self) -> &KernelTable {
		self.kernels
	}

	/// Appends one step to this action's undo recipe. Steps are replayed in
	/// the order they were recorded.
	pub fn record_undo(&mut self, action: Box<dyn Action>) {
		self.undo.push(action);
	}

	pub fn add_input(&mut self, layer: LayerId) {
		self.io.inputs.push(layer);
	}

	pub fn add_output(&mut self, layer: LayerId) {
		self.io.outputs.push(layer);
	}

	pub fn add_deleted(&mut self, layer: LayerId) {
		self.io.deleted.push(layer);
	}

	/// Hands the rest of this action to a background filter.
	///
	/// The action completes when the filter does; locks taken in `validate`
	/// stay held until then.
	pub fn start_filter(&mut self, filter: Box<dyn BackgroundFilter>, output: FilterOutput) -> Result<(), ActionError> {
		if self.filter.is_some() {
			return Err(ActionError::execution("an action may start at most one filter"));
		}
		self.filter = Some(FilterLaunch { filter, output });
		Ok(())
	}
}
