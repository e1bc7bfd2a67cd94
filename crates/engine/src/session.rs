//! Session ownership of one document and its dispatch thread.

use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;

use lamina_worker::{SequenceClock, TaskClass, WorkerRegistry, spawn_named_thread};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::action::ActionRegistry;
use crate::config::{ConfigError, SessionConfig};
use crate::dispatcher::{DispatchLink, DispatchStatus, Dispatcher, DispatcherHandle, DispatcherParts, Msg};
use crate::document::Document;
use crate::error::ActionError;
use crate::filter::{Kernel, KernelTable};
use crate::history::ActionHistory;
use crate::lock::ResourceLocks;
use crate::provenance::ProvenanceLedger;
use crate::undo::UndoBuffer;

#[derive(Debug, Error)]
pub enum SessionError {
	#[error(transparent)]
	Config(#[from] ConfigError),
	#[error("failed to start dispatch thread: {0}")]
	Spawn(#[from] std::io::Error),
	#[error(transparent)]
	Dispatch(#[from] ActionError),
}

/// Configures and opens a [`Session`].
pub struct SessionBuilder {
	config: SessionConfig,
	registry: Option<Arc<ActionRegistry>>,
	kernels: KernelTable,
	document: Document,
	ledger: Option<ProvenanceLedger>,
	user: String,
	sandboxes: SequenceClock,
}

impl Default for SessionBuilder {
	fn default() -> Self {
		Self {
			config: SessionConfig::default(),
			registry: None,
			kernels: KernelTable::with_builtins(),
			document: Document::new(),
			ledger: None,
			user: "lamina".to_string(),
			sandboxes: SequenceClock::new(),
		}
	}
}

impl SessionBuilder {
	pub fn config(mut self, config: SessionConfig) -> Self {
		self.config = config;
		self
	}

	/// Replaces the built-in action registry.
	pub fn registry(mut self, registry: ActionRegistry) -> Self {
		self.registry = Some(Arc::new(registry));
		self
	}

	/// Registers or overrides one kernel.
	pub fn kernel(mut self, name: impl Into<String>, kernel: Arc<dyn Kernel>) -> Self {
		self.kernels.insert(name, kernel);
		self
	}

	pub fn kernels(mut self, kernels: KernelTable) -> Self {
		self.kernels = kernels;
		self
	}

	/// Starts from an existing document instead of an empty one.
	pub fn document(mut self, document: Document) -> Self {
		self.document = document;
		self
	}

	/// Continues an existing provenance ledger.
	pub fn ledger(mut self, ledger: ProvenanceLedger) -> Self {
		self.ledger = Some(ledger);
		self
	}

	/// User name stamped on provenance steps.
	pub fn user(mut self, user: impl Into<String>) -> Self {
		self.user = user.into();
		self
	}

	pub fn open(self) -> Result<Session, SessionError> {
		self.config.check()?;
		let registry = self.registry.unwrap_or_else(|| Arc::new(ActionRegistry::with_builtins()));
		let (tx, rx) = crossbeam_channel::unbounded();
		let (events, _) = broadcast::channel(self.config.dispatch.event_capacity.max(1));
		let link = Arc::new(DispatchLink {
			tx,
			status: Arc::new(DispatchStatus::default()),
			events,
			workers: WorkerRegistry::new(),
			registry: Arc::clone(&registry),
			locks: ResourceLocks::new(),
			thread: OnceLock::new(),
		});

		let weak = Arc::downgrade(&link);
		link.locks.on_release(move |_| {
			if let Some(link) = weak.upgrade() {
				let _ = link.tx.send(Msg::Wake);
			}
		});

		let undo_config = &self.config.undo;
		let mut undo = UndoBuffer::new(undo_config.byte_limit, undo_config.max_items);
		undo.set_enabled(undo_config.enabled);
		let ledger = self.ledger.unwrap_or_else(|| ProvenanceLedger::new(self.user.clone()));
		let dispatcher = Dispatcher::new(
			DispatcherParts {
				doc: self.document,
				undo,
				ledger,
				history: ActionHistory::new(self.config.history.capacity),
				kernels: self.kernels.clone(),
				wait_timeout: self.config.dispatch.resource_wait_timeout(),
				rx,
			},
			&link,
		);
		let thread = spawn_named_thread(TaskClass::Dispatch, self.config.dispatch.thread_name.clone(), move || dispatcher.run())?;
		let _ = link.thread.set(thread.thread().id());
		tracing::info!(thread = %self.config.dispatch.thread_name, user = %self.user, "session.open");

		Ok(Session {
			link,
			thread: Some(thread),
			config: self.config,
			registry,
			kernels: self.kernels,
			user: self.user,
			sandboxes: self.sandboxes,
		})
	}
}

/// One document plus the dispatch thread that serializes its mutations.
///
/// Dropping the session closes it.
pub struct Session {
	link: Arc<DispatchLink>,
	thread: Option<JoinHandle<()>>,
	config: SessionConfig,
	registry: Arc<ActionRegistry>,
	kernels: KernelTable,
	user: String,
	sandboxes: SequenceClock,
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("user", &self.user)
			.field("open", &self.thread.is_some())
			.finish_non_exhaustive()
	}
}

impl Session {
	pub fn builder() -> SessionBuilder {
		SessionBuilder::default()
	}

	/// Opens an empty session with built-in actions and kernels.
	pub fn open(config: SessionConfig) -> Result<Self, SessionError> {
		Self::builder().config(config).open()
	}

	pub fn handle(&self) -> DispatcherHandle {
		DispatcherHandle::new(Arc::downgrade(&self.link))
	}

	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Opens a disposable session on a snapshot of the current document.
	///
	/// The snapshot is taken in dispatch order and tagged with a fresh sandbox
	/// id. Undo, provenance and history start empty.
	pub fn sandbox(&self) -> Result<Session, SessionError> {
		let snapshot = self.handle().inspect(|view| view.document.clone())?;
		let id = self.sandboxes.next();
		tracing::debug!(sandbox = id, layers = snapshot.len(), "session.sandbox");
		let mut config = self.config.clone();
		config.dispatch.thread_name = format!("{}-sandbox-{id}", self.config.dispatch.thread_name);
		SessionBuilder {
			config,
			registry: Some(Arc::clone(&self.registry)),
			kernels: self.kernels.clone(),
			document: snapshot.sandboxed(id),
			ledger: None,
			user: self.user.clone(),
			sandboxes: self.sandboxes.clone(),
		}
		.open()
	}

	/// Interrupts running filters, waits for them, and stops the dispatch
	/// thread. Work still queued concludes with an error.
	pub fn close(mut self) {
		self.shutdown();
	}

	fn shutdown(&mut self) {
		let Some(thread) = self.thread.take() else {
			return;
		};
		let _ = self.link.tx.send(Msg::Shutdown);
		if thread.join().is_err() {
			tracing::error!("session.dispatch_thread_panicked");
		} else {
			tracing::debug!("session.closed");
		}
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.shutdown();
	}
}
