//! Per-layer resource locks with condition-variable availability waits.
//!
//! # Invariants
//!
//! * At most one exclusive holder per layer, and never together with shared holders.
//! * Shared requests never block other shared requests.
//! * [`AvailabilityNotifier`] waits block on a condition variable that is
//!   notified on every release; nothing polls.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use lamina_worker::SequenceClock;
use parking_lot::{Condvar, Mutex};

use crate::document::LayerId;
use crate::error::ActionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
	Shared,
	Exclusive,
}

#[derive(Debug, Default, Clone, Copy)]
struct LockState {
	exclusive: bool,
	shared: usize,
}

impl LockState {
	fn admits(&self, mode: LockMode) -> bool {
		match mode {
			LockMode::Shared => !self.exclusive,
			LockMode::Exclusive => !self.exclusive && self.shared == 0,
		}
	}

	fn is_free(&self) -> bool {
		!self.exclusive && self.shared == 0
	}
}

type ReleaseListener = Arc<dyn Fn(LayerId) + Send + Sync>;

struct LockTable {
	states: Mutex<HashMap<LayerId, LockState>>,
	released: Condvar,
	listeners: Mutex<Vec<ReleaseListener>>,
	holders: SequenceClock,
}

impl LockTable {
	fn release(&self, layer: LayerId, mode: LockMode) {
		{
			let mut states = self.states.lock();
			if let Some(state) = states.get_mut(&layer) {
				match mode {
					LockMode::Shared => state.shared = state.shared.saturating_sub(1),
					LockMode::Exclusive => state.exclusive = false,
				}
				if state.is_free() {
					states.remove(&layer);
				}
			}
		}
		self.released.notify_all();
		let listeners: Vec<_> = self.listeners.lock().clone();
		for listener in listeners {
			listener(layer);
		}
	}
}

/// Shared table of layer locks for one session.
#[derive(Clone)]
pub struct ResourceLocks {
	table: Arc<LockTable>,
}

impl Default for ResourceLocks {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for ResourceLocks {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ResourceLocks").field("held", &self.table.states.lock().len()).finish()
	}
}

impl ResourceLocks {
	pub fn new() -> Self {
		Self {
			table: Arc::new(LockTable {
				states: Mutex::new(HashMap::new()),
				released: Condvar::new(),
				listeners: Mutex::new(Vec::new()),
				holders: SequenceClock::new(),
			}),
		}
	}

	/// Acquires `layer` in `mode` without blocking.
	///
	/// Fails with [`ActionError::ResourceBusy`] carrying a notifier for the
	/// requested mode when the layer is held incompatibly.
	pub fn acquire(&self, layer: LayerId, mode: LockMode) -> Result<LockHandle, ActionError> {
		let mut states = self.table.states.lock();
		let state = states.entry(layer).or_default();
		if !state.admits(mode) {
			drop(states);
			return Err(ActionError::ResourceBusy {
				layer,
				notifier: self.notifier_for(layer, mode),
			});
		}
		match mode {
			LockMode::Shared => state.shared += 1,
			LockMode::Exclusive => state.exclusive = true,
		}
		let holder = self.table.holders.next();
		tracing::trace!(layer = layer.0, ?mode, holder, "lock.acquire");
		Ok(LockHandle {
			table: Arc::clone(&self.table),
			layer,
			mode,
			holder,
		})
	}

	/// Releases a lock before its handle would be dropped.
	pub fn release(&self, handle: LockHandle) {
		drop(handle);
	}

	/// True when `layer` could be acquired in `mode` right now.
	pub fn is_available(&self, layer: LayerId, mode: LockMode) -> bool {
		self.table.states.lock().get(&layer).is_none_or(|state| state.admits(mode))
	}

	/// Strongest mode currently held on `layer`.
	pub fn held_mode(&self, layer: LayerId) -> Option<LockMode> {
		let states = self.table.states.lock();
		let state = states.get(&layer)?;
		if state.exclusive {
			Some(LockMode::Exclusive)
		} else if state.shared > 0 {
			Some(LockMode::Shared)
		} else {
			None
		}
	}

	/// A notifier that fires when `layer` becomes acquirable in `mode`.
	pub fn notifier_for(&self, layer: LayerId, mode: LockMode) -> AvailabilityNotifier {
		AvailabilityNotifier {
			table: Arc::downgrade(&self.table),
			layer,
			mode,
		}
	}

	/// Registers a callback invoked after every release, outside the table lock.
	pub fn on_release(&self, listener: impl Fn(LayerId) + Send + Sync + 'static) {
		self.table.listeners.lock().push(Arc::new(listener));
	}
}

/// RAII guard for one acquired lock; released on drop.
pub struct LockHandle {
	table: Arc<LockTable>,
	layer: LayerId,
	mode: LockMode,
	holder: u64,
}

impl LockHandle {
	pub fn layer(&self) -> LayerId {
		self.layer
	}

	pub fn mode(&self) -> LockMode {
		self.mode
	}
}

impl fmt::Debug for LockHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LockHandle")
			.field("layer", &self.layer)
			.field("mode", &self.mode)
			.field("holder", &self.holder)
			.finish()
	}
}

impl Drop for LockHandle {
	fn drop(&mut self) {
		tracing::trace!(layer = self.layer.0, mode = ?self.mode, holder = self.holder, "lock.release");
		self.table.release(self.layer, self.mode);
	}
}

/// Waits for a layer to become acquirable in a given mode.
///
/// Holds the lock table weakly: once the owning session is gone every wait
/// returns immediately.
#[derive(Clone)]
pub struct AvailabilityNotifier {
	table: Weak<LockTable>,
	layer: LayerId,
	mode: LockMode,
}

impl fmt::Debug for AvailabilityNotifier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AvailabilityNotifier")
			.field("layer", &self.layer)
			.field("mode", &self.mode)
			.finish()
	}
}

impl AvailabilityNotifier {
	pub fn layer(&self) -> LayerId {
		self.layer
	}

	pub fn mode(&self) -> LockMode {
		self.mode
	}

	pub fn is_available(&self) -> bool {
		let Some(table) = self.table.upgrade() else {
			return true;
		};
		table.states.lock().get(&self.layer).is_none_or(|state| state.admits(self.mode))
	}

	/// Blocks until the layer is available.
	pub fn wait(&self) {
		let Some(table) = self.table.upgrade() else {
			return;
		};
		let mut states = table.states.lock();
		while states.get(&self.layer).is_some_and(|state| !state.admits(self.mode)) {
			table.released.wait(&mut states);
		}
	}

	/// Blocks until the layer is available or `timeout` elapses.
	///
	/// Returns false on timeout; timing out is not an error.
	pub fn timed_wait(&self, timeout: Duration) -> bool {
		let Some(table) = self.table.upgrade() else {
			return true;
		};
		let deadline = Instant::now() + timeout;
		let mut states = table.states.lock();
		while states.get(&self.layer).is_some_and(|state| !state.admits(self.mode)) {
			if table.released.wait_until(&mut states, deadline).timed_out() {
				return states.get(&self.layer).is_none_or(|state| state.admits(self.mode));
			}
		}
		true
	}
}

#[cfg(test)]
mod tests;
