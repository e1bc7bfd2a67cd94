//! Bounded diagnostic record of completed actions.
//!
//! Never consulted for correctness; dropping entries cannot affect the document.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::action::{Action, ActionResult, ActionSource, ActionStatus};

#[derive(Debug, Clone)]
pub struct HistoryEntry {
	/// Dispatcher-wide completion sequence number.
	pub seq: u64,
	pub action: Box<dyn Action>,
	pub result: Option<ActionResult>,
	pub status: ActionStatus,
	pub source: ActionSource,
	pub completed_at: DateTime<Utc>,
}

/// Fixed-capacity ring buffer, most recent first.
#[derive(Debug)]
pub struct ActionHistory {
	entries: VecDeque<HistoryEntry>,
	capacity: usize,
}

impl ActionHistory {
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		Self {
			entries: VecDeque::with_capacity(capacity),
			capacity,
		}
	}

	/// Records an entry, silently dropping the oldest when full.
	pub fn record(&mut self, entry: HistoryEntry) {
		if self.entries.len() == self.capacity {
			self.entries.pop_back();
		}
		self.entries.push_front(entry);
	}

	/// Entry `index` places back from the most recent.
	pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
		self.entries.get(index)
	}

	/// Shrinking drops the oldest entries.
	pub fn set_capacity(&mut self, capacity: usize) {
		self.capacity = capacity.max(1);
		self.entries.truncate(self.capacity);
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Most recent first.
	pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
		self.entries.iter()
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}
}

#[cfg(test)]
mod tests;
