//! Undo and redo stacks with byte-budgeted eviction.
//!
//! The buffer only stores reversal recipes. Applying them is the
//! dispatcher's job: undo steps and redo actions run through the same
//! validate/run pipeline as every other action.
//!
//! # Invariants
//!
//! * Both stacks are most-recent-first.
//! * The redo stack is only filled by undo and is cleared by any push whose
//!   source is not the undo buffer.
//! * After a push the undo stack holds at most `max_items` items and at most
//!   `byte_limit` bytes, except that the newest item is always kept.

use std::collections::VecDeque;

use crate::action::{Action, ActionSource};
use crate::document::LayerId;
use crate::error::ActionError;
use crate::provenance::StepId;

/// Reversal recipe for one undoable mutation.
#[derive(Debug)]
pub struct UndoBufferItem {
	tag: String,
	undo_actions: Option<Vec<Box<dyn Action>>>,
	redo_action: Option<Box<dyn Action>>,
	provenance_steps: Vec<StepId>,
	entities: Vec<LayerId>,
	byte_size: usize,
}

impl UndoBufferItem {
	pub fn new(tag: impl Into<String>, undo_actions: Vec<Box<dyn Action>>) -> Self {
		let mut item = Self {
			tag: tag.into(),
			undo_actions: Some(undo_actions),
			redo_action: None,
			provenance_steps: Vec::new(),
			entities: Vec::new(),
			byte_size: 0,
		};
		item.compute_size();
		item
	}

	pub fn with_redo(mut self, action: Box<dyn Action>) -> Self {
		self.redo_action = Some(action);
		self
	}

	pub fn with_provenance(mut self, steps: Vec<StepId>) -> Self {
		self.provenance_steps = steps;
		self
	}

	/// Layers this item touches when applied.
	pub fn with_entities(mut self, mut entities: Vec<LayerId>) -> Self {
		entities.sort_unstable();
		entities.dedup();
		self.entities = entities;
		self
	}

	pub fn tag(&self) -> &str {
		&self.tag
	}

	pub fn byte_size(&self) -> usize {
		self.byte_size
	}

	pub fn entities(&self) -> &[LayerId] {
		&self.entities
	}

	pub fn provenance_steps(&self) -> &[StepId] {
		&self.provenance_steps
	}

	pub fn has_undo(&self) -> bool {
		self.undo_actions.is_some()
	}

	pub fn has_redo(&self) -> bool {
		self.redo_action.is_some()
	}

	/// Checkpoint bytes held by the undo actions.
	pub fn compute_size(&mut self) {
		self.byte_size = self.undo_actions.iter().flatten().map(|action| action.byte_size()).sum();
	}

	/// Hands out the undo actions and releases the stored state.
	///
	/// Succeeds once; later calls fail with [`ActionError::UndoConsumed`].
	pub fn apply_and_clear_undo(&mut self) -> Result<Vec<Box<dyn Action>>, ActionError> {
		let actions = self.undo_actions.take().ok_or(ActionError::UndoConsumed)?;
		self.byte_size = 0;
		Ok(actions)
	}

	pub fn take_redo(&mut self) -> Option<Box<dyn Action>> {
		self.redo_action.take()
	}
}

/// What an eviction dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictedItem {
	pub tag: String,
	pub byte_size: usize,
	pub provenance_steps: Vec<StepId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
	pub evicted: Vec<EvictedItem>,
}

impl EvictionReport {
	pub fn is_empty(&self) -> bool {
		self.evicted.is_empty()
	}

	/// Provenance steps of evicted items that held checkpoint data.
	pub fn invalidated_steps(&self) -> impl Iterator<Item = StepId> + '_ {
		self.evicted
			.iter()
			.filter(|item| item.byte_size > 0)
			.flat_map(|item| item.provenance_steps.iter().copied())
	}
}

#[derive(Debug)]
pub struct UndoBuffer {
	undo: VecDeque<UndoBufferItem>,
	redo: VecDeque<UndoBufferItem>,
	byte_limit: usize,
	max_items: usize,
	total_bytes: usize,
	enabled: bool,
}

impl UndoBuffer {
	pub fn new(byte_limit: usize, max_items: usize) -> Self {
		Self {
			undo: VecDeque::new(),
			redo: VecDeque::new(),
			byte_limit,
			max_items: max_items.max(1),
			total_bytes: 0,
			enabled: true,
		}
	}

	/// Pushes a new undo item, clearing redo unless `source` is the undo buffer.
	pub fn push(&mut self, item: UndoBufferItem, source: ActionSource) -> EvictionReport {
		if !self.enabled {
			return EvictionReport::default();
		}
		if source != ActionSource::UndoBuffer && !self.redo.is_empty() {
			tracing::trace!(dropped = self.redo.len(), "undo.redo_cleared");
			self.redo.clear();
		}
		tracing::debug!(tag = item.tag(), bytes = item.byte_size(), "undo.push");
		self.total_bytes += item.byte_size();
		self.undo.push_front(item);
		self.enforce_limits()
	}

	pub fn pop_undo(&mut self) -> Option<UndoBufferItem> {
		let item = self.undo.pop_front()?;
		self.total_bytes = self.total_bytes.saturating_sub(item.byte_size());
		Some(item)
	}

	pub fn peek_undo(&self) -> Option<&UndoBufferItem> {
		self.undo.front()
	}

	pub fn push_redo(&mut self, item: UndoBufferItem) {
		self.redo.push_front(item);
	}

	pub fn pop_redo(&mut self) -> Option<UndoBufferItem> {
		self.redo.pop_front()
	}

	pub fn peek_redo(&self) -> Option<&UndoBufferItem> {
		self.redo.front()
	}

	pub fn set_byte_limit(&mut self, byte_limit: usize) -> EvictionReport {
		self.byte_limit = byte_limit;
		self.enforce_limits()
	}

	pub fn set_max_items(&mut self, max_items: usize) -> EvictionReport {
		self.max_items = max_items.max(1);
		self.enforce_limits()
	}

	/// Disabling also empties both stacks.
	pub fn set_enabled(&mut self, enabled: bool) {
		self.enabled = enabled;
		if !enabled {
			self.reset();
		}
	}

	pub fn reset(&mut self) {
		self.undo.clear();
		self.redo.clear();
		self.total_bytes = 0;
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	pub fn byte_limit(&self) -> usize {
		self.byte_limit
	}

	pub fn total_bytes(&self) -> usize {
		self.total_bytes
	}

	pub fn undo_len(&self) -> usize {
		self.undo.len()
	}

	pub fn redo_len(&self) -> usize {
		self.redo.len()
	}

	/// Undo tags, most recent first.
	pub fn undo_tags(&self) -> Vec<String> {
		self.undo.iter().map(|item| item.tag.clone()).collect()
	}

	pub fn redo_tags(&self) -> Vec<String> {
		self.redo.iter().map(|item| item.tag.clone()).collect()
	}

	/// Drops oldest items until within both limits, always keeping the newest.
	fn enforce_limits(&mut self) -> EvictionReport {
		let mut report = EvictionReport::default();
		while self.undo.len() > 1 && (self.undo.len() > self.max_items || self.total_bytes > self.byte_limit) {
			let Some(item) = self.undo.pop_back() else {
				break;
			};
			self.total_bytes = self.total_bytes.saturating_sub(item.byte_size());
			tracing::warn!(tag = item.tag(), bytes = item.byte_size(), "undo.evicted");
			report.evicted.push(EvictedItem {
				tag: item.tag,
				byte_size: item.byte_size,
				provenance_steps: item.provenance_steps,
			});
		}
		report
	}
}
