//! Append-only provenance ledger.
//!
//! Each successful document mutation (outside undo replays and provenance
//! replays) appends one [`ProvenanceStep`] naming the command that ran and the
//! layers it consumed, produced and deleted. Undo deletes the step its
//! mutation created; redo records a fresh one.
//!
//! # Invariants
//!
//! * Step ids increase monotonically and are never reused, even after delete.
//! * Stored commands never contain non-persistent parameters, so replaying
//!   them does not depend on the recording session.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::ops::RangeBounds;

use chrono::{DateTime, Utc};
use lamina_invocation::Invocation;
use serde::{Deserialize, Serialize};

use crate::action::ActionRegistry;
use crate::document::LayerId;
use crate::error::ActionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub u64);

impl fmt::Display for StepId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "step-{}", self.0)
	}
}

/// Layers an action consumed, produced and deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceIo {
	pub inputs: Vec<LayerId>,
	pub outputs: Vec<LayerId>,
	pub deleted: Vec<LayerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceStep {
	pub id: StepId,
	pub action_type: String,
	/// Persistent parameters only.
	pub command: Invocation,
	pub inputs: Vec<LayerId>,
	pub outputs: Vec<LayerId>,
	pub deleted: Vec<LayerId>,
	pub recorded_at: DateTime<Utc>,
	pub user: String,
}

/// One step handed to the dispatcher for replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayStep {
	pub step: StepId,
	pub command: Invocation,
	/// Outputs in the recording document, mapped onto the replay outputs in order.
	pub outputs: Vec<LayerId>,
}

#[derive(Serialize, Deserialize)]
struct LedgerSnapshot {
	last_id: u64,
	user: String,
	steps: Vec<ProvenanceStep>,
}

#[derive(Debug, Clone)]
pub struct ProvenanceLedger {
	steps: BTreeMap<StepId, ProvenanceStep>,
	last_id: u64,
	user: String,
}

impl Default for ProvenanceLedger {
	fn default() -> Self {
		Self::new("lamina")
	}
}

impl ProvenanceLedger {
	/// An empty ledger attributing steps to `user`.
	pub fn new(user: impl Into<String>) -> Self {
		Self {
			steps: BTreeMap::new(),
			last_id: 0,
			user: user.into(),
		}
	}

	pub fn record_step(&mut self, action_type: &str, command: Invocation, io: ProvenanceIo) -> StepId {
		self.last_id += 1;
		let id = StepId(self.last_id);
		tracing::debug!(step = id.0, action = action_type, outputs = io.outputs.len(), "provenance.record");
		self.steps.insert(
			id,
			ProvenanceStep {
				id,
				action_type: action_type.to_string(),
				command,
				inputs: io.inputs,
				outputs: io.outputs,
				deleted: io.deleted,
				recorded_at: Utc::now(),
				user: self.user.clone(),
			},
		);
		id
	}

	/// Removes a step; returns false when it was already gone.
	pub fn delete_step(&mut self, id: StepId) -> bool {
		let removed = self.steps.remove(&id).is_some();
		if removed {
			tracing::debug!(step = id.0, "provenance.delete");
		}
		removed
	}

	pub fn get(&self, id: StepId) -> Option<&ProvenanceStep> {
		self.steps.get(&id)
	}

	pub fn len(&self) -> usize {
		self.steps.len()
	}

	pub fn is_empty(&self) -> bool {
		self.steps.is_empty()
	}

	/// Steps in recording order.
	pub fn iter(&self) -> impl Iterator<Item = &ProvenanceStep> {
		self.steps.values()
	}

	pub fn last_step(&self) -> Option<StepId> {
		self.steps.keys().next_back().copied()
	}

	pub fn steps_in(&self, range: impl RangeBounds<StepId>) -> impl Iterator<Item = &ProvenanceStep> {
		self.steps.range(range).map(|(_, step)| step)
	}

	/// Latest surviving step that produced `layer`.
	pub fn producer_of(&self, layer: LayerId) -> Option<StepId> {
		self.steps.values().rev().find(|step| step.outputs.contains(&layer)).map(|step| step.id)
	}

	/// Steps that led to `layer`, walking producers breadth-first through their
	/// inputs. Returned in recording order.
	pub fn trail(&self, layer: LayerId) -> Vec<StepId> {
		let mut found = BTreeSet::new();
		let mut queue = VecDeque::from([(layer, StepId(u64::MAX))]);

		while let Some((layer, before)) = queue.pop_front() {
			// Producer of `layer` as it existed when step `before` consumed it.
			let Some(producer) = self
				.steps
				.range(..before)
				.rev()
				.map(|(_, step)| step)
				.find(|step| step.outputs.contains(&layer))
			else {
				continue;
			};
			if !found.insert(producer.id) {
				continue;
			}
			queue.extend(producer.inputs.iter().map(|input| (*input, producer.id)));
		}
		found.into_iter().collect()
	}

	/// Rebuilds the steps in `range` for replay.
	///
	/// Fails up front if any stored command no longer maps to a registered
	/// action or no longer parses into one.
	pub fn replay(&self, range: impl RangeBounds<StepId>, registry: &ActionRegistry) -> Result<Vec<ReplayStep>, ActionError> {
		self.steps_in(range)
			.map(|step| {
				registry.build(&step.command)?;
				Ok(ReplayStep {
					step: step.id,
					command: step.command.clone(),
					outputs: step.outputs.clone(),
				})
			})
			.collect()
	}

	pub fn export_to_string(&self) -> Result<String, serde_json::Error> {
		serde_json::to_string_pretty(&LedgerSnapshot {
			last_id: self.last_id,
			user: self.user.clone(),
			steps: self.steps.values().cloned().collect(),
		})
	}

	pub fn import_from_string(text: &str) -> Result<Self, serde_json::Error> {
		let snapshot: LedgerSnapshot = serde_json::from_str(text)?;
		let last_id = snapshot.steps.iter().map(|s| s.id.0).max().unwrap_or(0).max(snapshot.last_id);
		Ok(Self {
			steps: snapshot.steps.into_iter().map(|step| (step.id, step)).collect(),
			last_id,
			user: snapshot.user,
		})
	}
}
