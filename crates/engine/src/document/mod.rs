//! The layer document mutated by actions.
//!
//! # Invariants
//!
//! * Layer ids are issued from a monotonic counter and never reissued for a
//!   different layer. Re-inserting a layer under its original id (undo of a
//!   delete, redo of a create) is the only way an id comes back.
//! * Every mutation bumps [`Document::version`].

mod checkpoint;
mod layer;

use indexmap::IndexMap;
use thiserror::Error;

pub use checkpoint::LayerCheckpoint;
pub use layer::{Layer, LayerData, LayerId, LayerRef};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
	#[error("layer {0} already exists")]
	DuplicateId(LayerId),
	#[error("layer {0} does not exist")]
	Missing(LayerId),
	#[error("layer data has {found} values, expected {expected}")]
	DataShape { expected: usize, found: usize },
}

/// Ordered table of layers plus id and version bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct Document {
	layers: IndexMap<LayerId, Layer>,
	last_id: u64,
	version: u64,
	sandbox: Option<u64>,
}

impl Document {
	pub fn new() -> Self {
		Self::default()
	}

	/// Copy of this document tagged as sandbox `sandbox`.
	pub fn sandboxed(&self, sandbox: u64) -> Self {
		let mut doc = self.clone();
		doc.sandbox = Some(sandbox);
		doc
	}

	pub fn sandbox(&self) -> Option<u64> {
		self.sandbox
	}

	pub fn version(&self) -> u64 {
		self.version
	}

	pub fn len(&self) -> usize {
		self.layers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.layers.is_empty()
	}

	/// Issues a fresh id without inserting anything.
	pub fn reserve_id(&mut self) -> LayerId {
		self.last_id += 1;
		LayerId(self.last_id)
	}

	pub fn get(&self, id: LayerId) -> Option<&Layer> {
		self.layers.get(&id)
	}

	pub fn contains(&self, id: LayerId) -> bool {
		self.layers.contains_key(&id)
	}

	pub fn position(&self, id: LayerId) -> Option<usize> {
		self.layers.get_index_of(&id)
	}

	/// First layer with the given name, in document order.
	pub fn find_by_name(&self, name: &str) -> Option<LayerId> {
		self.layers.values().find(|layer| layer.name == name).map(|layer| layer.id)
	}

	pub fn iter(&self) -> impl Iterator<Item = &Layer> {
		self.layers.values()
	}

	pub fn ids(&self) -> Vec<LayerId> {
		self.layers.keys().copied().collect()
	}

	/// Creates a layer under a fresh id at the end of the document.
	pub fn create(&mut self, name: impl Into<String>, data: LayerData) -> LayerId {
		let id = self.reserve_id();
		self.layers.insert(id, Layer::new(id, name, data));
		self.version += 1;
		id
	}

	/// Inserts a layer under its own id at `position` (end when `None` or out of range).
	pub fn insert(&mut self, layer: Layer, position: Option<usize>) -> Result<(), DocumentError> {
		if self.layers.contains_key(&layer.id) {
			return Err(DocumentError::DuplicateId(layer.id));
		}
		self.last_id = self.last_id.max(layer.id.0);
		let id = layer.id;
		let end = self.layers.len();
		self.layers.insert(id, layer);
		if let Some(pos) = position
			&& pos < end
		{
			self.layers.move_index(end, pos);
		}
		self.version += 1;
		Ok(())
	}

	/// Removes a layer, returning its former position and the layer.
	pub fn remove(&mut self, id: LayerId) -> Result<(usize, Layer), DocumentError> {
		let (pos, _, layer) = self.layers.shift_remove_full(&id).ok_or(DocumentError::Missing(id))?;
		self.version += 1;
		Ok((pos, layer))
	}

	/// Renames a layer, returning the previous name.
	pub fn rename(&mut self, id: LayerId, name: impl Into<String>) -> Result<String, DocumentError> {
		let layer = self.layers.get_mut(&id).ok_or(DocumentError::Missing(id))?;
		let old = std::mem::replace(&mut layer.name, name.into());
		layer.generation += 1;
		self.version += 1;
		Ok(old)
	}

	/// Swaps in new pixel data, returning the previous data.
	pub fn replace_data(&mut self, id: LayerId, data: LayerData) -> Result<LayerData, DocumentError> {
		let layer = self.layers.get_mut(&id).ok_or(DocumentError::Missing(id))?;
		let old = std::mem::replace(&mut layer.data, data);
		layer.generation += 1;
		self.version += 1;
		Ok(old)
	}

	/// Takes a checkpoint of a layer's current data.
	pub fn checkpoint(&self, id: LayerId) -> Result<LayerCheckpoint, DocumentError> {
		let layer = self.get(id).ok_or(DocumentError::Missing(id))?;
		Ok(LayerCheckpoint::new(id, layer.data.clone()))
	}

	/// Compares layer names and data in order, ignoring ids and versions.
	pub fn same_content(&self, other: &Document) -> bool {
		self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a.name == b.name && a.data == b.data)
	}
}

#[cfg(test)]
mod tests;
