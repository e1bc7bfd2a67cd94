use super::{LayerData, LayerId};

/// A saved copy of one layer's data, held by undo actions.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerCheckpoint {
	layer: LayerId,
	data: LayerData,
}

impl LayerCheckpoint {
	pub fn new(layer: LayerId, data: LayerData) -> Self {
		Self { layer, data }
	}

	pub fn layer(&self) -> LayerId {
		self.layer
	}

	pub fn data(&self) -> &LayerData {
		&self.data
	}

	pub fn into_data(self) -> LayerData {
		self.data
	}

	pub fn byte_size(&self) -> usize {
		self.data.byte_size()
	}
}
