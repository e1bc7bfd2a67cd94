use std::fmt;

use serde::{Deserialize, Serialize};

use super::DocumentError;

/// Document-wide layer identifier, written `#n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Single-channel raster owned by a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerData {
	width: u32,
	height: u32,
	values: Vec<f32>,
}

impl LayerData {
	/// A `width` x `height` raster filled with `fill`.
	pub fn filled(width: u32, height: u32, fill: f32) -> Self {
		Self {
			width,
			height,
			values: vec![fill; width as usize * height as usize],
		}
	}

	pub fn from_values(width: u32, height: u32, values: Vec<f32>) -> Result<Self, DocumentError> {
		let expected = width as usize * height as usize;
		if values.len() != expected {
			return Err(DocumentError::DataShape {
				expected,
				found: values.len(),
			});
		}
		Ok(Self { width, height, values })
	}

	pub fn width(&self) -> u32 {
		self.width
	}

	pub fn height(&self) -> u32 {
		self.height
	}

	pub fn values(&self) -> &[f32] {
		&self.values
	}

	pub fn get(&self, x: u32, y: u32) -> Option<f32> {
		if x >= self.width || y >= self.height {
			return None;
		}
		self.values.get(y as usize * self.width as usize + x as usize).copied()
	}

	/// Bytes held by the raster.
	pub fn byte_size(&self) -> usize {
		self.values.len() * std::mem::size_of::<f32>()
	}

	pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
		Self {
			width: self.width,
			height: self.height,
			values: self.values.iter().map(|v| f(*v)).collect(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
	pub id: LayerId,
	pub name: String,
	pub data: LayerData,
	/// Bumped on every change to this layer.
	pub generation: u64,
}

impl Layer {
	pub fn new(id: LayerId, name: impl Into<String>, data: LayerData) -> Self {
		Self {
			id,
			name: name.into(),
			data,
			generation: 0,
		}
	}

	pub fn export_to_string(&self) -> Result<String, serde_json::Error> {
		serde_json::to_string(self)
	}

	pub fn import_from_string(text: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str(text)
	}
}

/// A layer named either by id or by its current name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerRef {
	Id(LayerId),
	Name(String),
}

impl LayerRef {
	/// Looks the reference up; names resolve to the first match in document order.
	pub fn resolve(&self, doc: &super::Document) -> Option<LayerId> {
		match self {
			Self::Id(id) => doc.contains(*id).then_some(*id),
			Self::Name(name) => doc.find_by_name(name),
		}
	}

	pub fn to_value(&self) -> lamina_invocation::Value {
		match self {
			Self::Id(id) => lamina_invocation::Value::Entity(id.0),
			Self::Name(name) => lamina_invocation::Value::Str(name.clone()),
		}
	}
}

impl From<LayerId> for LayerRef {
	fn from(id: LayerId) -> Self {
		Self::Id(id)
	}
}

impl From<&str> for LayerRef {
	fn from(name: &str) -> Self {
		Self::Name(name.to_string())
	}
}

impl fmt::Display for LayerRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Id(id) => write!(f, "{id}"),
			Self::Name(name) => f.write_str(name),
		}
	}
}
