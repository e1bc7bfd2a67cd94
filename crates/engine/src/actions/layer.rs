use lamina_invocation::{Invocation, Value};

use crate::action::{Action, ActionResult, ActionSpec, ArgReader, Param, RunCx, ValidateCx};
use crate::document::{Layer, LayerData, LayerId, LayerRef};
use crate::error::ActionError;
use crate::lock::LockMode;

/// Largest accepted layer edge.
const MAX_EDGE: u32 = 16_384;

pub(super) static CREATE_LAYER: ActionSpec = ActionSpec {
	name: "create_layer",
	description: "Create a layer of the given size filled with a constant",
	undoable: true,
	mutates_document: true,
};

pub(super) static RENAME_LAYER: ActionSpec = ActionSpec {
	name: "rename_layer",
	description: "Rename a layer",
	undoable: true,
	mutates_document: true,
};

pub(super) static DELETE_LAYER: ActionSpec = ActionSpec {
	name: "delete_layer",
	description: "Delete a layer",
	undoable: true,
	mutates_document: true,
};

pub(super) static LAYER_INFO: ActionSpec = ActionSpec {
	name: "layer_info",
	description: "Describe a layer without changing it",
	undoable: false,
	mutates_document: false,
};

static RESTORE_LAYER: ActionSpec = ActionSpec {
	name: "restore_layer",
	description: "Re-insert a deleted layer (undo only)",
	undoable: false,
	mutates_document: true,
};

fn resolved(id: Option<LayerId>) -> Result<LayerId, ActionError> {
	id.ok_or_else(|| ActionError::execution("run called before validate"))
}

/// Creates a layer filled with `fill`.
///
/// The id chosen on first run is kept so a redo brings back the same layer.
#[derive(Debug, Clone)]
pub struct CreateLayer {
	name: String,
	width: u32,
	height: u32,
	fill: f64,
	sandbox: Option<u64>,
	assigned: Option<LayerId>,
}

impl CreateLayer {
	pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
		Self {
			name: name.into(),
			width,
			height,
			fill: 0.0,
			sandbox: None,
			assigned: None,
		}
	}

	pub fn with_fill(mut self, fill: f64) -> Self {
		self.fill = fill;
		self
	}

	/// Restricts the action to the sandbox document with this id.
	pub fn in_sandbox(mut self, sandbox: u64) -> Self {
		self.sandbox = Some(sandbox);
		self
	}

	pub(super) fn from_invocation(invocation: &Invocation) -> Result<Box<dyn Action>, ActionError> {
		let mut reader = ArgReader::new(invocation);
		let name = reader.string("name")?;
		let width = reader.u32("width")?;
		let height = reader.u32("height")?;
		let fill = reader.opt_f64("fill", 0.0)?;
		let sandbox = reader.opt_u64("sandbox")?;
		reader.finish()?;
		Ok(Box::new(Self {
			name,
			width,
			height,
			fill,
			sandbox,
			assigned: None,
		}))
	}
}

impl Action for CreateLayer {
	fn spec(&self) -> &'static ActionSpec {
		&CREATE_LAYER
	}

	fn params(&self) -> Vec<Param> {
		let mut params = vec![
			Param::arg("name", self.name.as_str()),
			Param::arg("width", i64::from(self.width)),
			Param::arg("height", i64::from(self.height)),
		];
		if self.fill != 0.0 {
			params.push(Param::option("fill", self.fill));
		}
		if let Some(sandbox) = self.sandbox {
			params.push(Param::option("sandbox", Value::Int(sandbox as i64)).transient());
		}
		params
	}

	fn validate(&mut self, cx: &mut ValidateCx<'_>) -> Result<(), ActionError> {
		if self.name.trim().is_empty() {
			return Err(ActionError::invalid("layer name must not be empty"));
		}
		if self.width == 0 || self.height == 0 || self.width > MAX_EDGE || self.height > MAX_EDGE {
			return Err(ActionError::invalid(format!(
				"layer size {}x{} is outside 1..={MAX_EDGE}",
				self.width, self.height
			)));
		}
		if !self.fill.is_finite() {
			return Err(ActionError::invalid("fill must be finite"));
		}
		if let Some(sandbox) = self.sandbox
			&& cx.document().sandbox() != Some(sandbox)
		{
			return Err(ActionError::invalid(format!("not running in sandbox {sandbox}")));
		}
		if let Some(id) = self.assigned
			&& cx.document().contains(id)
		{
			return Err(ActionError::invalid(format!("layer {id} already exists")));
		}
		Ok(())
	}

	fn run(&mut self, cx: &mut RunCx<'_>) -> Result<Option<ActionResult>, ActionError> {
		let data = LayerData::filled(self.width, self.height, self.fill as f32);
		let id = match self.assigned {
			Some(id) => {
				cx.document_mut().insert(Layer::new(id, self.name.clone(), data), None)?;
				id
			}
			None => cx.document_mut().create(self.name.clone(), data),
		};
		self.assigned = Some(id);
		cx.add_output(id);
		cx.record_undo(Box::new(DeleteLayer::new(id)));
		Ok(Some(ActionResult::Layer(id)))
	}
}

#[derive(Debug, Clone)]
pub struct RenameLayer {
	layer: LayerRef,
	name: String,
	resolved: Option<LayerId>,
}

impl RenameLayer {
	pub fn new(layer: impl Into<LayerRef>, name: impl Into<String>) -> Self {
		Self {
			layer: layer.into(),
			name: name.into(),
			resolved: None,
		}
	}

	pub(super) fn from_invocation(invocation: &Invocation) -> Result<Box<dyn Action>, ActionError> {
		let mut reader = ArgReader::new(invocation);
		let layer = reader.layer("layer")?;
		let name = reader.string("name")?;
		reader.finish()?;
		Ok(Box::new(Self::new(layer, name)))
	}
}

impl Action for RenameLayer {
	fn spec(&self) -> &'static ActionSpec {
		&RENAME_LAYER
	}

	fn params(&self) -> Vec<Param> {
		vec![Param::arg("layer", self.layer.to_value()), Param::arg("name", self.name.as_str())]
	}

	fn validate(&mut self, cx: &mut ValidateCx<'_>) -> Result<(), ActionError> {
		if self.name.trim().is_empty() {
			return Err(ActionError::invalid("layer name must not be empty"));
		}
		let id = cx.resolve(&self.layer)?;
		cx.lock(id, LockMode::Shared)?;
		self.resolved = Some(id);
		Ok(())
	}

	fn run(&mut self, cx: &mut RunCx<'_>) -> Result<Option<ActionResult>, ActionError> {
		let id = resolved(self.resolved)?;
		let old = cx.document_mut().rename(id, self.name.clone())?;
		cx.record_undo(Box::new(RenameLayer::new(id, old)));
		cx.add_input(id);
		cx.add_output(id);
		Ok(Some(ActionResult::Layer(id)))
	}

	fn clear_cache(&mut self) {
		self.resolved = None;
	}
}

#[derive(Debug, Clone)]
pub struct DeleteLayer {
	layer: LayerRef,
	resolved: Option<LayerId>,
}

impl DeleteLayer {
	pub fn new(layer: impl Into<LayerRef>) -> Self {
		Self {
			layer: layer.into(),
			resolved: None,
		}
	}

	pub(super) fn from_invocation(invocation: &Invocation) -> Result<Box<dyn Action>, ActionError> {
		let mut reader = ArgReader::new(invocation);
		let layer = reader.layer("layer")?;
		reader.finish()?;
		Ok(Box::new(Self::new(layer)))
	}
}

impl Action for DeleteLayer {
	fn spec(&self) -> &'static ActionSpec {
		&DELETE_LAYER
	}

	fn params(&self) -> Vec<Param> {
		vec![Param::arg("layer", self.layer.to_value())]
	}

	fn validate(&mut self, cx: &mut ValidateCx<'_>) -> Result<(), ActionError> {
		let id = cx.resolve(&self.layer)?;
		cx.lock(id, LockMode::Exclusive)?;
		self.resolved = Some(id);
		Ok(())
	}

	fn run(&mut self, cx: &mut RunCx<'_>) -> Result<Option<ActionResult>, ActionError> {
		let id = resolved(self.resolved)?;
		let (position, layer) = cx.document_mut().remove(id)?;
		cx.record_undo(Box::new(RestoreLayer { layer, position }));
		cx.add_deleted(id);
		Ok(None)
	}

	fn clear_cache(&mut self) {
		self.resolved = None;
	}
}

/// Undo step of [`DeleteLayer`]: puts the layer back where it was.
#[derive(Debug, Clone)]
pub struct RestoreLayer {
	layer: Layer,
	position: usize,
}

impl RestoreLayer {
	pub fn new(layer: Layer, position: usize) -> Self {
		Self { layer, position }
	}
}

impl Action for RestoreLayer {
	fn spec(&self) -> &'static ActionSpec {
		&RESTORE_LAYER
	}

	fn params(&self) -> Vec<Param> {
		vec![
			Param::arg("layer", Value::Entity(self.layer.id.0)),
			Param::option("position", self.position as i64),
		]
	}

	fn validate(&mut self, cx: &mut ValidateCx<'_>) -> Result<(), ActionError> {
		if cx.document().contains(self.layer.id) {
			return Err(ActionError::invalid(format!("layer {} already exists", self.layer.id)));
		}
		Ok(())
	}

	fn run(&mut self, cx: &mut RunCx<'_>) -> Result<Option<ActionResult>, ActionError> {
		let id = self.layer.id;
		cx.document_mut().insert(self.layer.clone(), Some(self.position))?;
		cx.add_output(id);
		cx.record_undo(Box::new(DeleteLayer::new(id)));
		Ok(Some(ActionResult::Layer(id)))
	}

	fn byte_size(&self) -> usize {
		self.layer.data.byte_size()
	}
}

/// Read-only summary of one layer.
#[derive(Debug, Clone)]
pub struct LayerInfo {
	layer: LayerRef,
	resolved: Option<LayerId>,
}

impl LayerInfo {
	pub fn new(layer: impl Into<LayerRef>) -> Self {
		Self {
			layer: layer.into(),
			resolved: None,
		}
	}

	pub(super) fn from_invocation(invocation: &Invocation) -> Result<Box<dyn Action>, ActionError> {
		let mut reader = ArgReader::new(invocation);
		let layer = reader.layer("layer")?;
		reader.finish()?;
		Ok(Box::new(Self::new(layer)))
	}
}

impl Action for LayerInfo {
	fn spec(&self) -> &'static ActionSpec {
		&LAYER_INFO
	}

	fn params(&self) -> Vec<Param> {
		vec![Param::arg("layer", self.layer.to_value())]
	}

	fn validate(&mut self, cx: &mut ValidateCx<'_>) -> Result<(), ActionError> {
		let id = cx.resolve(&self.layer)?;
		cx.lock(id, LockMode::Shared)?;
		self.resolved = Some(id);
		Ok(())
	}

	fn run(&mut self, cx: &mut RunCx<'_>) -> Result<Option<ActionResult>, ActionError> {
		let id = resolved(self.resolved)?;
		let layer = cx
			.document()
			.get(id)
			.ok_or_else(|| ActionError::UnknownLayer(id.to_string()))?;
		let values = layer.data.values();
		let mean = if values.is_empty() {
			0.0
		} else {
			values.iter().map(|v| f64::from(*v)).sum::<f64>() / values.len() as f64
		};
		Ok(Some(ActionResult::Text(format!(
			"{id} {} {}x{} mean={mean:.3}",
			layer.name,
			layer.data.width(),
			layer.data.height()
		))))
	}

	fn clear_cache(&mut self) {
		self.resolved = None;
	}
}
