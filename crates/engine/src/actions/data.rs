use lamina_invocation::{Invocation, Value};

use crate::action::{Action, ActionResult, ActionSpec, ArgReader, Param, RunCx, ValidateCx};
use crate::document::{LayerCheckpoint, LayerId, LayerRef};
use crate::error::ActionError;
use crate::lock::LockMode;

pub(super) static SCALE_LAYER: ActionSpec = ActionSpec {
	name: "scale_layer",
	description: "Multiply every value of a layer by a factor",
	undoable: true,
	mutates_document: true,
};

static RESTORE_LAYER_DATA: ActionSpec = ActionSpec {
	name: "restore_layer_data",
	description: "Put checkpointed data back into a layer (undo only)",
	undoable: false,
	mutates_document: true,
};

/// Scales layer values in place; undo restores a checkpoint of the old data.
#[derive(Debug, Clone)]
pub struct ScaleLayer {
	layer: LayerRef,
	factor: f64,
	resolved: Option<LayerId>,
}

impl ScaleLayer {
	pub fn new(layer: impl Into<LayerRef>, factor: f64) -> Self {
		Self {
			layer: layer.into(),
			factor,
			resolved: None,
		}
	}

	pub(super) fn from_invocation(invocation: &Invocation) -> Result<Box<dyn Action>, ActionError> {
		let mut reader = ArgReader::new(invocation);
		let layer = reader.layer("layer")?;
		let factor = reader.f64("factor")?;
		reader.finish()?;
		Ok(Box::new(Self::new(layer, factor)))
	}
}

impl Action for ScaleLayer {
	fn spec(&self) -> &'static ActionSpec {
		&SCALE_LAYER
	}

	fn params(&self) -> Vec<Param> {
		vec![Param::arg("layer", self.layer.to_value()), Param::arg("factor", self.factor)]
	}

	fn validate(&mut self, cx: &mut ValidateCx<'_>) -> Result<(), ActionError> {
		if !self.factor.is_finite() {
			return Err(ActionError::invalid("factor must be finite"));
		}
		let id = cx.resolve(&self.layer)?;
		cx.lock(id, LockMode::Exclusive)?;
		self.resolved = Some(id);
		Ok(())
	}

	fn run(&mut self, cx: &mut RunCx<'_>) -> Result<Option<ActionResult>, ActionError> {
		let id = self.resolved.ok_or_else(|| ActionError::execution("run called before validate"))?;
		let checkpoint = cx.document().checkpoint(id)?;
		let factor = self.factor as f32;
		let scaled = checkpoint.data().map(|v| v * factor);
		cx.document_mut().replace_data(id, scaled)?;
		cx.record_undo(Box::new(RestoreLayerData::new(checkpoint)));
		cx.add_input(id);
		cx.add_output(id);
		Ok(Some(ActionResult::Layer(id)))
	}

	fn clear_cache(&mut self) {
		self.resolved = None;
	}
}

/// Undo step that swaps a checkpoint back into its layer.
#[derive(Debug, Clone)]
pub struct RestoreLayerData {
	checkpoint: LayerCheckpoint,
}

impl RestoreLayerData {
	pub fn new(checkpoint: LayerCheckpoint) -> Self {
		Self { checkpoint }
	}
}

impl Action for RestoreLayerData {
	fn spec(&self) -> &'static ActionSpec {
		&RESTORE_LAYER_DATA
	}

	fn params(&self) -> Vec<Param> {
		vec![Param::arg("layer", Value::Entity(self.checkpoint.layer().0))]
	}

	fn validate(&mut self, cx: &mut ValidateCx<'_>) -> Result<(), ActionError> {
		let id = self.checkpoint.layer();
		if !cx.document().contains(id) {
			return Err(ActionError::UnknownLayer(id.to_string()));
		}
		cx.lock(id, LockMode::Exclusive)
	}

	fn run(&mut self, cx: &mut RunCx<'_>) -> Result<Option<ActionResult>, ActionError> {
		let id = self.checkpoint.layer();
		let old = cx.document_mut().replace_data(id, self.checkpoint.data().clone())?;
		cx.record_undo(Box::new(RestoreLayerData::new(LayerCheckpoint::new(id, old))));
		cx.add_output(id);
		Ok(Some(ActionResult::Layer(id)))
	}

	fn byte_size(&self) -> usize {
		self.checkpoint.byte_size()
	}
}
