use lamina_invocation::Invocation;

use crate::action::{Action, ActionResult, ActionSpec, ArgReader, Param, RunCx, ValidateCx};
use crate::document::{LayerId, LayerRef};
use crate::error::ActionError;
use crate::filter::{BoxBlur, FilterOutput, KernelFilter, KernelParams};
use crate::lock::LockMode;

const MAX_RADIUS: u32 = 64;

pub(super) static BLUR: ActionSpec = ActionSpec {
	name: "blur",
	description: "Box-blur a layer in the background, into a new layer or in place",
	undoable: true,
	mutates_document: true,
};

/// Runs the `box_blur` kernel on a worker.
///
/// The input layer stays exclusively locked until the result is applied. A
/// new output layer gets its id when the filter starts; the id is kept so a
/// redo produces the same layer.
#[derive(Debug, Clone)]
pub struct BlurFilter {
	layer: LayerRef,
	radius: u32,
	replace: bool,
	name: Option<String>,
	resolved: Option<LayerId>,
	reserved: Option<LayerId>,
}

impl BlurFilter {
	pub fn new(layer: impl Into<LayerRef>, radius: u32) -> Self {
		Self {
			layer: layer.into(),
			radius,
			replace: false,
			name: None,
			resolved: None,
			reserved: None,
		}
	}

	/// Writes the result back into the input layer.
	pub fn in_place(mut self) -> Self {
		self.replace = true;
		self
	}

	pub fn named(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	pub(super) fn from_invocation(invocation: &Invocation) -> Result<Box<dyn Action>, ActionError> {
		let mut reader = ArgReader::new(invocation);
		let layer = reader.layer("layer")?;
		let radius = reader.opt_u32("radius", 1)?;
		let replace = reader.opt_bool("replace", false)?;
		let name = match reader.option("name") {
			Some(value) => Some(
				value
					.as_str()
					.map(str::to_string)
					.ok_or_else(|| ActionError::ParamType {
						name: "name",
						expected: "string",
						found: value.type_name(),
					})?,
			),
			None => None,
		};
		reader.finish()?;
		Ok(Box::new(Self {
			layer,
			radius,
			replace,
			name,
			resolved: None,
			reserved: None,
		}))
	}
}

impl Action for BlurFilter {
	fn spec(&self) -> &'static ActionSpec {
		&BLUR
	}

	fn params(&self) -> Vec<Param> {
		let mut params = vec![Param::arg("layer", self.layer.to_value()), Param::option("radius", i64::from(self.radius))];
		if self.replace {
			params.push(Param::option("replace", true));
		}
		if let Some(name) = &self.name {
			params.push(Param::option("name", name.as_str()));
		}
		params
	}

	fn validate(&mut self, cx: &mut ValidateCx<'_>) -> Result<(), ActionError> {
		if self.radius > MAX_RADIUS {
			return Err(ActionError::invalid(format!("radius {} exceeds {MAX_RADIUS}", self.radius)));
		}
		if self.replace && self.name.is_some() {
			return Err(ActionError::invalid("name is only used for a new output layer"));
		}
		let id = cx.resolve(&self.layer)?;
		cx.lock(id, LockMode::Exclusive)?;
		self.resolved = Some(id);
		Ok(())
	}

	fn run(&mut self, cx: &mut RunCx<'_>) -> Result<Option<ActionResult>, ActionError> {
		let id = self.resolved.ok_or_else(|| ActionError::execution("run called before validate"))?;
		let kernel = cx.kernels().get(BoxBlur::NAME)?;
		let layer = cx.document().get(id).ok_or_else(|| ActionError::UnknownLayer(id.to_string()))?;
		let input = layer.data.clone();
		let output = if self.replace {
			FilterOutput::Replace(id)
		} else {
			let name = self.name.clone().unwrap_or_else(|| format!("{} blurred", layer.name));
			let out = match self.reserved {
				Some(reserved) if !cx.document().contains(reserved) => reserved,
				_ => cx.document_mut().reserve_id(),
			};
			self.reserved = Some(out);
			FilterOutput::NewLayer { id: out, name }
		};
		let out = output.layer();
		let params = KernelParams::new().with("radius", f64::from(self.radius));
		cx.start_filter(Box::new(KernelFilter::new(BLUR.name, kernel, input, params)), output)?;
		cx.add_input(id);
		cx.add_output(out);
		Ok(Some(ActionResult::Layer(out)))
	}

	fn clear_cache(&mut self) {
		self.resolved = None;
	}
}
