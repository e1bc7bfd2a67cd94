use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use super::{BackgroundFilter, FilterJob};
use crate::document::LayerData;
use crate::error::KernelError;

/// Numeric parameters handed to a kernel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelParams {
	values: BTreeMap<String, f64>,
}

impl KernelParams {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
		self.values.insert(name.into(), value);
		self
	}

	pub fn get(&self, name: &str) -> Option<f64> {
		self.values.get(name).copied()
	}

	pub fn require(&self, name: &str) -> Result<f64, KernelError> {
		self.get(name).ok_or_else(|| KernelError::BadParam(format!("missing '{name}'")))
	}
}

/// A pure raster computation that polls for interruption.
pub trait Kernel: Send + Sync + 'static {
	fn execute(&self, input: &LayerData, params: &KernelParams, job: &FilterJob) -> Result<LayerData, KernelError>;
}

/// Named kernels available to filter actions.
#[derive(Clone)]
pub struct KernelTable {
	kernels: HashMap<String, Arc<dyn Kernel>>,
}

impl fmt::Debug for KernelTable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut names: Vec<_> = self.kernels.keys().collect();
		names.sort();
		f.debug_struct("KernelTable").field("kernels", &names).finish()
	}
}

impl Default for KernelTable {
	fn default() -> Self {
		Self::with_builtins()
	}
}

impl KernelTable {
	pub fn empty() -> Self {
		Self { kernels: HashMap::new() }
	}

	pub fn with_builtins() -> Self {
		let mut table = Self::empty();
		table.insert(BoxBlur::NAME, Arc::new(BoxBlur));
		table
	}

	/// Registers `kernel` under `name`, replacing any previous one.
	pub fn insert(&mut self, name: impl Into<String>, kernel: Arc<dyn Kernel>) {
		self.kernels.insert(name.into(), kernel);
	}

	pub fn get(&self, name: &str) -> Result<Arc<dyn Kernel>, KernelError> {
		self.kernels.get(name).cloned().ok_or_else(|| KernelError::UnknownKernel(name.to_string()))
	}

	pub fn contains(&self, name: &str) -> bool {
		self.kernels.contains_key(name)
	}
}

/// Runs one kernel over a snapshot of its input.
pub struct KernelFilter {
	name: String,
	kernel: Arc<dyn Kernel>,
	input: LayerData,
	params: KernelParams,
	interruptable: bool,
}

impl KernelFilter {
	pub fn new(name: impl Into<String>, kernel: Arc<dyn Kernel>, input: LayerData, params: KernelParams) -> Self {
		Self {
			name: name.into(),
			kernel,
			input,
			params,
			interruptable: true,
		}
	}

	/// Marks the filter as one that ignores interrupt requests.
	pub fn uninterruptable(mut self) -> Self {
		self.interruptable = false;
		self
	}
}

impl BackgroundFilter for KernelFilter {
	fn name(&self) -> &str {
		&self.name
	}

	fn is_interruptable(&self) -> bool {
		self.interruptable
	}

	fn run(&mut self, job: &FilterJob) -> Result<LayerData, KernelError> {
		let output = self.kernel.execute(&self.input, &self.params, job)?;
		job.on_progress(1.0);
		Ok(output)
	}
}

/// Separable box blur with a square window of `2 * radius + 1`.
///
/// Edges clamp. Checks for interruption once per row of each pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxBlur;

impl BoxBlur {
	pub const NAME: &'static str = "box_blur";
}

impl Kernel for BoxBlur {
	fn execute(&self, input: &LayerData, params: &KernelParams, job: &FilterJob) -> Result<LayerData, KernelError> {
		let radius = params.require("radius")?;
		if !(0.0..=64.0).contains(&radius) || radius.fract() != 0.0 {
			return Err(KernelError::BadParam(format!("radius must be an integer in 0..=64, got {radius}")));
		}
		let radius = radius as usize;
		let (width, height) = (input.width() as usize, input.height() as usize);
		if radius == 0 || width == 0 || height == 0 {
			return Ok(input.clone());
		}

		let rows = (2 * height).max(1) as f32;
		let mut horizontal = vec![0.0f32; width * height];
		for y in 0..height {
			if job.interrupted() {
				return Err(KernelError::Interrupted);
			}
			let row = &input.values()[y * width..(y + 1) * width];
			for x in 0..width {
				horizontal[y * width + x] = window_mean(x, width, radius, |i| row[i]);
			}
			job.on_progress(y as f32 / rows);
		}

		let mut output = vec![0.0f32; width * height];
		for y in 0..height {
			if job.interrupted() {
				return Err(KernelError::Interrupted);
			}
			for x in 0..width {
				output[y * width + x] = window_mean(y, height, radius, |i| horizontal[i * width + x]);
			}
			job.on_progress((height + y) as f32 / rows);
		}

		LayerData::from_values(input.width(), input.height(), output).map_err(|err| KernelError::Failed(err.to_string()))
	}
}

fn window_mean(center: usize, len: usize, radius: usize, sample: impl Fn(usize) -> f32) -> f32 {
	let start = center.saturating_sub(radius);
	let end = (center + radius).min(len - 1);
	let sum: f32 = (start..=end).map(sample).sum();
	sum / (end - start + 1) as f32
}
