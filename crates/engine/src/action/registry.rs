use std::collections::BTreeMap;

use lamina_invocation::{Invocation, Value, parse_invocation};

use super::{Action, ActionSpec};
use crate::document::{LayerId, LayerRef};
use crate::error::ActionError;

type Factory = fn(&Invocation) -> Result<Box<dyn Action>, ActionError>;

/// Maps action type tags to constructors from textual invocations.
#[derive(Debug, Default, Clone)]
pub struct ActionRegistry {
	entries: BTreeMap<&'static str, (&'static ActionSpec, Factory)>,
}

impl ActionRegistry {
	/// An empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// A registry holding every built-in action.
	pub fn with_builtins() -> Self {
		let mut registry = Self::new();
		crate::actions::register_builtins(&mut registry);
		registry
	}

	/// Registers `factory` under `spec.name`, replacing any previous entry.
	pub fn register(&mut self, spec: &'static ActionSpec, factory: Factory) {
		if self.entries.insert(spec.name, (spec, factory)).is_some() {
			tracing::debug!(action = spec.name, "registry.replaced");
		}
	}

	pub fn contains(&self, name: &str) -> bool {
		self.entries.contains_key(name)
	}

	pub fn spec(&self, name: &str) -> Option<&'static ActionSpec> {
		self.entries.get(name).map(|(spec, _)| *spec)
	}

	/// Registered specs ordered by name.
	pub fn specs(&self) -> impl Iterator<Item = &'static ActionSpec> + '_ {
		self.entries.values().map(|(spec, _)| *spec)
	}

	/// Builds an action from an invocation.
	pub fn build(&self, invocation: &Invocation) -> Result<Box<dyn Action>, ActionError> {
		let (_, factory) = self
			.entries
			.get(invocation.name.as_str())
			.ok_or_else(|| ActionError::UnknownAction(invocation.name.clone()))?;
		factory(invocation)
	}

	/// Parses and builds an action from its exported text.
	pub fn import_from_string(&self, text: &str) -> Result<Box<dyn Action>, ActionError> {
		self.build(&parse_invocation(text)?)
	}
}

/// Typed accessor over an invocation's parameters for action factories.
///
/// Tracks what was read so [`ArgReader::finish`] can reject leftovers.
pub struct ArgReader<'a> {
	invocation: &'a Invocation,
	args_read: usize,
	options_read: Vec<&'static str>,
}

impl<'a> ArgReader<'a> {
	pub fn new(invocation: &'a Invocation) -> Self {
		Self {
			invocation,
			args_read: 0,
			options_read: Vec::new(),
		}
	}

	/// Next positional argument.
	pub fn arg(&mut self, name: &'static str) -> Result<&'a Value, ActionError> {
		let value = self.invocation.args.get(self.args_read).ok_or(ActionError::MissingArgument(name))?;
		self.args_read += 1;
		Ok(value)
	}

	pub fn option(&mut self, name: &'static str) -> Option<&'a Value> {
		self.options_read.push(name);
		self.invocation.option(name)
	}

	pub fn layer(&mut self, name: &'static str) -> Result<LayerRef, ActionError> {
		let value = self.arg(name)?;
		layer_ref(name, value)
	}

	pub fn string(&mut self, name: &'static str) -> Result<String, ActionError> {
		let value = self.arg(name)?;
		value.as_str().map(str::to_string).ok_or(type_error(name, "string", value))
	}

	pub fn u32(&mut self, name: &'static str) -> Result<u32, ActionError> {
		let value = self.arg(name)?;
		to_u32(name, value)
	}

	pub fn f64(&mut self, name: &'static str) -> Result<f64, ActionError> {
		let value = self.arg(name)?;
		value.as_float().ok_or(type_error(name, "float", value))
	}

	pub fn opt_f64(&mut self, name: &'static str, default: f64) -> Result<f64, ActionError> {
		match self.option(name) {
			Some(value) => value.as_float().ok_or(type_error(name, "float", value)),
			None => Ok(default),
		}
	}

	pub fn opt_u32(&mut self, name: &'static str, default: u32) -> Result<u32, ActionError> {
		match self.option(name) {
			Some(value) => to_u32(name, value),
			None => Ok(default),
		}
	}

	pub fn opt_bool(&mut self, name: &'static str, default: bool) -> Result<bool, ActionError> {
		match self.option(name) {
			Some(value) => value.as_bool().ok_or(type_error(name, "bool", value)),
			None => Ok(default),
		}
	}

	pub fn opt_u64(&mut self, name: &'static str) -> Result<Option<u64>, ActionError> {
		match self.option(name) {
			Some(value) => value
				.as_int()
				.and_then(|v| u64::try_from(v).ok())
				.map(Some)
				.ok_or(type_error(name, "non-negative int", value)),
			None => Ok(None),
		}
	}

	/// Rejects surplus positional arguments and unknown options.
	pub fn finish(self) -> Result<(), ActionError> {
		if self.invocation.args.len() > self.args_read {
			return Err(ActionError::invalid(format!(
				"{} takes {} argument(s), got {}",
				self.invocation.name,
				self.args_read,
				self.invocation.args.len()
			)));
		}
		let unknown = self
			.invocation
			.options
			.iter()
			.find(|(key, _)| !self.options_read.iter().any(|read| *read == key.as_str()));
		if let Some((key, _)) = unknown {
			return Err(ActionError::invalid(format!("{} has no option '{key}'", self.invocation.name)));
		}
		Ok(())
	}
}

fn type_error(name: &'static str, expected: &'static str, found: &Value) -> ActionError {
	ActionError::ParamType {
		name,
		expected,
		found: found.type_name(),
	}
}

fn to_u32(name: &'static str, value: &Value) -> Result<u32, ActionError> {
	value
		.as_int()
		.and_then(|v| u32::try_from(v).ok())
		.ok_or(type_error(name, "non-negative int", value))
}

fn layer_ref(name: &'static str, value: &Value) -> Result<LayerRef, ActionError> {
	match value {
		Value::Entity(id) => Ok(LayerRef::Id(LayerId(*id))),
		Value::Str(layer) => Ok(LayerRef::Name(layer.clone())),
		other => Err(type_error(name, "layer reference", other)),
	}
}
