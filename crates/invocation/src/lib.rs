#![cfg_attr(test, allow(unused_crate_dependencies))]

//! Canonical textual invocation form for Lamina actions.
//!
//! Every entry point that names an action by text (scripts, the action
//! registry, provenance records) goes through [`Invocation`]:
//!
//! ```text
//! create_layer base 64 64 fill=0.5
//! blur #3 radius=2 replace=true
//! ```
//!
//! Positional arguments come first, `key=value` options after. Entity
//! references are written `#id` and can be rewritten with
//! [`Invocation::map_entities`] when a command is replayed into another
//! document.

mod error;
mod parse;
pub mod schema;
mod value;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use error::{ParseError, ScriptError};
pub use parse::{parse_invocation, parse_invocation_with, parse_script};
pub use value::Value;

/// One textual action request: a name, positional arguments and options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
	/// Action type tag.
	pub name: String,
	pub args: Vec<Value>,
	/// Options in the order they were given.
	pub options: Vec<(String, Value)>,
}

impl Invocation {
	/// Creates an invocation with no parameters.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			args: Vec::new(),
			options: Vec::new(),
		}
	}

	/// Appends a positional argument.
	pub fn arg(mut self, value: impl Into<Value>) -> Self {
		self.args.push(value.into());
		self
	}

	/// Appends or replaces an option.
	pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		let key = key.into();
		let value = value.into();
		match self.options.iter_mut().find(|(k, _)| *k == key) {
			Some(slot) => slot.1 = value,
			None => self.options.push((key, value)),
		}
		self
	}

	/// Looks up an option by key.
	pub fn option(&self, key: &str) -> Option<&Value> {
		self.options.iter().find(|(k, _)| k == key).map(|(_, v)| v)
	}

	/// Collects every entity id referenced by arguments and options.
	pub fn entities(&self) -> Vec<u64> {
		let mut out = Vec::new();
		let mut push = |id| out.push(id);
		self.args.iter().for_each(|v| v.for_each_entity(&mut push));
		self.options.iter().for_each(|(_, v)| v.for_each_entity(&mut push));
		out
	}

	/// Rewrites every entity id through `f`; unmapped ids stay as they are.
	pub fn map_entities(&mut self, mut f: impl FnMut(u64) -> Option<u64>) {
		self.args.iter_mut().for_each(|v| v.map_entities(&mut f));
		self.options.iter_mut().for_each(|(_, v)| v.map_entities(&mut f));
	}

	/// Short description for tracing.
	pub fn describe(&self) -> String {
		match self.args.len() + self.options.len() {
			0 => format!("action:{}", self.name),
			n => format!("action:{}({n})", self.name),
		}
	}
}

impl fmt::Display for Invocation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.name)?;
		for arg in &self.args {
			write!(f, " {arg}")?;
		}
		for (key, value) in &self.options {
			write!(f, " {key}={value}")?;
		}
		Ok(())
	}
}

impl std::str::FromStr for Invocation {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		parse_invocation(s)
	}
}
