use std::fmt;

use serde::{Deserialize, Serialize};

/// One typed parameter value of an [`crate::Invocation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
	Int(i64),
	Float(f64),
	Bool(bool),
	Str(String),
	/// Reference to a document entity by id, written `#id`.
	Entity(u64),
	List(Vec<Value>),
}

impl Value {
	/// Short type label used in error messages.
	pub const fn type_name(&self) -> &'static str {
		match self {
			Self::Int(_) => "int",
			Self::Float(_) => "float",
			Self::Bool(_) => "bool",
			Self::Str(_) => "string",
			Self::Entity(_) => "entity",
			Self::List(_) => "list",
		}
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			Self::Int(v) => Some(*v),
			_ => None,
		}
	}

	/// Floats accept integer literals too.
	pub fn as_float(&self) -> Option<f64> {
		match self {
			Self::Float(v) => Some(*v),
			Self::Int(v) => Some(*v as f64),
			_ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Str(v) => Some(v),
			_ => None,
		}
	}

	/// Visits every entity id contained in this value, lists included.
	pub fn for_each_entity(&self, f: &mut impl FnMut(u64)) {
		match self {
			Self::Entity(id) => f(*id),
			Self::List(items) => items.iter().for_each(|item| item.for_each_entity(&mut *f)),
			_ => {}
		}
	}

	/// Rewrites entity ids in place; ids mapped to `None` are left untouched.
	pub fn map_entities(&mut self, f: &mut impl FnMut(u64) -> Option<u64>) {
		match self {
			Self::Entity(id) => {
				if let Some(mapped) = f(*id) {
					*id = mapped;
				}
			}
			Self::List(items) => items.iter_mut().for_each(|item| item.map_entities(&mut *f)),
			_ => {}
		}
	}

	/// Classifies an unquoted word.
	pub(crate) fn from_bare(word: &str) -> Self {
		if let Some(digits) = word.strip_prefix('#')
			&& !digits.is_empty()
			&& digits.bytes().all(|b| b.is_ascii_digit())
			&& let Ok(id) = digits.parse()
		{
			return Self::Entity(id);
		}
		match word {
			"true" => return Self::Bool(true),
			"false" => return Self::Bool(false),
			_ => {}
		}
		if let Ok(v) = word.parse::<i64>() {
			return Self::Int(v);
		}
		if looks_numeric(word)
			&& let Ok(v) = word.parse::<f64>()
		{
			return Self::Float(v);
		}
		Self::Str(word.to_string())
	}
}

/// Rejects words like `inf` or `nan` that `f64::from_str` would accept.
fn looks_numeric(word: &str) -> bool {
	let rest = word.strip_prefix(['-', '+']).unwrap_or(word);
	let rest = rest.strip_prefix('.').unwrap_or(rest);
	rest.starts_with(|c: char| c.is_ascii_digit())
}

fn needs_quotes(s: &str) -> bool {
	s.is_empty()
		|| s.chars().any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | '[' | ']' | ',' | '='))
		|| !matches!(Value::from_bare(s), Value::Str(_))
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
	f.write_str("\"")?;
	for c in s.chars() {
		match c {
			'"' => f.write_str("\\\"")?,
			'\\' => f.write_str("\\\\")?,
			'\n' => f.write_str("\\n")?,
			'\t' => f.write_str("\\t")?,
			c => write!(f, "{c}")?,
		}
	}
	f.write_str("\"")
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Int(v) => write!(f, "{v}"),
			Self::Float(v) => write!(f, "{v:?}"),
			Self::Bool(v) => write!(f, "{v}"),
			Self::Str(s) if needs_quotes(s) => write_quoted(f, s),
			Self::Str(s) => f.write_str(s),
			Self::Entity(id) => write!(f, "#{id}"),
			Self::List(items) => {
				f.write_str("[")?;
				for (i, item) in items.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{item}")?;
				}
				f.write_str("]")
			}
		}
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Self::Int(v)
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Self::Float(v)
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Self::Bool(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Self::Str(v.to_string())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Self::Str(v)
	}
}
