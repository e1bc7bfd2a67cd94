use crate::error::{ParseError, ScriptError};
use crate::schema::InvocationLimits;
use crate::{Invocation, Value};

/// Parses one invocation line with default limits.
pub fn parse_invocation(input: &str) -> Result<Invocation, ParseError> {
	parse_invocation_with(input, &InvocationLimits::default())
}

/// Parses one invocation line: `name arg... key=value...`.
pub fn parse_invocation_with(input: &str, limits: &InvocationLimits) -> Result<Invocation, ParseError> {
	let mut parser = Parser::new(input, limits);
	parser.skip_ws();
	if parser.at_end() {
		return Err(ParseError::Empty);
	}

	let column = parser.column();
	let name = parser.ident();
	if name.is_empty() || !parser.at_boundary() {
		return Err(ParseError::InvalidName { column });
	}

	let mut invocation = Invocation::new(name);
	loop {
		parser.skip_ws();
		if parser.at_end() {
			break;
		}
		if invocation.args.len() + invocation.options.len() >= limits.max_params {
			return Err(ParseError::TooManyParams { limit: limits.max_params });
		}
		if let Some(key) = parser.option_key() {
			if invocation.option(&key).is_some() {
				return Err(ParseError::DuplicateOption { key });
			}
			let value = parser.value(0)?;
			invocation.options.push((key, value));
		} else {
			let value = parser.value(0)?;
			invocation.args.push(value);
		}
		if !parser.at_end() && !parser.at_ws() {
			return Err(parser.unexpected());
		}
	}
	Ok(invocation)
}

/// Parses a multi-line script. Blank lines and lines starting with `#` are skipped.
pub fn parse_script(text: &str) -> Result<Vec<(usize, Invocation)>, ScriptError> {
	let mut out = Vec::new();
	for (idx, line) in text.lines().enumerate() {
		let trimmed = line.trim();
		if trimmed.is_empty() || trimmed.starts_with('#') {
			continue;
		}
		let invocation = parse_invocation(trimmed).map_err(|source| ScriptError { line: idx + 1, source })?;
		out.push((idx + 1, invocation));
	}
	Ok(out)
}

struct Parser<'a> {
	chars: Vec<char>,
	pos: usize,
	limits: &'a InvocationLimits,
}

impl<'a> Parser<'a> {
	fn new(input: &str, limits: &'a InvocationLimits) -> Self {
		Self {
			chars: input.chars().collect(),
			pos: 0,
			limits,
		}
	}

	fn peek(&self) -> Option<char> {
		self.chars.get(self.pos).copied()
	}

	fn at_end(&self) -> bool {
		self.pos >= self.chars.len()
	}

	fn at_ws(&self) -> bool {
		self.peek().is_some_and(char::is_whitespace)
	}

	fn at_boundary(&self) -> bool {
		self.at_end() || self.at_ws()
	}

	fn column(&self) -> usize {
		self.pos + 1
	}

	fn unexpected(&self) -> ParseError {
		match self.peek() {
			Some(ch) => ParseError::Unexpected { ch, column: self.column() },
			None => ParseError::Empty,
		}
	}

	fn skip_ws(&mut self) {
		while self.at_ws() {
			self.pos += 1;
		}
	}

	fn ident(&mut self) -> String {
		let start = self.pos;
		while let Some(c) = self.peek() {
			let ok = if self.pos == start {
				c.is_ascii_alphabetic() || c == '_'
			} else {
				c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
			};
			if !ok {
				break;
			}
			self.pos += 1;
		}
		self.chars[start..self.pos].iter().collect()
	}

	/// Consumes `key=` if present, leaving the cursor on the value.
	fn option_key(&mut self) -> Option<String> {
		let start = self.pos;
		let key = self.ident();
		if !key.is_empty() && self.peek() == Some('=') {
			self.pos += 1;
			return Some(key);
		}
		self.pos = start;
		None
	}

	fn value(&mut self, depth: usize) -> Result<Value, ParseError> {
		match self.peek() {
			Some('"') | Some('\'') => self.quoted().map(Value::Str),
			Some('[') => self.list(depth + 1),
			_ => self.bare(depth > 0),
		}
	}

	fn check_len(&self, s: &str) -> Result<(), ParseError> {
		if s.len() > self.limits.max_string_len {
			return Err(ParseError::StringTooLong {
				limit: self.limits.max_string_len,
			});
		}
		Ok(())
	}

	fn quoted(&mut self) -> Result<String, ParseError> {
		let column = self.column();
		let Some(quote) = self.peek() else {
			return Err(ParseError::Empty);
		};
		self.pos += 1;
		let mut out = String::new();
		loop {
			match self.peek() {
				None => return Err(ParseError::UnterminatedQuote { quote, column }),
				Some(c) if c == quote => {
					self.pos += 1;
					break;
				}
				// Single quotes are literal.
				Some('\\') if quote == '"' => {
					self.pos += 1;
					match self.peek() {
						None => return Err(ParseError::UnterminatedQuote { quote, column }),
						Some('n') => out.push('\n'),
						Some('t') => out.push('\t'),
						Some(c) => out.push(c),
					}
					self.pos += 1;
				}
				Some(c) => {
					out.push(c);
					self.pos += 1;
				}
			}
		}
		self.check_len(&out)?;
		Ok(out)
	}

	fn bare(&mut self, in_list: bool) -> Result<Value, ParseError> {
		let mut out = String::new();
		let mut escaped = false;
		while let Some(c) = self.peek() {
			if c.is_whitespace() || (in_list && matches!(c, ',' | ']')) {
				break;
			}
			match c {
				'\\' => {
					self.pos += 1;
					let Some(next) = self.peek() else {
						return Err(ParseError::TrailingBackslash);
					};
					out.push(next);
					escaped = true;
				}
				'"' | '\'' | '[' | ']' | ',' | '=' => return Err(self.unexpected()),
				c => out.push(c),
			}
			self.pos += 1;
		}
		if out.is_empty() {
			return Err(self.unexpected());
		}
		self.check_len(&out)?;
		Ok(if escaped { Value::Str(out) } else { Value::from_bare(&out) })
	}

	fn list(&mut self, depth: usize) -> Result<Value, ParseError> {
		if depth > self.limits.max_depth {
			return Err(ParseError::TooDeep { limit: self.limits.max_depth });
		}
		let column = self.column();
		self.pos += 1;
		let mut items = Vec::new();
		loop {
			self.skip_ws();
			match self.peek() {
				None => return Err(ParseError::UnterminatedList { column }),
				Some(']') => {
					self.pos += 1;
					return Ok(Value::List(items));
				}
				_ => {}
			}
			if items.len() >= self.limits.max_list_len {
				return Err(ParseError::ListTooLong {
					limit: self.limits.max_list_len,
				});
			}
			items.push(self.value(depth)?);
			self.skip_ws();
			match self.peek() {
				Some(',') => self.pos += 1,
				Some(']') => {}
				None => return Err(ParseError::UnterminatedList { column }),
				Some(_) => return Err(self.unexpected()),
			}
		}
	}
}
