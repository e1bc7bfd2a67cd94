use thiserror::Error;

/// Errors produced while parsing a textual invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
	#[error("empty invocation")]
	Empty,
	#[error("invalid action name at column {column}")]
	InvalidName { column: usize },
	#[error("unterminated {quote} quote starting at column {column}")]
	UnterminatedQuote { quote: char, column: usize },
	#[error("trailing backslash")]
	TrailingBackslash,
	#[error("unterminated list starting at column {column}")]
	UnterminatedList { column: usize },
	#[error("unexpected '{ch}' at column {column}")]
	Unexpected { ch: char, column: usize },
	#[error("duplicate option '{key}'")]
	DuplicateOption { key: String },
	#[error("too many parameters (limit {limit})")]
	TooManyParams { limit: usize },
	#[error("string value exceeds {limit} bytes")]
	StringTooLong { limit: usize },
	#[error("list exceeds {limit} elements")]
	ListTooLong { limit: usize },
	#[error("lists nested deeper than {limit}")]
	TooDeep { limit: usize },
}

/// A parse error annotated with its 1-based script line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {source}")]
pub struct ScriptError {
	pub line: usize,
	#[source]
	pub source: ParseError,
}
