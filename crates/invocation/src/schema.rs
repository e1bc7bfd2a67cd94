/// Size limits applied while parsing textual invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationLimits {
	/// Maximum number of positional arguments plus options.
	pub max_params: usize,
	/// Maximum length in bytes of one string value.
	pub max_string_len: usize,
	/// Maximum number of elements in one list value.
	pub max_list_len: usize,
	/// Maximum list nesting depth.
	pub max_depth: usize,
}

pub const DEFAULT_LIMITS: InvocationLimits = InvocationLimits {
	max_params: 64,
	max_string_len: 4096,
	max_list_len: 1024,
	max_depth: 4,
};

impl Default for InvocationLimits {
	fn default() -> Self {
		DEFAULT_LIMITS
	}
}
