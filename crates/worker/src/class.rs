/// Execution classes used for worker scheduling and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// The single serialized stream that owns document mutation.
	Dispatch,
	/// CPU-intensive filter work executed on the blocking pool.
	CpuBlocking,
}

impl TaskClass {
	/// Stable label used in tracing fields and worker snapshots.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Dispatch => "dispatch",
			Self::CpuBlocking => "cpu_blocking",
		}
	}
}
