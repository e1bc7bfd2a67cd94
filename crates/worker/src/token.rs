use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

/// Monotonic id clock shared between clones.
///
/// Ids start at 1 and are never handed out twice by the same clock.
#[derive(Debug, Default, Clone)]
pub struct SequenceClock {
	last: Arc<AtomicU64>,
}

impl SequenceClock {
	/// Creates a clock whose first id is 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next id.
	pub fn next(&self) -> u64 {
		self.last.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}

/// Job-scoped interrupt token for cooperative cancellation of worker jobs.
#[derive(Debug, Clone)]
pub struct InterruptToken {
	job: u64,
	cancel: CancellationToken,
}

impl InterruptToken {
	/// Creates a fresh token for `job`.
	pub fn new(job: u64) -> Self {
		Self {
			job,
			cancel: CancellationToken::new(),
		}
	}

	/// Returns the job id this token belongs to.
	pub const fn job(&self) -> u64 {
		self.job
	}

	/// Returns true once an interrupt was requested.
	pub fn is_interrupted(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Requests an interrupt. Idempotent.
	pub fn interrupt(&self) {
		self.cancel.cancel();
	}
}
