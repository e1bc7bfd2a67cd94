use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::TaskClass;

/// Lifecycle state of one registered job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
	Running,
	/// An interrupt was requested but the job has not returned yet.
	Interrupting,
}

/// Snapshot for one running worker job.
#[derive(Debug, Clone)]
pub struct JobRecord {
	pub job: u64,
	pub name: String,
	pub class: TaskClass,
	pub state: JobState,
	pub progress: f32,
}

/// In-memory registry of running jobs for status snapshots.
#[derive(Debug, Default, Clone)]
pub struct WorkerRegistry {
	inner: Arc<RwLock<BTreeMap<u64, JobRecord>>>,
}

impl WorkerRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Upserts one record.
	pub fn upsert(&self, record: JobRecord) {
		if let Ok(mut guard) = self.inner.write() {
			guard.insert(record.job, record);
		}
	}

	/// Applies `f` to the record for `job`, if present.
	pub fn update(&self, job: u64, f: impl FnOnce(&mut JobRecord)) {
		if let Ok(mut guard) = self.inner.write()
			&& let Some(record) = guard.get_mut(&job)
		{
			f(record);
		}
	}

	/// Removes one record.
	pub fn remove(&self, job: u64) {
		if let Ok(mut guard) = self.inner.write() {
			guard.remove(&job);
		}
	}

	/// Number of registered jobs.
	pub fn len(&self) -> usize {
		self.inner.read().map(|guard| guard.len()).unwrap_or(0)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Returns snapshots ordered by job id.
	pub fn snapshots(&self) -> Vec<JobRecord> {
		let Ok(guard) = self.inner.read() else {
			return Vec::new();
		};
		guard.values().cloned().collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(job: u64, name: &str) -> JobRecord {
		JobRecord {
			job,
			name: name.to_string(),
			class: TaskClass::CpuBlocking,
			state: JobState::Running,
			progress: 0.0,
		}
	}

	#[test]
	fn snapshots_are_ordered_by_job() {
		let registry = WorkerRegistry::new();
		registry.upsert(record(3, "blur"));
		registry.upsert(record(1, "scale"));
		let jobs: Vec<_> = registry.snapshots().into_iter().map(|r| r.job).collect();
		assert_eq!(jobs, vec![1, 3]);
	}

	#[test]
	fn update_and_remove() {
		let registry = WorkerRegistry::new();
		registry.upsert(record(1, "blur"));
		registry.update(1, |r| {
			r.progress = 0.5;
			r.state = JobState::Interrupting;
		});
		let snap = &registry.snapshots()[0];
		assert_eq!(snap.state, JobState::Interrupting);
		assert!((snap.progress - 0.5).abs() < f32::EPSILON);

		registry.update(9, |r| r.progress = 1.0);
		registry.remove(1);
		assert!(registry.is_empty());
	}
}
