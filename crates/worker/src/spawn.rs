use std::any::Any;
use std::io;
use std::sync::OnceLock;

use tokio::task::JoinHandle;

use crate::TaskClass;

static BLOCKING_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();

/// Returns a handle to the shared blocking pool.
///
/// Uses the ambient runtime when called from inside one, otherwise lazily
/// builds a process-wide runtime whose blocking pool hosts filter work.
fn runtime_handle() -> io::Result<tokio::runtime::Handle> {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return Ok(handle);
	}
	if let Some(runtime) = BLOCKING_RT.get() {
		return Ok(runtime.handle().clone());
	}

	let runtime = tokio::runtime::Builder::new_multi_thread()
		.worker_threads(1)
		.thread_name("lamina-worker")
		.build()?;
	// A concurrent initializer may have won; its runtime is kept and ours is dropped.
	let _ = BLOCKING_RT.set(runtime);
	BLOCKING_RT
		.get()
		.map(|runtime| runtime.handle().clone())
		.ok_or_else(|| io::Error::other("blocking runtime unavailable"))
}

/// Spawns blocking work with worker classification metadata.
pub fn spawn_blocking<F, R>(class: TaskClass, f: F) -> io::Result<JoinHandle<R>>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn_blocking");
	Ok(runtime_handle()?.spawn_blocking(f))
}

/// Spawns a dedicated named OS thread with worker classification metadata.
pub fn spawn_named_thread<F, R>(class: TaskClass, name: impl Into<String>, f: F) -> io::Result<std::thread::JoinHandle<R>>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	let name = name.into();
	tracing::trace!(worker_class = class.as_str(), thread = %name, "worker.spawn_named_thread");
	std::thread::Builder::new().name(name).spawn(f)
}

/// Extracts a readable message from a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		(*msg).to_string()
	} else if let Some(msg) = payload.downcast_ref::<String>() {
		msg.clone()
	} else {
		"non-string panic payload".to_string()
	}
}
