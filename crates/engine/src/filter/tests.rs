use std::sync::mpsc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use super::*;

fn job_for_test() -> FilterJob {
	let (events, _) = broadcast::channel(16);
	FilterJob {
		job: 1,
		interruptable: true,
		token: InterruptToken::new(1),
		progress: Arc::new(ProgressSink::new()),
		events,
		workers: WorkerRegistry::new(),
	}
}

struct Constant(f32);

impl BackgroundFilter for Constant {
	fn name(&self) -> &str {
		"constant"
	}

	fn run(&mut self, job: &FilterJob) -> Result<LayerData, KernelError> {
		job.on_progress(0.5);
		Ok(LayerData::filled(2, 2, self.0))
	}
}

/// Spins until interrupted, or until `release` fires when not interruptable.
struct Spin {
	interruptable: bool,
	release: Option<mpsc::Receiver<()>>,
}

impl BackgroundFilter for Spin {
	fn name(&self) -> &str {
		"spin"
	}

	fn is_interruptable(&self) -> bool {
		self.interruptable
	}

	fn run(&mut self, job: &FilterJob) -> Result<LayerData, KernelError> {
		loop {
			if job.interrupted() {
				return Err(KernelError::Interrupted);
			}
			if let Some(release) = &self.release
				&& release.try_recv().is_ok()
			{
				return Ok(LayerData::filled(1, 1, 1.0));
			}
			std::thread::sleep(Duration::from_millis(1));
		}
	}
}

struct Explode;

impl BackgroundFilter for Explode {
	fn name(&self) -> &str {
		"explode"
	}

	fn run(&mut self, _job: &FilterJob) -> Result<LayerData, KernelError> {
		panic!("kernel blew up");
	}
}

fn start_collecting(filter: Box<dyn BackgroundFilter>, workers: &WorkerRegistry) -> (FilterHandle, mpsc::Receiver<Result<LayerData, KernelError>>) {
	let (events, _) = broadcast::channel(16);
	let (tx, rx) = mpsc::channel();
	let handle = start(filter, 7, events, workers.clone(), move |_, outcome| {
		let _ = tx.send(outcome);
	})
	.unwrap();
	(handle, rx)
}

#[test]
fn completion_is_delivered_before_done() {
	let workers = WorkerRegistry::new();
	let (handle, rx) = start_collecting(Box::new(Constant(3.0)), &workers);
	handle.wait();
	assert!(handle.is_done());
	assert_eq!(rx.try_recv().unwrap(), Ok(LayerData::filled(2, 2, 3.0)));
	assert!(workers.is_empty());
	assert_eq!(handle.job(), 7);
	assert_eq!(handle.name(), "constant");
}

#[test]
fn interrupt_stops_interruptable_filter() {
	let workers = WorkerRegistry::new();
	let (handle, rx) = start_collecting(
		Box::new(Spin {
			interruptable: true,
			release: None,
		}),
		&workers,
	);
	assert!(!handle.wait_timeout(Duration::from_millis(20)));
	assert_eq!(workers.len(), 1);
	assert!(handle.request_interrupt());
	handle.wait();
	assert_eq!(rx.recv().unwrap(), Err(KernelError::Interrupted));
}

#[test]
fn uninterruptable_filter_ignores_interrupt() {
	let workers = WorkerRegistry::new();
	let (release_tx, release_rx) = mpsc::channel();
	let (handle, rx) = start_collecting(
		Box::new(Spin {
			interruptable: false,
			release: Some(release_rx),
		}),
		&workers,
	);
	assert!(!handle.request_interrupt());
	assert!(!handle.wait_timeout(Duration::from_millis(20)));
	release_tx.send(()).unwrap();
	handle.wait();
	assert_eq!(rx.recv().unwrap(), Ok(LayerData::filled(1, 1, 1.0)));
}

#[test]
fn panics_become_kernel_errors() {
	let workers = WorkerRegistry::new();
	let (handle, rx) = start_collecting(Box::new(Explode), &workers);
	handle.wait();
	assert_eq!(rx.recv().unwrap(), Err(KernelError::Panicked("kernel blew up".into())));
	assert!(workers.is_empty());
}

#[test]
fn progress_is_clamped_and_observable() {
	let sink = ProgressSink::new();
	let mut rx = sink.subscribe();
	assert_eq!(sink.set(1.5), 0.0);
	assert_eq!(sink.get(), 1.0);
	assert!(rx.has_changed().unwrap());
	assert_eq!(*rx.borrow_and_update(), 1.0);
}

#[test]
fn box_blur_keeps_uniform_rasters() {
	let input = LayerData::filled(5, 4, 2.0);
	let params = KernelParams::new().with("radius", 2.0);
	let output = BoxBlur.execute(&input, &params, &job_for_test()).unwrap();
	assert_eq!(output, input);
}

#[test]
fn box_blur_spreads_an_impulse() {
	let mut values = vec![0.0; 9];
	values[4] = 9.0;
	let input = LayerData::from_values(3, 3, values).unwrap();
	let params = KernelParams::new().with("radius", 1.0);
	let output = BoxBlur.execute(&input, &params, &job_for_test()).unwrap();
	// Centre window covers all nine cells; corners cover four.
	assert_eq!(output.get(1, 1), Some(1.0));
	assert_eq!(output.get(0, 0), Some(9.0 / 4.0));
}

#[test]
fn box_blur_rejects_bad_radius_and_honours_interrupt() {
	let input = LayerData::filled(3, 3, 1.0);
	let job = job_for_test();
	assert!(matches!(
		BoxBlur.execute(&input, &KernelParams::new().with("radius", 1.5), &job),
		Err(KernelError::BadParam(_))
	));
	assert!(matches!(BoxBlur.execute(&input, &KernelParams::new(), &job), Err(KernelError::BadParam(_))));

	job.token.interrupt();
	assert_eq!(
		BoxBlur.execute(&input, &KernelParams::new().with("radius", 1.0), &job),
		Err(KernelError::Interrupted)
	);
}

#[test]
fn kernel_table_lookup_and_override() {
	let mut table = KernelTable::with_builtins();
	assert!(table.contains(BoxBlur::NAME));
	assert_eq!(table.get("sharpen").err(), Some(KernelError::UnknownKernel("sharpen".into())));
	table.insert("sharpen", Arc::new(BoxBlur));
	assert!(table.get("sharpen").is_ok());
}
