use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use super::*;

const L: LayerId = LayerId(1);

#[test]
fn exclusive_excludes_everything() {
	let locks = ResourceLocks::new();
	let held = locks.acquire(L, LockMode::Exclusive).expect("free");
	assert!(matches!(locks.acquire(L, LockMode::Exclusive), Err(ActionError::ResourceBusy { layer: L, .. })));
	assert!(locks.acquire(L, LockMode::Shared).is_err());
	assert_eq!(locks.held_mode(L), Some(LockMode::Exclusive));
	locks.release(held);
	assert!(locks.acquire(L, LockMode::Exclusive).is_ok());
}

#[test]
fn shared_never_blocks_shared() {
	let locks = ResourceLocks::new();
	let a = locks.acquire(L, LockMode::Shared).expect("first");
	let b = locks.acquire(L, LockMode::Shared).expect("second");
	assert!(locks.acquire(L, LockMode::Exclusive).is_err());
	drop(a);
	assert!(!locks.is_available(L, LockMode::Exclusive));
	drop(b);
	assert!(locks.is_available(L, LockMode::Exclusive));
	assert_eq!(locks.held_mode(L), None);
}

#[test]
fn other_layers_are_independent() {
	let locks = ResourceLocks::new();
	let _a = locks.acquire(L, LockMode::Exclusive).expect("free");
	assert!(locks.acquire(LayerId(2), LockMode::Exclusive).is_ok());
}

#[test]
fn timed_wait_reports_timeout_without_error() {
	let locks = ResourceLocks::new();
	let _held = locks.acquire(L, LockMode::Exclusive).expect("free");
	let notifier = locks.notifier_for(L, LockMode::Shared);
	assert!(!notifier.is_available());
	assert!(!notifier.timed_wait(Duration::from_millis(20)));
}

#[test]
fn wait_wakes_on_release_from_another_thread() {
	let locks = ResourceLocks::new();
	let held = locks.acquire(L, LockMode::Exclusive).expect("free");
	let notifier = locks.notifier_for(L, LockMode::Exclusive);

	let waiter = thread::spawn(move || notifier.timed_wait(Duration::from_secs(5)));
	thread::sleep(Duration::from_millis(20));
	drop(held);
	assert!(waiter.join().expect("waiter thread"));
}

#[test]
fn concurrent_exclusive_holders_never_overlap() {
	let locks = ResourceLocks::new();
	let inside = Arc::new(AtomicUsize::new(0));
	let acquired = Arc::new(AtomicUsize::new(0));
	let threads: Vec<_> = (0..8)
		.map(|_| {
			let locks = locks.clone();
			let inside = Arc::clone(&inside);
			let acquired = Arc::clone(&acquired);
			thread::spawn(move || {
				for _ in 0..50 {
					let handle = loop {
						match locks.acquire(L, LockMode::Exclusive) {
							Ok(handle) => break handle,
							Err(ActionError::ResourceBusy { notifier, .. }) => notifier.wait(),
							Err(other) => panic!("unexpected {other}"),
						}
					};
					assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
					thread::yield_now();
					inside.fetch_sub(1, Ordering::SeqCst);
					acquired.fetch_add(1, Ordering::SeqCst);
					drop(handle);
				}
			})
		})
		.collect();
	for t in threads {
		t.join().expect("worker");
	}
	assert_eq!(acquired.load(Ordering::SeqCst), 400);
}

#[test]
fn release_listeners_fire() {
	let locks = ResourceLocks::new();
	let seen = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&seen);
	locks.on_release(move |layer| {
		assert_eq!(layer, L);
		counter.fetch_add(1, Ordering::SeqCst);
	});
	drop(locks.acquire(L, LockMode::Shared).expect("free"));
	assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[test]
fn notifier_outliving_table_never_blocks() {
	let locks = ResourceLocks::new();
	let notifier = locks.notifier_for(L, LockMode::Exclusive);
	drop(locks);
	assert!(notifier.is_available());
	notifier.wait();
	assert!(notifier.timed_wait(Duration::from_secs(5)));
}
