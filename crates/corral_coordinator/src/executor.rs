//! Bounded worker pool.
//!
//! A fixed set of OS threads draining one task channel. The membership
//! sweeper runs here alongside caller-supplied deferred work. Shutdown stops
//! intake and joins the workers; in-flight tasks run to completion (no hard
//! timeout — callers that need one apply it externally).

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, info};

type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct Executor {
    tx: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Executor {
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (tx, rx) = mpsc::channel::<Task>();
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..worker_count)
            .map(|index| {
                let rx = Arc::clone(&rx);
                std::thread::Builder::new()
                    .name(format!("corral-worker-{index}"))
                    .spawn(move || worker_loop(rx))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        debug!(workers = worker_count, "Executor started");
        Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    /// Queue a task. False if the executor has shut down.
    pub fn spawn<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match tx.as_ref() {
            Some(tx) => tx.send(Box::new(task)).is_ok(),
            None => false,
        }
    }

    /// Stop intake and wait for every worker to finish its queue.
    /// Idempotent.
    pub fn shutdown(&self) {
        {
            let mut tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
            if tx.take().is_none() {
                return;
            }
        }

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }
        info!("Executor drained");
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(rx: Arc<Mutex<Receiver<Task>>>) {
    loop {
        let task = {
            let guard = rx.lock().unwrap_or_else(PoisonError::into_inner);
            guard.recv()
        };
        match task {
            Ok(task) => task(),
            Err(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn runs_queued_tasks() {
        let executor = Executor::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..32 {
            let counter = counter.clone();
            assert!(executor.spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        executor.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn spawn_after_shutdown_is_rejected() {
        let executor = Executor::new(1);
        executor.shutdown();
        assert!(!executor.spawn(|| {}));
    }

    #[test]
    fn shutdown_waits_for_in_flight_tasks() {
        let executor = Executor::new(2);
        let done = Arc::new(AtomicUsize::new(0));
        let flag = done.clone();
        executor.spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            flag.fetch_add(1, Ordering::SeqCst);
        });

        executor.shutdown();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
