use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pending tasks admitted before `enqueue` starts rejecting.
const QUEUE_CAPACITY: usize = 64;

struct PoolState {
    queue: VecDeque<Job>,
    stop: bool,
}

struct Shared {
    state: Mutex<PoolState>,
    available: Condvar,
}

/// A fixed-size pool of worker threads draining a bounded FIFO queue.
///
/// Shutdown signals every worker, lets each finish the tasks already
/// queued, and joins them; no admitted task is dropped. Dropping the pool
/// shuts it down.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `workers` threads (at least one).
    pub fn new(workers: usize) -> Self {
        let count = workers.max(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                stop: false,
            }),
            available: Condvar::new(),
        });
        let handles = (0..count)
            .map(|i| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("kaiseki-worker-{i}"))
                    .spawn(move || worker_loop(&shared))
                    .expect("spawn worker thread")
            })
            .collect();
        log::info!("worker pool started with {count} threads");
        Self {
            shared,
            workers: handles,
        }
    }

    /// Half the hardware concurrency, minimum one worker.
    pub fn with_default_workers() -> Self {
        let parallelism = thread::available_parallelism().map_or(2, |n| n.get());
        Self::new((parallelism / 2).max(1))
    }

    /// Admits a task, or rejects it (with a diagnostic) once shutdown has
    /// been requested or the queue is full.
    pub fn enqueue<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.stop {
                log::error!("enqueue on a stopped worker pool");
                return false;
            }
            if state.queue.len() >= QUEUE_CAPACITY {
                log::error!("worker queue full, task rejected");
                return false;
            }
            state.queue.push_back(Box::new(task));
        }
        self.shared.available.notify_one();
        true
    }

    /// Requests shutdown, waits for queued tasks to drain, and joins every
    /// worker. Idempotent.
    pub fn shutdown(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.stop {
                return;
            }
            state.stop = true;
        }
        self.shared.available.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        log::info!("worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let task = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if let Some(task) = state.queue.pop_front() {
                    break task;
                }
                if state.stop {
                    return;
                }
                state = shared.available.wait(state).unwrap();
            }
        };
        task();
    }
}
