//! A worker-thread pool for running blocking engine calls from async tasks.
//!
//! The pool owns a fixed set of worker threads, each with its own queue.
//! Jobs are plain closures; [`OffloadPool::spawn`] returns an
//! [`OffloadHandle`] future that resolves to the closure's return value once
//! a worker has run it.
//!
//! Two scheduling modes exist. [`Affinity::Any`] distributes jobs round-robin
//! across the workers. [`Affinity::Chain`] pins every job carrying the same
//! [`ChainId`] to one worker, so those jobs execute in submission order on a
//! consistent thread. Store handles use a chain per store, which is what
//! keeps engine calls that share connection state off of each other's toes.
//!
//! A panic inside a job does not kill the worker: the payload is captured
//! and re-raised inside the awaiting task when the handle is polled.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{Sender, channel};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};
use std::thread::{self, JoinHandle};

/// Identity of a pinned submission sequence.
///
/// All jobs spawned with the same chain run on the same worker thread, in
/// submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(u64);

impl ChainId {
    /// Allocate a fresh process-unique chain.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Where a job may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    /// Any worker; the pool balances round-robin.
    Any,
    /// The worker owning this chain.
    Chain(ChainId),
}

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Worker {
    sender: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

/// Fixed-size pool of offload worker threads.
pub struct OffloadPool {
    workers: Vec<Worker>,
    next: AtomicUsize,
}

impl OffloadPool {
    /// Start a pool with `threads` workers (at least one).
    pub fn new(threads: usize) -> io::Result<Self> {
        let threads = threads.max(1);
        let mut workers = Vec::with_capacity(threads);
        for idx in 0..threads {
            let (sender, receiver) = channel::<Job>();
            let thread = thread::Builder::new()
                .name(format!("restmodel-offload-{idx}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                })?;
            workers.push(Worker {
                sender: Some(sender),
                thread: Some(thread),
            });
        }
        tracing::debug!(threads, "offload pool started");
        Ok(Self {
            workers,
            next: AtomicUsize::new(0),
        })
    }

    /// Start a pool sized to the machine's available parallelism.
    pub fn with_default_size() -> io::Result<Self> {
        let threads = thread::available_parallelism().map_or(4, std::num::NonZero::get);
        Self::new(threads)
    }

    /// Number of worker threads.
    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    fn worker_index(&self, affinity: Affinity) -> usize {
        match affinity {
            Affinity::Any => self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len(),
            Affinity::Chain(ChainId(id)) => (id as usize) % self.workers.len(),
        }
    }

    /// Submit a blocking closure and get a future for its result.
    ///
    /// Submitted jobs always run to completion on their worker; dropping
    /// the handle does not abandon the job.
    pub fn spawn<T, F>(&self, affinity: Affinity, job: F) -> OffloadHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let shared: Arc<Shared<T>> = Arc::new(Shared {
            state: Mutex::new(State {
                result: None,
                waker: None,
            }),
        });
        let completer = Arc::clone(&shared);
        let wrapped: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(job));
            completer.complete(result);
        });

        let index = self.worker_index(affinity);
        let delivered = self
            .workers
            .get(index)
            .and_then(|w| w.sender.as_ref())
            .is_some_and(|sender| sender.send(wrapped).is_ok());
        if !delivered {
            // Worker gone mid-shutdown; surface it as a panic in the
            // awaiting task rather than hanging the handle forever.
            shared.complete(Err(Box::new("offload worker unavailable")));
        }
        OffloadHandle { shared }
    }
}

impl Drop for OffloadPool {
    fn drop(&mut self) {
        for worker in &mut self.workers {
            worker.sender.take();
        }
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

struct State<T> {
    result: Option<thread::Result<T>>,
    waker: Option<Waker>,
}

struct Shared<T> {
    state: Mutex<State<T>>,
}

impl<T> Shared<T> {
    fn complete(&self, result: thread::Result<T>) {
        let waker = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.result = Some(result);
            state.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// Future for a spawned job's return value.
///
/// If the job panicked, polling re-raises the original payload in the
/// awaiting task.
pub struct OffloadHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Future for OffloadHandle<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(result) = state.result.take() {
            drop(state);
            match result {
                Ok(value) => Poll::Ready(value),
                Err(payload) => panic::resume_unwind(payload),
            }
        } else {
            match &mut state.waker {
                Some(existing) if existing.will_wake(cx.waker()) => {}
                slot => *slot = Some(cx.waker().clone()),
            }
            Poll::Pending
        }
    }
}
