//! Fixed set of download worker threads fed from a bounded queue

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Mutex, PoisonError},
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use thiserror::Error;

/// Upper bound for the configurable number of parallel downloads.
pub const MAX_WORKERS: usize = 10;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("download queue is full")]
    Saturated,

    #[error("download workers are shut down")]
    ShutDown,
}

pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    receiver: Receiver<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(MAX_WORKERS);
        let pool = Self {
            sender: Some(sender),
            receiver,
            workers: Mutex::new(Vec::new()),
        };
        pool.ensure_workers(workers);
        pool
    }

    /// Spawns workers until there are `count` of them (capped at [`MAX_WORKERS`]).
    ///
    /// Workers are never stopped early; admission decides how many are busy.
    pub fn ensure_workers(&self, count: usize) {
        let count = count.min(MAX_WORKERS);
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);

        while workers.len() < count {
            let index = workers.len();
            let receiver = self.receiver.clone();
            let spawned = thread::Builder::new()
                .name(format!("download-{index}"))
                .spawn(move || worker_loop(receiver));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    log::error!("failed to spawn download worker {index}: {e}");
                    break;
                }
            }
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn execute<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(PoolError::ShutDown)?;
        sender.try_send(Box::new(job)).map_err(|e| match e {
            TrySendError::Full(_) => PoolError::Saturated,
            TrySendError::Disconnected(_) => PoolError::ShutDown,
        })
    }
}

impl Drop for WorkerPool {
    /// Lets queued jobs finish, then joins every worker.
    fn drop(&mut self) {
        self.sender.take();
        let workers = std::mem::take(
            self.workers
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in workers {
            if handle.join().is_err() {
                log::error!("download worker exited abnormally");
            }
        }
    }
}

fn worker_loop(receiver: Receiver<Job>) {
    for job in receiver.iter() {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            log::error!("download job panicked");
        }
    }
}
