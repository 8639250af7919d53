//! Execution lanes for the pipeline.
//!
//! - Task lane: a bounded pool running short detection tasks. It grows by one
//!   thread per submission until it reaches its ceiling and never shrinks.
//! - Stage lane: one dedicated thread per long-lived stage loop.
//!
//! Stage loops never occupy a task-lane thread, so a pool of any size always
//! has room for detection work.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard};
use std::thread::JoinHandle;

type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct Scheduler {
    max_workers: usize,
    sender: Mutex<Option<Sender<Task>>>,
    receiver: Receiver<Task>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stages: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Scheduler whose task lane holds at most `max_workers` threads.
    pub fn new(max_workers: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            max_workers: max_workers.max(1),
            sender: Mutex::new(Some(sender)),
            receiver,
            workers: Mutex::new(Vec::new()),
            stages: Mutex::new(Vec::new()),
        }
    }

    /// Scheduler sized to the machine's available parallelism.
    pub fn with_hardware_concurrency() -> Self {
        Self::new(hardware_concurrency())
    }

    /// Ceiling of the task lane.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Task-lane threads started so far.
    pub fn worker_count(&self) -> usize {
        lock(&self.workers).len()
    }

    /// Queue a task on the task lane.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let sender = lock(&self.sender);
            let sender = sender
                .as_ref()
                .ok_or_else(|| anyhow!("scheduler is shut down"))?;
            sender
                .send(Box::new(task))
                .map_err(|_| anyhow!("task lane disconnected"))?;
        }
        self.grow()
    }

    /// Run a long-lived loop on its own named thread.
    pub fn spawn_stage<F>(&self, name: &str, stage: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = std::thread::Builder::new()
            .name(format!("stage-{}", name))
            .spawn(stage)
            .with_context(|| format!("failed to spawn stage {}", name))?;
        lock(&self.stages).push(handle);
        log::debug!("stage {} scheduled", name);
        Ok(())
    }

    /// Block until every stage loop spawned so far, and any spawned meanwhile, has exited.
    pub fn join_stages(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = lock(&self.stages).drain(..).collect();
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                let name = handle.thread().name().unwrap_or("stage").to_string();
                if let Err(panic) = handle.join() {
                    log::error!("{} panicked: {}", name, panic_message(&*panic));
                }
            }
        }
    }

    /// Stop accepting tasks, let queued tasks finish, and join the task lane.
    pub fn shutdown(&self) {
        lock(&self.sender).take();
        let workers: Vec<JoinHandle<()>> = lock(&self.workers).drain(..).collect();
        for handle in workers {
            let _ = handle.join();
        }
    }

    fn grow(&self) -> Result<()> {
        let mut workers = lock(&self.workers);
        if workers.len() >= self.max_workers {
            return Ok(());
        }
        let index = workers.len();
        let receiver = self.receiver.clone();
        let handle = std::thread::Builder::new()
            .name(format!("detect-{}", index))
            .spawn(move || run_tasks(receiver))
            .context("failed to spawn task worker")?;
        workers.push(handle);
        log::trace!("task lane grew to {} workers", workers.len());
        Ok(())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Disconnect only; the last owner may be a task-lane thread, which cannot join itself.
        lock(&self.sender).take();
    }
}

fn run_tasks(receiver: Receiver<Task>) {
    for task in receiver.iter() {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(task)) {
            log::error!("detection task panicked: {}", panic_message(&*panic));
        }
    }
}

/// Number of hardware threads, or 1 when it cannot be determined.
pub fn hardware_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
