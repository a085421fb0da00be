//! Drives a frame pump on its own thread.
//!
//! The worker sleeps on a condvar until the next tick is due. It only holds
//! the pump lock to hand work out and take results back: the read, the
//! detection and a source switch's open all run with the lock released.
//! Commands from [`PumpHandle`] therefore take effect immediately, even while
//! a network read is stalled, and late results are dropped by the pump's
//! generation check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use crate::error::OpenError;
use crate::events::{EventError, SourceCommand, UiEvent, UploadPolicy};
use crate::ingest::FrameSourceDescriptor;
use crate::pump::{FramePump, PipelineState, PumpStats};

struct Shared {
    pump: Mutex<FramePump>,
    // Signalled on every command and every state change.
    wake: Condvar,
    shutdown: AtomicBool,
    // One source switch at a time.
    selecting: Mutex<()>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, FramePump> {
        self.pump.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Thread-safe entry point for UI collaborators.
#[derive(Clone)]
pub struct PumpHandle {
    shared: Arc<Shared>,
    uploads: UploadPolicy,
}

impl PumpHandle {
    /// Switch sources. Blocks the caller, not the pump, while the old source
    /// finishes an outstanding read and the new one connects.
    pub fn select_source(&self, descriptor: FrameSourceDescriptor) -> Result<(), OpenError> {
        let _selecting = self
            .shared
            .selecting
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let job = {
            let mut pump = self.shared.lock();
            let job = pump.begin_select(descriptor);
            // The old source must be closed before the new one opens.
            while pump.is_reading() && !self.shared.shutdown.load(Ordering::SeqCst) {
                pump = self
                    .shared
                    .wake
                    .wait(pump)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            job
        };
        self.shared.wake.notify_all();

        let opened = job.run();
        let result = self.shared.lock().complete_select(opened);
        self.shared.wake.notify_all();
        result
    }

    pub fn reset(&self) {
        self.shared.lock().reset();
        self.shared.wake.notify_all();
    }

    /// Route a UI event to the pump.
    ///
    /// Rejected events leave the pipeline untouched. Open failures are not
    /// returned here; they show up as `PipelineState::Failed`.
    pub fn dispatch(&self, event: UiEvent) -> Result<(), EventError> {
        let Some(command) = event.into_command(&self.uploads)? else {
            return Ok(());
        };
        match command {
            // The failure is already recorded in the pump state.
            SourceCommand::Select(descriptor) => {
                let _ = self.select_source(descriptor);
            }
            SourceCommand::Reset => self.reset(),
        }
        Ok(())
    }

    pub fn state(&self) -> PipelineState {
        self.shared.lock().state().clone()
    }

    pub fn stats(&self) -> PumpStats {
        self.shared.lock().stats()
    }

    /// Block until the pipeline is no longer `Running`, or `timeout` passes.
    pub fn wait_while_running(&self, timeout: Duration) -> PipelineState {
        let deadline = Instant::now() + timeout;
        let mut pump = self.shared.lock();
        while pump.state().is_running() && !self.shared.shutdown.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            pump = self
                .shared
                .wake
                .wait_timeout(pump, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        pump.state().clone()
    }
}

/// Owns the worker thread.
pub struct PumpRunner {
    handle: PumpHandle,
    join: Option<JoinHandle<()>>,
}

impl PumpRunner {
    pub fn spawn(pump: FramePump, uploads: UploadPolicy) -> Result<Self> {
        let shared = Arc::new(Shared {
            pump: Mutex::new(pump),
            wake: Condvar::new(),
            shutdown: AtomicBool::new(false),
            selecting: Mutex::new(()),
        });
        let worker = Arc::clone(&shared);
        let join = std::thread::Builder::new()
            .name("frame-pump".to_string())
            .spawn(move || run_pump(&worker))
            .context("spawn frame pump thread")?;
        Ok(Self {
            handle: PumpHandle { shared, uploads },
            join: Some(join),
        })
    }

    pub fn handle(&self) -> PumpHandle {
        self.handle.clone()
    }

    /// Reset the pipeline (closing any source) and join the worker.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown();
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("frame pump thread panicked"))?;
        }
        Ok(())
    }

    fn shutdown(&self) {
        let shared = &self.handle.shared;
        shared.lock().reset();
        shared.shutdown.store(true, Ordering::SeqCst);
        shared.wake.notify_all();
    }
}

impl Drop for PumpRunner {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            self.shutdown();
            let _ = join.join();
        }
    }
}

fn run_pump(shared: &Shared) {
    log::debug!("pump runner started");
    loop {
        let read = {
            let mut pump = shared.lock();
            loop {
                if shared.shutdown.load(Ordering::SeqCst) {
                    log::debug!("pump runner stopped");
                    return;
                }
                let Some(deadline) = pump.next_deadline() else {
                    pump = shared.wake.wait(pump).unwrap_or_else(PoisonError::into_inner);
                    continue;
                };
                let now = Instant::now();
                if now < deadline {
                    pump = shared
                        .wake
                        .wait_timeout(pump, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                    continue;
                }
                match pump.begin_tick() {
                    Some(read) => break read,
                    None => {
                        pump = shared.wake.wait(pump).unwrap_or_else(PoisonError::into_inner);
                    }
                }
            }
        };

        let frame = read.run();

        let job = shared.lock().finish_read(frame);
        // Wakes selectors waiting for the source, and state watchers.
        shared.wake.notify_all();
        let Some(job) = job else {
            continue;
        };

        let done = job.run();

        shared.lock().complete_tick(done);
        shared.wake.notify_all();
    }
}
