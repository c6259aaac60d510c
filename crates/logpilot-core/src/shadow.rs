//! Background shadow evaluation.
//!
//! Every synthesis prompt can be replayed against a second "shadow" model
//! off the request path. Requests hand jobs to a bounded queue through a
//! [`ShadowHandle`]; a single named worker thread generates with the shadow
//! model, times the call and writes a [`ShadowRecord`] to the configured
//! [`ShadowSink`]. A full queue drops the job: the primary answer never waits
//! on the shadow model, and a failing shadow model never affects it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::collaborators::{GenerationService, ModelTier, ShadowRecord, ShadowSink};
use crate::errors::PilotError;

/// One prompt to replay against the shadow model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowJob {
    pub prompt: String,
    /// The user's original question, stored with the outcome.
    pub query: String,
}

enum ShadowMessage {
    Job(ShadowJob),
    Shutdown,
}

/// Cheap, clonable submitter for shadow jobs.
#[derive(Clone)]
pub struct ShadowHandle {
    sender: Sender<ShadowMessage>,
    model: String,
}

impl ShadowHandle {
    /// Queue `job` without blocking. Returns `false` if it was dropped.
    pub fn submit(&self, job: ShadowJob) -> bool {
        match self.sender.try_send(ShadowMessage::Job(job)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("shadow: queue full, dropping job");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("shadow: worker stopped, dropping job");
                false
            }
        }
    }

    /// Name of the shadow model jobs are replayed against.
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for ShadowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowHandle")
            .field("model", &self.model)
            .field("queued", &self.sender.len())
            .finish()
    }
}

/// Owner of the shadow worker thread.
pub struct ShadowWorker {
    handle: ShadowHandle,
    thread: Option<JoinHandle<()>>,
}

impl ShadowWorker {
    /// Start the worker. `generator` must already be pinned to the shadow
    /// model; `model` is only the name recorded with each outcome.
    pub fn spawn(
        generator: Arc<dyn GenerationService>,
        sink: Arc<dyn ShadowSink>,
        model: impl Into<String>,
        capacity: usize,
    ) -> Result<Self, PilotError> {
        let model = model.into();
        let (sender, receiver) = bounded(capacity.max(1));

        let worker_model = model.clone();
        let thread = std::thread::Builder::new()
            .name("logpilot-shadow".into())
            .spawn(move || run_worker(receiver, generator, sink, worker_model))?;

        info!("shadow: evaluating against '{}'", model);
        Ok(Self {
            handle: ShadowHandle { sender, model },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> ShadowHandle {
        self.handle.clone()
    }

    /// Drain queued jobs and stop the worker.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        // Cloned handles keep the channel open, so stop with a sentinel.
        let _ = self.handle.sender.send(ShadowMessage::Shutdown);
        if thread.join().is_err() {
            warn!("shadow: worker thread panicked");
        }
    }
}

impl Drop for ShadowWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(
    receiver: Receiver<ShadowMessage>,
    generator: Arc<dyn GenerationService>,
    sink: Arc<dyn ShadowSink>,
    model: String,
) {
    while let Ok(message) = receiver.recv() {
        let job = match message {
            ShadowMessage::Job(job) => job,
            ShadowMessage::Shutdown => break,
        };

        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            generator.generate(&job.prompt, ModelTier::Fast)
        }));
        let latency = start.elapsed().as_secs_f64();

        let answer = match outcome {
            Ok(Ok(text)) => Some(text),
            Ok(Err(e)) => {
                warn!("shadow: generation failed: {}", e);
                None
            }
            Err(_) => {
                warn!("shadow: generation panicked");
                None
            }
        };

        let record = ShadowRecord {
            query: job.query,
            shadow_model: model.clone(),
            answer,
            latency,
        };
        if let Err(e) = sink.record(&record) {
            warn!("shadow: failed to store outcome: {}", e);
        } else {
            debug!("shadow: recorded in {:.2}s", latency);
        }
    }
    debug!("shadow: worker exiting");
}
