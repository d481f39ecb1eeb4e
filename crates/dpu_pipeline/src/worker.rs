//! Worker threads
//!
//! - [`CommitWorker`]: one per output, runs every commit of that output in
//!   order, so two commits of the same pipeline are never in flight together.
//! - [`DeferredWorker`]: picks up work interrupt handlers must not do
//!   themselves (capture job release, repeater publish, register dump logging).

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use dpu_hw::{DpuError, DpuResult, RegisterDump};

use crate::capture::CaptureJob;
use crate::completion::{Completion, CompletionStatus};
use crate::output::{CommitRequest, OutputController, OutputId};
use crate::repeater::RepeaterPool;

/// Work handed from interrupt context to the deferred worker
pub enum DeferredWork {
    /// Render and log a register dump
    LogDump { reason: String, dump: RegisterDump },
    /// Recycle a finished capture job's repeater buffer, publishing it
    /// downstream when the job succeeded
    ReleaseCapture {
        job: CaptureJob,
        status: CompletionStatus,
        pool: Arc<RepeaterPool>,
    },
}

impl DeferredWork {
    /// Execute the work item on the calling thread
    pub fn run(self) {
        match self {
            DeferredWork::LogDump { reason, dump } => {
                let rendered = serde_json::to_string(&dump)
                    .unwrap_or_else(|err| format!("<unrenderable dump: {}>", err));
                log::error!("{}: {}", reason, rendered);
            }
            DeferredWork::ReleaseCapture { job, status, pool } => {
                if let Some(index) = job.repeater() {
                    if status.is_ok() {
                        pool.publish(index, job.id());
                    } else {
                        pool.release(index);
                    }
                }
                log::debug!("Capture job {} released ({:?})", job.id(), status);
            }
        }
    }
}

enum DeferredMessage {
    Work(DeferredWork),
    Flush(Sender<()>),
    Stop,
}

/// Cloneable handle used to post deferred work
#[derive(Clone)]
pub struct DeferredHandle {
    sender: Option<Sender<DeferredMessage>>,
}

impl DeferredHandle {
    /// Handle that runs work on the posting thread, for setups without a
    /// deferred worker
    pub fn inline() -> Self {
        Self { sender: None }
    }

    /// Queue work; falls back to running it inline when no worker is alive
    pub fn post(&self, work: DeferredWork) {
        let Some(sender) = &self.sender else {
            work.run();
            return;
        };
        if let Err(err) = sender.send(DeferredMessage::Work(work)) {
            if let DeferredMessage::Work(work) = err.into_inner() {
                work.run();
            }
        }
    }

    /// Block until everything posted so far has run
    pub fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (tx, rx) = bounded(1);
        if sender.send(DeferredMessage::Flush(tx)).is_ok() {
            let _ = rx.recv();
        }
    }
}

/// Thread executing [`DeferredWork`]
pub struct DeferredWorker {
    sender: Sender<DeferredMessage>,
    thread: Option<JoinHandle<()>>,
}

impl DeferredWorker {
    /// Start the `dpu-deferred` thread
    pub fn spawn() -> DpuResult<Self> {
        let (sender, receiver) = unbounded();
        let thread = thread::Builder::new()
            .name("dpu-deferred".to_string())
            .spawn(move || Self::run(receiver))
            .map_err(|err| DpuError::ResourceExhausted(format!("deferred worker: {}", err)))?;

        log::info!("Deferred worker started");
        Ok(Self {
            sender,
            thread: Some(thread),
        })
    }

    fn run(receiver: Receiver<DeferredMessage>) {
        for message in receiver.iter() {
            match message {
                DeferredMessage::Work(work) => work.run(),
                DeferredMessage::Flush(done) => {
                    let _ = done.send(());
                }
                DeferredMessage::Stop => break,
            }
        }
    }

    pub fn handle(&self) -> DeferredHandle {
        DeferredHandle {
            sender: Some(self.sender.clone()),
        }
    }

    /// Drain queued work and stop the thread
    pub fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.sender.send(DeferredMessage::Stop);
            let _ = thread.join();
            log::info!("Deferred worker stopped");
        }
    }
}

impl Drop for DeferredWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

type CommitReply = Sender<DpuResult<Completion>>;

enum CommitMessage {
    Commit(CommitRequest, CommitReply),
    Stop,
}

/// Serializes the commits of one output on a dedicated thread
pub struct CommitWorker {
    output: OutputId,
    sender: Sender<CommitMessage>,
    thread: Option<JoinHandle<()>>,
}

impl CommitWorker {
    /// Start the `dpu-commit-<id>` thread with room for `queue_depth`
    /// queued commits
    pub fn spawn(controller: Arc<Mutex<OutputController>>, queue_depth: usize) -> DpuResult<Self> {
        let output = controller.lock().id();
        let (sender, receiver) = bounded(queue_depth.max(1));
        let thread = thread::Builder::new()
            .name(format!("dpu-commit-{}", output))
            .spawn(move || Self::run(controller, receiver))
            .map_err(|err| DpuError::ResourceExhausted(format!("commit worker: {}", err)))?;

        log::info!("Commit worker for output {} started", output);
        Ok(Self {
            output,
            sender,
            thread: Some(thread),
        })
    }

    fn run(controller: Arc<Mutex<OutputController>>, receiver: Receiver<CommitMessage>) {
        for message in receiver.iter() {
            match message {
                CommitMessage::Commit(request, reply) => {
                    let result = controller.lock().commit(request);
                    let _ = reply.send(result);
                }
                CommitMessage::Stop => break,
            }
        }
    }

    pub fn output(&self) -> OutputId {
        self.output
    }

    /// Queue a commit; the receiver yields its result. Fails with `Busy` when
    /// the queue is full.
    pub fn submit(&self, request: CommitRequest) -> DpuResult<Receiver<DpuResult<Completion>>> {
        let (reply, result) = bounded(1);
        match self.sender.try_send(CommitMessage::Commit(request, reply)) {
            Ok(()) => Ok(result),
            Err(TrySendError::Full(_)) => Err(DpuError::Busy(format!(
                "commit queue of output {} is full",
                self.output
            ))),
            Err(TrySendError::Disconnected(_)) => Err(self.stopped()),
        }
    }

    /// Queue a commit and wait for its result
    pub fn commit(&self, request: CommitRequest) -> DpuResult<Completion> {
        let result = self.submit(request)?;
        result.recv().map_err(|_| self.stopped())?
    }

    fn stopped(&self) -> DpuError {
        DpuError::Hardware {
            device: format!("output {}", self.output),
            reason: "commit worker stopped".into(),
        }
    }

    pub fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.sender.send(CommitMessage::Stop);
            let _ = thread.join();
            log::info!("Commit worker for output {} stopped", self.output);
        }
    }
}

impl Drop for CommitWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
