//! Background generation with newest-request-wins semantics.
//!
//! One worker thread owns every in-flight mesh. Requests are coalesced: when
//! several arrive while a run is busy, only the newest is started, and the
//! busy run is told to stop at its next checkpoint. A run's result becomes
//! visible only if no newer request arrived before it finished.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::Timing;
use crate::cancel::CancelToken;
use crate::config::GenerationRequest;
use crate::elevation::assign_elevation_with;
use crate::error::{EngineError, Result};
use crate::hydrology::assign_rivers_with;
use crate::mesh::Mesh;
use crate::sampler::choose_peaks;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Meshing,
    Elevating,
    Rivering,
    Ready,
    Failed,
}

/// Called with `(run, stage)` on every transition of the current run.
pub type StageObserver = Arc<dyn Fn(u64, Stage) + Send + Sync>;

/// The immutable result of a successful run.
#[derive(Debug, Serialize)]
pub struct Snapshot {
    pub run: u64,
    pub request: GenerationRequest,
    pub mesh: Mesh,
    pub peaks: Vec<u32>,
    pub timings: Vec<Timing>,
}

fn elapsed_ms(t: Instant) -> f64 {
    t.elapsed().as_secs_f64() * 1000.0
}

/// Run every stage in order on a fresh mesh.
pub(crate) fn run_stages(
    req: &GenerationRequest,
    cancel: &CancelToken,
    mut enter: impl FnMut(Stage),
) -> Result<(Mesh, Vec<u32>, Vec<Timing>)> {
    let mut timings = Vec::new();
    let total = Instant::now();

    enter(Stage::Meshing);
    let t = Instant::now();
    let mut mesh = Mesh::build_with(req.mesh.point_count, req.mesh.seed, cancel)?;
    let peaks = choose_peaks(&mesh, req.mesh.peak_count, req.mesh.seed);
    timings.push(Timing {
        name: "mesh",
        ms: elapsed_ms(t),
    });
    debug!(
        regions = mesh.num_regions(),
        triangles = mesh.num_triangles(),
        peaks = peaks.len(),
        ms = timings[0].ms,
        "meshing done"
    );
    cancel.checkpoint()?;

    enter(Stage::Elevating);
    let t = Instant::now();
    assign_elevation_with(&mut mesh, &peaks, &req.elevation, &req.constraints, cancel)?;
    timings.push(Timing {
        name: "elevation",
        ms: elapsed_ms(t),
    });
    cancel.checkpoint()?;

    enter(Stage::Rivering);
    let t = Instant::now();
    assign_rivers_with(&mut mesh, &req.rivers, cancel)?;
    timings.push(Timing {
        name: "rivers",
        ms: elapsed_ms(t),
    });
    cancel.checkpoint()?;

    timings.push(Timing {
        name: "TOTAL",
        ms: elapsed_ms(total),
    });
    Ok((mesh, peaks, timings))
}

/// Synchronous one-shot generation on the calling thread.
pub fn generate(req: &GenerationRequest) -> Result<(Snapshot, Vec<Timing>)> {
    let (mesh, peaks, timings) = run_stages(req, &CancelToken::never(), |_| {})?;
    let snapshot = Snapshot {
        run: 0,
        request: req.clone(),
        mesh,
        peaks,
        timings: timings.clone(),
    };
    Ok((snapshot, timings))
}

struct Job {
    run: u64,
    request: GenerationRequest,
}

struct Status {
    stage: Stage,
    /// Newest run id handed out; only this run may publish.
    run: u64,
    snapshot: Option<Arc<Snapshot>>,
    failure: Option<(u64, EngineError)>,
}

struct Shared {
    status: Mutex<Status>,
    changed: Condvar,
    latest: Arc<AtomicU64>,
    observer: Option<StageObserver>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, run: u64, stage: Stage) {
        self.changed.notify_all();
        if let Some(observer) = &self.observer {
            observer(run, stage);
        }
    }

    fn enter(&self, run: u64, stage: Stage) {
        {
            let mut status = self.lock();
            if status.run != run {
                return;
            }
            status.stage = stage;
        }
        self.notify(run, stage);
    }

    fn finish(&self, job: Job, result: Result<(Mesh, Vec<u32>, Vec<Timing>)>) {
        let run = job.run;
        let stage = match result {
            Ok((mesh, peaks, timings)) => {
                let mut status = self.lock();
                if status.run != run {
                    debug!(run, "finished run was superseded, discarding");
                    return;
                }
                let total = timings.last().map_or(0.0, |t| t.ms);
                status.snapshot = Some(Arc::new(Snapshot {
                    run,
                    request: job.request,
                    mesh,
                    peaks,
                    timings,
                }));
                status.failure = None;
                status.stage = Stage::Ready;
                info!(run, ms = total, "snapshot published");
                Stage::Ready
            }
            Err(EngineError::Cancelled) => {
                debug!(run, "run cancelled");
                return;
            }
            Err(err) => {
                if !self.fail(run, err) {
                    return;
                }
                Stage::Failed
            }
        };
        self.notify(run, stage);
    }

    /// Mark `run` failed unless it was superseded or has already settled.
    fn fail(&self, run: u64, err: EngineError) -> bool {
        let mut status = self.lock();
        if status.run != run || matches!(status.stage, Stage::Ready | Stage::Failed) {
            return false;
        }
        warn!(run, error = %err, "generation failed");
        status.failure = Some((run, err));
        status.stage = Stage::Failed;
        true
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn worker_loop(shared: Arc<Shared>, jobs: crossbeam_channel::Receiver<Job>) {
    while let Ok(mut job) = jobs.recv() {
        // Drain stale requests; only the newest queued one matters.
        while let Ok(newer) = jobs.try_recv() {
            job = newer;
        }
        if job.run != shared.latest.load(Ordering::Acquire) {
            continue;
        }
        let run = job.run;
        let cancel = CancelToken::for_run(Arc::clone(&shared.latest), run);
        // A panicking stage or observer fails the run; the worker keeps serving.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let result = run_stages(&job.request, &cancel, |stage| shared.enter(run, stage));
            shared.finish(job, result);
        }));
        if let Err(payload) = outcome {
            let err = EngineError::WorkerPanic(panic_message(payload.as_ref()));
            if shared.fail(run, err) {
                let notify = AssertUnwindSafe(|| shared.notify(run, Stage::Failed));
                let _ = panic::catch_unwind(notify);
            }
        }
    }
}

/// Owns the generation worker and the last published snapshot.
pub struct GenerationPipeline {
    shared: Arc<Shared>,
    sender: Option<crossbeam_channel::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl GenerationPipeline {
    pub fn new() -> Self {
        Self::spawn(None)
    }

    pub fn with_observer(observer: StageObserver) -> Self {
        Self::spawn(Some(observer))
    }

    fn spawn(observer: Option<StageObserver>) -> Self {
        let shared = Arc::new(Shared {
            status: Mutex::new(Status {
                stage: Stage::Idle,
                run: 0,
                snapshot: None,
                failure: None,
            }),
            changed: Condvar::new(),
            latest: Arc::new(AtomicU64::new(0)),
            observer,
        });
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker_shared = Arc::clone(&shared);
        // Spawn failure drops the receiver, so every request fails as unavailable.
        let worker = std::thread::Builder::new()
            .name("terrain-gen-worker".into())
            .spawn(move || worker_loop(worker_shared, rx))
            .map_err(|err| warn!(error = %err, "failed to spawn generation worker"))
            .ok();
        Self {
            shared,
            sender: Some(tx),
            worker,
        }
    }

    /// Queue a run for `req`, superseding anything in flight. Returns the run id.
    pub fn request(&self, req: GenerationRequest) -> u64 {
        let run = {
            let mut status = self.shared.lock();
            let run = self.shared.latest.fetch_add(1, Ordering::AcqRel) + 1;
            status.run = run;
            status.stage = Stage::Idle;
            run
        };
        self.shared.changed.notify_all();
        debug!(run, points = req.mesh.point_count, "generation requested");
        let sent = self
            .sender
            .as_ref()
            .is_some_and(|sender| sender.send(Job { run, request: req }).is_ok());
        if !sent && self.shared.fail(run, EngineError::WorkerUnavailable) {
            self.shared.notify(run, Stage::Failed);
        }
        run
    }

    /// Abandon the in-flight run, if any, and return to `Idle`.
    /// The last published snapshot stays available.
    pub fn cancel(&self) {
        let run = {
            let mut status = self.shared.lock();
            let run = self.shared.latest.fetch_add(1, Ordering::AcqRel) + 1;
            status.run = run;
            status.stage = Stage::Idle;
            run
        };
        debug!(run, "generation cancelled");
        self.shared.notify(run, Stage::Idle);
    }

    pub fn stage(&self) -> Stage {
        self.shared.lock().stage
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.shared.lock().snapshot.clone()
    }

    /// Block until `run` resolves. Superseded or unknown runs yield
    /// `EngineError::Cancelled` unless they published before being replaced.
    pub fn wait(&self, run: u64) -> Result<Arc<Snapshot>> {
        let mut status = self.shared.lock();
        loop {
            if let Some(snapshot) = status.snapshot.as_ref().filter(|s| s.run == run) {
                return Ok(Arc::clone(snapshot));
            }
            if status.run != run {
                return Err(EngineError::Cancelled);
            }
            match status.stage {
                Stage::Failed => {
                    return match &status.failure {
                        Some((r, err)) if *r == run => Err(err.clone()),
                        _ => Err(EngineError::Cancelled),
                    };
                }
                _ => {}
            }
            status = self
                .shared
                .changed
                .wait(status)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Default for GenerationPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GenerationPipeline {
    fn drop(&mut self) {
        self.shared.latest.fetch_add(1, Ordering::AcqRel);
        self.sender.take();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}
