use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use terrain_mesh::{
    EngineError, GenerationPipeline, GenerationRequest, MeshParams, Stage, StageObserver,
};

const TIMEOUT: Duration = Duration::from_secs(30);

fn request(seed: u64) -> GenerationRequest {
    GenerationRequest {
        mesh: MeshParams {
            point_count: 400,
            seed,
            peak_count: 4,
        },
        ..Default::default()
    }
}

/// Observer that records every transition and parks the worker when run 1
/// enters `Elevating` until the test releases it.
struct Gate {
    seen: Arc<Mutex<Vec<(u64, Stage)>>>,
    parked: Receiver<()>,
    release: Sender<()>,
}

fn gated_pipeline() -> (GenerationPipeline, Gate) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (parked_tx, parked_rx) = crossbeam_channel::unbounded();
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
    let log = Arc::clone(&seen);
    let observer: StageObserver = Arc::new(move |run, stage| {
        log.lock().unwrap().push((run, stage));
        if run == 1 && stage == Stage::Elevating {
            parked_tx.send(()).unwrap();
            let _ = release_rx.recv();
        }
    });
    let gate = Gate {
        seen,
        parked: parked_rx,
        release: release_tx,
    };
    (GenerationPipeline::with_observer(observer), gate)
}

#[test]
fn regenerate_during_elevation_publishes_only_the_newer_run() {
    let (pipeline, gate) = gated_pipeline();

    let first = pipeline.request(request(1));
    assert_eq!(first, 1);
    gate.parked.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(pipeline.stage(), Stage::Elevating);

    let second = pipeline.request(request(2));
    gate.release.send(()).unwrap();

    let snapshot = pipeline.wait(second).unwrap();
    assert_eq!(snapshot.run, second);
    assert_eq!(snapshot.request.mesh.seed, 2);
    assert_eq!(pipeline.wait(first).unwrap_err(), EngineError::Cancelled);
    assert_eq!(pipeline.stage(), Stage::Ready);

    let seen = gate.seen.lock().unwrap().clone();
    assert!(!seen.contains(&(first, Stage::Ready)));
    assert!(!seen.contains(&(first, Stage::Rivering)));
    assert!(seen.contains(&(second, Stage::Ready)));
}

#[test]
fn stale_queued_requests_are_dropped() {
    let (pipeline, gate) = gated_pipeline();

    pipeline.request(request(1));
    gate.parked.recv_timeout(TIMEOUT).unwrap();
    let skipped: Vec<u64> = (2..4).map(|s| pipeline.request(request(s))).collect();
    let last = pipeline.request(request(4));
    gate.release.send(()).unwrap();

    assert_eq!(pipeline.wait(last).unwrap().run, last);
    let seen = gate.seen.lock().unwrap().clone();
    for run in skipped {
        assert!(seen.iter().all(|&(r, _)| r != run), "run {run} should never start");
        assert_eq!(pipeline.wait(run).unwrap_err(), EngineError::Cancelled);
    }
}

#[test]
fn cancel_returns_to_idle() {
    let (pipeline, gate) = gated_pipeline();

    let run = pipeline.request(request(1));
    gate.parked.recv_timeout(TIMEOUT).unwrap();
    pipeline.cancel();
    assert_eq!(pipeline.stage(), Stage::Idle);
    gate.release.send(()).unwrap();

    assert_eq!(pipeline.wait(run).unwrap_err(), EngineError::Cancelled);
    assert!(pipeline.snapshot().is_none());

    // The pipeline stays usable after a cancel.
    let next = pipeline.request(request(5));
    assert_eq!(pipeline.wait(next).unwrap().run, next);
}

#[test]
fn published_snapshot_survives_later_failure() {
    let pipeline = GenerationPipeline::new();
    let good = pipeline.request(request(7));
    pipeline.wait(good).unwrap();

    let mut bad = request(8);
    bad.mesh.point_count = 1;
    let run = pipeline.request(bad);
    assert!(matches!(pipeline.wait(run), Err(EngineError::DegenerateInput(_))));
    assert_eq!(pipeline.stage(), Stage::Failed);
    assert_eq!(pipeline.snapshot().map(|s| s.run), Some(good));
}

#[test]
fn panicking_run_fails_and_worker_survives() {
    let observer: StageObserver = Arc::new(|run, stage| {
        if run == 1 && stage == Stage::Elevating {
            panic!("observer exploded");
        }
    });
    let pipeline = GenerationPipeline::with_observer(observer);

    let first = pipeline.request(request(1));
    match pipeline.wait(first) {
        Err(EngineError::WorkerPanic(msg)) => assert!(msg.contains("observer exploded")),
        other => panic!("expected a worker panic, got {other:?}"),
    }
    assert_eq!(pipeline.stage(), Stage::Failed);

    let second = pipeline.request(request(2));
    assert_eq!(pipeline.wait(second).unwrap().run, second);
    assert_eq!(pipeline.stage(), Stage::Ready);
}
