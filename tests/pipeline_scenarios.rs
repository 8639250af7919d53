use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use framewatch::detect::{BoundingBox, DetectionEngine, Target};
use framewatch::frame::Frame;
use framewatch::ingest::FrameSource;
use framewatch::pipeline::{Pipeline, PipelineSettings};
use framewatch::sink::{
    FramePersister, InMemoryFramePersister, InMemoryResultsSink, ResultsSink,
};

struct ScriptedSource {
    frames: VecDeque<Frame>,
}

impl ScriptedSource {
    fn with_frames(count: u64) -> Self {
        let frames = (1..=count)
            .map(|seq| Frame::new(seq, 4, 4, vec![seq as u8; 48]).unwrap())
            .collect();
        Self { frames }
    }
}

impl FrameSource for ScriptedSource {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }
}

struct EndlessSource {
    seq: u64,
}

impl FrameSource for EndlessSource {
    fn name(&self) -> String {
        "endless".to_string()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.seq += 1;
        Ok(Some(Frame::new(self.seq, 4, 4, vec![0u8; 48])?))
    }
}

/// Adds `hits[seq]` targets to a frame; panics on frames listed in `panic_on`.
#[derive(Default)]
struct ScriptedEngine {
    hits: HashMap<u64, usize>,
    panic_on: Vec<u64>,
}

impl DetectionEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn process_frame(&self, frame: &mut Frame) -> Result<()> {
        if self.panic_on.contains(&frame.seq) {
            panic!("scripted failure on frame {}", frame.seq);
        }
        let count = self.hits.get(&frame.seq).copied().unwrap_or(0);
        for i in 0..count {
            frame.add_target(format!("t{}", i), BoundingBox::new(i as u32, 0, 1, 1), 0.9);
        }
        Ok(())
    }
}

struct FailingSink;

impl ResultsSink for FailingSink {
    fn append(&self, _target: &Target) -> Result<()> {
        Err(anyhow!("disk full"))
    }
}

fn settings(workers: usize, intermediate: bool) -> PipelineSettings {
    PipelineSettings {
        intermediate,
        ingest_capacity: 8,
        poll_interval: Duration::from_millis(1),
        initial_latency_ms: 1.0,
        workers,
        ..PipelineSettings::default()
    }
}

fn pipeline(
    settings: PipelineSettings,
    source: impl FrameSource + 'static,
    engine: ScriptedEngine,
    sink: Arc<dyn ResultsSink>,
    persister: Arc<dyn FramePersister>,
) -> Pipeline {
    Pipeline::new(settings, Box::new(source), Arc::new(engine), sink, persister)
}

fn seqs_and_labels(records: &[Target]) -> Vec<(u64, String)> {
    records
        .iter()
        .map(|t| (t.frame_seq, t.label.clone()))
        .collect()
}

#[test]
fn empty_source_drains_immediately() {
    let sink = Arc::new(InMemoryResultsSink::new());
    let persister = Arc::new(InMemoryFramePersister::new());
    let pipeline = pipeline(
        settings(1, true),
        ScriptedSource::with_frames(0),
        ScriptedEngine::default(),
        sink.clone(),
        persister.clone(),
    );

    assert!(pipeline.start_ingestion().unwrap());
    pipeline.wait_for_stages();

    assert!(sink.records().is_empty());
    assert!(persister.saved().is_empty());
    assert!(pipeline.is_idle());
    pipeline.shutdown();
}

#[test]
fn detections_reach_sink_in_frame_order() {
    let sink = Arc::new(InMemoryResultsSink::new());
    let persister = Arc::new(InMemoryFramePersister::new());
    let engine = ScriptedEngine {
        hits: HashMap::from([(2, 2), (4, 1)]),
        ..ScriptedEngine::default()
    };
    let pipeline = pipeline(
        settings(1, true),
        ScriptedSource::with_frames(5),
        engine,
        sink.clone(),
        persister.clone(),
    );

    pipeline.start_ingestion().unwrap();
    pipeline.wait_for_stages();

    assert_eq!(
        seqs_and_labels(&sink.records()),
        vec![
            (2, "t0".to_string()),
            (2, "t1".to_string()),
            (4, "t0".to_string()),
        ]
    );
    assert_eq!(persister.saved(), vec![2, 4]);

    let status = pipeline.status();
    assert!(!status.state.ingesting);
    assert_eq!(status.state.active_workers, 0);
    assert_eq!(status.state.processed_count, 5);
    assert_eq!(status.stages_running, 0);
    pipeline.shutdown();
}

#[test]
fn intermediate_off_persists_nothing() {
    let sink = Arc::new(InMemoryResultsSink::new());
    let persister = Arc::new(InMemoryFramePersister::new());
    let engine = ScriptedEngine {
        hits: HashMap::from([(1, 1), (3, 1)]),
        ..ScriptedEngine::default()
    };
    let pipeline = pipeline(
        settings(1, false),
        ScriptedSource::with_frames(3),
        engine,
        sink.clone(),
        persister.clone(),
    );

    pipeline.start_ingestion().unwrap();
    pipeline.wait_for_stages();

    assert_eq!(sink.records().len(), 2);
    assert!(persister.saved().is_empty());
    pipeline.shutdown();
}

#[test]
fn targets_of_a_frame_stay_contiguous_across_workers() {
    let sink = Arc::new(InMemoryResultsSink::new());
    let hits = (1..=20).map(|seq| (seq, 3)).collect();
    let pipeline = pipeline(
        settings(4, false),
        ScriptedSource::with_frames(20),
        ScriptedEngine {
            hits,
            ..ScriptedEngine::default()
        },
        sink.clone(),
        Arc::new(InMemoryFramePersister::new()),
    );

    pipeline.start_ingestion().unwrap();
    pipeline.wait_for_stages();

    let records = sink.records();
    assert_eq!(records.len(), 60);
    for chunk in records.chunks(3) {
        let seq = chunk[0].frame_seq;
        let labels: Vec<&str> = chunk.iter().map(|t| t.label.as_str()).collect();
        assert!(chunk.iter().all(|t| t.frame_seq == seq));
        assert_eq!(labels, vec!["t0", "t1", "t2"]);
    }
    let mut seqs: Vec<u64> = records.iter().map(|t| t.frame_seq).collect();
    seqs.sort_unstable();
    seqs.dedup();
    assert_eq!(seqs, (1..=20).collect::<Vec<_>>());
    pipeline.shutdown();
}

#[test]
fn stop_ends_an_endless_source() {
    let sink = Arc::new(InMemoryResultsSink::new());
    let pipeline = pipeline(
        settings(2, false),
        EndlessSource { seq: 0 },
        ScriptedEngine::default(),
        sink,
        Arc::new(InMemoryFramePersister::new()),
    );

    assert!(pipeline.start_ingestion().unwrap());
    std::thread::sleep(Duration::from_millis(50));
    assert!(pipeline.stop_ingestion());
    assert!(!pipeline.stop_ingestion());
    pipeline.wait_for_stages();

    assert!(pipeline.is_idle());
    assert!(pipeline.state().processed_count() > 0);
    pipeline.shutdown();
}

/// Sleeps on every frame so dispatched work backs up behind the pool.
struct SlowEngine;

impl DetectionEngine for SlowEngine {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn process_frame(&self, _frame: &mut Frame) -> Result<()> {
        std::thread::sleep(Duration::from_millis(5));
        Ok(())
    }
}

#[test]
fn ingest_queue_never_exceeds_capacity() {
    let settings = PipelineSettings {
        ingest_capacity: 3,
        initial_latency_ms: 5.0,
        ..settings(1, false)
    };
    let pipeline = Pipeline::new(
        settings,
        Box::new(EndlessSource { seq: 0 }),
        Arc::new(SlowEngine),
        Arc::new(InMemoryResultsSink::new()),
        Arc::new(InMemoryFramePersister::new()),
    );

    pipeline.start_ingestion().unwrap();
    for _ in 0..100 {
        assert!(pipeline.status().ingest_queued <= 3);
        std::thread::sleep(Duration::from_millis(1));
    }
    pipeline.stop_ingestion();
    pipeline.shutdown();
    assert!(pipeline.is_idle());
}

#[test]
fn quick_stop_start_keeps_every_stage_running() {
    let pipeline = pipeline(
        settings(2, false),
        EndlessSource { seq: 0 },
        ScriptedEngine::default(),
        Arc::new(InMemoryResultsSink::new()),
        Arc::new(InMemoryFramePersister::new()),
    );

    assert!(pipeline.start_ingestion().unwrap());
    for _ in 0..25 {
        assert!(pipeline.stop_ingestion());
        assert!(pipeline.start_ingestion().unwrap());
        std::thread::sleep(Duration::from_millis(2));
    }
    std::thread::sleep(Duration::from_millis(50));

    let before = pipeline.state().processed_count();
    let status = pipeline.status();
    assert!(status.state.ingesting);
    assert_eq!(status.stages_running, 3);
    std::thread::sleep(Duration::from_millis(50));
    assert!(pipeline.state().processed_count() > before);

    assert!(pipeline.stop_ingestion());
    pipeline.wait_for_stages();
    assert!(pipeline.is_idle());
    pipeline.shutdown();
}

#[test]
fn restart_after_drain_runs_again() {
    let sink = Arc::new(InMemoryResultsSink::new());
    let engine = ScriptedEngine {
        hits: HashMap::from([(1, 1)]),
        ..ScriptedEngine::default()
    };
    let pipeline = pipeline(
        settings(1, false),
        ScriptedSource::with_frames(3),
        engine,
        sink.clone(),
        Arc::new(InMemoryFramePersister::new()),
    );

    assert!(pipeline.start_ingestion().unwrap());
    pipeline.wait_for_stages();
    assert!(pipeline.start_ingestion().unwrap());
    pipeline.wait_for_stages();

    assert_eq!(sink.records().len(), 1);
    assert_eq!(pipeline.state().processed_count(), 3);
    assert!(pipeline.is_idle());
    pipeline.shutdown();
}

#[test]
fn failing_sink_does_not_stall_the_pipeline() {
    let persister = Arc::new(InMemoryFramePersister::new());
    let engine = ScriptedEngine {
        hits: HashMap::from([(1, 2), (2, 1)]),
        ..ScriptedEngine::default()
    };
    let pipeline = pipeline(
        settings(1, true),
        ScriptedSource::with_frames(2),
        engine,
        Arc::new(FailingSink),
        persister.clone(),
    );

    pipeline.start_ingestion().unwrap();
    pipeline.wait_for_stages();

    assert_eq!(persister.saved(), vec![1, 2]);
    assert!(pipeline.is_idle());
    pipeline.shutdown();
}

#[test]
fn panicking_detector_releases_its_worker() {
    let sink = Arc::new(InMemoryResultsSink::new());
    let engine = ScriptedEngine {
        hits: HashMap::from([(1, 1), (3, 1)]),
        panic_on: vec![2],
    };
    let pipeline = pipeline(
        settings(1, false),
        ScriptedSource::with_frames(3),
        engine,
        sink.clone(),
        Arc::new(InMemoryFramePersister::new()),
    );

    pipeline.start_ingestion().unwrap();
    pipeline.wait_for_stages();

    assert_eq!(pipeline.state().active_workers(), 0);
    let seqs: Vec<u64> = sink.records().iter().map(|t| t.frame_seq).collect();
    assert_eq!(seqs, vec![1, 3]);
    assert_eq!(pipeline.state().processed_count(), 2);
    pipeline.shutdown();
}
