use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use futures::{StreamExt, channel::mpsc};
use tokio_util::sync::CancellationToken;
use volume_segmenter::{
    ClassScoreBlock, EdgeCoverage, InferenceError, InferenceSession, ModelRuntime,
    PipelineConfig, PipelineError, ProgressEvent, RetryPolicy, RunState, Shape,
    SlidingWindowRun, Volume, WindowPosition, WindowTensor, segment_volume,
};

fn scores_for(tensor: &WindowTensor, num_classes: usize, class: usize) -> ClassScoreBlock {
    let crop = tensor.crop_dims();
    let n = crop.len();
    let mut data = vec![0.0; num_classes * n];
    data[class * n..(class + 1) * n].fill(1.0);
    ClassScoreBlock::new(data, vec![1, num_classes, crop.depth, crop.height, crop.width])
}

/// Always predicts `class` with probability 1.0 and counts its calls.
struct ConstantSession {
    class: usize,
    calls: Arc<AtomicUsize>,
}

impl ConstantSession {
    fn new(class: usize) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                class,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl InferenceSession for ConstantSession {
    async fn run(&mut self, tensor: &WindowTensor) -> Result<ClassScoreBlock, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(scores_for(tensor, 2, self.class))
    }
}

/// Labels every window with its own 1-based call number.
#[derive(Default)]
struct CountingSession {
    calls: usize,
}

impl InferenceSession for CountingSession {
    async fn run(&mut self, tensor: &WindowTensor) -> Result<ClassScoreBlock, InferenceError> {
        self.calls += 1;
        Ok(scores_for(tensor, 32, self.calls))
    }
}

/// Fails the calls whose 0-based numbers are listed, succeeds otherwise.
struct FlakySession {
    failing_calls: Vec<usize>,
    calls: usize,
}

impl InferenceSession for FlakySession {
    async fn run(&mut self, tensor: &WindowTensor) -> Result<ClassScoreBlock, InferenceError> {
        let call = self.calls;
        self.calls += 1;
        if self.failing_calls.contains(&call) {
            return Err(InferenceError::run(format!("call {call} failed")));
        }
        Ok(scores_for(tensor, 2, 1))
    }
}

struct ConstantRuntime;

impl ModelRuntime for ConstantRuntime {
    type Session = ConstantSession;

    async fn load(&self, model: &str) -> Result<ConstantSession, InferenceError> {
        if model.is_empty() {
            return Err(InferenceError::load(model, "empty model path"));
        }
        Ok(ConstantSession::new(1).0)
    }
}

fn zeros(shape: Shape) -> Volume {
    Volume::from_shape_vec(shape, vec![0.0; shape.len()]).unwrap()
}

#[tokio::test]
async fn all_zero_volume_is_fully_labelled_after_27_windows() {
    let volume = zeros(Shape::cube(128));
    let (session, calls) = ConstantSession::new(1);
    let run = SlidingWindowRun::new(session, &volume, &PipelineConfig::default()).unwrap();
    assert_eq!(run.total_windows(), 27);

    let mut window_events = Vec::new();
    let mut finished = 0;
    let labels = run
        .run_with_sink(|event| match event {
            ProgressEvent::Window(progress) => {
                window_events.push((progress.index, progress.total, progress.position))
            }
            ProgressEvent::Finished(labels) => {
                finished += 1;
                assert!(labels.as_slice().iter().all(|&l| l == 1));
            }
        })
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 27);
    assert_eq!(window_events.len(), 27);
    assert_eq!(finished, 1);
    assert!(window_events.iter().enumerate().all(|(i, e)| e.0 == i && e.1 == 27));
    assert_eq!(window_events[0].2, WindowPosition::new(0, 0, 0));
    assert_eq!(window_events[26].2, WindowPosition::new(64, 64, 64));
    assert_eq!(labels.shape(), Shape::cube(128));
    assert!(labels.as_slice().iter().all(|&l| l == 1));
}

#[tokio::test]
async fn progress_grows_monotonically() {
    let volume = zeros(Shape::cube(96));
    let (session, _) = ConstantSession::new(1);
    let mut run = SlidingWindowRun::new(session, &volume, &PipelineConfig::default()).unwrap();
    assert_eq!(run.state(), RunState::Idle);

    let mut labelled = 0;
    while let Some(progress) = run.next_window().await {
        let progress = progress.unwrap();
        let now = progress.labels.as_slice().iter().filter(|&&l| l == 1).count();
        assert!(now > labelled, "window {} added no labels", progress.index);
        labelled = now;
    }
    assert_eq!(run.state(), RunState::Done);
    assert_eq!(run.completed_windows(), 8);
    assert_eq!(labelled, 96 * 96 * 96);
    assert!(run.next_window().await.is_none());
}

#[tokio::test]
async fn later_windows_overwrite_overlaps() {
    let volume = zeros(Shape::cube(128));
    let run = SlidingWindowRun::new(CountingSession::default(), &volume, &PipelineConfig::default())
        .unwrap();
    let labels = run.run_with_sink(|_| {}).await.unwrap();
    let data = labels.data();

    // Only the first window covers the origin corner.
    assert_eq!(data[(0, 0, 0)], 1);
    // (40, 40, 40) lies in windows starting at 0 and 32 on each axis; the
    // last of those in z-y-x order is (32, 32, 32), window 13.
    assert_eq!(data[(40, 40, 40)], 14);
    // The far corner is only covered by the last window.
    assert_eq!(data[(127, 127, 127)], 27);
    // (10, 70, 100): z-origin 0, y-origins 32/64, x-origins 64 -> last is (0, 64, 64).
    assert_eq!(data[(10, 70, 100)], 9);
}

#[tokio::test]
async fn degenerate_volume_finishes_without_windows() {
    let volume = zeros(Shape::new(32, 128, 128));
    let (session, calls) = ConstantSession::new(1);
    let mut events = 0;
    let labels = SlidingWindowRun::new(session, &volume, &PipelineConfig::default())
        .unwrap()
        .run_with_sink(|event| {
            assert!(matches!(event, ProgressEvent::Finished(_)));
            events += 1;
        })
        .await
        .unwrap();

    assert_eq!(events, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(labels.shape(), Shape::new(32, 128, 128));
    assert!(labels.as_slice().iter().all(|&l| l == 0));
}

#[tokio::test]
async fn inference_failure_aborts_and_keeps_partial_labels() {
    let volume = zeros(Shape::cube(96));
    let session = FlakySession {
        failing_calls: vec![2],
        calls: 0,
    };
    let mut run = SlidingWindowRun::new(session, &volume, &PipelineConfig::default()).unwrap();

    assert!(run.next_window().await.unwrap().is_ok());
    assert!(run.next_window().await.unwrap().is_ok());
    let err = run.next_window().await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Inference {
            window: 2,
            position: WindowPosition { z: 0, y: 32, x: 0 },
            attempts: 1,
            ..
        }
    ));
    assert_eq!(run.state(), RunState::Failed);
    assert!(run.next_window().await.is_none());

    // The two finished windows stay in place.
    assert_eq!(run.completed_windows(), 2);
    let labels = run.labels().data();
    assert_eq!(labels[(0, 0, 0)], 1);
    assert_eq!(labels[(0, 0, 95)], 1);
    assert_eq!(labels[(95, 95, 95)], 0);
}

#[tokio::test]
async fn sink_sees_progress_up_to_the_failure() {
    let volume = zeros(Shape::cube(96));
    let session = FlakySession {
        failing_calls: vec![5],
        calls: 0,
    };
    let mut seen = 0;
    let result = SlidingWindowRun::new(session, &volume, &PipelineConfig::default())
        .unwrap()
        .run_with_sink(|event| {
            assert!(matches!(event, ProgressEvent::Window(_)));
            seen += 1;
        })
        .await;
    assert!(matches!(result, Err(PipelineError::Inference { window: 5, .. })));
    assert_eq!(seen, 5);
}

#[tokio::test]
async fn bounded_retry_recovers_from_transient_failures() {
    let volume = zeros(Shape::cube(64));
    let session = FlakySession {
        failing_calls: vec![0, 1],
        calls: 0,
    };
    let config = PipelineConfig::default().with_retry(RetryPolicy::attempts(3));
    let labels = SlidingWindowRun::new(session, &volume, &config)
        .unwrap()
        .run_with_sink(|_| {})
        .await
        .unwrap();
    assert!(labels.as_slice().iter().all(|&l| l == 1));
}

#[tokio::test]
async fn retry_gives_up_after_max_attempts() {
    let volume = zeros(Shape::cube(64));
    let session = FlakySession {
        failing_calls: vec![0, 1, 2],
        calls: 0,
    };
    let config = PipelineConfig::default().with_retry(RetryPolicy::attempts(2));
    let err = SlidingWindowRun::new(session, &volume, &config)
        .unwrap()
        .run_with_sink(|_| {})
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Inference {
            window: 0,
            attempts: 2,
            ..
        }
    ));
}

#[tokio::test]
async fn cancellation_stops_between_windows() {
    let volume = zeros(Shape::cube(128));
    let (session, calls) = ConstantSession::new(1);
    let cancel = CancellationToken::new();
    let mut run = SlidingWindowRun::new(session, &volume, &PipelineConfig::default())
        .unwrap()
        .with_cancellation(cancel.clone());

    assert!(run.next_window().await.unwrap().is_ok());
    assert!(run.next_window().await.unwrap().is_ok());
    cancel.cancel();

    let err = run.next_window().await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Cancelled {
            completed: 2,
            total: 27
        }
    ));
    assert_eq!(run.state(), RunState::Cancelled);
    assert!(run.next_window().await.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(run.labels().data()[(0, 0, 0)], 1);
}

#[tokio::test]
async fn stream_yields_one_snapshot_per_window() {
    let volume = zeros(Shape::cube(96));
    let run = SlidingWindowRun::new(CountingSession::default(), &volume, &PipelineConfig::default())
        .unwrap();
    let snapshots: Vec<_> = run
        .into_stream()
        .map(|item| item.unwrap())
        .collect()
        .await;

    assert_eq!(snapshots.len(), 8);
    for (i, snapshot) in snapshots.iter().enumerate() {
        assert_eq!(snapshot.index, i);
        assert_eq!(snapshot.total, 8);
        // Each snapshot is frozen at its own window.
        let counts = snapshot.labels.class_counts();
        assert_eq!(counts.len(), i + 2);
    }
}

#[tokio::test]
async fn stream_forwards_into_a_channel() {
    let volume = zeros(Shape::cube(64));
    let (session, _) = ConstantSession::new(1);
    let run = SlidingWindowRun::new(session, &volume, &PipelineConfig::default()).unwrap();

    let (tx, rx) = mpsc::unbounded();
    run.into_stream()
        .map(Ok)
        .forward(tx)
        .await
        .unwrap();
    let received: Vec<_> = rx.collect().await;
    assert_eq!(received.len(), 1);
    let snapshot = received[0].as_ref().unwrap();
    assert!(snapshot.labels.as_slice().iter().all(|&l| l == 1));
}

#[tokio::test]
async fn aligned_final_window_covers_trailing_strip() {
    let volume = zeros(Shape::new(64, 64, 100));
    let truncated = SlidingWindowRun::new(
        ConstantSession::new(1).0,
        &volume,
        &PipelineConfig::default(),
    )
    .unwrap()
    .run_with_sink(|_| {})
    .await
    .unwrap();
    // x in 96..100 is never reached by origins 0 and 32.
    assert_eq!(truncated.data()[(0, 0, 95)], 1);
    assert_eq!(truncated.data()[(0, 0, 96)], 0);

    let config = PipelineConfig::default().with_edge_coverage(EdgeCoverage::AlignFinalWindow);
    let aligned = SlidingWindowRun::new(ConstantSession::new(1).0, &volume, &config)
        .unwrap()
        .run_with_sink(|_| {})
        .await
        .unwrap();
    assert!(aligned.as_slice().iter().all(|&l| l == 1));
}

#[tokio::test]
async fn segment_volume_loads_once_and_runs_to_completion() {
    let volume = zeros(Shape::cube(64));
    let mut windows = 0;
    let labels = segment_volume(&ConstantRuntime, &volume, &PipelineConfig::default(), |event| {
        if matches!(event, ProgressEvent::Window(_)) {
            windows += 1;
        }
    })
    .await
    .unwrap();
    assert_eq!(windows, 1);
    assert!(labels.as_slice().iter().all(|&l| l == 1));
}

#[tokio::test]
async fn segment_volume_reports_load_and_input_errors() {
    let volume = zeros(Shape::cube(64));
    let config = PipelineConfig::default().with_model("");
    let err = segment_volume(&ConstantRuntime, &volume, &config, |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Load(InferenceError::Load { .. })));

    let err = segment_volume(&ConstantRuntime, &Volume::default(), &PipelineConfig::default(), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Volume(_)));

    let config = PipelineConfig::default().with_window(64, 0);
    let err = segment_volume(&ConstantRuntime, &volume, &config, |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}
