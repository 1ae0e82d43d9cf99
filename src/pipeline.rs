//! Sliding-window run: extract, infer, decode, and stitch one window at a
//! time in planner order, exposing the growing label map after each window.

use std::{sync::Arc, time::Duration};

use futures::{Stream, stream};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use web_time::Instant;

use crate::{
    config::{ConfigError, PipelineConfig, RetryPolicy},
    decoder::{DecodeError, decode_argmax},
    enums::RunState,
    inference::{ClassScoreBlock, InferenceError, InferenceSession, ModelRuntime},
    normalizer::NormalizedVolume,
    stitcher::{LabelVolume, StitchError},
    volume::{Shape, Volume, VolumeError},
    window_extractor::{WindowTensor, extract_window},
    window_planner::WindowPosition,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Could not create inference session: {0}")]
    Load(#[source] InferenceError),

    #[error("Inference failed on window {window} at {position:?} after {attempts} attempt(s): {source}")]
    Inference {
        window: usize,
        position: WindowPosition,
        attempts: u32,
        #[source]
        source: InferenceError,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Stitch(#[from] StitchError),

    #[error("Run cancelled after {completed} of {total} windows")]
    Cancelled { completed: usize, total: usize },
}

/// Progress after one window, lending the full label map as it stands.
#[derive(Debug, Clone, Copy)]
pub struct WindowProgress<'a> {
    pub index: usize,
    pub total: usize,
    pub position: WindowPosition,
    /// Wall time spent on this window.
    pub elapsed: Duration,
    pub labels: &'a LabelVolume,
}

impl WindowProgress<'_> {
    pub fn completed(&self) -> usize {
        self.index + 1
    }

    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed() as f32 * 100.0 / self.total as f32
    }
}

/// Owned counterpart of [`WindowProgress`], for streams and channels.
#[derive(Debug, Clone)]
pub struct WindowSnapshot {
    pub index: usize,
    pub total: usize,
    pub position: WindowPosition,
    pub elapsed: Duration,
    pub labels: Arc<LabelVolume>,
}

impl From<&WindowProgress<'_>> for WindowSnapshot {
    fn from(progress: &WindowProgress<'_>) -> Self {
        Self {
            index: progress.index,
            total: progress.total,
            position: progress.position,
            elapsed: progress.elapsed,
            labels: Arc::new(progress.labels.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ProgressEvent<'a> {
    Window(WindowProgress<'a>),
    Finished(&'a LabelVolume),
}

/// One segmentation run over one volume.
///
/// Owns the inference session and the label accumulator; nothing is shared
/// with other runs. Windows are processed strictly one after another in
/// planner order.
pub struct SlidingWindowRun<S> {
    session: S,
    volume: NormalizedVolume,
    positions: Vec<WindowPosition>,
    crop: Shape,
    retry: RetryPolicy,
    labels: LabelVolume,
    cancel: CancellationToken,
    next: usize,
    state: RunState,
    started: Option<Instant>,
}

impl<S: InferenceSession> SlidingWindowRun<S> {
    pub fn new(
        session: S,
        volume: &Volume,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let volume = NormalizedVolume::from_volume(volume)?;
        Self::from_normalized(session, volume, config)
    }

    pub fn from_normalized(
        session: S,
        volume: NormalizedVolume,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let planner = config.planner()?;
        let shape = volume.shape();
        let positions = planner.plan(shape);
        if positions.is_empty() {
            info!(
                %shape,
                crop_size = config.crop_size,
                "Volume is smaller than one window, nothing to segment"
            );
        }
        Ok(Self {
            session,
            volume,
            positions,
            crop: planner.crop_dims(),
            retry: config.retry,
            labels: LabelVolume::new(shape),
            cancel: CancellationToken::new(),
            next: 0,
            state: RunState::Idle,
            started: None,
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn positions(&self) -> &[WindowPosition] {
        &self.positions
    }

    pub fn total_windows(&self) -> usize {
        self.positions.len()
    }

    pub fn completed_windows(&self) -> usize {
        self.next
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// The label map as it stands, including after a failure or cancellation.
    pub fn labels(&self) -> &LabelVolume {
        &self.labels
    }

    pub fn into_labels(self) -> LabelVolume {
        self.labels
    }

    /// Process the next window and lend the updated label map.
    ///
    /// Returns `None` once every window is done or the run has failed or
    /// been cancelled; the sequence cannot be restarted.
    pub async fn next_window(&mut self) -> Option<Result<WindowProgress<'_>, PipelineError>> {
        if self.state.is_terminal() {
            return None;
        }
        let total = self.positions.len();
        let Some(&position) = self.positions.get(self.next) else {
            self.state = RunState::Done;
            info!(
                windows = total,
                elapsed_ms = self.started.map_or(0, |t| t.elapsed().as_millis() as u64),
                "Sliding-window run finished"
            );
            return None;
        };
        if self.cancel.is_cancelled() {
            self.state = RunState::Cancelled;
            warn!(completed = self.next, total, "Sliding-window run cancelled");
            return Some(Err(PipelineError::Cancelled {
                completed: self.next,
                total,
            }));
        }
        if self.state == RunState::Idle {
            self.state = RunState::Running;
            self.started = Some(Instant::now());
            info!(windows = total, shape = %self.labels.shape(), "Sliding-window run started");
        }

        let index = self.next;
        let started = Instant::now();
        if let Err(err) = self.process_window(index, position).await {
            self.state = RunState::Failed;
            warn!(window = index, ?position, error = %err, "Sliding-window run failed");
            return Some(Err(err));
        }
        self.next += 1;

        let elapsed = started.elapsed();
        debug!(
            window = index,
            total,
            ?position,
            elapsed_ms = elapsed.as_millis() as u64,
            "Window stitched"
        );
        Some(Ok(WindowProgress {
            index,
            total,
            position,
            elapsed,
            labels: &self.labels,
        }))
    }

    async fn process_window(
        &mut self,
        index: usize,
        position: WindowPosition,
    ) -> Result<(), PipelineError> {
        let tensor = extract_window(&self.volume, position, self.crop);
        let scores = self.infer(index, position, &tensor).await?;
        let labels = decode_argmax(scores.data(), scores.dims())?;
        self.labels.stitch(position, &labels, self.crop)?;
        Ok(())
    }

    async fn infer(
        &mut self,
        index: usize,
        position: WindowPosition,
        tensor: &WindowTensor,
    ) -> Result<ClassScoreBlock, PipelineError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.session.run(tensor).await {
                Ok(scores) => return Ok(scores),
                Err(err) if attempt < max_attempts => {
                    warn!(
                        window = index,
                        attempt,
                        max_attempts,
                        error = %err,
                        "Forward pass failed, retrying"
                    );
                    attempt += 1;
                }
                Err(source) => {
                    return Err(PipelineError::Inference {
                        window: index,
                        position,
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    /// Drive the run to completion, reporting every window to `sink` and
    /// then the final map once more.
    ///
    /// On error the labels stitched so far are not rolled back, but the run
    /// is consumed; use [`next_window`](Self::next_window) directly to keep
    /// the partial map.
    pub async fn run_with_sink<F>(mut self, mut sink: F) -> Result<LabelVolume, PipelineError>
    where
        F: FnMut(ProgressEvent<'_>),
    {
        while let Some(progress) = self.next_window().await {
            sink(ProgressEvent::Window(progress?));
        }
        sink(ProgressEvent::Finished(&self.labels));
        Ok(self.labels)
    }

    /// Turn the run into a stream of owned snapshots, one per window.
    ///
    /// Each item clones the label map, so prefer [`next_window`](Self::next_window)
    /// when the consumer can borrow.
    pub fn into_stream(self) -> impl Stream<Item = Result<WindowSnapshot, PipelineError>> {
        stream::unfold(self, |mut run| async move {
            let item = match run.next_window().await? {
                Ok(progress) => Ok(WindowSnapshot::from(&progress)),
                Err(err) => Err(err),
            };
            Some((item, run))
        })
    }
}

/// Validate `volume`, load one session from `runtime`, and segment the whole
/// volume, reporting progress to `sink`.
pub async fn segment_volume<R, F>(
    runtime: &R,
    volume: &Volume,
    config: &PipelineConfig,
    sink: F,
) -> Result<LabelVolume, PipelineError>
where
    R: ModelRuntime,
    F: FnMut(ProgressEvent<'_>),
{
    config.validate()?;
    let normalized = NormalizedVolume::from_volume(volume)?;
    let session = runtime
        .load(&config.model)
        .await
        .map_err(PipelineError::Load)?;
    SlidingWindowRun::from_normalized(session, normalized, config)?
        .run_with_sink(sink)
        .await
}
