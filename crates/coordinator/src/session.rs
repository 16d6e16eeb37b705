//! The comparison pipeline: pointer input in, similarity maps out.
//!
//! A session holds the list of compared subjects, the pinned selection and
//! the active measure and grid shape. Each selection change bumps the
//! [`Generation`], then submits one calculation per subject (base first)
//! through the [`SerializedScheduler`]. Results are drawn only if the
//! generation they were requested under is still current. Targets whose data
//! is missing or not yet cached show a status message and are retried through
//! the [`RetryScheduler`].

use std::sync::{Arc, Mutex};

use reprsim_core::{GridShape, Selection, SubjectId, Tile, WorkItemKey};
use reprsim_protocol::{CalcSimilarities, FailureReason, FetchRepr, Outcome, SimilarityMeasure};
use reprsim_worker::WorkerLink;

use crate::bridge::WorkerBridge;
use crate::config::CoordinatorConfig;
use crate::generation::{Generation, GenerationStamp};
use crate::lock;
use crate::render::{RenderSink, SimilarityFrame, StatusMessage};
use crate::retry::RetryScheduler;
use crate::scheduler::SerializedScheduler;
use crate::trigger::TriggerGate;

/// Knows where each subject's representation lives.
pub trait ReprLocator: Send + Sync + 'static {
    /// URL of the representation for the active model and position, or
    /// `None` while it has not been generated yet.
    fn repr_url(&self, subject: SubjectId) -> Option<String>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
enum RetryKey {
    Similarities(SubjectId),
    Fetch(SubjectId),
}

/// Everything needed to compute and draw one target for one selection.
#[derive(Debug, Copy, Clone)]
struct TargetJob {
    base: SubjectId,
    target: SubjectId,
    tile: Tile,
    stamp: GenerationStamp,
    measure: SimilarityMeasure,
    shape: GridShape,
}

#[derive(Debug)]
struct ViewState {
    subjects: Vec<SubjectId>,
    shape: GridShape,
    measure: SimilarityMeasure,
    selection: Selection,
    gate: TriggerGate,
}

struct Inner {
    bridge: Arc<WorkerBridge>,
    scheduler: SerializedScheduler,
    generation: Generation,
    retries: RetryScheduler<RetryKey>,
    locator: Box<dyn ReprLocator>,
    sink: Box<dyn RenderSink>,
    state: Mutex<ViewState>,
}

/// Cheap to clone; clones drive the same session.
#[derive(Clone)]
pub struct ComparisonSession {
    inner: Arc<Inner>,
}

impl core::fmt::Debug for ComparisonSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ComparisonSession")
            .field("state", &*lock(&self.inner.state))
            .field("generation", &self.inner.generation.current())
            .finish_non_exhaustive()
    }
}

impl ComparisonSession {
    /// Start a session on `link`. Must be called within a tokio runtime.
    pub fn new(
        link: WorkerLink,
        shape: GridShape,
        locator: impl ReprLocator,
        sink: impl RenderSink,
        config: &CoordinatorConfig,
    ) -> Self {
        let bridge = Arc::new(WorkerBridge::new(link, config));
        let generation = Generation::new();
        let scheduler = SerializedScheduler::new(bridge.clone(), generation.clone());

        Self {
            inner: Arc::new(Inner {
                bridge,
                scheduler,
                generation,
                retries: RetryScheduler::new(config.retry_window),
                locator: Box::new(locator),
                sink: Box::new(sink),
                state: Mutex::new(ViewState {
                    subjects: Vec::new(),
                    shape,
                    measure: SimilarityMeasure::default(),
                    selection: Selection::default(),
                    gate: TriggerGate::new(),
                }),
            }),
        }
    }

    pub fn subjects(&self) -> Vec<SubjectId> {
        lock(&self.inner.state).subjects.clone()
    }

    pub fn selection(&self) -> Selection {
        lock(&self.inner.state).selection
    }

    pub fn shape(&self) -> GridShape {
        lock(&self.inner.state).shape
    }

    pub fn measure(&self) -> SimilarityMeasure {
        lock(&self.inner.state).measure
    }

    pub fn generation(&self) -> GenerationStamp {
        self.inner.generation.current()
    }

    /// Jobs sent to the worker and not yet resolved.
    pub fn outstanding_jobs(&self) -> usize {
        self.inner.bridge.outstanding()
    }

    /// Add a comparison target and start loading it.
    ///
    /// The first subject becomes the pinned base. Returns `false` if the
    /// subject is already present.
    pub fn add_subject(&self, subject: SubjectId) -> bool {
        {
            let mut state = lock(&self.inner.state);
            if state.subjects.contains(&subject) {
                return false;
            }
            state.subjects.push(subject);
            state.selection.pin_if_empty(subject);
        }
        tracing::info!(subject = %subject, "subject added");

        self.inner.load(subject);
        self.inner.refresh();
        true
    }

    /// Remove a target and drop its pending retries.
    ///
    /// If it was the pinned base, the first remaining subject takes over.
    pub fn remove_subject(&self, subject: SubjectId) -> bool {
        {
            let mut state = lock(&self.inner.state);
            let Some(position) = state.subjects.iter().position(|s| *s == subject) else {
                return false;
            };
            state.subjects.remove(position);
            state.selection.release(subject);
            if let Some(first) = state.subjects.first().copied() {
                state.selection.pin_if_empty(first);
            }
        }
        self.inner.retries.forget(&RetryKey::Similarities(subject));
        self.inner.retries.forget(&RetryKey::Fetch(subject));
        tracing::info!(subject = %subject, "subject removed");

        self.inner.refresh();
        true
    }

    /// Ask the worker to fetch and cache `subject`'s representation.
    ///
    /// Returns `false` if the subject is unknown or its representation is
    /// not generated yet. On success every target is refreshed; a `loading`
    /// answer is retried.
    pub fn load_subject(&self, subject: SubjectId) -> bool {
        self.inner.load(subject)
    }

    /// Fetch every subject again, e.g. after the model or position changed.
    pub fn reload_all(&self) {
        for subject in self.subjects() {
            self.inner.load(subject);
        }
    }

    /// Pointer over tile `(col, row)` of `base`'s image.
    ///
    /// Coordinates outside the grid and repeats of the previous tile are
    /// ignored. Returns `true` if work was started.
    pub fn pointer_moved(&self, base: SubjectId, col: i64, row: i64) -> bool {
        let Some(tile) = lock(&self.inner.state).shape.tile_at(col, row) else {
            return false;
        };
        self.inner.update(WorkItemKey::new(base, tile))
    }

    /// Pin tile `(col, row)` of `base` and recompute even if unchanged.
    pub fn clicked(&self, base: SubjectId, col: i64, row: i64) -> bool {
        let key = {
            let mut state = lock(&self.inner.state);
            let Some(tile) = state.shape.tile_at(col, row) else {
                return false;
            };
            if !state.subjects.contains(&base) {
                return false;
            }
            state.selection.pin(base, tile);
            state.gate.reset();
            WorkItemKey::new(base, tile)
        };
        self.inner.update(key)
    }

    /// The pointer left the images: fall back to the pinned selection.
    pub fn pointer_left(&self) -> bool {
        self.inner.refresh()
    }

    /// Recompute the pinned selection.
    pub fn refresh(&self) -> bool {
        self.inner.refresh()
    }

    pub fn set_measure(&self, measure: SimilarityMeasure) -> bool {
        {
            let mut state = lock(&self.inner.state);
            if state.measure == measure {
                return false;
            }
            state.measure = measure;
        }
        tracing::debug!(measure = %measure, "similarity measure changed");
        self.inner.refresh()
    }

    /// Switch to a new grid shape, carrying the pinned tile over.
    pub fn set_shape(&self, shape: GridShape) {
        {
            let mut state = lock(&self.inner.state);
            if state.shape == shape {
                return;
            }
            let previous = state.shape;
            state.selection.rescale(previous, shape);
            state.shape = shape;
        }
        tracing::debug!(n = shape.n(), m = shape.m(), "grid shape changed");

        self.reload_all();
        self.inner.refresh();
    }
}

impl Inner {
    fn has_subject(&self, subject: SubjectId) -> bool {
        lock(&self.state).subjects.contains(&subject)
    }

    fn refresh(self: &Arc<Self>) -> bool {
        let key = {
            let mut state = lock(&self.state);
            state.gate.reset();
            state.selection.key()
        };
        match key {
            Some(key) => self.update(key),
            None => false,
        }
    }

    fn update(self: &Arc<Self>, key: WorkItemKey) -> bool {
        let jobs: Vec<TargetJob> = {
            let mut state = lock(&self.state);
            if !state.subjects.contains(&key.subject) || !state.shape.contains(key.tile) {
                return false;
            }
            if !state.gate.admit(key) {
                return false;
            }

            let stamp = self.generation.bump();
            let others = state.subjects.iter().copied().filter(|s| *s != key.subject);
            std::iter::once(key.subject)
                .chain(others)
                .map(|target| TargetJob {
                    base: key.subject,
                    target,
                    tile: key.tile,
                    stamp,
                    measure: state.measure,
                    shape: state.shape,
                })
                .collect()
        };
        tracing::debug!(key = %key, targets = jobs.len(), "selection changed");

        for job in jobs {
            self.refresh_target(job);
        }
        true
    }

    fn refresh_target(self: &Arc<Self>, job: TargetJob) {
        if !self.generation.is_current(job.stamp) || !self.has_subject(job.target) {
            return;
        }

        let (Some(base_url), Some(target_url)) = (
            self.locator.repr_url(job.base),
            self.locator.repr_url(job.target),
        ) else {
            self.sink.draw_status(job.target, StatusMessage::Generating);
            self.retry_target(job);
            return;
        };

        let pending = self.scheduler.submit_calculation(CalcSimilarities {
            func: job.measure,
            repr1_str: base_url,
            repr2_str: target_url,
            row: job.tile.row,
            col: job.tile.col,
        });

        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let outcome = pending.await;
            if let Some(inner) = weak.upgrade() {
                inner.apply_outcome(job, outcome);
            }
        });
    }

    fn apply_outcome(self: &Arc<Self>, job: TargetJob, outcome: Outcome) {
        if !self.generation.is_current(job.stamp) {
            tracing::debug!(subject = %job.target, "discarding result for an outdated selection");
            return;
        }
        if !self.has_subject(job.target) {
            return;
        }

        match outcome {
            Outcome::Success {
                similarities: Some(values),
            } => {
                let got = values.len();
                match SimilarityFrame::new(job.base, job.target, job.tile, job.shape, values) {
                    Some(frame) => self.sink.draw_similarities(job.target, &frame),
                    None => {
                        tracing::warn!(
                            subject = %job.target,
                            expected = job.shape.tile_count(),
                            got,
                            "similarity map does not match the grid"
                        );
                        self.fail_target(job);
                    }
                }
            }
            Outcome::Success { similarities: None } => {
                tracing::warn!(subject = %job.target, "worker returned no similarities");
                self.fail_target(job);
            }
            Outcome::Error {
                reason: FailureReason::Loading,
            } => {
                self.sink.draw_status(job.target, StatusMessage::Loading);
                self.retry_target(job);
            }
            Outcome::Error {
                reason: FailureReason::Outdated,
            } => {
                tracing::debug!(subject = %job.target, "calculation superseded");
            }
            Outcome::Error { reason } => {
                tracing::warn!(
                    subject = %job.target,
                    reason = %reason,
                    "error in worker while calculating similarities"
                );
                self.fail_target(job);
            }
        }
    }

    fn fail_target(self: &Arc<Self>, job: TargetJob) {
        self.sink.draw_status(job.target, StatusMessage::Failed);
        self.retry_target(job);
    }

    fn retry_target(self: &Arc<Self>, job: TargetJob) {
        let weak = Arc::downgrade(self);
        self.retries.schedule_retry(RetryKey::Similarities(job.target), move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.generation.is_current(job.stamp) {
                inner.refresh_target(job);
            }
        });
    }

    fn load(self: &Arc<Self>, subject: SubjectId) -> bool {
        let shape = {
            let state = lock(&self.state);
            state.subjects.contains(&subject).then_some(state.shape)
        };
        let Some(shape) = shape else {
            return false;
        };
        let Some(url) = self.locator.repr_url(subject) else {
            tracing::debug!(subject = %subject, "representation not generated yet");
            return false;
        };

        let pending = self.bridge.submit(FetchRepr {
            url: url.clone(),
            n: shape.n(),
            m: shape.m(),
        });

        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let outcome = pending.await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match outcome.failure() {
                None => {
                    tracing::debug!(subject = %subject, url = %url, "representation cached by worker");
                    inner.refresh();
                }
                Some(FailureReason::Loading) => {
                    tracing::debug!(subject = %subject, url = %url, "representation not available yet");
                    inner.retry_load(subject);
                }
                Some(reason) => {
                    tracing::warn!(
                        subject = %subject,
                        url = %url,
                        reason = %reason,
                        "error while fetching representation"
                    );
                }
            }
        });
        true
    }

    fn retry_load(self: &Arc<Self>, subject: SubjectId) {
        let weak = Arc::downgrade(self);
        self.retries.schedule_retry(RetryKey::Fetch(subject), move || {
            if let Some(inner) = weak.upgrade() {
                inner.load(subject);
            }
        });
    }
}
