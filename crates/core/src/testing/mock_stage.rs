//! Mock stage for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::frame::{Frame, FrameContext};
use crate::stage::{FrameError, FrameStage, RunTarget, StageError};

/// One `process_frame` call seen by a [`MockStage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCall {
    pub frame: usize,
    pub stage: String,
    /// Marker of the buffer the stage received.
    pub input_marker: u8,
}

/// Call log shared by every mock stage of a pipeline, so the order in which
/// stages saw a frame can be asserted.
#[derive(Debug, Clone, Default)]
pub struct StageLog(Arc<Mutex<Vec<StageCall>>>);

impl StageLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: StageCall) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    pub fn calls(&self) -> Vec<StageCall> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stage names that processed `frame`, in call order.
    pub fn stages_for(&self, frame: usize) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.frame == frame)
            .map(|c| c.stage)
            .collect()
    }

    /// Marker of the buffer `stage` received for `frame`.
    pub fn input_marker(&self, frame: usize, stage: &str) -> Option<u8> {
        self.calls()
            .into_iter()
            .find(|c| c.frame == frame && c.stage == stage)
            .map(|c| c.input_marker)
    }

    /// How many times `stage` processed `frame`.
    pub fn count(&self, frame: usize, stage: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.frame == frame && c.stage == stage)
            .count()
    }
}

/// Number of stages that have stamped a frame.
///
/// Mock stages increment the red channel of pixel (0, 0).
pub fn marker_of(frame: &Frame) -> u8 {
    frame.get_pixel(0, 0)[0]
}

/// Mock implementation of the FrameStage trait.
///
/// Provides controllable behavior for testing:
/// - Record every frame it sees in a shared [`StageLog`]
/// - Fail, exhaust resources or panic on chosen frames
/// - Fail the pre-check or the pre-start validation
/// - Count post-process and reclaim calls
pub struct MockStage {
    name: String,
    log: StageLog,
    failing: HashSet<usize>,
    /// Each index exhausts resources once, then succeeds on retry.
    exhausting: Mutex<HashSet<usize>>,
    panicking: HashSet<usize>,
    fail_pre_check: bool,
    fail_pre_start: bool,
    delay: Option<Duration>,
    handle: Mutex<Option<()>>,
    post_process_calls: AtomicUsize,
    releases: AtomicUsize,
    release_calls: AtomicUsize,
}

impl MockStage {
    pub fn new(name: impl Into<String>, log: StageLog) -> Self {
        Self {
            name: name.into(),
            log,
            failing: HashSet::new(),
            exhausting: Mutex::new(HashSet::new()),
            panicking: HashSet::new(),
            fail_pre_check: false,
            fail_pre_start: false,
            delay: None,
            handle: Mutex::new(None),
            post_process_calls: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            release_calls: AtomicUsize::new(0),
        }
    }

    /// Fails the transformation of frame `index`.
    pub fn failing_on(mut self, index: usize) -> Self {
        self.failing.insert(index);
        self
    }

    /// Reports resource exhaustion on the first attempt at frame `index`.
    pub fn exhausting_on(self, index: usize) -> Self {
        self.exhausting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index);
        self
    }

    /// Panics while processing frame `index`.
    pub fn panicking_on(mut self, index: usize) -> Self {
        self.panicking.insert(index);
        self
    }

    pub fn failing_pre_check(mut self) -> Self {
        self.fail_pre_check = true;
        self
    }

    pub fn failing_pre_start(mut self) -> Self {
        self.fail_pre_start = true;
        self
    }

    /// Sleeps this long in every `process_frame` call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn post_process_calls(&self) -> usize {
        self.post_process_calls.load(Ordering::SeqCst)
    }

    /// Post-process calls that actually released something.
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    pub fn is_loaded(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[async_trait]
impl FrameStage for MockStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn pre_check(&self) -> Result<(), StageError> {
        if self.fail_pre_check {
            return Err(StageError::asset_unavailable(&self.name, "mock asset missing"));
        }
        Ok(())
    }

    async fn pre_start(&self, target: &RunTarget) -> Result<(), StageError> {
        if self.fail_pre_start {
            return Err(StageError::unsupported_target(
                &self.name,
                &target.target,
                "mock rejects every target",
            ));
        }
        Ok(())
    }

    fn process_frame(&self, ctx: &FrameContext, frame: &Frame) -> Result<Frame, FrameError> {
        let index = ctx.frame.index();
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(());
        self.log.push(StageCall {
            frame: index,
            stage: self.name.clone(),
            input_marker: marker_of(frame),
        });

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.panicking.contains(&index) {
            panic!("mock stage {} panicked on frame {}", self.name, index);
        }
        let exhausted = self
            .exhausting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&index);
        if exhausted {
            return Err(FrameError::resource_exhausted("mock out of memory"));
        }
        if self.failing.contains(&index) {
            return Err(FrameError::transform(format!("mock failure on frame {}", index)));
        }

        let mut output = frame.clone();
        let pixel = output.get_pixel_mut(0, 0);
        pixel[0] = pixel[0].wrapping_add(1);
        Ok(output)
    }

    fn release_transient(&self, _aggressive: bool) {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn post_process(&self) {
        self.post_process_calls.fetch_add(1, Ordering::SeqCst);
        let released = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}
