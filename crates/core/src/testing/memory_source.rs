//! Scripted memory readings and a recording reclaimer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::memory::{MemorySource, Reclaimer};

/// Memory source replaying a fixed trace of system fractions. Once the
/// trace is exhausted the last value repeats.
#[derive(Debug)]
pub struct ScriptedMemorySource {
    trace: Vec<f64>,
    position: Mutex<usize>,
}

impl ScriptedMemorySource {
    pub fn new(trace: Vec<f64>) -> Self {
        Self {
            trace,
            position: Mutex::new(0),
        }
    }

    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }

    /// How many readings have been taken.
    pub fn readings(&self) -> usize {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemorySource for ScriptedMemorySource {
    fn system_fraction_used(&self) -> f64 {
        let mut position = self.position.lock().unwrap_or_else(PoisonError::into_inner);
        let value = self
            .trace
            .get(*position)
            .or_else(|| self.trace.last())
            .copied()
            .unwrap_or(0.0);
        *position += 1;
        value
    }
}

/// Reclaimer counting how often it was asked to free memory.
#[derive(Debug)]
pub struct RecordingReclaimer {
    name: String,
    calls: AtomicUsize,
    aggressive_calls: AtomicUsize,
}

impl RecordingReclaimer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: AtomicUsize::new(0),
            aggressive_calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn aggressive_calls(&self) -> usize {
        self.aggressive_calls.load(Ordering::SeqCst)
    }
}

impl Reclaimer for RecordingReclaimer {
    fn name(&self) -> &str {
        &self.name
    }

    fn reclaim(&self, aggressive: bool) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if aggressive {
            self.aggressive_calls.fetch_add(1, Ordering::SeqCst);
        }
    }
}
