//! Chunks and the adaptive chunk-size policy.

use std::time::Duration;

use crate::frame::FrameRef;
use crate::memory::Pressure;
use crate::stage::ChunkReport;

/// Frames handed to one worker invocation.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: u64,
    pub frames: Vec<FrameRef>,
}

/// What a worker hands back to the coordinator.
#[derive(Debug)]
pub struct ChunkCompletion {
    pub id: u64,
    pub report: ChunkReport,
    /// The worker panicked; frames it had not finished are in `report.failed`.
    pub crashed: bool,
    pub elapsed: Duration,
}

/// Decides the size of the next chunk.
///
/// Starts at `max(1, min(batch_hint, total / worker_limit))`, halves under
/// high pressure and doubles under low pressure up to `cap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSizer {
    current: usize,
    cap: usize,
}

impl ChunkSizer {
    pub fn new(total: usize, worker_limit: usize, batch_hint: usize, multiplier: usize) -> Self {
        let worker_limit = worker_limit.max(1);
        let initial = batch_hint.min(total / worker_limit).max(1);
        let cap = initial.max(worker_limit.saturating_mul(multiplier.max(1)));
        Self {
            current: initial,
            cap,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Applies the pressure policy and returns the next size.
    pub fn adjust(&mut self, pressure: Pressure) -> usize {
        match pressure {
            Pressure::High => self.halve(),
            Pressure::Low => {
                self.current = self.current.saturating_mul(2).min(self.cap);
                self.current
            }
            Pressure::Normal => self.current,
        }
    }

    pub fn halve(&mut self) -> usize {
        self.current = (self.current / 2).max(1);
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_size() {
        assert_eq!(ChunkSizer::new(10, 2, 5, 2).current(), 5);
        assert_eq!(ChunkSizer::new(100, 4, 5, 2).current(), 5);
        assert_eq!(ChunkSizer::new(6, 4, 5, 2).current(), 1);
        assert_eq!(ChunkSizer::new(1, 8, 5, 2).current(), 1);
        assert_eq!(ChunkSizer::new(0, 8, 5, 2).current(), 1);
    }

    #[test]
    fn test_halves_to_one() {
        let mut sizer = ChunkSizer::new(100, 2, 5, 2);
        assert_eq!(sizer.adjust(Pressure::High), 2);
        assert_eq!(sizer.adjust(Pressure::High), 1);
        assert_eq!(sizer.adjust(Pressure::High), 1);
    }

    #[test]
    fn test_doubles_to_cap() {
        let mut sizer = ChunkSizer::new(100, 4, 3, 2);
        assert_eq!(sizer.cap(), 8);
        assert_eq!(sizer.adjust(Pressure::Low), 6);
        assert_eq!(sizer.adjust(Pressure::Low), 8);
        assert_eq!(sizer.adjust(Pressure::Low), 8);
        assert_eq!(sizer.adjust(Pressure::Normal), 8);
    }

    #[test]
    fn test_cap_never_below_initial() {
        let sizer = ChunkSizer::new(1000, 2, 50, 2);
        assert_eq!(sizer.current(), 50);
        assert_eq!(sizer.cap(), 50);
    }
}
