//! Mock audio pipeline.
//!
//! [`MockAudioPipeline`] is a scripted [`AudioPipeline`]: outbound blocks are
//! queued up front, inbound blocks are captured for inspection. Clones share
//! the same queues, so a test can keep one clone while the other is owned
//! by the protocol engine.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use riglink_core::audio::{AudioPipeline, PcmBlock};

#[derive(Debug, Default)]
struct Queues {
    outbound: VecDeque<PcmBlock>,
    received: Vec<PcmBlock>,
}

/// A scripted [`AudioPipeline`] for tests.
#[derive(Debug, Clone, Default)]
pub struct MockAudioPipeline {
    queues: Arc<Mutex<Queues>>,
}

impl MockAudioPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a block for the engine to pull.
    pub fn queue_outbound(&self, block: PcmBlock) {
        if let Ok(mut q) = self.queues.lock() {
            q.outbound.push_back(block);
        }
    }

    /// Number of outbound blocks not yet pulled.
    pub fn outbound_remaining(&self) -> usize {
        self.queues.lock().map(|q| q.outbound.len()).unwrap_or(0)
    }

    /// All blocks the engine has pushed so far.
    pub fn received(&self) -> Vec<PcmBlock> {
        self.queues
            .lock()
            .map(|q| q.received.clone())
            .unwrap_or_default()
    }
}

impl AudioPipeline for MockAudioPipeline {
    fn pull_next_block(&mut self) -> Option<PcmBlock> {
        self.queues.lock().ok().and_then(|mut q| q.outbound.pop_front())
    }

    fn push_received_block(&mut self, block: PcmBlock) {
        if let Ok(mut q) = self.queues.lock() {
            q.received.push(block);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_queues() {
        let pipeline = MockAudioPipeline::new();
        let mut engine_side = pipeline.clone();

        pipeline.queue_outbound(PcmBlock::new(vec![1, 2]));
        assert_eq!(pipeline.outbound_remaining(), 1);
        assert_eq!(engine_side.pull_next_block().unwrap().samples, vec![1, 2]);
        assert!(engine_side.pull_next_block().is_none());

        engine_side.push_received_block(PcmBlock::new(vec![9]));
        assert_eq!(pipeline.received(), vec![PcmBlock::new(vec![9])]);
    }
}
