//! Network monitor - sliding window of backend network statistics.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use robodeck_shared::NetworkStats;

use crate::infrastructure::lock;

#[derive(Clone)]
pub struct NetworkMonitor {
    samples: Arc<Mutex<VecDeque<NetworkStats>>>,
    capacity: usize,
}

impl NetworkMonitor {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn record(&self, stats: NetworkStats) {
        let mut samples = lock(&self.samples);
        samples.push_back(stats);
        while samples.len() > self.capacity {
            samples.pop_front();
        }
    }

    pub fn latest(&self) -> Option<NetworkStats> {
        lock(&self.samples).back().copied()
    }

    /// Oldest first.
    pub fn history(&self) -> Vec<NetworkStats> {
        lock(&self.samples).iter().copied().collect()
    }

    pub fn average_latency(&self) -> Option<f64> {
        let samples = lock(&self.samples);
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().map(|s| s.latency).sum::<f64>() / samples.len() as f64)
    }

    pub fn len(&self) -> usize {
        lock(&self.samples).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
