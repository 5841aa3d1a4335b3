//! Per-server send timestamps observed by the adversary.

use std::collections::{BTreeMap, BTreeSet};

use crate::sim::message::ServerId;
use crate::sim::scheduler::SimTime;

/// Sorted send timestamps per server
#[derive(Debug, Default, Clone)]
pub struct SendLog {
    sends: BTreeMap<ServerId, Vec<SimTime>>,
}

impl SendLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `now` into the server's list, keeping it sorted.
    pub fn record(&mut self, server: ServerId, now: SimTime) {
        let times = self.sends.entry(server).or_default();
        let index = times.partition_point(|&t| t < now);
        times.insert(index, now);
    }

    /// Servers with at least `k` sends at or after `min_time`.
    pub fn candidate_set(&self, min_time: SimTime, k: usize) -> BTreeSet<ServerId> {
        self.sends
            .iter()
            .filter(|(_, times)| !times.is_empty())
            .filter(|(_, times)| times.len() - times.partition_point(|&t| t < min_time) >= k)
            .map(|(&server, _)| server)
            .collect()
    }

    /// Drop every timestamp older than `min_time`.
    pub fn trim(&mut self, min_time: SimTime) {
        for times in self.sends.values_mut() {
            let stale = times.partition_point(|&t| t < min_time);
            times.drain(..stale);
        }
        self.sends.retain(|_, times| !times.is_empty());
    }

    pub fn num_servers(&self) -> usize {
        self.sends.len()
    }

    pub fn num_entries(&self) -> usize {
        self.sends.values().map(Vec::len).sum()
    }

    pub fn times(&self, server: ServerId) -> &[SimTime] {
        self.sends.get(&server).map(Vec::as_slice).unwrap_or(&[])
    }
}
