//! Per-server statistics accumulated by the disclosure attack.
//!
//! Two samplers feed the table: attack rounds (triggered by the target client
//! completing a request) and baseline samples (taken at random times). For
//! each sampler a server keeps a running mean of "was in the candidate set"
//! and a hit counter. Beta posteriors are derived from the counters on demand.

use std::collections::{BTreeMap, BTreeSet};

use crate::prob::{Beta, RandomVariable};
use crate::sim::message::ServerId;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ServerStat {
    pub weight: f64,
    pub baseline_weight: f64,
    pub times_in_sample: u64,
    pub times_in_baseline: u64,
}

#[derive(Debug, Clone, Default)]
pub struct AttackStats {
    servers: BTreeMap<ServerId, ServerStat>,
    rounds: u64,
    baseline_rounds: u64,
}

fn running_mean(old: f64, n: u64, hit: bool) -> f64 {
    (old * n as f64 + if hit { 1.0 } else { 0.0 }) / (n + 1) as f64
}

impl AttackStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn baseline_rounds(&self) -> u64 {
        self.baseline_rounds
    }

    pub fn get(&self, server: ServerId) -> Option<&ServerStat> {
        self.servers.get(&server)
    }

    pub fn servers(&self) -> impl Iterator<Item = (ServerId, &ServerStat)> {
        self.servers.iter().map(|(&id, stat)| (id, stat))
    }

    pub fn num_servers(&self) -> usize {
        self.servers.len()
    }

    /// Fold one attack round's candidate set into the table.
    pub fn fold_sample(&mut self, candidates: &BTreeSet<ServerId>) {
        for &server in candidates {
            self.servers.entry(server).or_default();
        }
        let n = self.rounds;
        for (server, stat) in self.servers.iter_mut() {
            let hit = candidates.contains(server);
            stat.weight = running_mean(stat.weight, n, hit);
            if hit {
                stat.times_in_sample += 1;
            }
        }
        self.rounds += 1;
    }

    /// Fold one baseline sample's candidate set into the table.
    pub fn fold_baseline(&mut self, candidates: &BTreeSet<ServerId>) {
        for &server in candidates {
            self.servers.entry(server).or_default();
        }
        let n = self.baseline_rounds;
        for (server, stat) in self.servers.iter_mut() {
            let hit = candidates.contains(server);
            stat.baseline_weight = running_mean(stat.baseline_weight, n, hit);
            if hit {
                stat.times_in_baseline += 1;
            }
        }
        self.baseline_rounds += 1;
    }

    /// Posterior of "in an attack sample". `None` if the server never was.
    pub fn attack_posterior(&self, server: ServerId) -> Option<Beta> {
        let stat = self.servers.get(&server)?;
        if stat.times_in_sample == 0 {
            return None;
        }
        Beta::posterior(stat.times_in_sample, self.rounds).ok()
    }

    /// Posterior of "in a baseline sample". `None` if the server never was.
    pub fn baseline_posterior(&self, server: ServerId) -> Option<Beta> {
        let stat = self.servers.get(&server)?;
        if stat.times_in_baseline == 0 {
            return None;
        }
        Beta::posterior(stat.times_in_baseline, self.baseline_rounds).ok()
    }

    /// Difference of posterior means for every server seen in an attack sample.
    ///
    /// A server never seen by the baseline sampler is compared against the
    /// zero-hit baseline posterior.
    pub fn signals(&self) -> BTreeMap<ServerId, f64> {
        self.servers
            .iter()
            .filter(|(_, stat)| stat.times_in_sample > 0)
            .filter_map(|(&server, stat)| {
                let attack = Beta::posterior(stat.times_in_sample, self.rounds).ok()?.mean()?;
                let baseline = Beta::posterior(stat.times_in_baseline, self.baseline_rounds).ok()?.mean()?;
                Some((server, attack - baseline))
            })
            .collect()
    }
}
