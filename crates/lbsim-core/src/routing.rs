//! Worker selection.
//!
//! Pure functions of `(algorithm, position index, in-flight snapshot)`.
//! Whoever calls `select` owns the index and advances it (see
//! `Algorithm::consumes_index`).

use std::collections::HashMap;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::domain::{Algorithm, LbError, WorkerId};

/// Fixed, ordered set of workers plus their static weights.
///
/// Order matters: it is the round-robin order and the least-connections
/// tie-break order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPool {
    ids: Vec<WorkerId>,
    weights: Vec<u32>,
}

impl WorkerPool {
    pub fn new(ids: Vec<WorkerId>, weights: Vec<u32>) -> Result<Self, LbError> {
        if ids.is_empty() {
            return Err(LbError::InvalidPool("no workers".into()));
        }
        if ids.len() != weights.len() {
            return Err(LbError::InvalidPool(format!(
                "{} workers but {} weights",
                ids.len(),
                weights.len()
            )));
        }
        if weights.contains(&0) {
            return Err(LbError::InvalidPool("weights must be positive".into()));
        }
        let mut seen = ids.clone();
        seen.sort();
        seen.dedup();
        if seen.len() != ids.len() {
            return Err(LbError::InvalidPool("duplicate worker id".into()));
        }
        Ok(Self { ids, weights })
    }

    /// Workers "1", "2", "3" weighted 3:2:1.
    pub fn standard() -> Self {
        Self {
            ids: ["1", "2", "3"].into_iter().map(WorkerId::from).collect(),
            weights: vec![3, 2, 1],
        }
    }

    pub fn ids(&self) -> &[WorkerId] {
        &self.ids
    }

    pub fn weights(&self) -> &[u32] {
        &self.weights
    }

    pub fn contains(&self, worker: &WorkerId) -> bool {
        self.ids.contains(worker)
    }

    pub fn total_weight(&self) -> u64 {
        self.weights.iter().map(|&w| u64::from(w)).sum()
    }

    pub fn select(
        &self,
        algorithm: Algorithm,
        index: u64,
        in_flight: &HashMap<WorkerId, usize>,
    ) -> &WorkerId {
        match algorithm {
            Algorithm::RoundRobin => self.round_robin(index),
            Algorithm::LeastConnections => self.least_connections(in_flight),
            Algorithm::Weighted => self.weighted(index),
        }
    }

    fn round_robin(&self, index: u64) -> &WorkerId {
        let len = self.ids.len() as u64;
        &self.ids[(index % len) as usize]
    }

    fn least_connections(&self, in_flight: &HashMap<WorkerId, usize>) -> &WorkerId {
        let count = |id: &WorkerId| in_flight.get(id).copied().unwrap_or(0);

        let mut best = &self.ids[0];
        let mut best_count = count(best);
        for id in &self.ids[1..] {
            let c = count(id);
            // strictly smaller: earlier workers win ties
            if c < best_count {
                best = id;
                best_count = c;
            }
        }
        best
    }

    fn weighted(&self, index: u64) -> &WorkerId {
        let position = index % self.total_weight();
        let mut boundary = 0u64;
        for (id, &weight) in self.ids.iter().zip(&self.weights) {
            boundary += u64::from(weight);
            if position < boundary {
                return id;
            }
        }
        // position < total_weight, so the loop always returns
        &self.ids[0]
    }

    /// Uniform pick among every worker except `excluding`.
    ///
    /// Returns `None` when the pool has no other worker.
    pub fn pick_fallback<R: Rng + ?Sized>(
        &self,
        excluding: &WorkerId,
        rng: &mut R,
    ) -> Option<&WorkerId> {
        let others: Vec<&WorkerId> = self.ids.iter().filter(|id| *id != excluding).collect();
        others.choose(rng).copied()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::standard()
    }
}
