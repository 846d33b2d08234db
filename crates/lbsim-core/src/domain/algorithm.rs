use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Load-balancing algorithm used to pick a worker for each new task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    #[default]
    RoundRobin,
    LeastConnections,
    Weighted,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [
        Algorithm::RoundRobin,
        Algorithm::LeastConnections,
        Algorithm::Weighted,
    ];

    /// Config / wire name (`round-robin`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::RoundRobin => "round-robin",
            Algorithm::LeastConnections => "least-connections",
            Algorithm::Weighted => "weighted",
        }
    }

    /// Human label used in the activity log.
    pub fn label(self) -> &'static str {
        match self {
            Algorithm::RoundRobin => "round robin",
            Algorithm::LeastConnections => "least connections",
            Algorithm::Weighted => "weighted",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Algorithm::RoundRobin => "cycles through workers in order",
            Algorithm::LeastConnections => "always picks the least-busy worker",
            Algorithm::Weighted => "worker-1 gets 3x traffic, worker-2 gets 2x, worker-3 gets 1x",
        }
    }

    /// Whether a dispatch with this algorithm advances the round-robin index.
    pub fn consumes_index(self) -> bool {
        !matches!(self, Algorithm::LeastConnections)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown algorithm `{0}` (expected round-robin|least-connections|weighted)")]
pub struct UnknownAlgorithm(String);

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Algorithm::ALL
            .into_iter()
            .find(|a| a.name() == normalized)
            .ok_or_else(|| UnknownAlgorithm(s.to_string()))
    }
}
