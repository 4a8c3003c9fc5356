use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::SpaceError;

/// Largest seed handed out by [`TrialPlan::generated`]; fits a C `int`.
const MAX_GENERATED_SEED: u64 = i32::MAX as u64 - 1;

/// Where the trial seed goes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SeedInjection {
    /// Appended after every other run argument.
    #[default]
    Arg,
    /// Build-time definition; forces one build per trial.
    Define { name: String },
}

/// Repeated trials of each configuration, one per seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialPlan {
    pub seeds: Vec<u64>,
    #[serde(default)]
    pub injection: SeedInjection,
}

impl TrialPlan {
    pub fn seeds(seeds: impl Into<Vec<u64>>) -> Self {
        Self {
            seeds: seeds.into(),
            injection: SeedInjection::Arg,
        }
    }

    /// Draw `count` distinct seeds reproducibly from `base_seed`.
    pub fn generated(count: usize, base_seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(base_seed);
        let mut seeds = Vec::with_capacity(count);
        while seeds.len() < count {
            let seed = rng.gen_range(1..=MAX_GENERATED_SEED);
            if !seeds.contains(&seed) {
                seeds.push(seed);
            }
        }
        Self::seeds(seeds)
    }

    pub fn with_injection(mut self, injection: SeedInjection) -> Self {
        self.injection = injection;
        self
    }

    pub fn validate(&self) -> Result<(), SpaceError> {
        if self.seeds.is_empty() {
            return Err(SpaceError::NoSeeds);
        }
        if let SeedInjection::Define { name } = &self.injection {
            if name.trim().is_empty() {
                return Err(SpaceError::EmptyName);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }
}
