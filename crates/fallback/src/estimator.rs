//! Uniform Fallback Estimator

use crate::FallbackError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Fallback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Fixed seed for reproducible estimates (entropy-seeded if absent)
    pub seed: Option<u64>,
    /// Lower bound of the estimate (default: 20)
    pub min_rul: f64,
    /// Upper bound of the estimate (default: 120)
    pub max_rul: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            seed: None,
            min_rul: 20.0,
            max_rul: 120.0,
        }
    }
}

/// Draws RUL estimates uniformly from a configured range
pub struct FallbackEstimator {
    rng: Mutex<StdRng>,
    min_rul: f64,
    max_rul: f64,
    seeded: bool,
}

impl FallbackEstimator {
    /// Create an estimator from configuration
    pub fn new(config: &FallbackConfig) -> Result<Self, FallbackError> {
        let valid = config.min_rul.is_finite()
            && config.max_rul.is_finite()
            && config.min_rul >= 0.0
            && config.min_rul <= config.max_rul;
        if !valid {
            return Err(FallbackError::InvalidRange {
                min_rul: config.min_rul,
                max_rul: config.max_rul,
            });
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(
            min_rul = config.min_rul,
            max_rul = config.max_rul,
            seeded = config.seed.is_some(),
            "Created fallback estimator"
        );

        Ok(Self {
            rng: Mutex::new(rng),
            min_rul: config.min_rul,
            max_rul: config.max_rul,
            seeded: config.seed.is_some(),
        })
    }

    /// Seeded estimator with the default range
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            min_rul: 20.0,
            max_rul: 120.0,
            seeded: true,
        }
    }

    /// Draw one estimate in `[min_rul, max_rul]`
    pub fn estimate(&self) -> f64 {
        if self.min_rul == self.max_rul {
            return self.min_rul;
        }

        // A poisoned lock still holds a usable generator
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Fallback generator lock poisoned, recovering");
                poisoned.into_inner()
            }
        };
        let rul = rng.gen_range(self.min_rul..=self.max_rul);
        debug!(rul, "Drew fallback RUL estimate");
        rul
    }

    /// `(min_rul, max_rul)`
    pub fn range(&self) -> (f64, f64) {
        (self.min_rul, self.max_rul)
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }
}

impl Default for FallbackEstimator {
    fn default() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            min_rul: 20.0,
            max_rul: 120.0,
            seeded: false,
        }
    }
}

impl std::fmt::Debug for FallbackEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackEstimator")
            .field("min_rul", &self.min_rul)
            .field("max_rul", &self.max_rul)
            .field("seeded", &self.seeded)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let a = FallbackEstimator::seeded(42);
        let b = FallbackEstimator::seeded(42);

        let first: Vec<f64> = (0..8).map(|_| a.estimate()).collect();
        let second: Vec<f64> = (0..8).map(|_| b.estimate()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_different_seeds_diverge() {
        let a = FallbackEstimator::seeded(1);
        let b = FallbackEstimator::seeded(2);

        let first: Vec<f64> = (0..8).map(|_| a.estimate()).collect();
        let second: Vec<f64> = (0..8).map(|_| b.estimate()).collect();
        assert_ne!(first, second);
    }

    #[test]
    fn test_invalid_range_rejected() {
        let config = FallbackConfig {
            seed: Some(0),
            min_rul: 90.0,
            max_rul: 10.0,
        };
        assert_eq!(
            FallbackEstimator::new(&config).unwrap_err(),
            FallbackError::InvalidRange {
                min_rul: 90.0,
                max_rul: 10.0
            }
        );
    }

    #[test]
    fn test_degenerate_range() {
        let config = FallbackConfig {
            seed: None,
            min_rul: 75.0,
            max_rul: 75.0,
        };
        let estimator = FallbackEstimator::new(&config).unwrap();
        assert_eq!(estimator.estimate(), 75.0);
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config: FallbackConfig = serde_json::from_str(r#"{"seed": 7}"#).unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.min_rul, 20.0);
        assert_eq!(config.max_rul, 120.0);
    }

    proptest! {
        #[test]
        fn prop_estimates_within_range(seed in any::<u64>(), lo in 0.0f64..100.0, width in 0.0f64..100.0) {
            let config = FallbackConfig { seed: Some(seed), min_rul: lo, max_rul: lo + width };
            let estimator = FallbackEstimator::new(&config).unwrap();
            for _ in 0..16 {
                let rul = estimator.estimate();
                prop_assert!(rul >= lo && rul <= lo + width);
            }
        }
    }
}
