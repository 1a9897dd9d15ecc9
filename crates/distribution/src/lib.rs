// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Probability distributions deciding how many stochastic firings fall into
//! a time window.
//!
//! Each distribution exposes a cumulative-distribution function over elapsed
//! simulated time. [`Distribution::check_trigger`] counts the integer
//! threshold crossings of `intensity * cdf(t)` between two instants; the
//! event system launches one firing per crossing.
//!
//! All parameters are expressed in seconds of simulated time. Distributions
//! are immutable after configuration; the completed-cycle count is supplied
//! by the caller on every evaluation.

use std::time::Duration;

use protosim_types::identifiers::DistributionName;

mod special;

use special::{erf, regularized_gamma_p};

/// A named distribution with its firing intensity.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    name: DistributionName,
    intensity: f64,
    kind: DistributionKind,
}

/// The closed set of supplied distribution families.
#[derive(Debug, Clone, PartialEq)]
pub enum DistributionKind {
    /// Unbounded-rate arrival process: `1 - e^(-rate * t)`, plus one whole
    /// unit per completed cycle.
    Exponential { rate: f64 },
    /// Φ((t - mean) / std_dev).
    Normal { mean: f64, std_dev: f64 },
    /// Linear ramp over `[0, range]`.
    Uniform { range: f64 },
    /// Regularized lower incomplete gamma P(shape, t / scale).
    Gamma { shape: f64, scale: f64 },
    /// Chi distribution on the variable shifted by `location`.
    Chi { location: f64, degrees: u32 },
    /// Chi-square distribution on the variable shifted by `location`.
    ChiSquare { location: f64, degrees: u32 },
}

impl Distribution {
    pub fn from_params(
        name: DistributionName,
        intensity: f64,
        params: DistributionParams,
    ) -> Result<Self, DistributionConfigError> {
        let kind = params.validate(&name)?;
        if !(intensity > 0.0) || !intensity.is_finite() {
            return Err(DistributionConfigError::NonPositive {
                name,
                field: "intensity",
            });
        }
        Ok(Self {
            name,
            intensity,
            kind,
        })
    }

    pub fn name(&self) -> &DistributionName {
        &self.name
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    /// Probability mass accumulated up to `t` since the distribution's
    /// onset, plus one whole unit per completed cycle for unbounded-rate
    /// processes. Monotonically non-decreasing in `t`; 0 before onset.
    pub fn cdf(&self, t: Duration, cycle_count: u64) -> f64 {
        let t = t.as_secs_f64();
        match self.kind {
            DistributionKind::Exponential { rate } => {
                cycle_count as f64 + (1.0 - (-rate * t).exp())
            }
            DistributionKind::Normal { mean, std_dev } => {
                0.5 * (1.0 + erf((t - mean) / (std_dev * std::f64::consts::SQRT_2)))
            }
            DistributionKind::Uniform { range } => (t / range).clamp(0.0, 1.0),
            DistributionKind::Gamma { shape, scale } => regularized_gamma_p(shape, t / scale),
            DistributionKind::Chi { location, degrees } => {
                let x = t - location;
                if x <= 0.0 {
                    0.0
                } else {
                    regularized_gamma_p(degrees as f64 / 2.0, x * x / 2.0)
                }
            }
            DistributionKind::ChiSquare { location, degrees } => {
                let x = t - location;
                if x <= 0.0 {
                    0.0
                } else {
                    regularized_gamma_p(degrees as f64 / 2.0, x / 2.0)
                }
            }
        }
    }

    /// Number of firings in `[t1, t2)`: the count of integer thresholds
    /// crossed by `intensity * cdf(t)` between the two instants, clamped to
    /// be non-negative.
    pub fn check_trigger(&self, t1: Duration, t2: Duration, cycle_count: u64) -> u64 {
        let before = (self.intensity * self.cdf(t1, cycle_count)).floor();
        let after = (self.intensity * self.cdf(t2, cycle_count)).floor();
        if after > before {
            (after - before) as u64
        } else {
            0
        }
    }
}

/// Configuration-level description of a distribution, as it arrives from
/// the model definition. Validated into [`DistributionKind`] at assembly
/// time; a malformed parameterization is fatal to the definition.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DistributionParams {
    Exponential {
        rate: f64,
    },
    Normal {
        mean: f64,
        #[serde(rename = "std-dev")]
        std_dev: f64,
    },
    Uniform {
        range: f64,
    },
    /// Exactly one of `scale`, `rate`, `mean` must be supplied next to
    /// `shape`; the three are equivalent parameterizations.
    Gamma {
        shape: f64,
        #[serde(default)]
        scale: Option<f64>,
        #[serde(default)]
        rate: Option<f64>,
        #[serde(default)]
        mean: Option<f64>,
    },
    Chi {
        #[serde(default)]
        location: f64,
        degrees: u32,
    },
    ChiSquare {
        #[serde(default)]
        location: f64,
        degrees: u32,
    },
}

impl DistributionParams {
    fn validate(self, name: &DistributionName) -> Result<DistributionKind, DistributionConfigError> {
        let positive = |field: &'static str, value: f64| {
            if value > 0.0 && value.is_finite() {
                Ok(value)
            } else {
                Err(DistributionConfigError::NonPositive {
                    name: name.clone(),
                    field,
                })
            }
        };

        match self {
            DistributionParams::Exponential { rate } => Ok(DistributionKind::Exponential {
                rate: positive("rate", rate)?,
            }),
            DistributionParams::Normal { mean, std_dev } => Ok(DistributionKind::Normal {
                mean,
                std_dev: positive("std-dev", std_dev)?,
            }),
            DistributionParams::Uniform { range } => Ok(DistributionKind::Uniform {
                range: positive("range", range)?,
            }),
            DistributionParams::Gamma {
                shape,
                scale,
                rate,
                mean,
            } => {
                let shape = positive("shape", shape)?;
                let scale = match (scale, rate, mean) {
                    (Some(scale), None, None) => positive("scale", scale)?,
                    (None, Some(rate), None) => 1.0 / positive("rate", rate)?,
                    (None, None, Some(mean)) => positive("mean", mean)? / shape,
                    (None, None, None) => {
                        return Err(DistributionConfigError::MissingGammaParameterization {
                            name: name.clone(),
                        });
                    }
                    _ => {
                        return Err(DistributionConfigError::AmbiguousGammaParameterization {
                            name: name.clone(),
                        });
                    }
                };
                Ok(DistributionKind::Gamma { shape, scale })
            }
            DistributionParams::Chi { location, degrees } => {
                if degrees == 0 {
                    return Err(DistributionConfigError::NonPositive {
                        name: name.clone(),
                        field: "degrees",
                    });
                }
                Ok(DistributionKind::Chi { location, degrees })
            }
            DistributionParams::ChiSquare { location, degrees } => {
                if degrees == 0 {
                    return Err(DistributionConfigError::NonPositive {
                        name: name.clone(),
                        field: "degrees",
                    });
                }
                Ok(DistributionKind::ChiSquare { location, degrees })
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DistributionConfigError {
    #[error("distribution '{name}': parameter '{field}' must be positive and finite")]
    NonPositive {
        name: DistributionName,
        field: &'static str,
    },
    #[error("distribution '{name}': gamma requires one of scale, rate or mean")]
    MissingGammaParameterization { name: DistributionName },
    #[error("distribution '{name}': gamma accepts only one of scale, rate or mean")]
    AmbiguousGammaParameterization { name: DistributionName },
}

#[cfg(test)]
mod tests {
    use super::*;

    use protosim_test_util::assert;

    fn dist(intensity: f64, params: DistributionParams) -> Distribution {
        Distribution::from_params(DistributionName::from("d"), intensity, params).unwrap()
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn exponential_window_count() {
        // floor(10 * (1 - e^-1)) - floor(10 * 0) = floor(6.32) = 6
        let d = dist(10.0, DistributionParams::Exponential { rate: 1.0 });
        assert_eq!(d.check_trigger(Duration::ZERO, secs(1.0), 0), 6);
    }

    #[test]
    fn exponential_accumulates_cycles() {
        let d = dist(10.0, DistributionParams::Exponential { rate: 1.0 });
        // each completed cycle contributes one whole unit of mass
        assert!(d.cdf(secs(1.0), 2) > 2.0);
        assert_eq!(
            d.check_trigger(Duration::ZERO, secs(1.0), 2),
            d.check_trigger(Duration::ZERO, secs(1.0), 0)
        );
    }

    #[test]
    fn trigger_count_is_zero_on_empty_window() {
        for params in [
            DistributionParams::Exponential { rate: 0.5 },
            DistributionParams::Uniform { range: 60.0 },
            DistributionParams::Normal {
                mean: 30.0,
                std_dev: 5.0,
            },
        ] {
            let d = dist(7.0, params);
            assert_eq!(d.check_trigger(secs(3.0), secs(3.0), 0), 0);
        }
    }

    #[test]
    fn cdfs_are_monotone_and_zero_before_onset() {
        let distributions = vec![
            dist(1.0, DistributionParams::Exponential { rate: 0.7 }),
            dist(
                1.0,
                DistributionParams::Normal {
                    mean: 10.0,
                    std_dev: 2.0,
                },
            ),
            dist(1.0, DistributionParams::Uniform { range: 20.0 }),
            dist(
                1.0,
                DistributionParams::Gamma {
                    shape: 2.0,
                    scale: Some(3.0),
                    rate: None,
                    mean: None,
                },
            ),
            dist(
                1.0,
                DistributionParams::Chi {
                    location: 5.0,
                    degrees: 3,
                },
            ),
            dist(
                1.0,
                DistributionParams::ChiSquare {
                    location: 5.0,
                    degrees: 4,
                },
            ),
        ];

        for d in &distributions {
            let mut last = f64::NEG_INFINITY;
            for i in 0..200 {
                let t = secs(i as f64 * 0.2);
                let p = d.cdf(t, 0);
                assert!(p >= last, "{:?} cdf regressed at t={t:?}", d.kind);
                last = p;
            }
        }

        // shifted distributions carry no mass before their onset
        for d in &distributions[4..] {
            assert_eq!(d.cdf(secs(4.9), 0), 0.0);
            assert_eq!(d.cdf(Duration::ZERO, 0), 0.0);
        }
    }

    #[test]
    fn uniform_saturates_at_range() {
        let d = dist(4.0, DistributionParams::Uniform { range: 10.0 });
        assert_eq!(d.cdf(secs(10.0), 0), 1.0);
        assert_eq!(d.cdf(secs(25.0), 0), 1.0);
        // all four firings happen within the ramp
        assert_eq!(d.check_trigger(Duration::ZERO, secs(10.0), 0), 4);
        assert_eq!(d.check_trigger(secs(10.0), secs(20.0), 0), 0);
    }

    #[test]
    fn gamma_parameterizations_are_equivalent() {
        let by_scale = dist(
            1.0,
            DistributionParams::Gamma {
                shape: 2.0,
                scale: Some(4.0),
                rate: None,
                mean: None,
            },
        );
        let by_rate = dist(
            1.0,
            DistributionParams::Gamma {
                shape: 2.0,
                scale: None,
                rate: Some(0.25),
                mean: None,
            },
        );
        let by_mean = dist(
            1.0,
            DistributionParams::Gamma {
                shape: 2.0,
                scale: None,
                rate: None,
                mean: Some(8.0),
            },
        );

        for t in [1.0, 5.0, 20.0] {
            let p = by_scale.cdf(secs(t), 0);
            assert!((by_rate.cdf(secs(t), 0) - p).abs() < 1e-12);
            assert!((by_mean.cdf(secs(t), 0) - p).abs() < 1e-12);
        }
    }

    #[test]
    fn gamma_mixture_is_rejected() {
        let result = Distribution::from_params(
            DistributionName::from("bad"),
            1.0,
            DistributionParams::Gamma {
                shape: 2.0,
                scale: Some(1.0),
                rate: Some(1.0),
                mean: None,
            },
        );
        assert!(let Err(DistributionConfigError::AmbiguousGammaParameterization { .. }) = result);

        let result = Distribution::from_params(
            DistributionName::from("bad"),
            1.0,
            DistributionParams::Gamma {
                shape: 2.0,
                scale: None,
                rate: None,
                mean: None,
            },
        );
        assert!(let Err(DistributionConfigError::MissingGammaParameterization { .. }) = result);
    }

    #[test]
    fn params_deserialize_from_model_config() {
        let params: DistributionParams = serde_json::from_str(
            r#"{"type": "normal", "mean": 30.0, "std-dev": 5.0}"#,
        )
        .unwrap();
        let d = dist(2.0, params);
        // symmetric around the mean
        assert!((d.cdf(secs(30.0), 0) - 0.5).abs() < 1e-7);
    }

    #[test]
    fn chi_square_median_with_two_degrees() {
        let d = dist(
            1.0,
            DistributionParams::ChiSquare {
                location: 0.0,
                degrees: 2,
            },
        );
        // median of chi-square with k=2 is 2 ln 2
        let median = 2.0 * 2.0f64.ln();
        assert!((d.cdf(secs(median), 0) - 0.5).abs() < 1e-9);
    }
}
