use crate::data::Data;
use crate::formula::Term;
use crate::model::{Model, OUTLIER_PARAM};
use crate::param::Param;
use crate::prior::{Prior, PriorSetting};
use crate::spec::ParamSpec;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Beta, Distribution, Gamma, Normal};
use std::collections::BTreeMap;
use thiserror::Error;

const STEP_SIZE: f64 = 1e-3;
const MAX_DECISION_TIME: f64 = 10.0;

/// Errors raised while drawing from priors or simulating trials.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SamplingError {
    #[error("Cannot sample from unknown distribution `{name}` (parameter `{param}`).")]
    UnknownDistribution { param: String, name: String },

    #[error("Distribution `{name}` for parameter `{param}` is missing hyperparameter `{hyper}`.")]
    MissingHyperparameter {
        param: String,
        name: String,
        hyper: String,
    },

    #[error("Distribution `{name}` for parameter `{param}` has invalid hyperparameters: {detail}")]
    InvalidHyperparameters {
        param: String,
        name: String,
        detail: String,
    },

    #[error("Column `{column}` disappeared from the data during sampling.")]
    MissingColumn { column: String },
}

/// Prior-predictive draws: one row per draw, one column per observation.
#[derive(Debug, Clone)]
pub struct PriorPredictive {
    pub rt: Array2<f64>,
    pub response: Array2<f64>,
}

impl PriorPredictive {
    pub fn n_draws(&self) -> usize {
        self.rt.nrows()
    }

    pub fn n_obs(&self) -> usize {
        self.rt.ncols()
    }
}

fn draw_prior<R: Rng + ?Sized>(
    param: &str,
    prior: &Prior,
    rng: &mut R,
) -> Result<f64, SamplingError> {
    let hyper = |key: &str| {
        prior
            .param(key)
            .ok_or_else(|| SamplingError::MissingHyperparameter {
                param: param.to_string(),
                name: prior.name.clone(),
                hyper: key.to_string(),
            })
    };
    let invalid = |detail: String| SamplingError::InvalidHyperparameters {
        param: param.to_string(),
        name: prior.name.clone(),
        detail,
    };

    match prior.name.as_str() {
        "Uniform" => {
            let lower = hyper("lower")?;
            let upper = hyper("upper")?;
            if !(lower < upper) {
                return Err(invalid(format!("lower ({lower}) must be below upper ({upper})")));
            }
            Ok(rng.gen_range(lower..upper))
        }
        "Normal" => {
            let dist =
                Normal::new(hyper("mu")?, hyper("sigma")?).map_err(|e| invalid(e.to_string()))?;
            Ok(dist.sample(rng))
        }
        "HalfNormal" => {
            let dist = Normal::new(0.0, hyper("sigma")?).map_err(|e| invalid(e.to_string()))?;
            Ok(dist.sample(rng).abs())
        }
        "Beta" => {
            let dist =
                Beta::new(hyper("alpha")?, hyper("beta")?).map_err(|e| invalid(e.to_string()))?;
            Ok(dist.sample(rng))
        }
        "Gamma" => {
            let rate = hyper("beta")?;
            if rate <= 0.0 {
                return Err(invalid(format!("rate must be positive, got {rate}")));
            }
            let dist =
                Gamma::new(hyper("alpha")?, 1.0 / rate).map_err(|e| invalid(e.to_string()))?;
            Ok(dist.sample(rng))
        }
        other => Err(SamplingError::UnknownDistribution {
            param: param.to_string(),
            name: other.to_string(),
        }),
    }
}

fn draw_setting<R: Rng + ?Sized>(
    param: &str,
    setting: &PriorSetting,
    rng: &mut R,
) -> Result<f64, SamplingError> {
    match setting {
        PriorSetting::Fixed(value) => Ok(*value),
        PriorSetting::Dist(prior) => draw_prior(param, prior, rng),
    }
}

/// One prior draw of a parameter, expanded to a per-observation vector.
fn draw_param_values<R: Rng + ?Sized>(
    param: &Param,
    data: &Data,
    rng: &mut R,
) -> Result<Array1<f64>, SamplingError> {
    let n = data.n_trials();
    let values = match &param.spec {
        ParamSpec::Fixed { value } => Array1::from_elem(n, *value),
        ParamSpec::PriorOnly { prior } => {
            Array1::from_elem(n, draw_prior(&param.name, prior, rng)?)
        }
        ParamSpec::Regression {
            formula,
            priors,
            link,
        } => {
            let mut eta = Array1::<f64>::zeros(n);
            for term in &formula.terms {
                let key = term.key();
                let setting = priors.get(&key);
                match term {
                    Term::Intercept => {
                        let beta = match setting {
                            Some(s) => draw_setting(&param.name, s, rng)?,
                            None => 0.0,
                        };
                        eta += beta;
                    }
                    Term::Covariate(column) => {
                        let beta = match setting {
                            Some(s) => draw_setting(&param.name, s, rng)?,
                            None => 0.0,
                        };
                        let x = data.column(column).ok_or_else(|| {
                            SamplingError::MissingColumn {
                                column: column.clone(),
                            }
                        })?;
                        eta = eta + x.mapv(|v| v * beta);
                    }
                    Term::RandomIntercept(group) => {
                        // Draw the group sd, then one offset per level.
                        let sd = match setting {
                            Some(s) => draw_setting(&param.name, s, rng)?.abs(),
                            None => 1.0,
                        };
                        let levels = data.unique_levels(group).ok_or_else(|| {
                            SamplingError::MissingColumn {
                                column: group.clone(),
                            }
                        })?;
                        let mut offsets = BTreeMap::new();
                        for level in &levels {
                            offsets.insert(level.to_bits(), sd * rng.sample::<f64, _>(rand_distr::StandardNormal));
                        }
                        let col = data.column(group).ok_or_else(|| {
                            SamplingError::MissingColumn {
                                column: group.clone(),
                            }
                        })?;
                        for (i, value) in col.iter().enumerate() {
                            eta[i] += offsets.get(&value.to_bits()).copied().unwrap_or(0.0);
                        }
                    }
                }
            }
            eta.mapv(|e| link.inverse(e))
        }
    };
    let clamped = match param.bounds {
        Some((lower, upper)) if lower.is_finite() && upper.is_finite() => {
            // keep draws inside the parameter's support
            let width = upper - lower;
            values.mapv(|v| v.clamp(lower + 1e-6 * width, upper - 1e-6 * width))
        }
        Some((lower, upper)) => values.mapv(|v| {
            let v = if lower.is_finite() { v.max(lower + 1e-9) } else { v };
            if upper.is_finite() {
                v.min(upper - 1e-9)
            } else {
                v
            }
        }),
        None => values,
    };
    Ok(clamped)
}

/// Forward-simulate one trial of the diffusion process with an
/// Euler-Maruyama walk between absorbing boundaries.
fn simulate_trial<R: Rng + ?Sized>(v: f64, a: f64, z: f64, t: f64, rng: &mut R) -> (f64, f64) {
    let a = a.max(1e-3);
    let z = z.clamp(1e-3, 1.0 - 1e-3);
    let t = t.max(0.0);
    let noise = STEP_SIZE.sqrt();
    let mut x = z * a;
    let mut elapsed = 0.0;
    while elapsed < MAX_DECISION_TIME {
        x += v * STEP_SIZE + noise * rng.sample::<f64, _>(rand_distr::StandardNormal);
        elapsed += STEP_SIZE;
        if x <= 0.0 {
            return (t + elapsed, -1.0);
        }
        if x >= a {
            return (t + elapsed, 1.0);
        }
    }
    // censored walk: report the boundary the process leans toward
    let response = if x >= a / 2.0 { 1.0 } else { -1.0 };
    (t + MAX_DECISION_TIME, response)
}

impl Model {
    /// Draw from the prior predictive distribution: `draws` synthetic
    /// datasets over the model's observations. With a seed, the draw
    /// sequence is deterministic.
    ///
    /// The forward simulation uses the diffusion parameters `v`, `a`, `z`
    /// and `t`; parameters outside that set shape the draws only through
    /// their priors. When `p_outlier` is enabled, each trial is replaced by
    /// a uniform contaminant with that probability.
    pub fn sample_prior_predictive(
        &self,
        draws: usize,
        seed: Option<u64>,
    ) -> Result<PriorPredictive, SamplingError> {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.sample_prior_predictive_with(draws, &mut rng)
    }

    /// As `sample_prior_predictive`, but with a caller-owned generator.
    pub fn sample_prior_predictive_with<R: Rng + ?Sized>(
        &self,
        draws: usize,
        rng: &mut R,
    ) -> Result<PriorPredictive, SamplingError> {
        let n = self.data.n_trials();
        let mut rt = Array2::<f64>::zeros((draws, n));
        let mut response = Array2::<f64>::zeros((draws, n));

        for d in 0..draws {
            let mut values: BTreeMap<&str, Array1<f64>> = BTreeMap::new();
            for param in &self.params {
                values.insert(param.name.as_str(), draw_param_values(param, &self.data, rng)?);
            }
            let pick = |name: &str, default: f64| -> Array1<f64> {
                values
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| Array1::from_elem(n, default))
            };
            let v = pick("v", 0.0);
            let a = pick("a", 1.0);
            let z = pick("z", 0.5);
            let t = pick("t", 0.0);
            let p_outlier = values
                .get(OUTLIER_PARAM)
                .map(|p| p[0].clamp(0.0, 1.0))
                .unwrap_or(0.0);

            for i in 0..n {
                let (trial_rt, trial_response) = if p_outlier > 0.0 && rng.gen::<f64>() < p_outlier
                {
                    // contaminant process: uniform rt, random boundary
                    let contaminant_rt = rng.gen_range(0.0..MAX_DECISION_TIME);
                    let resp = if rng.gen::<bool>() { 1.0 } else { -1.0 };
                    (contaminant_rt, resp)
                } else {
                    simulate_trial(v[i], a[i], z[i], t[i], rng)
                };
                rt[[d, i]] = trial_rt;
                response[[d, i]] = trial_response;
            }
        }

        Ok(PriorPredictive { rt, response })
    }
}
