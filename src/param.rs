use crate::data::Data;
use crate::formula::{Formula, Term};
use crate::prior::{Prior, PriorSetting};
use crate::registry::ResolvedConfig;
use crate::spec::ParamSpec;
use crate::types::{Bounds, Link};
use log::warn;
use std::collections::BTreeMap;
use thiserror::Error;

/// Grouping column used for the default hierarchical baseline, when present
/// in the data.
pub const PARTICIPANT_COLUMN: &str = "participant_id";

/// Errors raised while materializing resolved parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    #[error(
        "Prior for parameter `{param}` names term `{term}`, which is not part of its formula."
    )]
    UnknownTerm { param: String, term: String },

    #[error("Formula for parameter `{param}` references column `{column}`, which is not in the data.")]
    UnknownColumn { param: String, column: String },
}

/// One fully resolved model parameter. Built once per model construction and
/// immutable thereafter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub spec: ParamSpec,
    pub bounds: Option<Bounds>,
}

impl Param {
    pub fn is_regression(&self) -> bool {
        self.spec.is_regression()
    }

    pub fn formula(&self) -> Option<&Formula> {
        match &self.spec {
            ParamSpec::Regression { formula, .. } => Some(formula),
            _ => None,
        }
    }

    pub fn link(&self) -> Link {
        match &self.spec {
            ParamSpec::Regression { link, .. } => *link,
            _ => Link::Identity,
        }
    }
}

fn default_prior(name: &str, bounds: Option<Bounds>, resolved: &ResolvedConfig) -> Prior {
    if let Some(prior) = resolved.default_priors.get(name) {
        return prior.clone();
    }
    match bounds {
        Some((lower, upper)) if lower.is_finite() && upper.is_finite() => {
            Prior::uniform(lower, upper)
        }
        _ => Prior::normal(0.0, 2.0),
    }
}

/// The hierarchical baseline for a parameter nobody touched: an
/// intercept-only regression, grouped by participant when the column exists.
fn default_regression(
    name: &str,
    bounds: Option<Bounds>,
    resolved: &ResolvedConfig,
    data: &Data,
) -> ParamSpec {
    let formula_str = if data.has_column(PARTICIPANT_COLUMN) {
        format!("{name} ~ 1 + (1|{PARTICIPANT_COLUMN})")
    } else {
        format!("{name} ~ 1")
    };
    let formula = Formula::parse_for(name, &formula_str)
        .expect("default formulas are always well formed");
    let mut priors = BTreeMap::new();
    priors.insert(
        "Intercept".to_string(),
        PriorSetting::Dist(default_prior(name, bounds, resolved)),
    );
    ParamSpec::Regression {
        formula,
        priors,
        link: Link::Identity,
    }
}

fn validate_regression(
    name: &str,
    formula: &Formula,
    priors: &BTreeMap<String, PriorSetting>,
    data: &Data,
) -> Result<(), ParamError> {
    for covariate in formula.covariates() {
        if !data.has_column(covariate) {
            return Err(ParamError::UnknownColumn {
                param: name.to_string(),
                column: covariate.to_string(),
            });
        }
    }
    for group in formula.groups() {
        if !data.has_column(group) {
            return Err(ParamError::UnknownColumn {
                param: name.to_string(),
                column: group.to_string(),
            });
        }
    }
    let term_keys = formula.term_keys();
    for key in priors.keys() {
        if !term_keys.iter().any(|k| k == key) {
            return Err(ParamError::UnknownTerm {
                param: name.to_string(),
                term: key.clone(),
            });
        }
    }
    Ok(())
}

/// Fill per-term priors missing from a validated regression spec.
fn complete_regression_priors(
    name: &str,
    formula: &Formula,
    priors: &mut BTreeMap<String, PriorSetting>,
    bounds: Option<Bounds>,
    resolved: &ResolvedConfig,
) {
    for term in &formula.terms {
        let key = term.key();
        if priors.contains_key(&key) {
            continue;
        }
        let prior = match term {
            Term::Intercept => default_prior(name, bounds, resolved),
            Term::Covariate(_) => Prior::normal(0.0, 2.0),
            // sd of the group offsets
            Term::RandomIntercept(_) => Prior::half_normal(1.0),
        };
        priors.insert(key, PriorSetting::Dist(prior));
    }
}

/// Materialize one `Param` per resolved name, in `list_params` order, then
/// any regression parameters introduced only through `include`.
pub fn build_params(
    resolved: &ResolvedConfig,
    specs: Vec<(String, ParamSpec)>,
    data: &Data,
) -> Result<Vec<Param>, ParamError> {
    let mut remaining: Vec<(String, ParamSpec)> = specs;
    let mut params = Vec::with_capacity(resolved.list_params.len());

    let mut ordered_names: Vec<String> = resolved.list_params.clone();
    for (name, _) in &remaining {
        if !ordered_names.iter().any(|n| n == name) {
            ordered_names.push(name.clone());
        }
    }

    for name in ordered_names {
        let bounds = resolved.bounds_for(&name);
        let position = remaining.iter().position(|(n, _)| *n == name);
        let spec = match position {
            Some(i) => remaining.remove(i).1,
            None => default_regression(&name, bounds, resolved, data),
        };
        let spec = match spec {
            ParamSpec::Regression {
                formula,
                mut priors,
                link,
            } => {
                validate_regression(&name, &formula, &priors, data)?;
                complete_regression_priors(&name, &formula, &mut priors, bounds, resolved);
                ParamSpec::Regression {
                    formula,
                    priors,
                    link,
                }
            }
            ParamSpec::Fixed { value } => {
                if let Some((lower, upper)) = bounds {
                    if value < lower || value > upper {
                        warn!(
                            "fixed value {value} for parameter `{name}` lies outside its bounds ({lower}, {upper})"
                        );
                    }
                }
                ParamSpec::Fixed { value }
            }
            other => other,
        };
        params.push(Param {
            name,
            spec,
            bounds,
        });
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{lookup, ResolvedConfig};
    use crate::types::LoglikKind;
    use serde_json::json;

    fn data() -> Data {
        Data::new(vec![0.5, 0.7, 0.9], vec![1.0, -1.0, 1.0])
            .unwrap()
            .with_column("x", vec![0.1, 0.2, 0.3])
            .unwrap()
    }

    fn resolved() -> ResolvedConfig {
        let entry = lookup("ddm", LoglikKind::Analytical).unwrap();
        ResolvedConfig::from_registry(entry, None)
    }

    fn regression_spec(name: &str, formula: &str) -> ParamSpec {
        crate::spec::normalize(
            name,
            &crate::spec::ParamInput::Spec(json!({"formula": formula})),
        )
        .unwrap()
    }

    #[test]
    fn untouched_parameters_default_to_intercept_regressions() {
        let params = build_params(&resolved(), Vec::new(), &data()).unwrap();
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["v", "a", "z", "t"]);
        assert!(params.iter().all(Param::is_regression));
    }

    #[test]
    fn default_regression_groups_by_participant_when_present() {
        let data = data()
            .with_column(PARTICIPANT_COLUMN, vec![1.0, 2.0, 3.0])
            .unwrap();
        let params = build_params(&resolved(), Vec::new(), &data).unwrap();
        let v = &params[0];
        assert!(v
            .formula()
            .unwrap()
            .groups()
            .any(|g| g == PARTICIPANT_COLUMN));
    }

    #[test]
    fn fixed_override_is_not_a_regression() {
        let specs = vec![("a".to_string(), ParamSpec::Fixed { value: 0.5 })];
        let params = build_params(&resolved(), specs, &data()).unwrap();
        let a = params.iter().find(|p| p.name == "a").unwrap();
        assert!(!a.is_regression());
        assert_eq!(a.spec, ParamSpec::Fixed { value: 0.5 });
    }

    #[test]
    fn regression_priors_are_completed_with_defaults() {
        let specs = vec![("v".to_string(), regression_spec("v", "v ~ 1 + x"))];
        let params = build_params(&resolved(), specs, &data()).unwrap();
        let v = &params[0];
        match &v.spec {
            ParamSpec::Regression { priors, .. } => {
                assert!(priors.contains_key("Intercept"));
                assert!(priors.contains_key("x"));
            }
            other => panic!("expected regression, got {other:?}"),
        }
    }

    #[test]
    fn unknown_prior_term_is_rejected() {
        let spec = crate::spec::normalize(
            "v",
            &crate::spec::ParamInput::Spec(json!({
                "formula": "v ~ 1 + x",
                "prior": {"z_scored": {"name": "Normal", "mu": 0.0, "sigma": 1.0}},
            })),
        )
        .unwrap();
        let err = build_params(&resolved(), vec![("v".to_string(), spec)], &data()).unwrap_err();
        assert_eq!(
            err,
            ParamError::UnknownTerm {
                param: "v".to_string(),
                term: "z_scored".to_string(),
            }
        );
    }

    #[test]
    fn formula_covariates_must_exist_in_data() {
        let specs = vec![("v".to_string(), regression_spec("v", "v ~ 1 + missing"))];
        let err = build_params(&resolved(), specs, &data()).unwrap_err();
        assert_eq!(
            err,
            ParamError::UnknownColumn {
                param: "v".to_string(),
                column: "missing".to_string(),
            }
        );
    }

    #[test]
    fn include_only_parameters_are_appended_after_list_params() {
        let specs = vec![("slope_scale".to_string(), ParamSpec::Fixed { value: 1.0 })];
        let params = build_params(&resolved(), specs, &data()).unwrap();
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["v", "a", "z", "t", "slope_scale"]);
    }
}
