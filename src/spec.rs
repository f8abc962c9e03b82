use crate::formula::{Formula, FormulaError};
use crate::prior::{Prior, PriorSetting};
use crate::types::Link;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while merging and normalizing parameter specifications.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpecError {
    #[error("Parameter \"{name}\" is already specified in `include`.")]
    DuplicateSpecification { name: String },

    #[error("Entry {index} of `include` must be a mapping with a `name` string.")]
    MissingName { index: usize },

    #[error("Specification for parameter `{name}` has unrecognized keys: {}.", keys.join(", "))]
    UnrecognizedKeys { name: String, keys: Vec<String> },

    #[error("Specification for parameter `{name}` sets {} together; they are mutually exclusive.", fields.join(" and "))]
    ConflictingFields { name: String, fields: Vec<String> },

    #[error("Field `{field}` of parameter `{name}` must be a {expected}.")]
    InvalidFieldType {
        name: String,
        field: String,
        expected: String,
    },

    #[error("Prior for parameter `{name}` is malformed: {detail}")]
    MalformedPrior { name: String, detail: String },

    #[error("Link `{link}` for parameter `{name}` is not recognized.")]
    InvalidLink { name: String, link: String },

    #[error("Specification for parameter `{name}` has unsupported shape: {found}.")]
    UnsupportedShape { name: String, found: String },

    #[error(transparent)]
    Formula(#[from] FormulaError),
}

/// One loose, user-supplied parameter specification. Builder overrides and
/// `include` entries both funnel into this shape before normalization.
#[derive(Debug, Clone)]
pub enum ParamInput {
    Fixed(f64),
    Dist(Prior),
    /// A JSON-style mapping with `prior`/`value`/`formula`/`link` keys.
    Spec(Value),
}

impl From<f64> for ParamInput {
    fn from(value: f64) -> Self {
        ParamInput::Fixed(value)
    }
}

impl From<Prior> for ParamInput {
    fn from(prior: Prior) -> Self {
        ParamInput::Dist(prior)
    }
}

impl From<Value> for ParamInput {
    fn from(value: Value) -> Self {
        ParamInput::Spec(value)
    }
}

/// Canonical form of one parameter specification. Every surviving user input
/// is exactly one of these three shapes; downstream code never re-inspects
/// the loose input.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSpec {
    Fixed {
        value: f64,
    },
    PriorOnly {
        prior: Prior,
    },
    Regression {
        formula: Formula,
        priors: BTreeMap<String, PriorSetting>,
        link: Link,
    },
}

impl ParamSpec {
    pub fn is_regression(&self) -> bool {
        matches!(self, ParamSpec::Regression { .. })
    }
}

/// Combine the `include` list with per-parameter overrides into one ordered
/// `name -> loose input` sequence (`include` order first, then override
/// order). Specifying the same parameter from both sources is an error.
pub fn merge_overrides(
    include: &[Value],
    overrides: &[(String, ParamInput)],
) -> Result<Vec<(String, ParamInput)>, SpecError> {
    let mut merged: Vec<(String, ParamInput)> = Vec::with_capacity(include.len() + overrides.len());

    for (index, entry) in include.iter().enumerate() {
        let object = entry.as_object().ok_or(SpecError::MissingName { index })?;
        let name = object
            .get("name")
            .and_then(Value::as_str)
            .ok_or(SpecError::MissingName { index })?
            .to_string();
        if merged.iter().any(|(n, _)| *n == name) {
            return Err(SpecError::DuplicateSpecification { name });
        }
        let mut body = object.clone();
        body.remove("name");
        merged.push((name, ParamInput::Spec(Value::Object(body))));
    }

    for (name, input) in overrides {
        if merged.iter().any(|(n, _)| n == name) {
            return Err(SpecError::DuplicateSpecification { name: name.clone() });
        }
        merged.push((name.clone(), input.clone()));
    }

    Ok(merged)
}

fn parse_prior_object(name: &str, value: &Value) -> Result<Prior, SpecError> {
    serde_json::from_value::<Prior>(value.clone()).map_err(|e| SpecError::MalformedPrior {
        name: name.to_string(),
        detail: e.to_string(),
    })
}

fn parse_term_priors(
    name: &str,
    value: &Value,
) -> Result<BTreeMap<String, PriorSetting>, SpecError> {
    let object = value.as_object().ok_or_else(|| SpecError::MalformedPrior {
        name: name.to_string(),
        detail: format!(
            "a regression prior must map term names to distributions, found {}",
            shape_of(value)
        ),
    })?;
    if object.get("name").map(Value::is_string).unwrap_or(false) {
        return Err(SpecError::MalformedPrior {
            name: name.to_string(),
            detail: "a regression prior must map term names (e.g. \"Intercept\") to \
                     distributions, not be a single distribution"
                .to_string(),
        });
    }
    let mut priors = BTreeMap::new();
    for (term, spec) in object {
        let setting = if let Some(v) = spec.as_f64() {
            PriorSetting::Fixed(v)
        } else if spec.is_object() {
            PriorSetting::Dist(parse_prior_object(name, spec)?)
        } else {
            return Err(SpecError::MalformedPrior {
                name: name.to_string(),
                detail: format!("prior for term `{term}` must be a number or a distribution"),
            });
        };
        priors.insert(term.clone(), setting);
    }
    Ok(priors)
}

fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}

const SPEC_KEYS: [&str; 4] = ["prior", "value", "formula", "link"];

fn normalize_mapping(name: &str, value: &Value) -> Result<ParamSpec, SpecError> {
    let object = match value {
        Value::Number(n) => {
            return n.as_f64().map(|v| ParamSpec::Fixed { value: v }).ok_or(
                SpecError::UnsupportedShape {
                    name: name.to_string(),
                    found: "a non-finite number".to_string(),
                },
            );
        }
        Value::Object(object) => object,
        other => {
            return Err(SpecError::UnsupportedShape {
                name: name.to_string(),
                found: shape_of(other).to_string(),
            });
        }
    };

    let unrecognized: Vec<String> = object
        .keys()
        .filter(|k| !SPEC_KEYS.contains(&k.as_str()))
        .cloned()
        .collect();
    if !unrecognized.is_empty() {
        return Err(SpecError::UnrecognizedKeys {
            name: name.to_string(),
            keys: unrecognized,
        });
    }

    let has_formula = object.contains_key("formula");
    let present: Vec<String> = ["value", "prior", "formula"]
        .iter()
        .filter(|k| object.contains_key(**k))
        .map(|k| format!("`{k}`"))
        .collect();
    if object.contains_key("value") && (object.contains_key("prior") || has_formula) {
        return Err(SpecError::ConflictingFields {
            name: name.to_string(),
            fields: present,
        });
    }
    if object.contains_key("link") && !has_formula {
        return Err(SpecError::UnrecognizedKeys {
            name: name.to_string(),
            keys: vec!["link".to_string()],
        });
    }

    if has_formula {
        let formula_str = object
            .get("formula")
            .and_then(Value::as_str)
            .ok_or_else(|| SpecError::InvalidFieldType {
                name: name.to_string(),
                field: "formula".to_string(),
                expected: "string".to_string(),
            })?;
        let formula = Formula::parse_for(name, formula_str)?;
        let link = match object.get("link") {
            None => Link::default(),
            Some(v) => {
                let link_str = v.as_str().ok_or_else(|| SpecError::InvalidFieldType {
                    name: name.to_string(),
                    field: "link".to_string(),
                    expected: "string".to_string(),
                })?;
                link_str.parse().map_err(|_| SpecError::InvalidLink {
                    name: name.to_string(),
                    link: link_str.to_string(),
                })?
            }
        };
        let priors = match object.get("prior") {
            None => BTreeMap::new(),
            Some(v) => parse_term_priors(name, v)?,
        };
        return Ok(ParamSpec::Regression {
            formula,
            priors,
            link,
        });
    }

    if let Some(v) = object.get("value") {
        let value = v.as_f64().ok_or_else(|| SpecError::InvalidFieldType {
            name: name.to_string(),
            field: "value".to_string(),
            expected: "number".to_string(),
        })?;
        return Ok(ParamSpec::Fixed { value });
    }

    match object.get("prior") {
        Some(Value::Number(n)) => n.as_f64().map(|v| ParamSpec::Fixed { value: v }).ok_or(
            SpecError::MalformedPrior {
                name: name.to_string(),
                detail: "prior is a non-finite number".to_string(),
            },
        ),
        Some(v @ Value::Object(_)) => Ok(ParamSpec::PriorOnly {
            prior: parse_prior_object(name, v)?,
        }),
        Some(other) => Err(SpecError::MalformedPrior {
            name: name.to_string(),
            detail: format!(
                "a prior must be a number or a distribution mapping, found {}",
                shape_of(other)
            ),
        }),
        None => Err(SpecError::UnsupportedShape {
            name: name.to_string(),
            found: "a mapping with neither `value`, `prior`, nor `formula`".to_string(),
        }),
    }
}

/// Normalize one merged entry into its canonical shape. This is the single
/// place that branches on the loose input's shape.
pub fn normalize(name: &str, input: &ParamInput) -> Result<ParamSpec, SpecError> {
    match input {
        ParamInput::Fixed(value) => Ok(ParamSpec::Fixed { value: *value }),
        ParamInput::Dist(prior) => Ok(ParamSpec::PriorOnly {
            prior: prior.clone(),
        }),
        ParamInput::Spec(value) => normalize_mapping(name, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(value: Value) -> ParamInput {
        ParamInput::Spec(value)
    }

    #[test]
    fn merge_preserves_include_then_override_order() {
        let include = vec![json!({"name": "v", "formula": "v ~ 1 + x"})];
        let overrides = vec![("a".to_string(), ParamInput::Fixed(0.5))];
        let merged = merge_overrides(&include, &overrides).unwrap();
        let names: Vec<&str> = merged.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["v", "a"]);
    }

    #[test]
    fn merge_rejects_parameter_in_both_sources() {
        let include = vec![json!({"name": "a", "prior": 0.5})];
        let overrides = vec![("a".to_string(), ParamInput::Fixed(0.5))];
        let err = merge_overrides(&include, &overrides).unwrap_err();
        assert_eq!(
            err,
            SpecError::DuplicateSpecification {
                name: "a".to_string()
            }
        );
        assert!(err
            .to_string()
            .contains("Parameter \"a\" is already specified in `include`"));
    }

    #[test]
    fn merge_rejects_duplicates_within_include() {
        let include = vec![
            json!({"name": "v", "prior": 0.5}),
            json!({"name": "v", "formula": "v ~ 1"}),
        ];
        assert!(matches!(
            merge_overrides(&include, &[]).unwrap_err(),
            SpecError::DuplicateSpecification { .. }
        ));
    }

    #[test]
    fn merge_rejects_entries_without_name() {
        let include = vec![json!({"prior": 0.5})];
        assert_eq!(
            merge_overrides(&include, &[]).unwrap_err(),
            SpecError::MissingName { index: 0 }
        );
    }

    #[test]
    fn scalar_normalizes_to_fixed() {
        assert_eq!(
            normalize("a", &ParamInput::Fixed(0.5)).unwrap(),
            ParamSpec::Fixed { value: 0.5 }
        );
        assert_eq!(
            normalize("a", &spec(json!(1.5))).unwrap(),
            ParamSpec::Fixed { value: 1.5 }
        );
        assert_eq!(
            normalize("t", &spec(json!({"value": 0.2}))).unwrap(),
            ParamSpec::Fixed { value: 0.2 }
        );
    }

    #[test]
    fn prior_mapping_normalizes_to_prior_only() {
        let got = normalize(
            "a",
            &spec(json!({"prior": {"name": "Normal", "mu": 0.5, "sigma": 0.1}})),
        )
        .unwrap();
        match got {
            ParamSpec::PriorOnly { prior } => {
                assert_eq!(prior.name, "Normal");
                assert_eq!(prior.param("mu"), Some(0.5));
            }
            other => panic!("expected PriorOnly, got {other:?}"),
        }
    }

    #[test]
    fn formula_with_term_priors_normalizes_to_regression() {
        let got = normalize(
            "v",
            &spec(json!({
                "prior": {
                    "Intercept": {"name": "Uniform", "lower": -3.0, "upper": 3.0},
                    "x": {"name": "Uniform", "lower": -0.5, "upper": 0.5},
                },
                "formula": "v ~ 1 + x",
                "link": "identity",
            })),
        )
        .unwrap();
        match got {
            ParamSpec::Regression {
                formula,
                priors,
                link,
            } => {
                assert_eq!(formula.lhs, "v");
                assert_eq!(link, Link::Identity);
                assert_eq!(priors.len(), 2);
                assert_eq!(priors["x"].as_dist().unwrap().name, "Uniform");
            }
            other => panic!("expected Regression, got {other:?}"),
        }
    }

    #[test]
    fn bare_string_prior_is_rejected() {
        let err = normalize("invalid_param", &spec(json!({"prior": "invalid_param"}))).unwrap_err();
        assert!(matches!(err, SpecError::MalformedPrior { ref name, .. } if name == "invalid_param"));
    }

    #[test]
    fn unrecognized_keys_are_rejected_by_name() {
        let err = normalize(
            "v",
            &spec(json!({
                "prior": {"Intercept": {"name": "Uniform", "lower": -3.0, "upper": 3.0}},
                "formula": "v ~ 1",
                "invalid_key": "identity",
            })),
        )
        .unwrap_err();
        assert_eq!(
            err,
            SpecError::UnrecognizedKeys {
                name: "v".to_string(),
                keys: vec!["invalid_key".to_string()],
            }
        );
    }

    #[test]
    fn formula_lhs_must_match_parameter_name() {
        let err = normalize(
            "v",
            &spec(json!({
                "prior": {"Intercept": {"name": "Uniform", "lower": -3.0, "upper": 3.0}},
                "formula": "invalid_formula",
            })),
        )
        .unwrap_err();
        assert!(matches!(err, SpecError::Formula(_)));
    }

    #[test]
    fn value_and_prior_are_mutually_exclusive() {
        let err = normalize("a", &spec(json!({"value": 0.5, "prior": 0.6}))).unwrap_err();
        assert!(matches!(err, SpecError::ConflictingFields { .. }));
    }

    #[test]
    fn link_without_formula_is_rejected() {
        let err = normalize("a", &spec(json!({"prior": 0.5, "link": "log"}))).unwrap_err();
        assert!(matches!(err, SpecError::UnrecognizedKeys { .. }));
    }
}
