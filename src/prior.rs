use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A named prior distribution with scalar hyperparameters, e.g.
/// `{"name": "Normal", "mu": 0.5, "sigma": 0.1}`.
///
/// The hyperparameter names are interpreted by the sampling layer; the
/// specification layer only checks shape, not distribution semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prior {
    pub name: String,
    #[serde(flatten)]
    pub params: BTreeMap<String, f64>,
}

impl Prior {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Attach one hyperparameter, builder style.
    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn param(&self, key: &str) -> Option<f64> {
        self.params.get(key).copied()
    }

    pub fn uniform(lower: f64, upper: f64) -> Self {
        Prior::new("Uniform").with("lower", lower).with("upper", upper)
    }

    pub fn normal(mu: f64, sigma: f64) -> Self {
        Prior::new("Normal").with("mu", mu).with("sigma", sigma)
    }

    pub fn half_normal(sigma: f64) -> Self {
        Prior::new("HalfNormal").with("sigma", sigma)
    }
}

impl fmt::Display for Prior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str(")")
    }
}

/// A prior setting for one regression term: either pinned to a constant or a
/// full distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriorSetting {
    Fixed(f64),
    Dist(Prior),
}

impl PriorSetting {
    pub fn as_fixed(&self) -> Option<f64> {
        match self {
            PriorSetting::Fixed(v) => Some(*v),
            PriorSetting::Dist(_) => None,
        }
    }

    pub fn as_dist(&self) -> Option<&Prior> {
        match self {
            PriorSetting::Fixed(_) => None,
            PriorSetting::Dist(p) => Some(p),
        }
    }
}

impl From<f64> for PriorSetting {
    fn from(value: f64) -> Self {
        PriorSetting::Fixed(value)
    }
}

impl From<Prior> for PriorSetting {
    fn from(prior: Prior) -> Self {
        PriorSetting::Dist(prior)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prior_deserializes_with_flattened_hyperparameters() {
        let prior: Prior =
            serde_json::from_value(json!({"name": "Normal", "mu": 0.5, "sigma": 0.1})).unwrap();
        assert_eq!(prior.name, "Normal");
        assert_eq!(prior.param("mu"), Some(0.5));
        assert_eq!(prior.param("sigma"), Some(0.1));
    }

    #[test]
    fn prior_rejects_non_numeric_hyperparameters() {
        let bad = serde_json::from_value::<Prior>(json!({"name": "Normal", "mu": "wide"}));
        assert!(bad.is_err());
    }

    #[test]
    fn display_is_compact() {
        let p = Prior::uniform(-3.0, 3.0);
        assert_eq!(p.to_string(), "Uniform(lower=-3, upper=3)");
    }
}
