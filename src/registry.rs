use crate::prior::Prior;
use crate::types::{Bounds, LoglikKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const INF: f64 = f64::INFINITY;

/// One read-only registry entry: the default parameterization of a supported
/// (generative model, likelihood kind) pair.
#[derive(Debug, Clone, Copy)]
pub struct RegistryEntry {
    pub model: &'static str,
    pub kind: LoglikKind,
    pub list_params: &'static [&'static str],
    pub bounds: &'static [(&'static str, Bounds)],
    /// True iff the library ships a built-in closed form for this exact pair.
    pub has_default: bool,
}

/// Default parameterizations of the built-in generative models. Populated at
/// compile time and never mutated, so concurrent lookups need no locking.
static REGISTRY: &[RegistryEntry] = &[
    RegistryEntry {
        model: "ddm",
        kind: LoglikKind::Analytical,
        list_params: &["v", "a", "z", "t"],
        bounds: &[
            ("v", (-INF, INF)),
            ("a", (0.0, INF)),
            ("z", (0.0, 1.0)),
            ("t", (0.0, INF)),
        ],
        has_default: true,
    },
    RegistryEntry {
        model: "ddm",
        kind: LoglikKind::ApproxDifferentiable,
        list_params: &["v", "a", "z", "t"],
        bounds: &[
            ("v", (-3.0, 3.0)),
            ("a", (0.3, 2.5)),
            ("z", (0.1, 0.9)),
            ("t", (0.0, 2.0)),
        ],
        has_default: false,
    },
    RegistryEntry {
        model: "ddm",
        kind: LoglikKind::Blackbox,
        list_params: &["v", "a", "z", "t"],
        bounds: &[
            ("v", (-INF, INF)),
            ("a", (0.0, INF)),
            ("z", (0.0, 1.0)),
            ("t", (0.0, INF)),
        ],
        has_default: false,
    },
    RegistryEntry {
        model: "angle",
        kind: LoglikKind::ApproxDifferentiable,
        list_params: &["v", "a", "z", "t", "theta"],
        bounds: &[
            ("v", (-3.0, 3.0)),
            ("a", (0.3, 3.0)),
            ("z", (0.1, 0.9)),
            ("t", (0.001, 2.0)),
            ("theta", (-0.1, 1.3)),
        ],
        has_default: false,
    },
    RegistryEntry {
        model: "angle",
        kind: LoglikKind::Blackbox,
        list_params: &["v", "a", "z", "t", "theta"],
        bounds: &[
            ("v", (-3.0, 3.0)),
            ("a", (0.3, 3.0)),
            ("z", (0.1, 0.9)),
            ("t", (0.001, 2.0)),
            ("theta", (-0.1, 1.3)),
        ],
        has_default: false,
    },
];

pub fn lookup(model: &str, kind: LoglikKind) -> Option<&'static RegistryEntry> {
    REGISTRY
        .iter()
        .find(|e| e.model == model && e.kind == kind)
}

/// True iff the registry marks (model, kind) as having a built-in closed
/// form. Custom and unknown models never have registry defaults.
pub fn model_has_default(model: &str, kind: LoglikKind) -> bool {
    lookup(model, kind).map(|e| e.has_default).unwrap_or(false)
}

/// The likelihood kind used when the caller does not request one:
/// analytical when a closed form exists, otherwise approx_differentiable if
/// registered. `None` for models absent from the registry.
pub fn default_kind(model: &str) -> Option<LoglikKind> {
    if model_has_default(model, LoglikKind::Analytical) {
        return Some(LoglikKind::Analytical);
    }
    [LoglikKind::ApproxDifferentiable, LoglikKind::Blackbox]
        .into_iter()
        .find(|&kind| lookup(model, kind).is_some())
}

/// Caller-supplied (partial) override of registry defaults. For built-in
/// models, supplied keys merge over the registry entry per key; for custom
/// models this is the sole source of the parameterization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub loglik_kind: Option<LoglikKind>,
    #[serde(default)]
    pub list_params: Option<Vec<String>>,
    #[serde(default)]
    pub bounds: BTreeMap<String, Bounds>,
    #[serde(default)]
    pub default_priors: BTreeMap<String, Prior>,
}

impl ModelConfig {
    pub fn is_empty(&self) -> bool {
        self.loglik_kind.is_none()
            && self.list_params.is_none()
            && self.bounds.is_empty()
            && self.default_priors.is_empty()
    }
}

/// Fully resolved parameterization handed to the parameter builder.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub list_params: Vec<String>,
    pub bounds: BTreeMap<String, Bounds>,
    pub default_priors: BTreeMap<String, Prior>,
}

impl ResolvedConfig {
    /// Merge a (possibly partial) user config over a registry entry, per key.
    pub fn from_registry(entry: &RegistryEntry, config: Option<&ModelConfig>) -> Self {
        let mut bounds: BTreeMap<String, Bounds> = entry
            .bounds
            .iter()
            .map(|(name, b)| (name.to_string(), *b))
            .collect();
        let mut list_params: Vec<String> =
            entry.list_params.iter().map(|s| s.to_string()).collect();
        let mut default_priors = BTreeMap::new();

        if let Some(config) = config {
            if let Some(user_params) = &config.list_params {
                list_params = user_params.clone();
            }
            for (name, b) in &config.bounds {
                bounds.insert(name.clone(), *b);
            }
            for (name, p) in &config.default_priors {
                default_priors.insert(name.clone(), p.clone());
            }
        }

        Self {
            list_params,
            bounds,
            default_priors,
        }
    }

    /// Build from a custom-model config. The caller has already verified that
    /// `list_params` is present.
    pub fn from_custom(config: &ModelConfig, list_params: &[String]) -> Self {
        Self {
            list_params: list_params.to_vec(),
            bounds: config.bounds.clone(),
            default_priors: config.default_priors.clone(),
        }
    }

    pub fn bounds_for(&self, name: &str) -> Option<Bounds> {
        self.bounds.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ddm_has_analytical_default_only() {
        assert!(model_has_default("ddm", LoglikKind::Analytical));
        assert!(!model_has_default("ddm", LoglikKind::Blackbox));
        assert!(!model_has_default("custom", LoglikKind::Analytical));
        assert!(!model_has_default("angle", LoglikKind::Analytical));
    }

    #[test]
    fn default_kind_prefers_closed_form() {
        assert_eq!(default_kind("ddm"), Some(LoglikKind::Analytical));
        assert_eq!(default_kind("angle"), Some(LoglikKind::ApproxDifferentiable));
        assert_eq!(default_kind("custom"), None);
    }

    #[test]
    fn partial_config_merges_per_key_over_registry() {
        let entry = lookup("ddm", LoglikKind::Analytical).unwrap();
        let config = ModelConfig {
            bounds: [("a".to_string(), (0.5, 3.0))].into_iter().collect(),
            ..ModelConfig::default()
        };
        let resolved = ResolvedConfig::from_registry(entry, Some(&config));
        assert_eq!(resolved.list_params, vec!["v", "a", "z", "t"]);
        assert_eq!(resolved.bounds_for("a"), Some((0.5, 3.0)));
        // untouched keys keep registry defaults
        assert_eq!(resolved.bounds_for("z"), Some((0.0, 1.0)));
    }

    #[test]
    fn model_config_deserializes_from_loose_json() {
        let config: ModelConfig = serde_json::from_value(json!({
            "list_params": ["v", "a", "z", "t"],
            "bounds": {
                "v": [-3.0, 3.0],
                "a": [0.3, 2.5],
            },
        }))
        .unwrap();
        assert_eq!(config.list_params.as_deref().unwrap().len(), 4);
        assert_eq!(config.bounds["v"], (-3.0, 3.0));
        assert!(!config.is_empty());
        assert!(ModelConfig::default().is_empty());
    }
}
