use crate::artifact::{ArtifactError, ArtifactResolver, LocalCacheResolver};
use crate::data::Data;
use crate::likelihoods::{ddm_loglik, Loglik, LoglikFn};
use crate::param::{build_params, Param, ParamError};
use crate::prior::{Prior, PriorSetting};
use crate::registry::{default_kind, lookup, model_has_default, ModelConfig, ResolvedConfig};
use crate::spec::{merge_overrides, normalize, ParamInput, ParamSpec, SpecError};
use crate::types::{Bounds, LoglikKind};
use log::debug;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

pub const OUTLIER_PARAM: &str = "p_outlier";
const DEFAULT_P_OUTLIER: f64 = 0.05;
const OUTLIER_BOUNDS: Bounds = (0.0, 1.0);

/// Errors raised during model construction. Construction is atomic: any of
/// these aborts the build and no partial model is exposed.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("When using a custom model, please provide a `loglik_kind`.")]
    MissingLoglikKind,

    #[error("Please provide a valid `loglik`.")]
    MissingLoglik,

    #[error("For custom models, please provide a valid `model_config`.")]
    MissingModelConfig,

    #[error("For custom models, please provide `list_params` in `model_config`.")]
    MissingListParams,

    #[error("`{model}` is not a built-in model; use model=\"custom\" with a `model_config`.")]
    UnknownModel { model: String },

    #[error("Model `{model}` has no registered `{kind}` likelihood.")]
    UnsupportedKind { model: String, kind: LoglikKind },

    #[error("`{OUTLIER_PARAM}` cannot be a regression parameter.")]
    OutlierRegression,

    #[error("`{OUTLIER_PARAM}` must lie in [0, 1), got {value}.")]
    InvalidOutlier { value: f64 },

    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// The user-supplied likelihood: a callable, or the name of a fetchable
/// artifact such as `"angle.onnx"`.
#[derive(Clone)]
pub enum LoglikInput {
    Function(LoglikFn),
    Name(String),
}

impl From<LoglikFn> for LoglikInput {
    fn from(f: LoglikFn) -> Self {
        LoglikInput::Function(f)
    }
}

impl From<&str> for LoglikInput {
    fn from(name: &str) -> Self {
        LoglikInput::Name(name.to_string())
    }
}

impl From<String> for LoglikInput {
    fn from(name: String) -> Self {
        LoglikInput::Name(name)
    }
}

/// How the outlier mixture parameter is configured.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OutlierSetting {
    /// Fixed at the library default of 0.05.
    #[default]
    Default,
    /// No outlier mixture; `p_outlier` is omitted from the model entirely.
    Disabled,
    Fixed(f64),
    Prior(Prior),
}

impl From<f64> for OutlierSetting {
    fn from(value: f64) -> Self {
        OutlierSetting::Fixed(value)
    }
}

impl From<Prior> for OutlierSetting {
    fn from(prior: Prior) -> Self {
        OutlierSetting::Prior(prior)
    }
}

/// Effective prior of one resolved parameter, for quick inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum PriorSummary {
    Fixed(f64),
    Dist(Prior),
    /// Per-term priors of a regression parameter.
    Terms(BTreeMap<String, PriorSetting>),
}

impl PriorSummary {
    pub fn as_fixed(&self) -> Option<f64> {
        match self {
            PriorSummary::Fixed(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_dist(&self) -> Option<&Prior> {
        match self {
            PriorSummary::Dist(p) => Some(p),
            _ => None,
        }
    }

    /// Distribution name for simple priors, `None` for fixed values and
    /// per-term maps.
    pub fn name(&self) -> Option<&str> {
        self.as_dist().map(|p| p.name.as_str())
    }
}

impl PartialEq<f64> for PriorSummary {
    fn eq(&self, other: &f64) -> bool {
        self.as_fixed() == Some(*other)
    }
}

/// A fully resolved hierarchical sequential sampling model, ready for
/// prior-predictive sampling. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Model {
    pub(crate) model_name: String,
    pub(crate) loglik_kind: LoglikKind,
    pub(crate) loglik: Loglik,
    pub(crate) list_params: Vec<String>,
    pub(crate) params: Vec<Param>,
    pub(crate) data: Data,
}

impl Model {
    pub fn builder(data: Data) -> ModelBuilder {
        ModelBuilder {
            data,
            model: "ddm".to_string(),
            include: Vec::new(),
            overrides: Vec::new(),
            loglik_kind: None,
            loglik: None,
            model_config: None,
            outlier: OutlierSetting::Default,
            resolver: None,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn loglik_kind(&self) -> LoglikKind {
        self.loglik_kind
    }

    pub fn loglik(&self) -> &Loglik {
        &self.loglik
    }

    pub fn list_params(&self) -> &[String] {
        &self.list_params
    }

    /// Resolved parameters in resolution order (`list_params` first, then
    /// parameters introduced only through `include`, then `p_outlier` last
    /// when outliers are enabled).
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn param_names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    /// Derived view: effective prior (or fixed value) per parameter.
    pub fn priors(&self) -> BTreeMap<String, PriorSummary> {
        self.params
            .iter()
            .map(|p| (p.name.clone(), summarize(&p.spec)))
            .collect()
    }

    pub fn prior(&self, name: &str) -> Option<PriorSummary> {
        self.param(name).map(|p| summarize(&p.spec))
    }
}

fn summarize(spec: &ParamSpec) -> PriorSummary {
    match spec {
        ParamSpec::Fixed { value } => PriorSummary::Fixed(*value),
        ParamSpec::PriorOnly { prior } => PriorSummary::Dist(prior.clone()),
        ParamSpec::Regression { priors, .. } => PriorSummary::Terms(priors.clone()),
    }
}

/// Staged model construction. Collects the loose user specification and
/// resolves it in one `build` call; nothing is validated until then.
pub struct ModelBuilder {
    data: Data,
    model: String,
    include: Vec<Value>,
    overrides: Vec<(String, ParamInput)>,
    loglik_kind: Option<LoglikKind>,
    loglik: Option<LoglikInput>,
    model_config: Option<ModelConfig>,
    outlier: OutlierSetting,
    resolver: Option<Box<dyn ArtifactResolver>>,
}

impl ModelBuilder {
    pub fn model(mut self, name: impl Into<String>) -> Self {
        self.model = name.into();
        self
    }

    /// Append one structured `include` entry (a mapping carrying `name`).
    pub fn include(mut self, entry: Value) -> Self {
        self.include.push(entry);
        self
    }

    /// Per-parameter override: a fixed value, a distribution, or a loose
    /// spec mapping.
    pub fn param(mut self, name: impl Into<String>, input: impl Into<ParamInput>) -> Self {
        self.overrides.push((name.into(), input.into()));
        self
    }

    pub fn loglik_kind(mut self, kind: LoglikKind) -> Self {
        self.loglik_kind = Some(kind);
        self
    }

    pub fn loglik(mut self, loglik: impl Into<LoglikInput>) -> Self {
        self.loglik = Some(loglik.into());
        self
    }

    pub fn model_config(mut self, config: ModelConfig) -> Self {
        self.model_config = Some(config);
        self
    }

    pub fn p_outlier(mut self, setting: impl Into<OutlierSetting>) -> Self {
        self.outlier = setting.into();
        self
    }

    pub fn without_outliers(mut self) -> Self {
        self.outlier = OutlierSetting::Disabled;
        self
    }

    pub fn artifact_resolver(mut self, resolver: Box<dyn ArtifactResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Result<Model, ModelError> {
        let ModelBuilder {
            data,
            model,
            include,
            overrides,
            loglik_kind,
            loglik,
            model_config,
            mut outlier,
            resolver,
        } = self;

        // Resolve the (model, likelihood kind) pair and the parameterization.
        let is_custom = model == "custom";
        let (kind, resolved) = if is_custom {
            let kind = loglik_kind.ok_or(ModelError::MissingLoglikKind)?;
            if loglik.is_none() {
                return Err(ModelError::MissingLoglik);
            }
            let config = model_config.as_ref().ok_or(ModelError::MissingModelConfig)?;
            let list_params = config
                .list_params
                .as_ref()
                .ok_or(ModelError::MissingListParams)?;
            (kind, ResolvedConfig::from_custom(config, list_params))
        } else {
            let kind = match loglik_kind.or_else(|| {
                model_config.as_ref().and_then(|c| c.loglik_kind)
            }) {
                Some(kind) => kind,
                None => default_kind(&model).ok_or_else(|| ModelError::UnknownModel {
                    model: model.clone(),
                })?,
            };
            let entry = lookup(&model, kind).ok_or_else(|| {
                if lookup(&model, LoglikKind::Analytical).is_some()
                    || lookup(&model, LoglikKind::ApproxDifferentiable).is_some()
                    || lookup(&model, LoglikKind::Blackbox).is_some()
                {
                    ModelError::UnsupportedKind {
                        model: model.clone(),
                        kind,
                    }
                } else {
                    ModelError::UnknownModel {
                        model: model.clone(),
                    }
                }
            })?;
            (kind, ResolvedConfig::from_registry(entry, model_config.as_ref()))
        };

        // Wire in the likelihood reference.
        let resolver = resolver.unwrap_or_else(|| Box::new(LocalCacheResolver::default()));
        let loglik = match loglik {
            Some(LoglikInput::Function(f)) => Loglik::Function(f),
            Some(LoglikInput::Name(name)) => Loglik::Artifact(resolver.resolve(&name)?),
            None if model_has_default(&model, kind) => Loglik::Function(ddm_loglik()),
            None if kind == LoglikKind::ApproxDifferentiable => {
                Loglik::Artifact(resolver.resolve(&format!("{model}.onnx"))?)
            }
            None => return Err(ModelError::MissingLoglik),
        };
        debug!("resolved model `{model}` with {kind} likelihood");

        // Merge, normalize, and materialize the parameter set.
        let merged = merge_overrides(&include, &overrides)?;
        let mut specs = Vec::with_capacity(merged.len());
        for (name, input) in &merged {
            specs.push((name.clone(), normalize(name, input)?));
        }

        // `p_outlier` is handled by the injector, never by the builder pass.
        if let Some(position) = specs.iter().position(|(n, _)| n == OUTLIER_PARAM) {
            if outlier != OutlierSetting::Default {
                return Err(SpecError::DuplicateSpecification {
                    name: OUTLIER_PARAM.to_string(),
                }
                .into());
            }
            outlier = match specs.remove(position).1 {
                ParamSpec::Fixed { value } => OutlierSetting::Fixed(value),
                ParamSpec::PriorOnly { prior } => OutlierSetting::Prior(prior),
                ParamSpec::Regression { .. } => return Err(ModelError::OutlierRegression),
            };
        }

        let mut params = build_params(&resolved, specs, &data)?;

        // Outlier injection: always last, never a regression.
        let outlier_spec = match outlier {
            OutlierSetting::Disabled => None,
            OutlierSetting::Default => Some(ParamSpec::Fixed {
                value: DEFAULT_P_OUTLIER,
            }),
            OutlierSetting::Fixed(value) => {
                if !(0.0..1.0).contains(&value) {
                    return Err(ModelError::InvalidOutlier { value });
                }
                Some(ParamSpec::Fixed { value })
            }
            OutlierSetting::Prior(prior) => Some(ParamSpec::PriorOnly { prior }),
        };
        if let Some(spec) = outlier_spec {
            params.push(Param {
                name: OUTLIER_PARAM.to_string(),
                spec,
                bounds: Some(OUTLIER_BOUNDS),
            });
        }

        Ok(Model {
            model_name: model,
            loglik_kind: kind,
            loglik,
            list_params: resolved.list_params,
            params,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data() -> Data {
        Data::new(vec![0.5, 0.7, 0.9, 1.1], vec![1.0, -1.0, 1.0, 1.0])
            .unwrap()
            .with_column("x", vec![0.1, 0.2, 0.3, 0.4])
            .unwrap()
    }

    #[test]
    fn default_build_resolves_ddm_analytical() {
        let model = Model::builder(data()).build().unwrap();
        assert_eq!(model.model_name(), "ddm");
        assert_eq!(model.loglik_kind(), LoglikKind::Analytical);
        assert_eq!(model.param_names(), vec!["v", "a", "z", "t", OUTLIER_PARAM]);
        assert!(model.loglik().as_function().is_some());
    }

    #[test]
    fn outlier_parameter_is_always_last_and_never_a_regression() {
        let model = Model::builder(data())
            .include(json!({"name": "v", "formula": "v ~ 1 + x"}))
            .build()
            .unwrap();
        let last = model.params().last().unwrap();
        assert_eq!(last.name, OUTLIER_PARAM);
        assert!(!last.is_regression());
        assert_eq!(model.prior(OUTLIER_PARAM).unwrap(), 0.05);
    }

    #[test]
    fn disabled_outliers_omit_the_parameter_entirely() {
        let model = Model::builder(data()).without_outliers().build().unwrap();
        assert!(model.param(OUTLIER_PARAM).is_none());
        assert_eq!(model.param_names(), vec!["v", "a", "z", "t"]);
    }

    #[test]
    fn outlier_prior_can_be_overridden_but_not_a_regression() {
        let model = Model::builder(data())
            .p_outlier(Prior::uniform(0.0, 0.2))
            .build()
            .unwrap();
        let p = model.prior(OUTLIER_PARAM).unwrap();
        assert_eq!(p.name(), Some("Uniform"));

        let err = Model::builder(data())
            .include(json!({"name": OUTLIER_PARAM, "formula": "p_outlier ~ 1 + x"}))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::OutlierRegression));

        let err = Model::builder(data()).p_outlier(1.5).build().unwrap_err();
        assert!(matches!(err, ModelError::InvalidOutlier { value } if value == 1.5));
    }

    #[test]
    fn outlier_specified_twice_is_a_duplicate() {
        let err = Model::builder(data())
            .include(json!({"name": OUTLIER_PARAM, "prior": 0.02}))
            .p_outlier(0.03)
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::Spec(SpecError::DuplicateSpecification { .. })));
    }

    #[test]
    fn unknown_model_is_rejected() {
        let err = Model::builder(data()).model("race").build().unwrap_err();
        assert!(matches!(err, ModelError::UnknownModel { model } if model == "race"));
    }

    #[test]
    fn analytical_kind_for_lan_only_model_is_rejected() {
        let err = Model::builder(data())
            .model("angle")
            .loglik_kind(LoglikKind::Analytical)
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedKind { .. }));
    }

    #[test]
    fn blackbox_requires_an_explicit_loglik() {
        let err = Model::builder(data())
            .loglik_kind(LoglikKind::Blackbox)
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingLoglik));
    }

    #[test]
    fn priors_view_reports_fixed_values_unwrapped() {
        let model = Model::builder(data()).param("a", 0.5).build().unwrap();
        let priors = model.priors();
        assert_eq!(priors["a"], 0.5);
        assert!(model.param("a").map(|p| !p.is_regression()).unwrap());
    }
}
