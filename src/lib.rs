#![deny(dead_code)]
#![deny(unused_imports)]

//! Hierarchical Bayesian specification front-end for sequential sampling
//! models. The caller hands over trial data, a generative model name,
//! loosely shaped per-parameter prior specifications, and a likelihood
//! strategy; `ModelBuilder::build` resolves that into a validated,
//! immutable [`Model`] ready for prior-predictive sampling.

pub mod artifact;
pub mod data;
pub mod formula;
pub mod likelihoods;
pub mod model;
pub mod param;
pub mod prior;
pub mod registry;
pub mod sampling;
pub mod spec;
pub mod types;

pub use artifact::{ArtifactError, ArtifactResolver, LocalCacheResolver};
pub use data::{Data, DataError};
pub use formula::{Formula, FormulaError, Term};
pub use likelihoods::{ddm_loglik, logp_ddm, Loglik, LoglikFn};
pub use model::{
    Model, ModelBuilder, ModelError, LoglikInput, OutlierSetting, PriorSummary, OUTLIER_PARAM,
};
pub use param::{Param, ParamError, PARTICIPANT_COLUMN};
pub use prior::{Prior, PriorSetting};
pub use registry::{model_has_default, ModelConfig, RegistryEntry};
pub use sampling::{PriorPredictive, SamplingError};
pub use spec::{ParamInput, ParamSpec, SpecError};
pub use types::{Bounds, Link, LoglikKind};
