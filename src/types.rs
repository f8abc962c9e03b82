use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Strategy used to compute a trial's log-likelihood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoglikKind {
    Analytical,
    ApproxDifferentiable,
    Blackbox,
}

impl fmt::Display for LoglikKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoglikKind::Analytical => "analytical",
            LoglikKind::ApproxDifferentiable => "approx_differentiable",
            LoglikKind::Blackbox => "blackbox",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "`{0}` is not a recognized loglik_kind; expected one of analytical, approx_differentiable, blackbox"
)]
pub struct UnknownLoglikKind(pub String);

impl FromStr for LoglikKind {
    type Err = UnknownLoglikKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analytical" => Ok(LoglikKind::Analytical),
            "approx_differentiable" => Ok(LoglikKind::ApproxDifferentiable),
            "blackbox" => Ok(LoglikKind::Blackbox),
            other => Err(UnknownLoglikKind(other.to_string())),
        }
    }
}

/// Link function applied to a parameter's linear predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Link {
    #[default]
    Identity,
    Log,
    Logit,
}

impl Link {
    /// Map a linear-predictor value back to the parameter's natural scale.
    pub fn inverse(&self, eta: f64) -> f64 {
        match self {
            Link::Identity => eta,
            Link::Log => eta.exp(),
            Link::Logit => 1.0 / (1.0 + (-eta).exp()),
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Link::Identity => "identity",
            Link::Log => "log",
            Link::Logit => "logit",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("`{0}` is not a recognized link; expected one of identity, log, logit")]
pub struct UnknownLink(pub String);

impl FromStr for Link {
    type Err = UnknownLink;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identity" => Ok(Link::Identity),
            "log" => Ok(Link::Log),
            "logit" => Ok(Link::Logit),
            other => Err(UnknownLink(other.to_string())),
        }
    }
}

/// Inclusive lower/upper support bounds for one model parameter.
pub type Bounds = (f64, f64);
