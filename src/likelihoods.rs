use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A per-trial log-likelihood callable: `(rt, response, params)` where
/// `params` follows the model's `list_params` order.
pub type LoglikFn = Arc<dyn Fn(f64, f64, &[f64]) -> f64 + Send + Sync>;

/// The resolved likelihood reference wired into a model: either a callable
/// or a local artifact (e.g. a network surrogate file) resolved by an
/// `ArtifactResolver`.
#[derive(Clone)]
pub enum Loglik {
    Function(LoglikFn),
    Artifact(PathBuf),
}

impl Loglik {
    pub fn artifact_path(&self) -> Option<&Path> {
        match self {
            Loglik::Artifact(path) => Some(path),
            Loglik::Function(_) => None,
        }
    }

    pub fn as_function(&self) -> Option<&LoglikFn> {
        match self {
            Loglik::Function(f) => Some(f),
            Loglik::Artifact(_) => None,
        }
    }
}

impl fmt::Debug for Loglik {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loglik::Function(_) => f.write_str("Loglik::Function(..)"),
            Loglik::Artifact(path) => f.debug_tuple("Loglik::Artifact").field(path).finish(),
        }
    }
}

const SERIES_TERMS: usize = 10;
// Normalized-time threshold for switching between the small-time and
// large-time series of the first passage time density.
const SMALL_TIME_CUTOFF: f64 = 0.35;

fn wfpt_standard(tt: f64, w: f64) -> f64 {
    if tt < SMALL_TIME_CUTOFF {
        let mut p = 0.0;
        for k in -(SERIES_TERMS as i64)..=(SERIES_TERMS as i64) {
            let wk = w + 2.0 * k as f64;
            p += wk * (-wk * wk / (2.0 * tt)).exp();
        }
        p / (2.0 * std::f64::consts::PI * tt.powi(3)).sqrt()
    } else {
        let mut p = 0.0;
        for k in 1..=SERIES_TERMS {
            let kf = k as f64;
            let kpi = kf * std::f64::consts::PI;
            p += kf * (-kpi * kpi * tt / 2.0).exp() * (kpi * w).sin();
        }
        p * std::f64::consts::PI
    }
}

/// Analytical log density of the drift diffusion model at one trial,
/// following the Navarro & Fuss (2009) series approximation of the Wiener
/// first passage time density.
///
/// `response` is the chosen boundary coded -1 (lower) or 1 (upper); `v` is
/// the drift rate, `a` the boundary separation, `z` the relative starting
/// point in (0, 1), and `t` the non-decision time. Out-of-support inputs
/// yield `f64::NEG_INFINITY` rather than an error, matching how samplers
/// consume log densities.
pub fn logp_ddm(rt: f64, response: f64, v: f64, a: f64, z: f64, t: f64) -> f64 {
    if !(rt.is_finite() && a > 0.0 && z > 0.0 && z < 1.0 && t >= 0.0) {
        return f64::NEG_INFINITY;
    }
    let td = rt - t;
    if td <= 0.0 {
        return f64::NEG_INFINITY;
    }

    // The upper boundary is the lower boundary of the flipped process.
    let (v, w) = if response > 0.0 { (-v, 1.0 - z) } else { (v, z) };

    let tt = td / (a * a);
    let p = wfpt_standard(tt, w);
    if !(p.is_finite() && p > 0.0) {
        return f64::NEG_INFINITY;
    }
    p.ln() - v * a * w - v * v * td / 2.0 - 2.0 * a.ln()
}

/// The built-in analytical DDM likelihood as a wireable callable; expects
/// `params` ordered `[v, a, z, t]`.
pub fn ddm_loglik() -> LoglikFn {
    Arc::new(|rt, response, params| {
        if params.len() != 4 {
            return f64::NEG_INFINITY;
        }
        logp_ddm(rt, response, params[0], params[1], params[2], params[3])
    })
}
