use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while parsing or reconciling a regression formula.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormulaError {
    #[error("Formula `{formula}` could not be parsed: {detail}")]
    Unparseable { formula: String, detail: String },

    #[error(
        "Formula for parameter `{param}` must have `{param}` on its left-hand side, found `{lhs}`"
    )]
    LhsMismatch { param: String, lhs: String },

    #[error("Formula `{formula}` names term `{term}` more than once")]
    DuplicateTerm { formula: String, term: String },
}

/// One term of a linear predictor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Term {
    Intercept,
    Covariate(String),
    /// A random intercept grouped by a dataset column, written `(1|col)`.
    RandomIntercept(String),
}

impl Term {
    /// Name used to key per-term priors ("Intercept", the covariate name, or
    /// "1|group" for random intercepts).
    pub fn key(&self) -> String {
        match self {
            Term::Intercept => "Intercept".to_string(),
            Term::Covariate(name) => name.clone(),
            Term::RandomIntercept(group) => format!("1|{group}"),
        }
    }
}

/// A parsed mixed-effects formula `"<param> ~ 1 + x + (1|group)"`.
///
/// The intercept is implicit: `"v ~ x"` is read as `"v ~ 1 + x"`. Writing
/// `0` as a term suppresses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    pub lhs: String,
    pub terms: Vec<Term>,
    raw: String,
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Formula {
    pub fn parse(formula: &str) -> Result<Self, FormulaError> {
        let unparseable = |detail: &str| FormulaError::Unparseable {
            formula: formula.to_string(),
            detail: detail.to_string(),
        };

        let mut sides = formula.splitn(2, '~');
        let lhs = sides.next().unwrap_or("").trim();
        let rhs = match sides.next() {
            Some(rhs) => rhs.trim(),
            None => return Err(unparseable("expected `<param> ~ <terms>`")),
        };
        if !is_identifier(lhs) {
            return Err(unparseable("left-hand side is not a parameter name"));
        }
        if rhs.is_empty() {
            return Err(unparseable("right-hand side is empty"));
        }

        let mut terms = Vec::new();
        let mut suppress_intercept = false;
        for token in rhs.split('+') {
            let token = token.trim();
            if token.is_empty() {
                return Err(unparseable("empty term in right-hand side"));
            }
            let term = if token == "1" {
                Term::Intercept
            } else if token == "0" {
                suppress_intercept = true;
                continue;
            } else if let Some(inner) = token.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
                let mut parts = inner.splitn(2, '|');
                let effect = parts.next().unwrap_or("").trim();
                let group = parts.next().unwrap_or("").trim();
                if effect != "1" || !is_identifier(group) {
                    return Err(unparseable("random effects must be written `(1|group)`"));
                }
                Term::RandomIntercept(group.to_string())
            } else if is_identifier(token) {
                Term::Covariate(token.to_string())
            } else {
                return Err(unparseable(&format!("unrecognized term `{token}`")));
            };
            if terms.contains(&term) {
                return Err(FormulaError::DuplicateTerm {
                    formula: formula.to_string(),
                    term: term.key(),
                });
            }
            terms.push(term);
        }

        if !suppress_intercept && !terms.contains(&Term::Intercept) {
            terms.insert(0, Term::Intercept);
        }
        if terms.is_empty() {
            return Err(unparseable("formula has no terms"));
        }

        Ok(Formula {
            lhs: lhs.to_string(),
            terms,
            raw: formula.to_string(),
        })
    }

    /// Parse and require the left-hand side to match `param`.
    pub fn parse_for(param: &str, formula: &str) -> Result<Self, FormulaError> {
        let parsed = Self::parse(formula)?;
        if parsed.lhs != param {
            return Err(FormulaError::LhsMismatch {
                param: param.to_string(),
                lhs: parsed.lhs,
            });
        }
        Ok(parsed)
    }

    pub fn term_keys(&self) -> Vec<String> {
        self.terms.iter().map(Term::key).collect()
    }

    /// Fixed-effect covariate column names referenced by the formula.
    pub fn covariates(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().filter_map(|t| match t {
            Term::Covariate(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Grouping column names of random intercepts.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().filter_map(|t| match t {
            Term::RandomIntercept(group) => Some(group.as_str()),
            _ => None,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixed_and_random_terms() {
        let f = Formula::parse("v ~ 1 + x + y + (1|subject_id)").unwrap();
        assert_eq!(f.lhs, "v");
        assert_eq!(
            f.terms,
            vec![
                Term::Intercept,
                Term::Covariate("x".to_string()),
                Term::Covariate("y".to_string()),
                Term::RandomIntercept("subject_id".to_string()),
            ]
        );
        assert_eq!(f.term_keys(), vec!["Intercept", "x", "y", "1|subject_id"]);
    }

    #[test]
    fn intercept_is_implicit_unless_suppressed() {
        let f = Formula::parse("a ~ x").unwrap();
        assert_eq!(f.terms[0], Term::Intercept);
        let f = Formula::parse("a ~ 0 + x").unwrap();
        assert!(!f.terms.contains(&Term::Intercept));
    }

    #[test]
    fn rejects_formula_without_tilde() {
        let err = Formula::parse("invalid_formula").unwrap_err();
        assert!(matches!(err, FormulaError::Unparseable { .. }));
    }

    #[test]
    fn rejects_mismatched_lhs() {
        let err = Formula::parse_for("v", "a ~ 1 + x").unwrap_err();
        assert_eq!(
            err,
            FormulaError::LhsMismatch {
                param: "v".to_string(),
                lhs: "a".to_string()
            }
        );
    }

    #[test]
    fn rejects_malformed_random_effect() {
        assert!(Formula::parse("v ~ (x|g)").is_err());
        assert!(Formula::parse("v ~ (1|)").is_err());
    }

    #[test]
    fn rejects_duplicate_terms() {
        let err = Formula::parse("v ~ x + x").unwrap_err();
        assert!(matches!(err, FormulaError::DuplicateTerm { .. }));
    }
}
