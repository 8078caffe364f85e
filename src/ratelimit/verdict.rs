//! The single admission decision and how per-scope outcomes fold into it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::scope::Scope;
use super::window::ScopeDecision;

/// The admission decision for one protected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    /// Whether the request may proceed
    pub allowed: bool,
    /// The governing scope when denied
    pub scope: Option<Scope>,
    /// Limit of the governing scope
    pub limit: u64,
    /// Remaining events of the governing scope
    pub remaining: u64,
    /// When the governing scope's bucket rolls over. `None` when failing open.
    pub reset_at: Option<DateTime<Utc>>,
    /// Set when the decision was not made against the store at all
    pub fail_open: bool,
}

impl Verdict {
    /// Every configured scope admitted the request.
    pub fn admitted(limit: u64, remaining: u64, reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            scope: None,
            limit,
            remaining,
            reset_at: Some(reset_at),
            fail_open: false,
        }
    }

    /// `scope` denied the request.
    pub fn denied(scope: Scope, decision: &ScopeDecision) -> Self {
        Self {
            allowed: false,
            scope: Some(scope),
            limit: decision.limit,
            remaining: decision.remaining,
            reset_at: Some(decision.reset_at),
            fail_open: false,
        }
    }

    /// The store could not be consulted; let the request through.
    pub fn fail_open() -> Self {
        Self {
            allowed: true,
            scope: None,
            limit: 0,
            remaining: 0,
            reset_at: None,
            fail_open: true,
        }
    }

    /// Nothing is configured to limit this request.
    pub fn unrestricted() -> Self {
        Self {
            allowed: true,
            scope: None,
            limit: 0,
            remaining: 0,
            reset_at: None,
            fail_open: false,
        }
    }

    pub fn is_denied(&self) -> bool {
        !self.allowed
    }
}

/// How one scope's check ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeOutcome {
    /// The store answered and the limiter decided.
    Decided(ScopeDecision),
    /// The store reported an error.
    Unavailable(String),
    /// The check did not finish within the coordinator's timeout.
    TimedOut,
}

impl ScopeOutcome {
    pub fn decision(&self) -> Option<&ScopeDecision> {
        match self {
            ScopeOutcome::Decided(decision) => Some(decision),
            _ => None,
        }
    }
}

/// Combine per-scope outcomes into one verdict.
///
/// Any outcome that is not `Decided` fails the whole evaluation open; there
/// is no partial enforcement. Otherwise the highest-priority denial wins.
/// When everything admits, `remaining` is the tightest across scopes and
/// `limit`/`reset_at` come from the source-address scope, falling back to
/// the highest-priority scope present.
pub fn fold_outcomes(outcomes: &[(Scope, ScopeOutcome)]) -> Verdict {
    let mut decided: Vec<(Scope, &ScopeDecision)> = Vec::with_capacity(outcomes.len());
    for (scope, outcome) in outcomes {
        match outcome.decision() {
            Some(decision) => decided.push((*scope, decision)),
            None => return Verdict::fail_open(),
        }
    }
    decided.sort_by_key(|(scope, _)| *scope);

    if let Some((scope, decision)) = decided.iter().find(|(_, d)| !d.allowed) {
        return Verdict::denied(*scope, decision);
    }

    let governing = decided
        .iter()
        .find(|(scope, _)| *scope == Scope::SourceAddress)
        .or_else(|| decided.first());

    match governing {
        Some((_, decision)) => {
            let remaining = decided
                .iter()
                .map(|(_, d)| d.remaining)
                .min()
                .unwrap_or(decision.remaining);
            Verdict::admitted(decision.limit, remaining, decision.reset_at)
        }
        None => Verdict::unrestricted(),
    }
}
