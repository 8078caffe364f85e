//! Multi-scope coordinator.
//!
//! Fans one request out to every configured scope, each checked as its own
//! task against the counter store, then folds the outcomes into a single
//! [`Verdict`].

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::policy::PolicyTable;
use super::scope::{normalize_identity, Identifiers, Scope, UseCase, GLOBAL_IDENTIFIER};
use super::verdict::{fold_outcomes, ScopeOutcome, Verdict};
use super::window::SlidingWindowLimiter;
use crate::error::{GuardError, Result};

/// Default upper bound for a single scope check.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_millis(1000);

/// Evaluates every scope of a use case and produces one verdict.
///
/// Cheap to share behind an `Arc`; holds no per-request state.
pub struct RateLimitCoordinator {
    limiter: Arc<SlidingWindowLimiter>,
    policies: Arc<PolicyTable>,
    check_timeout: Duration,
}

impl RateLimitCoordinator {
    pub fn new(limiter: Arc<SlidingWindowLimiter>, policies: Arc<PolicyTable>) -> Self {
        Self {
            limiter,
            policies,
            check_timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }

    pub fn with_check_timeout(mut self, check_timeout: Duration) -> Self {
        self.check_timeout = check_timeout;
        self
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// Decide whether one more `use_case` request from `ids` is admitted.
    ///
    /// Never fails: a store problem on any scope turns into a fail-open
    /// verdict. Dropping the returned future aborts checks still in flight;
    /// increments that already landed stay.
    #[instrument(skip(self, ids))]
    pub async fn check(&self, use_case: UseCase, ids: &Identifiers) -> Verdict {
        let mut tasks = JoinSet::new();

        for (scope, policy) in self.policies.scopes(use_case) {
            let limiter = self.limiter.clone();
            let policy = policy.clone();
            let identifier = ids.for_scope(scope).to_string();
            let check_timeout = self.check_timeout;

            tasks.spawn(async move {
                let outcome =
                    match tokio::time::timeout(check_timeout, limiter.check(&policy, &identifier))
                        .await
                    {
                        Ok(Ok(decision)) => ScopeOutcome::Decided(decision),
                        Ok(Err(err)) => ScopeOutcome::Unavailable(err.to_string()),
                        Err(_) => ScopeOutcome::TimedOut,
                    };
                (scope, outcome)
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => outcomes.push(result),
                Err(err) => {
                    // A check task that panicked or was cancelled has no
                    // scope attached; treat the whole evaluation as degraded.
                    warn!(error = %err, "Scope check task failed");
                    return self.degraded(use_case, "scope check task failed");
                }
            }
        }

        for (scope, outcome) in &outcomes {
            match outcome {
                ScopeOutcome::Unavailable(reason) => {
                    warn!(scope = %scope, reason = %reason, "Counter store unavailable");
                }
                ScopeOutcome::TimedOut => {
                    warn!(
                        scope = %scope,
                        timeout_ms = self.check_timeout.as_millis() as u64,
                        "Scope check timed out"
                    );
                }
                ScopeOutcome::Decided(_) => {}
            }
        }

        let verdict = fold_outcomes(&outcomes);
        if verdict.fail_open {
            return self.degraded(use_case, "counter store unavailable");
        }

        if let Some(scope) = verdict.scope {
            info!(
                scope = %scope,
                limit = verdict.limit,
                "Request denied by rate limit"
            );
        } else {
            debug!(remaining = verdict.remaining, "Request admitted");
        }

        verdict
    }

    /// Delete every recorded event for `identifier` under one scope.
    ///
    /// Identity identifiers are normalized the same way checks normalize
    /// them. Unlike `check`, store failures are returned to the caller.
    pub async fn reset(&self, use_case: UseCase, scope: Scope, identifier: &str) -> Result<()> {
        let policy = self.policies.get(use_case, scope).ok_or_else(|| {
            GuardError::PolicyMisconfigured(format!(
                "no policy configured for {}/{}",
                use_case, scope
            ))
        })?;

        let identifier = match scope {
            Scope::Global => GLOBAL_IDENTIFIER.to_string(),
            Scope::SourceAddress => identifier.trim().to_string(),
            Scope::Identity => normalize_identity(identifier),
        };
        if identifier.is_empty() {
            return Err(GuardError::InvalidIdentifier(format!(
                "{} identifier must not be empty",
                scope
            )));
        }

        self.limiter.reset(policy, &identifier).await?;

        info!(
            use_case = %use_case,
            scope = %scope,
            identifier = %identifier,
            "Rate limit reset"
        );
        Ok(())
    }

    fn degraded(&self, use_case: UseCase, reason: &str) -> Verdict {
        warn!(
            use_case = %use_case,
            reason = %reason,
            "Rate limiting degraded, failing open"
        );
        Verdict::fail_open()
    }
}
