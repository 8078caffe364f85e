//! Rate limiting logic: policies, the sliding window and scope coordination.

mod clock;
mod coordinator;
mod policy;
mod scope;
mod verdict;
mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{RateLimitCoordinator, DEFAULT_CHECK_TIMEOUT};
pub use policy::{
    default_rules, PolicyRule, PolicyRules, PolicyTable, TimeUnit, WindowPolicy,
    DEFAULT_NAMESPACE,
};
pub use scope::{normalize_identity, Identifiers, Scope, UseCase, GLOBAL_IDENTIFIER};
pub use verdict::{fold_outcomes, ScopeOutcome, Verdict};
pub use window::{weigh, Bucket, ScopeDecision, SlidingWindowLimiter};
