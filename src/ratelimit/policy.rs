//! Window policy table.
//!
//! Every (use case, scope) pair gets one immutable [`WindowPolicy`]. The
//! table is built once at startup from the built-in defaults, with any rows
//! from configuration replacing the matching default row, and validated
//! before the guard starts serving.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::info;

use super::scope::{Scope, UseCase};
use crate::error::{GuardError, Result};

/// Default key namespace.
pub const DEFAULT_NAMESPACE: &str = "ratelimit";

/// Time unit for policy windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of one unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

/// A configured rule: `limit` events per `units` x `unit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Number of events admitted per window
    pub limit: u64,
    /// The time unit
    pub unit: TimeUnit,
    /// How many units make up one window
    #[serde(default = "default_units")]
    pub units: u64,
}

fn default_units() -> u64 {
    1
}

impl PolicyRule {
    pub fn new(limit: u64, unit: TimeUnit, units: u64) -> Self {
        Self { limit, unit, units }
    }

    /// The window length this rule describes.
    pub fn window(&self) -> Duration {
        self.unit.duration().saturating_mul(self.units.min(u32::MAX as u64) as u32)
    }
}

/// Configured rule overrides, keyed by use case then scope.
pub type PolicyRules = HashMap<UseCase, HashMap<Scope, PolicyRule>>;

/// The resolved policy for one (use case, scope) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowPolicy {
    /// Events admitted per window
    pub limit: u64,
    /// Window length
    pub window: Duration,
    /// Key namespace, `<namespace>:<use-case>:<scope>`
    pub key_prefix: String,
}

impl WindowPolicy {
    pub fn new(limit: u64, window: Duration, key_prefix: impl Into<String>) -> Self {
        Self {
            limit,
            window,
            key_prefix: key_prefix.into(),
        }
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window.as_millis() as u64
    }

    /// Store key of the bucket with the given index for an identifier.
    pub fn bucket_key(&self, identifier: &str, bucket: u64) -> String {
        format!("{}:{}:{}", self.key_prefix, identifier, bucket)
    }

    /// Reject a policy that admits nothing or has a window under 1 ms.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(GuardError::PolicyMisconfigured(format!(
                "{}: limit must be greater than zero",
                self.key_prefix
            )));
        }
        if self.window_ms() == 0 {
            return Err(GuardError::PolicyMisconfigured(format!(
                "{}: window must be greater than zero",
                self.key_prefix
            )));
        }
        Ok(())
    }
}

/// The built-in policy rows.
pub fn default_rules() -> Vec<(UseCase, Scope, PolicyRule)> {
    vec![
        (UseCase::Signup, Scope::SourceAddress, PolicyRule::new(3, TimeUnit::Minute, 15)),
        (UseCase::Signup, Scope::Identity, PolicyRule::new(5, TimeUnit::Hour, 1)),
        (UseCase::Signup, Scope::Global, PolicyRule::new(100, TimeUnit::Second, 60)),
        (UseCase::Login, Scope::SourceAddress, PolicyRule::new(10, TimeUnit::Second, 60)),
        (UseCase::Login, Scope::Identity, PolicyRule::new(5, TimeUnit::Second, 60)),
        (UseCase::Login, Scope::Global, PolicyRule::new(1000, TimeUnit::Second, 60)),
    ]
}

/// Immutable table of window policies.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    namespace: String,
    policies: BTreeMap<(UseCase, Scope), WindowPolicy>,
}

impl PolicyTable {
    /// Build and validate a table from the defaults plus overrides.
    pub fn new(namespace: &str, overrides: &PolicyRules) -> Result<Self> {
        let namespace = namespace.trim();
        if namespace.is_empty() {
            return Err(GuardError::PolicyMisconfigured(
                "key namespace must not be empty".to_string(),
            ));
        }

        let mut rules: BTreeMap<(UseCase, Scope), PolicyRule> = default_rules()
            .into_iter()
            .map(|(use_case, scope, rule)| ((use_case, scope), rule))
            .collect();

        for (use_case, scopes) in overrides {
            for (scope, rule) in scopes {
                rules.insert((*use_case, *scope), rule.clone());
            }
        }

        let mut policies = BTreeMap::new();
        for ((use_case, scope), rule) in rules {
            let policy = WindowPolicy::new(
                rule.limit,
                rule.window(),
                format!("{}:{}:{}", namespace, use_case, scope),
            );
            policy.validate()?;
            policies.insert((use_case, scope), policy);
        }

        info!(
            namespace = %namespace,
            policies = policies.len(),
            "Window policy table loaded"
        );

        Ok(Self {
            namespace: namespace.to_string(),
            policies,
        })
    }

    /// The built-in table under the default namespace.
    pub fn defaults() -> Result<Self> {
        Self::new(DEFAULT_NAMESPACE, &PolicyRules::new())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Get the policy for a use case and scope.
    pub fn get(&self, use_case: UseCase, scope: Scope) -> Option<&WindowPolicy> {
        self.policies.get(&(use_case, scope))
    }

    /// Scopes configured for a use case, highest priority first.
    pub fn scopes(&self, use_case: UseCase) -> impl Iterator<Item = (Scope, &WindowPolicy)> + '_ {
        self.policies
            .iter()
            .filter(move |((uc, _), _)| *uc == use_case)
            .map(|((_, scope), policy)| (*scope, policy))
    }

    /// Every row in the table, ordered by use case then scope priority.
    pub fn iter(&self) -> impl Iterator<Item = (UseCase, Scope, &WindowPolicy)> + '_ {
        self.policies
            .iter()
            .map(|((use_case, scope), policy)| (*use_case, *scope, policy))
    }
}
