//! Scopes, use cases and the identifiers a request is limited by.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};

/// Identifier used for every request in the global scope.
pub const GLOBAL_IDENTIFIER: &str = "global";

/// One independent dimension along which admission is evaluated.
///
/// Variants are declared in priority order, so `Ord` sorts the most
/// important scope first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// System-wide limit shared by every caller.
    Global,
    /// Per client address.
    #[serde(rename = "ip", alias = "source-address", alias = "source_address")]
    SourceAddress,
    /// Per normalized email.
    #[serde(rename = "email", alias = "identity")]
    Identity,
}

impl Scope {
    /// All scopes, highest priority first.
    pub const PRIORITY: [Scope; 3] = [Scope::Global, Scope::SourceAddress, Scope::Identity];

    /// Segment used for this scope in store keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::SourceAddress => "ip",
            Scope::Identity => "email",
        }
    }

    /// Message key a consumer can use to pick user-facing guidance.
    pub fn denial_message(&self) -> &'static str {
        match self {
            Scope::Global => "rate_limit.global",
            Scope::SourceAddress => "rate_limit.source_address",
            Scope::Identity => "rate_limit.identity",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(Scope::Global),
            "ip" | "source-address" | "source_address" => Ok(Scope::SourceAddress),
            "email" | "identity" => Ok(Scope::Identity),
            other => Err(GuardError::Config(format!("unknown scope '{}'", other))),
        }
    }
}

/// The protected operation a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UseCase {
    Signup,
    Login,
}

impl UseCase {
    pub const ALL: [UseCase; 2] = [UseCase::Signup, UseCase::Login];

    pub fn as_str(&self) -> &'static str {
        match self {
            UseCase::Signup => "signup",
            UseCase::Login => "login",
        }
    }
}

impl fmt::Display for UseCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UseCase {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "signup" => Ok(UseCase::Signup),
            "login" => Ok(UseCase::Login),
            other => Err(GuardError::Config(format!("unknown use case '{}'", other))),
        }
    }
}

/// Lower-case and trim an email so that case variants share one counter.
pub fn normalize_identity(email: &str) -> String {
    email.trim().to_lowercase()
}

/// The concrete per-request identifiers, already normalized and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifiers {
    source_address: String,
    identity: String,
}

impl Identifiers {
    /// Build identifiers from raw request values.
    ///
    /// The identity is normalized with [`normalize_identity`]. Empty values
    /// are a caller contract violation and are rejected here, before any
    /// counter is touched.
    pub fn new(source_address: &str, identity: &str) -> Result<Self> {
        let source_address = source_address.trim();
        if source_address.is_empty() {
            return Err(GuardError::InvalidIdentifier(
                "source address must not be empty".to_string(),
            ));
        }

        let identity = normalize_identity(identity);
        if identity.is_empty() {
            return Err(GuardError::InvalidIdentifier(
                "identity must not be empty".to_string(),
            ));
        }

        Ok(Self {
            source_address: source_address.to_string(),
            identity,
        })
    }

    pub fn source_address(&self) -> &str {
        &self.source_address
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The identifier a given scope counts against.
    pub fn for_scope(&self, scope: Scope) -> &str {
        match scope {
            Scope::Global => GLOBAL_IDENTIFIER,
            Scope::SourceAddress => &self.source_address,
            Scope::Identity => &self.identity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_priority_order() {
        let mut scopes = vec![Scope::Identity, Scope::Global, Scope::SourceAddress];
        scopes.sort();
        assert_eq!(scopes, Scope::PRIORITY.to_vec());
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!("ip".parse::<Scope>().unwrap(), Scope::SourceAddress);
        assert_eq!("source-address".parse::<Scope>().unwrap(), Scope::SourceAddress);
        assert_eq!("Identity".parse::<Scope>().unwrap(), Scope::Identity);
        assert_eq!("global".parse::<Scope>().unwrap(), Scope::Global);
        assert!("tenant".parse::<Scope>().is_err());
    }

    #[test]
    fn test_use_case_parsing() {
        assert_eq!("signup".parse::<UseCase>().unwrap(), UseCase::Signup);
        assert_eq!(" LOGIN ".parse::<UseCase>().unwrap(), UseCase::Login);
        assert!("checkout".parse::<UseCase>().is_err());
    }

    #[test]
    fn test_identifiers_normalize_identity() {
        let ids = Identifiers::new(" 9.9.9.9 ", "  A@Example.COM ").unwrap();
        assert_eq!(ids.source_address(), "9.9.9.9");
        assert_eq!(ids.identity(), "a@example.com");
        assert_eq!(ids.for_scope(Scope::Global), GLOBAL_IDENTIFIER);
        assert_eq!(ids.for_scope(Scope::SourceAddress), "9.9.9.9");
        assert_eq!(ids.for_scope(Scope::Identity), "a@example.com");
    }

    #[test]
    fn test_identifiers_reject_empty_values() {
        let err = Identifiers::new("", "a@example.com").unwrap_err();
        assert!(matches!(err, GuardError::InvalidIdentifier(_)));

        let err = Identifiers::new("9.9.9.9", "   ").unwrap_err();
        assert!(matches!(err, GuardError::InvalidIdentifier(_)));
    }
}
