//! Configuration for trust-chain resolution and this entity's own statement.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use fedtrust_keyring::SigningAlgorithm;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::FederationError;

/// Configuration for [`TrustChainResolver`](crate::resolver::TrustChainResolver).
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Deadline for each remote fetch.
    pub fetch_timeout: Duration,
    /// Maximum statements in one chain, leaf and anchor included.
    pub max_chain_length: usize,
    /// Tolerated clock difference for `iat`/`exp` checks.
    pub clock_skew: Duration,
    /// User agent for federation fetches.
    pub user_agent: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            max_chain_length: 8,
            clock_skew: Duration::from_secs(60),
            user_agent: format!("fedtrust/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Client registration flows an OP supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRegistrationType {
    /// Chain resolved at authorization time.
    Automatic,
    /// Client registers by posting its entity configuration.
    Explicit,
}

impl ClientRegistrationType {
    /// Metadata value.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::Explicit => "explicit",
        }
    }
}

/// Federation settings of this entity, usually loaded from TOML.
///
/// ```toml
/// entity_id = "https://op.example"
/// authority_hints = ["https://ia.example"]
/// trust_anchors = ["https://ta.example"]
/// client_registration_types = ["explicit"]
/// federation_registration_endpoint = "https://op.example/federation/register"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Entity identifier of this server.
    pub entity_id: String,
    /// Immediate superiors.
    pub authority_hints: Vec<String>,
    /// Trusted federation roots.
    pub trust_anchors: Vec<String>,
    /// Organization name published in common metadata.
    pub organization_name: Option<String>,
    /// Organization URI published in common metadata.
    pub organization_uri: Option<String>,
    /// Homepage published in common metadata.
    pub homepage_uri: Option<String>,
    /// Contact addresses.
    pub contacts: Vec<String>,
    /// Logo URI.
    pub logo_uri: Option<String>,
    /// Policy URI.
    pub policy_uri: Option<String>,
    /// Lifetime of statements this entity signs, in seconds.
    pub lifespan_secs: i64,
    /// Supported client registration flows.
    pub client_registration_types: Vec<ClientRegistrationType>,
    /// Where explicit registration requests are posted.
    pub federation_registration_endpoint: Option<String>,
    /// Fetch endpoint, when this entity is an intermediate.
    pub federation_fetch_endpoint: Option<String>,
    /// Resolve endpoint.
    pub federation_resolve_endpoint: Option<String>,
    /// Historical keys endpoint.
    pub federation_historical_keys_endpoint: Option<String>,
    /// Algorithm of the keys that sign this entity's statements.
    pub signing_algorithm: SigningAlgorithm,
    /// Per-fetch deadline, in seconds.
    pub fetch_timeout_secs: u64,
    /// Maximum trust chain length.
    pub max_chain_length: usize,
    /// Clock skew leeway, in seconds.
    pub clock_skew_secs: u64,
}

impl Default for FederationConfig {
    fn default() -> Self {
        let resolver = ResolverConfig::default();
        Self {
            entity_id: String::new(),
            authority_hints: Vec::new(),
            trust_anchors: Vec::new(),
            organization_name: None,
            organization_uri: None,
            homepage_uri: None,
            contacts: Vec::new(),
            logo_uri: None,
            policy_uri: None,
            lifespan_secs: 24 * 60 * 60, // one day
            client_registration_types: vec![ClientRegistrationType::Explicit],
            federation_registration_endpoint: None,
            federation_fetch_endpoint: None,
            federation_resolve_endpoint: None,
            federation_historical_keys_endpoint: None,
            signing_algorithm: SigningAlgorithm::default(),
            fetch_timeout_secs: resolver.fetch_timeout.as_secs(),
            max_chain_length: resolver.max_chain_length,
            clock_skew_secs: resolver.clock_skew.as_secs(),
        }
    }
}

impl FederationConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, FederationError> {
        let config: Self = toml::from_str(source).map_err(|e| FederationError::ConfigError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FederationError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| FederationError::ConfigError {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml_str(&source)
    }

    /// Check identifiers and numeric settings.
    pub fn validate(&self) -> Result<(), FederationError> {
        check_entity_id("entity_id", &self.entity_id)?;
        for hint in &self.authority_hints {
            check_entity_id("authority_hints", hint)?;
        }
        for anchor in &self.trust_anchors {
            check_entity_id("trust_anchors", anchor)?;
        }

        if self.lifespan_secs <= 0 {
            return Err(FederationError::ConfigError {
                message: "lifespan_secs must be positive".into(),
            });
        }
        if self.max_chain_length < 1 {
            return Err(FederationError::ConfigError {
                message: "max_chain_length must be at least 1".into(),
            });
        }
        if self.supports_explicit_registration() && self.federation_registration_endpoint.is_none()
        {
            return Err(FederationError::ConfigError {
                message: "explicit registration requires federation_registration_endpoint".into(),
            });
        }
        Ok(())
    }

    /// Resolver settings derived from this configuration.
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            max_chain_length: self.max_chain_length,
            clock_skew: Duration::from_secs(self.clock_skew_secs),
            ..ResolverConfig::default()
        }
    }

    /// Whether explicit client registration is offered.
    pub fn supports_explicit_registration(&self) -> bool {
        self.client_registration_types
            .contains(&ClientRegistrationType::Explicit)
    }

    /// Trust anchors as a set.
    pub fn trust_anchor_set(&self) -> BTreeSet<String> {
        self.trust_anchors.iter().cloned().collect()
    }
}

fn check_entity_id(field: &str, value: &str) -> Result<(), FederationError> {
    let url = Url::parse(value).map_err(|e| FederationError::ConfigError {
        message: format!("{field}: invalid entity identifier {value:?}: {e}"),
    })?;
    if !matches!(url.scheme(), "https" | "http") {
        return Err(FederationError::ConfigError {
            message: format!("{field}: entity identifier {value:?} must be an http(s) URL"),
        });
    }
    Ok(())
}
