//! # fedtrust-core
//!
//! OpenID Federation trust-chain resolution and metadata policy engine.
//!
//! Given a leaf entity and a set of trust anchors, the engine discovers every
//! verifiable chain of authority from the leaf up to an anchor, folds the
//! metadata policies published along each chain, and selects the first chain
//! whose combined policy accepts the leaf's declared metadata.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TrustChainResolver                         │
//! │                                                              │
//! │  ┌────────────────────┐        ┌─────────────────────┐      │
//! │  │ FederationFetcher  │        │   Statement (jws)    │      │
//! │  │ (.well-known, sub) │ ─────▶ │ parse / verify /     │      │
//! │  └────────────────────┘        │ validate_fields      │      │
//! │                                └─────────────────────┘      │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │      depth-first discovery, one branch per hint   │      │
//! │  │      (copy-on-branch visited set, Found | Skip)   │      │
//! │  └──────────────────────────────────────────────────┘      │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │                 Policy combiner                   │      │
//! │  │  fold anchor → leaf, select first acceptable     │      │
//! │  └──────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Properties
//!
//! - **Branch isolation**: a failed fetch, bad signature or invalid field drops
//!   only the authority-hint branch it occurred on
//! - **Bounded search**: cycles are cut by the visited set, depth by
//!   [`ResolverConfig::max_chain_length`], every fetch by a timeout
//! - **Deterministic selection**: chains are produced in declared
//!   authority-hint order, and the first acceptable one wins

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::pedantic)] // Too strict for production code
#![allow(clippy::doc_markdown)] // Allow protocol names without backticks
#![allow(clippy::missing_errors_doc)] // Error documentation not required
#![allow(clippy::missing_panics_doc)] // Panic documentation not required
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

pub mod combiner;
pub mod config;
pub mod entity_configuration;
pub mod error;
pub mod fetch;
pub mod jws;
pub mod metadata;
pub mod policy;
pub mod registration;
pub mod registration_client;
pub mod resolver;
pub mod statement;

pub use combiner::{
    enforce_policy, fold_chain_policy, require_acceptable_chain, select_acceptable_chain,
    AcceptedChain,
};
pub use config::{ClientRegistrationType, FederationConfig, ResolverConfig};
pub use entity_configuration::EntityConfigurationBuilder;
pub use error::FederationError;
pub use fetch::{FederationFetcher, FetchError, HttpFederationFetcher};
pub use metadata::{
    CommonMetadata, CommonMetadataPolicy, FederationEntityMetadata, FederationEntityPolicy,
    JsonClaim, Metadata, MetadataPolicy, OpenIdProviderMetadata, OpenIdProviderPolicy,
    RelyingPartyMetadata, RelyingPartyPolicy,
};
pub use policy::{Policy, PolicyError, PolicyList};
pub use registration::{ExplicitRegistrationService, RegistrationOutcome};
pub use registration_client::{ClientRegistration, ExplicitRegistrationClient};
pub use resolver::{TrustChain, TrustChainResolver};
pub use statement::{Audience, EntityStatement, SignedStatement, StatementType};
