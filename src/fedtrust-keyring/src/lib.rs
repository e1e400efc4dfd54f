//! # fedtrust-keyring
//!
//! Local signing keys for an OpenID Federation entity.
//!
//! An entity signs its own entity configuration and any explicit
//! registration responses it issues. This crate provides:
//! - The [`StatementSigner`] trait implemented by every key backend
//! - In-memory ECDSA P-256 (`ES256`) and Ed25519 (`EdDSA`) signers
//! - [`LocalKeyStore`], which publishes the entity's JWK set and picks the
//!   active signer for the configured algorithm
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fedtrust_keyring::{KeyStatus, LocalKeyStore, SigningAlgorithm, SoftwareSigner};
//!
//! let store = LocalKeyStore::new();
//! store.insert(Arc::new(SoftwareSigner::generate()?), KeyStatus::Active)?;
//!
//! // Published in the entity configuration
//! let jwks = store.local_key_set(SigningAlgorithm::Es256)?;
//!
//! // Used to sign statements
//! let signer = store.active_signer(SigningAlgorithm::Es256)?;
//! let signature = signer.sign(b"header.payload").await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::pedantic)] // Too strict for production code
#![allow(clippy::missing_errors_doc)] // Error documentation not required
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

mod error;
mod jwk;
mod signer;
mod store;
mod types;

#[cfg(feature = "software")]
mod software;

pub use error::KeyringError;
pub use jwk::{ec_p256_jwk, okp_ed25519_jwk, thumbprint};
pub use signer::StatementSigner;
pub use store::{LocalKeyStore, ManagedKey};
pub use types::{KeyStatus, KeyUse, SigningAlgorithm};

#[cfg(feature = "software")]
pub use software::{Ed25519SoftwareSigner, SoftwareSigner};
