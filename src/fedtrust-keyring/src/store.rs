//! Local key store.
//!
//! Holds every key this entity owns together with its status and use, and
//! answers the two questions statement publishing needs: which public keys
//! to publish, and which private key signs right now.

use std::sync::{Arc, RwLock};

use jsonwebtoken::jwk::JwkSet;

use crate::error::KeyringError;
use crate::signer::StatementSigner;
use crate::types::{KeyStatus, KeyUse, SigningAlgorithm};

/// A key registered with the store.
#[derive(Clone)]
pub struct ManagedKey {
    /// Backend holding the private key.
    pub signer: Arc<dyn StatementSigner>,
    /// Lifecycle status.
    pub status: KeyStatus,
    /// Intended use.
    pub key_use: KeyUse,
}

impl std::fmt::Debug for ManagedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedKey")
            .field("kid", &self.signer.key_id())
            .field("algorithm", &self.signer.algorithm())
            .field("status", &self.status)
            .field("key_use", &self.key_use)
            .finish()
    }
}

/// Thread-safe registry of this entity's keys.
#[derive(Debug, Default)]
pub struct LocalKeyStore {
    keys: RwLock<Vec<ManagedKey>>,
}

impl LocalKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a signature key.
    pub fn insert(
        &self,
        signer: Arc<dyn StatementSigner>,
        status: KeyStatus,
    ) -> Result<(), KeyringError> {
        self.insert_key(ManagedKey {
            signer,
            status,
            key_use: KeyUse::Signature,
        })
    }

    /// Register a key with an explicit use.
    pub fn insert_key(&self, key: ManagedKey) -> Result<(), KeyringError> {
        let mut keys = self.keys.write().map_err(|_| KeyringError::LockPoisoned)?;

        let kid = key.signer.key_id().to_string();
        if keys.iter().any(|k| k.signer.key_id() == kid) {
            return Err(KeyringError::KeyAlreadyExists { kid });
        }

        tracing::info!(
            kid = %kid,
            algorithm = %key.signer.algorithm(),
            status = ?key.status,
            "LocalKeyStore: key registered"
        );
        keys.push(key);
        Ok(())
    }

    /// Change the status of a key, e.g. to rotate it out.
    pub fn set_status(&self, kid: &str, status: KeyStatus) -> Result<(), KeyringError> {
        let mut keys = self.keys.write().map_err(|_| KeyringError::LockPoisoned)?;
        let key = keys
            .iter_mut()
            .find(|k| k.signer.key_id() == kid)
            .ok_or_else(|| KeyringError::KeyNotFound {
                kid: kid.to_string(),
            })?;
        key.status = status;
        Ok(())
    }

    /// Public keys to publish: enabled, signature-use keys of `algorithm`.
    pub fn local_key_set(&self, algorithm: SigningAlgorithm) -> Result<JwkSet, KeyringError> {
        let keys = self.keys.read().map_err(|_| KeyringError::LockPoisoned)?;

        let jwks = keys
            .iter()
            .filter(|k| {
                k.status.is_enabled()
                    && k.key_use == KeyUse::Signature
                    && k.signer.algorithm() == algorithm
            })
            .map(|k| k.signer.public_jwk())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(JwkSet { keys: jwks })
    }

    /// The first active signature key of `algorithm`.
    pub fn active_signer(
        &self,
        algorithm: SigningAlgorithm,
    ) -> Result<Arc<dyn StatementSigner>, KeyringError> {
        let keys = self.keys.read().map_err(|_| KeyringError::LockPoisoned)?;

        keys.iter()
            .find(|k| {
                k.status == KeyStatus::Active
                    && k.key_use == KeyUse::Signature
                    && k.signer.algorithm() == algorithm
            })
            .map(|k| Arc::clone(&k.signer))
            .ok_or_else(|| KeyringError::NoActiveKey {
                algorithm: algorithm.jws_name().to_string(),
            })
    }

    /// Number of registered keys, in any state.
    pub fn len(&self) -> Result<usize, KeyringError> {
        let keys = self.keys.read().map_err(|_| KeyringError::LockPoisoned)?;
        Ok(keys.len())
    }

    /// Whether no key is registered.
    pub fn is_empty(&self) -> Result<bool, KeyringError> {
        Ok(self.len()? == 0)
    }
}
