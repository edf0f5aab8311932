//! Format-keyed attestation statement verifiers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{
    AttestationError, AttestationObject, FidoU2fVerifier, FormatIdentifier, NoneVerifier,
    PackedVerifier,
};
use crate::client_data::ClientDataHash;
use crate::error::{CeremonyError, Result};

/// Verifies the attestation statement of one format.
///
/// Implemented for any `Fn(&AttestationObject, &ClientDataHash) -> Result<(), AttestationError>`,
/// so ad-hoc verifiers can be registered as closures.
pub trait AttestationVerifier: Send + Sync {
    fn verify(
        &self,
        object: &AttestationObject,
        client_data_hash: &ClientDataHash,
    ) -> std::result::Result<(), AttestationError>;
}

impl<F> AttestationVerifier for F
where
    F: Fn(&AttestationObject, &ClientDataHash) -> std::result::Result<(), AttestationError>
        + Send
        + Sync,
{
    fn verify(
        &self,
        object: &AttestationObject,
        client_data_hash: &ClientDataHash,
    ) -> std::result::Result<(), AttestationError> {
        self(object, client_data_hash)
    }
}

/// Verifiers by format. Built once at startup and shared behind an `Arc`.
#[derive(Clone, Default)]
pub struct VerifierRegistry {
    verifiers: HashMap<FormatIdentifier, Arc<dyn AttestationVerifier>>,
}

impl VerifierRegistry {
    /// An empty registry. Every format is unsupported until registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the `none`, `packed` and `fido-u2f` verifiers.
    pub fn with_builtin_verifiers() -> Self {
        let mut registry = Self::new();
        registry
            .register(FormatIdentifier::NONE, NoneVerifier)
            .register(FormatIdentifier::PACKED, PackedVerifier)
            .register(FormatIdentifier::FIDO_U2F, FidoU2fVerifier);
        registry
    }

    /// Register `verifier` for `format`, replacing any previous one.
    pub fn register(
        &mut self,
        format: impl Into<FormatIdentifier>,
        verifier: impl AttestationVerifier + 'static,
    ) -> &mut Self {
        let format = format.into();
        if self
            .verifiers
            .insert(format.clone(), Arc::new(verifier))
            .is_some()
        {
            tracing::debug!(format = %format, "replaced attestation verifier");
        }
        self
    }

    pub fn get(&self, format: &FormatIdentifier) -> Option<&Arc<dyn AttestationVerifier>> {
        self.verifiers.get(format)
    }

    pub fn contains(&self, format: &FormatIdentifier) -> bool {
        self.verifiers.contains_key(format)
    }

    /// Registered formats, sorted.
    pub fn formats(&self) -> Vec<&FormatIdentifier> {
        let mut formats: Vec<_> = self.verifiers.keys().collect();
        formats.sort();
        formats
    }

    /// Look up the verifier for the object's format and run it.
    pub fn verify(&self, object: &AttestationObject, client_data_hash: &ClientDataHash) -> Result<()> {
        let format = object.format();
        let verifier = self
            .get(format)
            .ok_or_else(|| CeremonyError::UnsupportedAttestationFormat(format.to_string()))?;
        verifier
            .verify(object, client_data_hash)
            .map_err(|e| CeremonyError::AttestationStatementInvalid {
                format: format.to_string(),
                reason: e.to_string(),
            })
    }
}

impl fmt::Debug for VerifierRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifierRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}
