use super::{AttestationError, AttestationObject, AttestationVerifier};
use crate::client_data::ClientDataHash;

/// `none` attestation: the authenticator makes no claim, so the statement must be empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneVerifier;

impl AttestationVerifier for NoneVerifier {
    fn verify(
        &self,
        object: &AttestationObject,
        _client_data_hash: &ClientDataHash,
    ) -> Result<(), AttestationError> {
        match object.statement_entries()?.first() {
            None => Ok(()),
            Some((key, _)) => Err(AttestationError::UnexpectedField(
                key.as_text().unwrap_or("<non-text key>").to_string(),
            )),
        }
    }
}
