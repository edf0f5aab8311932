use p256::ecdsa::signature::Verifier;

use super::{certificate_p256_key, AttestationError, AttestationObject, AttestationVerifier, StatementFields};
use crate::client_data::ClientDataHash;
use crate::cose::CoseAlgorithm;

/// `packed` attestation, full (x5c) and self attestation.
///
/// The signature covers `authData ‖ clientDataHash`. With `x5c` it is checked
/// against the leaf certificate's key (ES256); without it, against the
/// credential key itself. ECDAA is not supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackedVerifier;

impl AttestationVerifier for PackedVerifier {
    fn verify(
        &self,
        object: &AttestationObject,
        client_data_hash: &ClientDataHash,
    ) -> Result<(), AttestationError> {
        let fields = StatementFields::read(object.statement_entries()?)?;
        let alg = fields.alg.ok_or(AttestationError::MissingField("alg"))?;
        let sig = fields.sig.ok_or(AttestationError::MissingField("sig"))?;
        if fields.ecdaa_key_id {
            return Err(AttestationError::UnexpectedField("ecdaaKeyId".into()));
        }

        let mut signed = object.raw_authenticator_data().to_vec();
        signed.extend_from_slice(client_data_hash.as_bytes());

        match fields.x5c {
            Some(certs) => {
                if alg != CoseAlgorithm::Es256.id() {
                    return Err(AttestationError::UnsupportedAlgorithm(alg));
                }
                let leaf = certs.first().ok_or(AttestationError::Certificate("x5c is empty".into()))?;
                let key = certificate_p256_key(leaf)?;
                let sig = p256::ecdsa::Signature::from_der(sig)
                    .map_err(|_| AttestationError::BadSignature("not a DER ECDSA signature".into()))?;
                key.verify(&signed, &sig)
                    .map_err(|_| AttestationError::BadSignature("attestation certificate key".into()))?;
                tracing::debug!(chain_len = certs.len(), "packed full attestation verified");
            }
            None => {
                let credential = object
                    .authenticator_data()
                    .attested_credential_data()
                    .ok_or(AttestationError::CredentialKey("no attested credential data".into()))?;
                let key = credential.decoded_public_key();
                if alg != key.algorithm().id() {
                    return Err(AttestationError::CredentialKey(format!(
                        "statement alg {alg} does not match credential alg {}",
                        key.algorithm().id()
                    )));
                }
                key.verify_signature(&signed, sig)
                    .map_err(AttestationError::BadSignature)?;
                tracing::debug!(alg, "packed self attestation verified");
            }
        }

        Ok(())
    }
}
