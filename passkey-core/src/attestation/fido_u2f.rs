use p256::ecdsa::signature::Verifier;

use super::{certificate_p256_key, AttestationError, AttestationObject, AttestationVerifier, StatementFields};
use crate::client_data::ClientDataHash;

/// `fido-u2f` attestation for legacy U2F authenticators.
///
/// Signed data is `0x00 ‖ rpIdHash ‖ clientDataHash ‖ credentialId ‖ publicKeyU2F`
/// where `publicKeyU2F` is the uncompressed P-256 point of the credential.
#[derive(Debug, Clone, Copy, Default)]
pub struct FidoU2fVerifier;

impl AttestationVerifier for FidoU2fVerifier {
    fn verify(
        &self,
        object: &AttestationObject,
        client_data_hash: &ClientDataHash,
    ) -> Result<(), AttestationError> {
        let fields = StatementFields::read(object.statement_entries()?)?;
        if fields.alg.is_some() {
            return Err(AttestationError::UnexpectedField("alg".into()));
        }
        if fields.ecdaa_key_id {
            return Err(AttestationError::UnexpectedField("ecdaaKeyId".into()));
        }
        let sig = fields.sig.ok_or(AttestationError::MissingField("sig"))?;
        let certs = fields.x5c.ok_or(AttestationError::MissingField("x5c"))?;
        let [cert] = certs.as_slice() else {
            return Err(AttestationError::Certificate(format!(
                "expected exactly one certificate, got {}",
                certs.len()
            )));
        };
        let attestation_key = certificate_p256_key(cert)?;

        let authenticator_data = object.authenticator_data();
        let credential = authenticator_data
            .attested_credential_data()
            .ok_or(AttestationError::CredentialKey("no attested credential data".into()))?;
        let public_key_u2f = credential
            .decoded_public_key()
            .p256_uncompressed_point()
            .ok_or(AttestationError::CredentialKey("credential key is not EC2 P-256".into()))?;

        let mut signed = Vec::with_capacity(1 + 32 + 32 + credential.credential_id().len() + 65);
        signed.push(0x00);
        signed.extend_from_slice(authenticator_data.rp_id_hash());
        signed.extend_from_slice(client_data_hash.as_bytes());
        signed.extend_from_slice(credential.credential_id());
        signed.extend_from_slice(&public_key_u2f);

        let sig = p256::ecdsa::Signature::from_der(sig)
            .map_err(|_| AttestationError::BadSignature("not a DER ECDSA signature".into()))?;
        attestation_key
            .verify(&signed, &sig)
            .map_err(|_| AttestationError::BadSignature("attestation certificate key".into()))
    }
}
