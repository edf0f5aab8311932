//! Attestation objects and attestation statement verification.
//!
//! An attestation object is a CBOR map `{fmt, authData, attStmt}`. Decoding only
//! checks structure; what the statement means is up to the verifier registered
//! for its format in a [`VerifierRegistry`].

mod fido_u2f;
mod none;
mod packed;
pub mod registry;

use std::fmt;

use ciborium::Value;
use thiserror::Error;
use x509_parser::prelude::*;

use crate::authenticator_data::AuthenticatorData;
use crate::error::{CeremonyError, Result};

pub use fido_u2f::FidoU2fVerifier;
pub use none::NoneVerifier;
pub use packed::PackedVerifier;
pub use registry::{AttestationVerifier, VerifierRegistry};

/// Attestation statement format identifier (`fmt`).
///
/// Open-ended: any text is a valid identifier, it just may not have a verifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormatIdentifier(String);

impl FormatIdentifier {
    pub const NONE: &'static str = "none";
    pub const PACKED: &'static str = "packed";
    pub const TPM: &'static str = "tpm";
    pub const ANDROID_KEY: &'static str = "android-key";
    pub const ANDROID_SAFETYNET: &'static str = "android-safetynet";
    pub const FIDO_U2F: &'static str = "fido-u2f";
    pub const APPLE: &'static str = "apple";

    pub fn new(format: impl Into<String>) -> Self {
        Self(format.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FormatIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FormatIdentifier {
    fn from(format: &str) -> Self {
        Self::new(format)
    }
}

impl From<String> for FormatIdentifier {
    fn from(format: String) -> Self {
        Self(format)
    }
}

/// Why a verifier rejected an attestation statement.
#[derive(Error, Debug)]
pub enum AttestationError {
    #[error("attestation statement is not a map")]
    NotAMap,

    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("field {0} has the wrong type")]
    InvalidField(&'static str),

    #[error("unexpected field {0}")]
    UnexpectedField(String),

    #[error("unsupported algorithm {0}")]
    UnsupportedAlgorithm(i64),

    #[error("attestation certificate: {0}")]
    Certificate(String),

    #[error("credential public key: {0}")]
    CredentialKey(String),

    #[error("signature verification failed: {0}")]
    BadSignature(String),
}

/// A decoded attestation object.
#[derive(Debug, Clone)]
pub struct AttestationObject {
    format: FormatIdentifier,
    raw_authenticator_data: Vec<u8>,
    attestation_statement: Value,
    authenticator_data: AuthenticatorData,
}

impl AttestationObject {
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let malformed = |msg: &str| CeremonyError::MalformedAttestationObject(msg.to_string());

        let value: Value = ciborium::from_reader(raw)
            .map_err(|e| CeremonyError::MalformedAttestationObject(e.to_string()))?;
        let entries = match value {
            Value::Map(entries) => entries,
            _ => return Err(malformed("top-level value is not a map")),
        };

        let mut format = None;
        let mut auth_data = None;
        let mut statement = None;
        for (key, value) in entries {
            match (key.as_text(), value) {
                (Some("fmt"), Value::Text(text)) => format = Some(text),
                (Some("fmt"), _) => return Err(malformed("fmt is not text")),
                (Some("authData"), Value::Bytes(bytes)) => auth_data = Some(bytes),
                (Some("authData"), _) => return Err(malformed("authData is not a byte string")),
                (Some("attStmt"), v @ Value::Map(_)) => statement = Some(v),
                (Some("attStmt"), _) => return Err(malformed("attStmt is not a map")),
                _ => {}
            }
        }

        let format = format.ok_or_else(|| malformed("missing fmt"))?;
        let raw_authenticator_data = auth_data.ok_or_else(|| malformed("missing authData"))?;
        let attestation_statement = statement.ok_or_else(|| malformed("missing attStmt"))?;

        let authenticator_data = AuthenticatorData::parse(&raw_authenticator_data)?;

        Ok(Self {
            format: FormatIdentifier(format),
            raw_authenticator_data,
            attestation_statement,
            authenticator_data,
        })
    }

    pub fn format(&self) -> &FormatIdentifier {
        &self.format
    }

    pub fn raw_authenticator_data(&self) -> &[u8] {
        &self.raw_authenticator_data
    }

    pub fn attestation_statement(&self) -> &Value {
        &self.attestation_statement
    }

    pub fn authenticator_data(&self) -> &AuthenticatorData {
        &self.authenticator_data
    }

    /// Statement entries; `attStmt` is always a map after decoding.
    pub(crate) fn statement_entries(&self) -> std::result::Result<&[(Value, Value)], AttestationError> {
        match &self.attestation_statement {
            Value::Map(entries) => Ok(entries),
            _ => Err(AttestationError::NotAMap),
        }
    }
}

/// Fields of an attestation statement that the built-in formats understand.
#[derive(Debug, Default)]
pub(crate) struct StatementFields<'a> {
    pub alg: Option<i64>,
    pub sig: Option<&'a [u8]>,
    pub x5c: Option<Vec<&'a [u8]>>,
    pub ecdaa_key_id: bool,
}

impl<'a> StatementFields<'a> {
    pub(crate) fn read(entries: &'a [(Value, Value)]) -> std::result::Result<Self, AttestationError> {
        let mut fields = StatementFields::default();
        for (key, value) in entries {
            let name = key.as_text().ok_or(AttestationError::InvalidField("statement key"))?;
            match name {
                "alg" => {
                    fields.alg =
                        Some(crate::cose::integer(value).ok_or(AttestationError::InvalidField("alg"))?)
                }
                "sig" => {
                    fields.sig = Some(
                        value
                            .as_bytes()
                            .ok_or(AttestationError::InvalidField("sig"))?
                            .as_slice(),
                    )
                }
                "x5c" => {
                    let certs = value.as_array().ok_or(AttestationError::InvalidField("x5c"))?;
                    let certs = certs
                        .iter()
                        .map(|c| c.as_bytes().map(Vec::as_slice))
                        .collect::<Option<Vec<_>>>()
                        .ok_or(AttestationError::InvalidField("x5c"))?;
                    fields.x5c = Some(certs);
                }
                "ecdaaKeyId" => fields.ecdaa_key_id = true,
                other => return Err(AttestationError::UnexpectedField(other.to_string())),
            }
        }
        Ok(fields)
    }
}

/// P-256 public key of a DER attestation certificate.
pub(crate) fn certificate_p256_key(
    der: &[u8],
) -> std::result::Result<p256::ecdsa::VerifyingKey, AttestationError> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| AttestationError::Certificate(format!("failed to parse: {e}")))?;
    let point = &*cert.public_key().subject_public_key.data;
    p256::ecdsa::VerifyingKey::from_sec1_bytes(point)
        .map_err(|_| AttestationError::Certificate("public key is not a P-256 point".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value) -> Vec<u8> {
        let mut out = Vec::new();
        ciborium::into_writer(value, &mut out).unwrap();
        out
    }

    fn header_only_auth_data() -> Vec<u8> {
        let mut raw = vec![0u8; 37];
        raw[32] = 0x01;
        raw
    }

    fn object(fmt: Value, auth_data: Value, stmt: Value) -> Vec<u8> {
        encode(&Value::Map(vec![
            (Value::Text("fmt".into()), fmt),
            (Value::Text("attStmt".into()), stmt),
            (Value::Text("authData".into()), auth_data),
        ]))
    }

    #[test]
    fn test_decode_round_trip() {
        let auth_data = header_only_auth_data();
        let stmt = Value::Map(vec![(Value::Text("alg".into()), Value::Integer((-7).into()))]);
        let raw = object(
            Value::Text("packed".into()),
            Value::Bytes(auth_data.clone()),
            stmt.clone(),
        );

        let decoded = AttestationObject::decode(&raw).unwrap();
        assert_eq!(decoded.format().as_str(), FormatIdentifier::PACKED);
        assert_eq!(decoded.raw_authenticator_data(), auth_data.as_slice());
        assert_eq!(decoded.attestation_statement(), &stmt);
        assert!(decoded.authenticator_data().flags().user_present());
    }

    #[test]
    fn test_unknown_format_decodes() {
        let raw = object(
            Value::Text("acme-proprietary".into()),
            Value::Bytes(header_only_auth_data()),
            Value::Map(vec![]),
        );
        let decoded = AttestationObject::decode(&raw).unwrap();
        assert_eq!(decoded.format().to_string(), "acme-proprietary");
    }

    #[test]
    fn test_rejects_mistyped_fields() {
        let cases = [
            object(Value::Integer(1.into()), Value::Bytes(header_only_auth_data()), Value::Map(vec![])),
            object(Value::Text("none".into()), Value::Text("x".into()), Value::Map(vec![])),
            object(Value::Text("none".into()), Value::Bytes(header_only_auth_data()), Value::Array(vec![])),
        ];
        for raw in cases {
            assert!(matches!(
                AttestationObject::decode(&raw),
                Err(CeremonyError::MalformedAttestationObject(_))
            ));
        }
    }

    #[test]
    fn test_rejects_missing_fields_and_garbage() {
        let raw = encode(&Value::Map(vec![(Value::Text("fmt".into()), Value::Text("none".into()))]));
        assert!(matches!(
            AttestationObject::decode(&raw),
            Err(CeremonyError::MalformedAttestationObject(_))
        ));
        assert!(matches!(
            AttestationObject::decode(&[0xa3, 0x63]),
            Err(CeremonyError::MalformedAttestationObject(_))
        ));
        assert!(matches!(
            AttestationObject::decode(&encode(&Value::Bool(true))),
            Err(CeremonyError::MalformedAttestationObject(_))
        ));
    }

    #[test]
    fn test_short_auth_data_is_truncated() {
        let raw = object(
            Value::Text("none".into()),
            Value::Bytes(vec![0u8; 20]),
            Value::Map(vec![]),
        );
        assert!(matches!(
            AttestationObject::decode(&raw),
            Err(CeremonyError::TruncatedAuthenticatorData { .. })
        ));
    }

    #[test]
    fn test_statement_fields() {
        let entries = vec![
            (Value::Text("alg".into()), Value::Integer((-7).into())),
            (Value::Text("sig".into()), Value::Bytes(vec![1, 2])),
            (
                Value::Text("x5c".into()),
                Value::Array(vec![Value::Bytes(vec![3]), Value::Bytes(vec![4])]),
            ),
        ];
        let fields = StatementFields::read(&entries).unwrap();
        assert_eq!(fields.alg, Some(-7));
        assert_eq!(fields.sig, Some(&[1u8, 2][..]));
        assert_eq!(fields.x5c.unwrap().len(), 2);
        assert!(!fields.ecdaa_key_id);

        let bad = vec![(Value::Text("sig".into()), Value::Text("no".into()))];
        assert!(matches!(
            StatementFields::read(&bad),
            Err(AttestationError::InvalidField("sig"))
        ));
    }
}
