//! COSE_Key decoding for credential public keys (RFC 9052 / RFC 9053).
//!
//! Keys arrive as CBOR maps with integer labels. Decoding rejects anything that
//! is not an integer-keyed map; validation then checks that the key carries
//! exactly the parameters its key type needs and an algorithm it can be used with.

use std::collections::BTreeMap;

use ciborium::Value;
use p256::ecdsa::signature::Verifier;
use rsa::pkcs1v15;
use rsa::{BigUint, RsaPublicKey};
use sha2::{Sha256, Sha384, Sha512};

use crate::error::{CeremonyError, Result};

/// Common and key-type specific COSE labels.
pub mod label {
    pub const KTY: i64 = 1;
    pub const ALG: i64 = 3;
    /// EC2/OKP curve, RSA modulus `n`.
    pub const CRV: i64 = -1;
    pub const N: i64 = -1;
    /// EC2/OKP x coordinate, RSA exponent `e`.
    pub const X: i64 = -2;
    pub const E: i64 = -2;
    pub const Y: i64 = -3;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Okp,
    Ec2,
    Rsa,
}

impl KeyType {
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(KeyType::Okp),
            2 => Some(KeyType::Ec2),
            3 => Some(KeyType::Rsa),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoseAlgorithm {
    Es256,
    Es384,
    Es512,
    EdDsa,
    Ps256,
    Rs256,
    Rs384,
    Rs512,
}

impl CoseAlgorithm {
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            -7 => Some(CoseAlgorithm::Es256),
            -35 => Some(CoseAlgorithm::Es384),
            -36 => Some(CoseAlgorithm::Es512),
            -8 => Some(CoseAlgorithm::EdDsa),
            -37 => Some(CoseAlgorithm::Ps256),
            -257 => Some(CoseAlgorithm::Rs256),
            -258 => Some(CoseAlgorithm::Rs384),
            -259 => Some(CoseAlgorithm::Rs512),
            _ => None,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            CoseAlgorithm::Es256 => -7,
            CoseAlgorithm::Es384 => -35,
            CoseAlgorithm::Es512 => -36,
            CoseAlgorithm::EdDsa => -8,
            CoseAlgorithm::Ps256 => -37,
            CoseAlgorithm::Rs256 => -257,
            CoseAlgorithm::Rs384 => -258,
            CoseAlgorithm::Rs512 => -259,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EllipticCurve {
    P256,
    P384,
    P521,
    Ed25519,
}

impl EllipticCurve {
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(EllipticCurve::P256),
            2 => Some(EllipticCurve::P384),
            3 => Some(EllipticCurve::P521),
            6 => Some(EllipticCurve::Ed25519),
            _ => None,
        }
    }

    /// Coordinate length in bytes.
    fn coordinate_len(&self) -> usize {
        match self {
            EllipticCurve::P256 | EllipticCurve::Ed25519 => 32,
            EllipticCurve::P384 => 48,
            EllipticCurve::P521 => 66,
        }
    }
}

/// A decoded and structurally validated credential public key.
#[derive(Debug, Clone, PartialEq)]
pub struct CoseKey {
    key_type: KeyType,
    algorithm: CoseAlgorithm,
    curve: Option<EllipticCurve>,
    params: BTreeMap<i64, Value>,
}

impl CoseKey {
    /// Decode a key that must occupy all of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (key, consumed) = Self::decode_prefix(bytes)?;
        if consumed != bytes.len() {
            return Err(CeremonyError::MalformedPublicKey(format!(
                "{} trailing bytes after key",
                bytes.len() - consumed
            )));
        }
        Ok(key)
    }

    /// Decode the first CBOR item in `bytes` as a key, returning it together
    /// with the number of bytes it occupied.
    pub fn decode_prefix(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut reader = bytes;
        let value: Value = ciborium::from_reader(&mut reader)
            .map_err(|e| CeremonyError::MalformedPublicKey(e.to_string()))?;
        let consumed = bytes.len() - reader.len();
        Ok((Self::from_value(value)?, consumed))
    }

    fn from_value(value: Value) -> Result<Self> {
        let entries = match value {
            Value::Map(entries) => entries,
            _ => {
                return Err(CeremonyError::MalformedPublicKey(
                    "key is not a CBOR map".into(),
                ))
            }
        };

        let mut params = BTreeMap::new();
        for (k, v) in entries {
            let label = integer(&k).ok_or_else(|| {
                CeremonyError::MalformedPublicKey("key map has a non-integer label".into())
            })?;
            if params.insert(label, v).is_some() {
                return Err(CeremonyError::MalformedPublicKey(format!(
                    "duplicate label {label}"
                )));
            }
        }

        Self::validate(params)
    }

    fn validate(params: BTreeMap<i64, Value>) -> Result<Self> {
        let invalid = |msg: String| CeremonyError::InvalidPublicKeyParameters(msg);

        let kty = params
            .get(&label::KTY)
            .ok_or_else(|| invalid("missing kty".into()))?;
        let kty = integer(kty).ok_or_else(|| invalid("kty is not an integer".into()))?;
        let key_type = KeyType::from_id(kty).ok_or_else(|| invalid(format!("unsupported kty {kty}")))?;

        let alg = params
            .get(&label::ALG)
            .ok_or_else(|| invalid("missing alg".into()))?;
        let alg = integer(alg).ok_or_else(|| invalid("alg is not an integer".into()))?;
        let algorithm =
            CoseAlgorithm::from_id(alg).ok_or_else(|| invalid(format!("unsupported alg {alg}")))?;

        let allowed: &[i64] = match key_type {
            KeyType::Ec2 => &[label::KTY, label::ALG, label::CRV, label::X, label::Y],
            KeyType::Okp => &[label::KTY, label::ALG, label::CRV, label::X],
            KeyType::Rsa => &[label::KTY, label::ALG, label::N, label::E],
        };
        if let Some(extra) = params.keys().find(|l| !allowed.contains(*l)) {
            return Err(invalid(format!("label {extra} is not allowed for {key_type:?} keys")));
        }

        let curve = match key_type {
            KeyType::Ec2 | KeyType::Okp => {
                let crv = params
                    .get(&label::CRV)
                    .and_then(integer)
                    .ok_or_else(|| invalid("missing or non-integer crv".into()))?;
                let curve = EllipticCurve::from_id(crv)
                    .ok_or_else(|| invalid(format!("unsupported crv {crv}")))?;

                let expected = match (key_type, curve) {
                    (KeyType::Ec2, EllipticCurve::P256) => CoseAlgorithm::Es256,
                    (KeyType::Ec2, EllipticCurve::P384) => CoseAlgorithm::Es384,
                    (KeyType::Ec2, EllipticCurve::P521) => CoseAlgorithm::Es512,
                    (KeyType::Okp, EllipticCurve::Ed25519) => CoseAlgorithm::EdDsa,
                    _ => return Err(invalid(format!("curve {crv} does not match {key_type:?}"))),
                };
                if algorithm != expected {
                    return Err(invalid(format!("alg {alg} does not match curve {crv}")));
                }

                let coords: &[i64] = if key_type == KeyType::Ec2 {
                    &[label::X, label::Y]
                } else {
                    &[label::X]
                };
                for coord in coords {
                    let len = params
                        .get(coord)
                        .and_then(Value::as_bytes)
                        .map(Vec::len)
                        .ok_or_else(|| invalid(format!("missing or non-bytes coordinate {coord}")))?;
                    if len != curve.coordinate_len() {
                        return Err(invalid(format!(
                            "coordinate {coord} is {len} bytes, expected {}",
                            curve.coordinate_len()
                        )));
                    }
                }
                Some(curve)
            }
            KeyType::Rsa => {
                if !matches!(
                    algorithm,
                    CoseAlgorithm::Rs256
                        | CoseAlgorithm::Rs384
                        | CoseAlgorithm::Rs512
                        | CoseAlgorithm::Ps256
                ) {
                    return Err(invalid(format!("alg {alg} is not an RSA algorithm")));
                }
                for (param, name) in [(label::N, "n"), (label::E, "e")] {
                    let present = params
                        .get(&param)
                        .and_then(Value::as_bytes)
                        .is_some_and(|b| !b.is_empty());
                    if !present {
                        return Err(invalid(format!("missing or empty RSA parameter {name}")));
                    }
                }
                None
            }
        };

        Ok(Self {
            key_type,
            algorithm,
            curve,
            params,
        })
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn algorithm(&self) -> CoseAlgorithm {
        self.algorithm
    }

    pub fn curve(&self) -> Option<EllipticCurve> {
        self.curve
    }

    pub fn param(&self, label: i64) -> Option<&Value> {
        self.params.get(&label)
    }

    /// EC2 affine coordinates `(x, y)`.
    pub fn ec2_coordinates(&self) -> Option<(&[u8], &[u8])> {
        if self.key_type != KeyType::Ec2 {
            return None;
        }
        let x = self.param(label::X)?.as_bytes()?;
        let y = self.param(label::Y)?.as_bytes()?;
        Some((x.as_slice(), y.as_slice()))
    }

    /// Uncompressed SEC1 point (`0x04 ‖ x ‖ y`) for P-256 keys.
    pub fn p256_uncompressed_point(&self) -> Option<Vec<u8>> {
        if self.curve != Some(EllipticCurve::P256) {
            return None;
        }
        let (x, y) = self.ec2_coordinates()?;
        let mut point = Vec::with_capacity(65);
        point.push(0x04);
        point.extend_from_slice(x);
        point.extend_from_slice(y);
        Some(point)
    }

    /// Verify `signature` over `message` with this key.
    ///
    /// ES256 signatures are ASN.1 DER encoded; EdDSA signatures are the raw 64 bytes.
    /// RSA keys verify with the digest named by their algorithm.
    pub fn verify_signature(&self, message: &[u8], signature: &[u8]) -> std::result::Result<(), String> {
        match self.algorithm {
            CoseAlgorithm::Es256 => {
                let point = self
                    .p256_uncompressed_point()
                    .ok_or("ES256 key is not on P-256")?;
                let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                    .map_err(|_| "credential key is not a valid P-256 point".to_string())?;
                let sig = p256::ecdsa::Signature::from_der(signature)
                    .map_err(|_| "signature is not a DER encoded ECDSA signature".to_string())?;
                key.verify(message, &sig)
                    .map_err(|_| "signature does not verify".to_string())
            }
            CoseAlgorithm::EdDsa => {
                let x = self
                    .param(label::X)
                    .and_then(Value::as_bytes)
                    .ok_or("EdDSA key has no x coordinate")?;
                let bytes: [u8; 32] = x
                    .as_slice()
                    .try_into()
                    .map_err(|_| "EdDSA key is not 32 bytes".to_string())?;
                let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                    .map_err(|_| "credential key is not a valid Ed25519 point".to_string())?;
                let sig = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|_| "signature is not 64 bytes".to_string())?;
                key.verify_strict(message, &sig)
                    .map_err(|_| "signature does not verify".to_string())
            }
            CoseAlgorithm::Rs256
            | CoseAlgorithm::Rs384
            | CoseAlgorithm::Rs512
            | CoseAlgorithm::Ps256 => self.verify_rsa(message, signature),
            other @ (CoseAlgorithm::Es384 | CoseAlgorithm::Es512) => Err(format!(
                "signature verification with alg {} is not supported",
                other.id()
            )),
        }
    }

    /// RS* signatures are PKCS#1 v1.5, PS256 is PSS with SHA-256.
    fn verify_rsa(&self, message: &[u8], signature: &[u8]) -> std::result::Result<(), String> {
        let n = self
            .param(label::N)
            .and_then(Value::as_bytes)
            .ok_or("RSA key has no modulus")?;
        let e = self
            .param(label::E)
            .and_then(Value::as_bytes)
            .ok_or("RSA key has no exponent")?;
        let key = RsaPublicKey::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
            .map_err(|e| format!("credential key is not a valid RSA key: {e}"))?;
        let mismatch = |_| "signature does not verify".to_string();

        if self.algorithm == CoseAlgorithm::Ps256 {
            let sig = rsa::pss::Signature::try_from(signature)
                .map_err(|_| "signature is not a valid PSS signature".to_string())?;
            return rsa::pss::VerifyingKey::<Sha256>::new(key)
                .verify(message, &sig)
                .map_err(mismatch);
        }

        let sig = pkcs1v15::Signature::try_from(signature)
            .map_err(|_| "signature is not a valid PKCS#1 v1.5 signature".to_string())?;
        match self.algorithm {
            CoseAlgorithm::Rs384 => pkcs1v15::VerifyingKey::<Sha384>::new(key).verify(message, &sig),
            CoseAlgorithm::Rs512 => pkcs1v15::VerifyingKey::<Sha512>::new(key).verify(message, &sig),
            _ => pkcs1v15::VerifyingKey::<Sha256>::new(key).verify(message, &sig),
        }
        .map_err(mismatch)
    }
}

pub(crate) fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => i64::try_from(i128::from(*i)).ok(),
        _ => None,
    }
}
