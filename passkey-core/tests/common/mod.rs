//! Builders for synthetic authenticator responses.

#![allow(dead_code)]

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ciborium::Value;
use p256::ecdsa::signature::Signer;
use sha2::{Digest, Sha256};

use passkey_core::{Registrar, RelyingParty, VerifierRegistry};

pub const RP_ID: &str = "relying-party";
pub const ORIGIN: &str = "http://relying-party:8080";
pub const AAGUID: [u8; 16] = [0x5a; 16];

/// Self-signed P-256 attestation certificate ("Test Attestation", valid until 2126).
pub const ATTESTATION_CERT_HEX: &str = "3082021d308201c3a00302010202146f8b2b4e3ba62a1ce88054d8ba410e3398489341300a06082a8648ce3d0403023063310b300906035504061302555331153013060355040a0c0c506173736b6579205465737431223020060355040b0c1941757468656e74696361746f72204174746573746174696f6e3119301706035504030c1054657374204174746573746174696f6e3020170d3236313031373231343532315a180f32313236303932333231343532315a3063310b300906035504061302555331153013060355040a0c0c506173736b6579205465737431223020060355040b0c1941757468656e74696361746f72204174746573746174696f6e3119301706035504030c1054657374204174746573746174696f6e3059301306072a8648ce3d020106082a8648ce3d030107034200049a3894d60582d88d4f4ba08db55571ce8136c0ae84a0435d8ecc4ca73266aa33b164371f052bd0a7220302d141a5d5203c97062a95de62a01e5ebf5c846dd8eca3533051301d0603551d0e04160414f7f2136028fe6a6f08b4e7bf557b188413b18f3d301f0603551d23041830168014f7f2136028fe6a6f08b4e7bf557b188413b18f3d300f0603551d130101ff040530030101ff300a06082a8648ce3d0403020348003045022100a365ff2d12f32eac27f365d9cb8c9758278f3ea70fb65e57d896aae8184391b40220672ac5466033bee48bf62e6236720ddd39be6c0a78973115c76a449b8ac7792a";
/// Private scalar of the attestation certificate's key.
pub const ATTESTATION_KEY_HEX: &str =
    "c21b03a6da5d2b7cd90f6f62be6b232038ad95af75491b36d2e3b54ddd1b55c1";

pub const FLAG_UP: u8 = 0x01;
pub const FLAG_UV: u8 = 0x04;
pub const FLAG_AT: u8 = 0x40;
pub const FLAG_ED: u8 = 0x80;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("passkey_core=debug")
        .with_test_writer()
        .try_init();
}

pub fn registrar() -> Registrar {
    let rp = RelyingParty::new(RP_ID, ORIGIN, "Relying Party").unwrap();
    Registrar::new(rp, Arc::new(VerifierRegistry::with_builtin_verifiers()))
}

fn int(v: i64) -> Value {
    Value::Integer(v.into())
}

fn text(s: &str) -> Value {
    Value::Text(s.into())
}

pub fn cbor(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out).unwrap();
    out
}

pub fn es256_key(seed: u8) -> p256::ecdsa::SigningKey {
    p256::ecdsa::SigningKey::from_slice(&[seed; 32]).unwrap()
}

pub fn attestation_key() -> p256::ecdsa::SigningKey {
    p256::ecdsa::SigningKey::from_slice(&hex::decode(ATTESTATION_KEY_HEX).unwrap()).unwrap()
}

pub fn attestation_cert() -> Vec<u8> {
    hex::decode(ATTESTATION_CERT_HEX).unwrap()
}

pub fn es256_sign(key: &p256::ecdsa::SigningKey, message: &[u8]) -> Vec<u8> {
    let sig: p256::ecdsa::Signature = key.sign(message);
    sig.to_der().as_bytes().to_vec()
}

pub fn es256_cose(key: &p256::ecdsa::SigningKey) -> Vec<u8> {
    let point = key.verifying_key().to_encoded_point(false);
    cbor(&Value::Map(vec![
        (int(1), int(2)),
        (int(3), int(-7)),
        (int(-1), int(1)),
        (int(-2), Value::Bytes(point.x().unwrap().to_vec())),
        (int(-3), Value::Bytes(point.y().unwrap().to_vec())),
    ]))
}

pub fn ed25519_key(seed: u8) -> ed25519_dalek::SigningKey {
    ed25519_dalek::SigningKey::from_bytes(&[seed; 32])
}

pub fn ed25519_sign(key: &ed25519_dalek::SigningKey, message: &[u8]) -> Vec<u8> {
    let sig: ed25519_dalek::Signature = ed25519_dalek::Signer::sign(key, message);
    sig.to_bytes().to_vec()
}

pub fn ed25519_cose(key: &ed25519_dalek::SigningKey) -> Vec<u8> {
    cbor(&Value::Map(vec![
        (int(1), int(1)),
        (int(3), int(-8)),
        (int(-1), int(6)),
        (int(-2), Value::Bytes(key.verifying_key().to_bytes().to_vec())),
    ]))
}

pub fn rs256_key() -> rsa::RsaPrivateKey {
    rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap()
}

pub fn rs256_sign(key: &rsa::RsaPrivateKey, message: &[u8]) -> Vec<u8> {
    use rsa::signature::{SignatureEncoding, Signer};
    rsa::pkcs1v15::SigningKey::<Sha256>::new(key.clone())
        .sign(message)
        .to_vec()
}

pub fn rs256_cose(key: &rsa::RsaPrivateKey) -> Vec<u8> {
    use rsa::traits::PublicKeyParts;
    cbor(&Value::Map(vec![
        (int(1), int(3)),
        (int(3), int(-257)),
        (int(-1), Value::Bytes(key.n().to_bytes_be())),
        (int(-2), Value::Bytes(key.e().to_bytes_be())),
    ]))
}

pub fn rp_id_hash(rp_id: &str) -> [u8; 32] {
    Sha256::digest(rp_id.as_bytes()).into()
}

/// Authenticator data with attested credential data for `rp_id`.
pub fn auth_data(rp_id: &str, flags: u8, credential_id: &[u8], cose_key: &[u8]) -> Vec<u8> {
    let mut raw = rp_id_hash(rp_id).to_vec();
    raw.push(flags);
    raw.extend_from_slice(&0u32.to_be_bytes());
    raw.extend_from_slice(&AAGUID);
    raw.extend_from_slice(&(credential_id.len() as u16).to_be_bytes());
    raw.extend_from_slice(credential_id);
    raw.extend_from_slice(cose_key);
    raw
}

pub fn client_data_json(type_: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
    serde_json::json!({
        "type": type_,
        "challenge": URL_SAFE_NO_PAD.encode(challenge),
        "origin": origin,
        "crossOrigin": false,
    })
    .to_string()
    .into_bytes()
}

pub fn attestation_object(fmt: &str, auth_data: &[u8], statement: Vec<(Value, Value)>) -> Vec<u8> {
    cbor(&Value::Map(vec![
        (text("fmt"), text(fmt)),
        (text("attStmt"), Value::Map(statement)),
        (text("authData"), Value::Bytes(auth_data.to_vec())),
    ]))
}

pub fn packed_statement(alg: i64, sig: Vec<u8>, x5c: Option<Vec<Vec<u8>>>) -> Vec<(Value, Value)> {
    let mut stmt = vec![(text("alg"), int(alg)), (text("sig"), Value::Bytes(sig))];
    if let Some(certs) = x5c {
        stmt.push((
            text("x5c"),
            Value::Array(certs.into_iter().map(Value::Bytes).collect()),
        ));
    }
    stmt
}

pub fn u2f_statement(sig: Vec<u8>, cert: Vec<u8>) -> Vec<(Value, Value)> {
    vec![
        (text("sig"), Value::Bytes(sig)),
        (text("x5c"), Value::Array(vec![Value::Bytes(cert)])),
    ]
}

/// `authData ‖ SHA-256(clientDataJSON)`
pub fn signed_data(auth_data: &[u8], client_data_json: &[u8]) -> Vec<u8> {
    let mut signed = auth_data.to_vec();
    signed.extend_from_slice(&Sha256::digest(client_data_json));
    signed
}
