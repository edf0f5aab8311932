//! Binary authenticator data parser.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! [0, 32)        rpIdHash
//! [32]           flags
//! [33, 37)       signCount
//! -- present when AT is set --
//! [37, 53)       aaguid
//! [53, 55)       credentialIdLength (L)
//! [55, 55+L)     credentialId
//! [55+L, ..)     credentialPublicKey (COSE_Key)
//! -- present when ED is set --
//! [.., end)      extensions (CBOR map, kept raw)
//! ```

use crate::cose::CoseKey;
use crate::error::{CeremonyError, Result};

pub const RP_ID_HASH_LEN: usize = 32;
pub const AAGUID_LEN: usize = 16;
/// rpIdHash + flags + signCount.
pub const MIN_AUTHENTICATOR_DATA_LEN: usize = 37;

const FLAGS_OFFSET: usize = 32;
const SIGN_COUNT_OFFSET: usize = 33;
const AAGUID_OFFSET: usize = 37;
const CREDENTIAL_ID_LEN_OFFSET: usize = 53;
const CREDENTIAL_ID_OFFSET: usize = 55;

/// Authenticator data flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthenticatorFlags(u8);

impl AuthenticatorFlags {
    pub const USER_PRESENT: u8 = 0x01;
    pub const USER_VERIFIED: u8 = 0x04;
    pub const ATTESTED_CREDENTIAL_DATA: u8 = 0x40;
    pub const EXTENSION_DATA: u8 = 0x80;

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn user_present(&self) -> bool {
        self.0 & Self::USER_PRESENT != 0
    }

    pub fn user_verified(&self) -> bool {
        self.0 & Self::USER_VERIFIED != 0
    }

    pub fn has_attested_credential_data(&self) -> bool {
        self.0 & Self::ATTESTED_CREDENTIAL_DATA != 0
    }

    pub fn has_extension_data(&self) -> bool {
        self.0 & Self::EXTENSION_DATA != 0
    }
}

/// The credential being registered, as embedded in authenticator data.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestedCredentialData {
    aaguid: [u8; AAGUID_LEN],
    credential_id: Vec<u8>,
    credential_public_key: Vec<u8>,
    decoded_public_key: CoseKey,
}

impl AttestedCredentialData {
    pub fn aaguid(&self) -> &[u8; AAGUID_LEN] {
        &self.aaguid
    }

    pub fn credential_id_length(&self) -> u16 {
        // Parsed from a u16 length prefix.
        self.credential_id.len() as u16
    }

    pub fn credential_id(&self) -> &[u8] {
        &self.credential_id
    }

    /// Raw COSE_Key bytes, exactly as the authenticator sent them.
    pub fn credential_public_key(&self) -> &[u8] {
        &self.credential_public_key
    }

    pub fn decoded_public_key(&self) -> &CoseKey {
        &self.decoded_public_key
    }
}

/// Parsed authenticator data. Only obtainable through [`AuthenticatorData::parse`].
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatorData {
    rp_id_hash: [u8; RP_ID_HASH_LEN],
    flags: AuthenticatorFlags,
    sign_count: u32,
    attested_credential_data: Option<AttestedCredentialData>,
    extensions: Option<Vec<u8>>,
}

impl AuthenticatorData {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let mut rp_id_hash = [0u8; RP_ID_HASH_LEN];
        rp_id_hash.copy_from_slice(field(raw, 0, RP_ID_HASH_LEN, "rpIdHash")?);

        let flags = AuthenticatorFlags::from_bits(field(raw, FLAGS_OFFSET, 1, "flags")?[0]);

        let mut count = [0u8; 4];
        count.copy_from_slice(field(raw, SIGN_COUNT_OFFSET, 4, "signCount")?);
        let sign_count = u32::from_be_bytes(count);

        let mut rest = &raw[MIN_AUTHENTICATOR_DATA_LEN..];
        let mut attested_credential_data = None;

        if flags.has_attested_credential_data() && raw.len() > MIN_AUTHENTICATOR_DATA_LEN {
            let mut aaguid = [0u8; AAGUID_LEN];
            aaguid.copy_from_slice(field(raw, AAGUID_OFFSET, AAGUID_LEN, "aaguid")?);

            let len = field(raw, CREDENTIAL_ID_LEN_OFFSET, 2, "credentialIdLength")?;
            let credential_id_len = u16::from_be_bytes([len[0], len[1]]) as usize;
            let credential_id =
                field(raw, CREDENTIAL_ID_OFFSET, credential_id_len, "credentialId")?.to_vec();

            let key_bytes = &raw[CREDENTIAL_ID_OFFSET + credential_id_len..];
            let (decoded_public_key, consumed) = CoseKey::decode_prefix(key_bytes)?;

            attested_credential_data = Some(AttestedCredentialData {
                aaguid,
                credential_id,
                credential_public_key: key_bytes[..consumed].to_vec(),
                decoded_public_key,
            });
            rest = &key_bytes[consumed..];

            if !flags.has_extension_data() && !rest.is_empty() {
                return Err(CeremonyError::MalformedPublicKey(format!(
                    "{} unexpected bytes after credential public key",
                    rest.len()
                )));
            }
        }

        let extensions = if flags.has_extension_data() {
            if rest.is_empty() {
                return Err(CeremonyError::TruncatedAuthenticatorData {
                    field: "extensions",
                    needed: raw.len() + 1,
                    actual: raw.len(),
                });
            }
            Some(rest.to_vec())
        } else {
            None
        };

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential_data,
            extensions,
        })
    }

    pub fn rp_id_hash(&self) -> &[u8; RP_ID_HASH_LEN] {
        &self.rp_id_hash
    }

    pub fn flags(&self) -> AuthenticatorFlags {
        self.flags
    }

    pub fn sign_count(&self) -> u32 {
        self.sign_count
    }

    pub fn attested_credential_data(&self) -> Option<&AttestedCredentialData> {
        self.attested_credential_data.as_ref()
    }

    /// Raw extension outputs (CBOR), when the ED flag is set.
    pub fn extensions(&self) -> Option<&[u8]> {
        self.extensions.as_deref()
    }
}

/// Bounds-checked slice of `len` bytes starting at `offset`.
fn field<'a>(raw: &'a [u8], offset: usize, len: usize, name: &'static str) -> Result<&'a [u8]> {
    let end = offset.saturating_add(len);
    raw.get(offset..end)
        .ok_or(CeremonyError::TruncatedAuthenticatorData {
            field: name,
            needed: end,
            actual: raw.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciborium::Value;
    use rand::Rng;

    fn cose_key() -> Vec<u8> {
        let int = |v: i64| Value::Integer(v.into());
        let key = Value::Map(vec![
            (int(1), int(2)),
            (int(3), int(-7)),
            (int(-1), int(1)),
            (int(-2), Value::Bytes(vec![0x11; 32])),
            (int(-3), Value::Bytes(vec![0x22; 32])),
        ]);
        let mut out = Vec::new();
        ciborium::into_writer(&key, &mut out).unwrap();
        out
    }

    fn build(flags: u8, credential_id: &[u8], key: &[u8]) -> Vec<u8> {
        let mut raw = vec![0xab; RP_ID_HASH_LEN];
        raw.push(flags);
        raw.extend_from_slice(&7u32.to_be_bytes());
        raw.extend_from_slice(&[0x5a; AAGUID_LEN]);
        raw.extend_from_slice(&(credential_id.len() as u16).to_be_bytes());
        raw.extend_from_slice(credential_id);
        raw.extend_from_slice(key);
        raw
    }

    #[test]
    fn test_parse_header_only() {
        let mut raw = vec![0u8; MIN_AUTHENTICATOR_DATA_LEN];
        raw[FLAGS_OFFSET] = AuthenticatorFlags::USER_PRESENT;
        raw[33..37].copy_from_slice(&0x0102_0304u32.to_be_bytes());

        let data = AuthenticatorData::parse(&raw).unwrap();
        assert!(data.flags().user_present());
        assert!(!data.flags().user_verified());
        assert_eq!(data.sign_count(), 0x0102_0304);
        assert!(data.attested_credential_data().is_none());
        assert!(data.extensions().is_none());
    }

    #[test]
    fn test_at_flag_without_trailing_bytes() {
        let mut raw = vec![0u8; MIN_AUTHENTICATOR_DATA_LEN];
        raw[FLAGS_OFFSET] = 0x41;
        let data = AuthenticatorData::parse(&raw).unwrap();
        assert!(data.flags().has_attested_credential_data());
        assert!(data.attested_credential_data().is_none());
    }

    #[test]
    fn test_parse_attested_credential() {
        let key = cose_key();
        let raw = build(0x45, &[1, 2, 3, 4], &key);

        let data = AuthenticatorData::parse(&raw).unwrap();
        assert_eq!(data.rp_id_hash(), &[0xab; 32]);
        assert!(data.flags().user_verified());
        assert_eq!(data.sign_count(), 7);

        let attested = data.attested_credential_data().unwrap();
        assert_eq!(attested.aaguid(), &[0x5a; 16]);
        assert_eq!(attested.credential_id_length(), 4);
        assert_eq!(attested.credential_id(), &[1, 2, 3, 4]);
        assert_eq!(attested.credential_public_key(), key.as_slice());
    }

    #[test]
    fn test_extensions_after_key() {
        let mut raw = build(0xc1, &[9; 16], &cose_key());
        // {"credProtect": 2}
        let mut ext = Vec::new();
        ciborium::into_writer(
            &Value::Map(vec![(Value::Text("credProtect".into()), Value::Integer(2.into()))]),
            &mut ext,
        )
        .unwrap();
        raw.extend_from_slice(&ext);

        let data = AuthenticatorData::parse(&raw).unwrap();
        assert_eq!(data.extensions(), Some(ext.as_slice()));
        assert_eq!(
            data.attested_credential_data().unwrap().credential_public_key(),
            cose_key().as_slice()
        );
    }

    #[test]
    fn test_trailing_bytes_without_ed_flag() {
        let mut raw = build(0x41, &[9; 16], &cose_key());
        raw.push(0xa0);
        assert!(matches!(
            AuthenticatorData::parse(&raw),
            Err(CeremonyError::MalformedPublicKey(_))
        ));
    }

    #[test]
    fn test_ed_flag_without_extension_bytes() {
        let raw = build(0xc1, &[9; 16], &cose_key());
        assert!(matches!(
            AuthenticatorData::parse(&raw),
            Err(CeremonyError::TruncatedAuthenticatorData { field: "extensions", .. })
        ));
    }

    #[test]
    fn test_credential_id_length_overruns_buffer() {
        let mut raw = build(0x41, &[1, 2, 3], &[]);
        raw[53..55].copy_from_slice(&500u16.to_be_bytes());
        let err = AuthenticatorData::parse(&raw).unwrap_err();
        match err {
            CeremonyError::TruncatedAuthenticatorData { needed, actual, .. } => {
                assert_eq!(needed, 555);
                assert_eq!(actual, raw.len());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_every_short_input_is_truncated() {
        for len in 0..MIN_AUTHENTICATOR_DATA_LEN {
            let raw = vec![0x41; len];
            assert!(
                matches!(
                    AuthenticatorData::parse(&raw),
                    Err(CeremonyError::TruncatedAuthenticatorData { .. })
                ),
                "length {len} should be truncated"
            );
        }
    }

    #[test]
    fn test_random_truncations_never_panic() {
        let full = build(0xc5, &[3; 64], &cose_key());
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let len = rng.gen_range(0..=full.len());
            let mut raw = full[..len].to_vec();
            if len > FLAGS_OFFSET {
                raw[FLAGS_OFFSET] = rng.gen();
            }
            let result = AuthenticatorData::parse(&raw);
            if len < MIN_AUTHENTICATOR_DATA_LEN {
                assert!(result.is_err());
            }
        }
    }

    #[test]
    fn test_random_bytes_never_panic() {
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let len = rng.gen_range(0..256);
            let raw: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let _ = AuthenticatorData::parse(&raw);
        }
    }
}
