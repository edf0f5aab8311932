#![no_main]

//! Fuzz target for AuthenticatorData::parse()
//!
//! Offsets are computed from attacker-controlled length fields, so this
//! must never panic or read out of bounds, whatever the flags say.
//!
//! Run with: cargo +nightly fuzz run fuzz_authenticator_data

use libfuzzer_sys::fuzz_target;
use passkey_core::AuthenticatorData;

fuzz_target!(|data: &[u8]| {
    if let Ok(parsed) = AuthenticatorData::parse(data) {
        if let Some(attested) = parsed.attested_credential_data() {
            assert!(attested.credential_id().len() + 55 <= data.len());
        }
    }
});
