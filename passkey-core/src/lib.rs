//! Passkey Core - WebAuthn registration ceremony validation
//!
//! This crate validates the response a browser returns from
//! `navigator.credentials.create()` and turns it into a stored credential.
//!
//! # Features
//!
//! - Bit-exact authenticator data parser (never panics on hostile input)
//! - COSE_Key decoding with strict per-key-type parameter checks
//! - Pluggable attestation statement verifiers (`none`, `packed`, `fido-u2f` built in)
//! - Ordered ceremony steps with a distinct error for each failure
//! - At-most-once credential registration under concurrency
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use passkey_core::{
//!     MemoryChallengeStore, MemoryCredentialStore, Registrar, RegistrationResponse,
//!     RelyingParty, UserAccount, VerifierRegistry,
//! };
//!
//! # async fn example(client_data_json: &[u8], attestation_object: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let rp = RelyingParty::new("example.com", "https://example.com", "Example")?;
//! let registrar = Registrar::new(rp, Arc::new(VerifierRegistry::with_builtin_verifiers()));
//! let challenges = MemoryChallengeStore::new();
//! let credentials = MemoryCredentialStore::new();
//!
//! // Send `options` to the browser
//! let user = UserAccount::new(b"user-1".to_vec(), "alice", "Alice")?;
//! let options = registrar.start(&challenges, "session-1", &user, &[])?;
//!
//! // ...and validate what comes back
//! let response = RegistrationResponse::new(client_data_json, attestation_object);
//! let credential = registrar
//!     .finish_session(&challenges, "session-1", &response, &credentials)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod attestation;
pub mod authenticator_data;
pub mod ceremony;
pub mod client_data;
pub mod cose;
pub mod error;
pub mod options;
pub mod store;

// Re-export main types for convenience
pub use attestation::{
    AttestationError, AttestationObject, AttestationVerifier, FidoU2fVerifier, FormatIdentifier,
    NoneVerifier, PackedVerifier, VerifierRegistry,
};
pub use authenticator_data::{AttestedCredentialData, AuthenticatorData, AuthenticatorFlags};
pub use ceremony::{
    AcceptAllExtensions, DuplicatePolicy, ExtensionValidator, Registrar, RegistrationResponse,
    RelyingParty, RelyingPartyError, ValidatedRegistration,
};
pub use client_data::{validate_client_data, ClientDataHash, CollectedClientData};
pub use cose::{CoseAlgorithm, CoseKey, EllipticCurve, KeyType};
pub use error::{
    AuthenticatorDataCheck, CeremonyError, CeremonyStep, ClientDataCheck, ErrorKind, Result,
};
pub use options::{Challenge, OptionsError, PublicKeyCredentialCreationOptions, UserAccount};
pub use store::{
    ChallengeStore, Credential, CredentialStore, InsertError, MemoryChallengeStore,
    MemoryCredentialStore, MemoryUserStore, PendingRegistration, StorageError, UserStore,
};
