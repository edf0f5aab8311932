//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod health;
pub mod registration;

pub use crate::state::AppState;
pub use health::{health, ready, HealthResponse, ReadyResponse};
pub use registration::{
    finish_registration, start_registration, AuthenticatorResponse, FinishRegistrationRequest,
    RegisteredCredentialResponse, StartRegistrationRequest, StartRegistrationResponse,
};
