//! The authorization code flow: request construction, callback handling and code exchange.

pub mod authorization;
pub mod exchange;
pub mod state;

pub use authorization::{build_authorization_request, callback_url, AuthorizationRequest};
pub use exchange::{exchange_code, Callback, TokenResponse};
pub use state::{generate, generate_nonce, generate_state, FlowState};
