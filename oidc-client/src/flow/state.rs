//! Anti-forgery state and replay nonce for a single authorization attempt.

use rand::Rng;

/// Generate a cryptographically random state token (32 bytes, hex encoded).
pub fn generate_state() -> String {
    let random_bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(random_bytes)
}

/// Generate a cryptographically random nonce (16 bytes, hex encoded).
pub fn generate_nonce() -> String {
    let random_bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(random_bytes)
}

/// Generate a fresh `(state, nonce)` pair.
pub fn generate() -> (String, String) {
    (generate_state(), generate_nonce())
}

/// Correlation values of the flow currently in progress.
///
/// Only the authorization request builder arms a flow. The state is consumed by the first
/// callback compared against it; the nonce stays until the flow is re-armed or cleared so the
/// ID token of that callback can be checked against it.
#[derive(Debug, Clone, Default)]
pub struct FlowState {
    state: Option<String>,
    nonce: Option<String>,
    callback_url: Option<String>,
}

impl FlowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a new attempt, replacing whatever a previous attempt left behind.
    pub(crate) fn arm(&mut self, state: String, nonce: String, callback_url: String) {
        self.state = Some(state);
        self.nonce = Some(nonce);
        self.callback_url = Some(callback_url);
    }

    /// Compare `returned` with the armed state and consume it.
    ///
    /// Returns false when nothing is armed, the state was already consumed, or the values differ.
    pub(crate) fn take_state_if_matches(&mut self, returned: &str) -> bool {
        match self.state.take() {
            Some(expected) => expected == returned,
            None => false,
        }
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    pub fn callback_url(&self) -> Option<&str> {
        self.callback_url.as_deref()
    }

    pub fn is_armed(&self) -> bool {
        self.nonce.is_some()
    }

    pub(crate) fn clear_callback_url(&mut self) {
        self.callback_url = None;
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}
