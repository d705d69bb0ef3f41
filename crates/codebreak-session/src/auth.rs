//! Authentication hook for validating player identity.
//!
//! Codebreak doesn't issue or validate credentials itself — that belongs
//! to whatever identity provider fronts the deployment. The server only
//! needs one answer: "whose connection is this?" The [`Authenticator`]
//! trait is that seam; the handshake hands it the client's token and
//! gets back a [`PlayerId`] or a rejection.

use codebreak_protocol::PlayerId;

use crate::ConnectionError;

/// Validates a client's auth token and returns their identity.
///
/// `Send + Sync + 'static` because the authenticator is shared across
/// connection tasks for the lifetime of the server.
pub trait Authenticator: Send + Sync + 'static {
    /// Validates the given token.
    ///
    /// Called during the handshake. Returns
    /// [`ConnectionError::AuthFailed`] for an invalid, expired, or
    /// rejected credential.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<PlayerId, ConnectionError>> + Send;
}
