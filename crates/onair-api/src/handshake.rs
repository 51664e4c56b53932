//! Authentication boundary.
//!
//! The key exchange itself is supplied by the embedding application. This
//! module only fixes its shape: a [`Handshake`] consumes a freshly opened
//! transport plus the password and yields opaque [`SessionKeys`], which the
//! RPC layer then uses to seal and open every frame.

use std::future::Future;

use bytes::Bytes;
use secrecy::SecretString;

use crate::error::Error;
use crate::transport::Transport;

/// Key material produced by a successful handshake.
///
/// Stream ciphers keep per-direction state, so both operations take
/// `&mut self` and must be called in frame order.
pub trait SessionKeys: Send + 'static {
    /// Seal an outbound plaintext message into a wire frame.
    fn seal(&mut self, plaintext: &[u8]) -> Result<Bytes, Error>;

    /// Open an inbound wire frame. Failure means the stream can no longer
    /// be trusted.
    fn open(&mut self, frame: &[u8]) -> Result<Bytes, Error>;
}

/// A handshake procedure run once per connection attempt.
///
/// Implementations must return [`Error::Handshake`] when the server
/// refuses the credentials or speaks an incompatible protocol. Transport
/// failures during the exchange must surface as transport errors instead,
/// so the caller can tell a dead link from a wrong password.
pub trait Handshake: Send + Sync + 'static {
    type Keys: SessionKeys;

    fn perform<T: Transport>(
        &self,
        transport: &mut T,
        password: &SecretString,
    ) -> impl Future<Output = Result<Self::Keys, Error>> + Send;
}
