//! Friend transport seam.

use auto_impl::auto_impl;
use xvine_primitives::PeerId;

/// Carries frames between directly connected peers.
///
/// The overlay calls [`FriendTransport::request_transmit`] when a friend queue
/// becomes non-empty. The transport answers later through
/// `Overlay::on_transmit_ready`, offering a buffer size; the overlay then
/// returns the frames that fit. Only one request per friend is outstanding at
/// a time.
#[auto_impl(&, Box, Arc)]
pub trait FriendTransport: Send + Sync {
    /// Ask for a transmit-ready callback for `peer` with room for at least
    /// `size` bytes.
    fn request_transmit(&self, peer: &PeerId, size: usize);
}
