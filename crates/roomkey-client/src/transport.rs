//! Outbound transport seam.

use roomkey_proto::Envelope;

/// Connection state of the relay link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// Handshake in progress.
    Connecting,
    /// Envelopes can be sent.
    Connected,
    /// No link; sends fail.
    Disconnected,
}

/// Carries envelopes to the relay.
///
/// Inbound envelopes are pushed into [`Session::receive`](crate::Session::receive)
/// by whoever owns the connection.
pub trait Transport {
    /// Hand an envelope to the relay.
    ///
    /// Returns `false` when disconnected. No delivery acknowledgement exists
    /// beyond that.
    fn send(&mut self, envelope: &Envelope) -> bool;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, envelope: &Envelope) -> bool {
        (**self).send(envelope)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, envelope: &Envelope) -> bool {
        (**self).send(envelope)
    }
}
