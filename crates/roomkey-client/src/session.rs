//! Session driver.
//!
//! A `Session` owns one [`Client`], its [`MessageRouter`], a [`Transport`] and
//! a [`SessionObserver`], and executes the client's actions against them. It
//! is the only place where the Sans-IO core touches the outside world.
//!
//! Nothing here fails loudly. Send failures return `false`; every other
//! failure is logged and surfaced as [`SessionEvent::Warning`].

use roomkey_core::{env::Environment, storage::KeyStore};
use roomkey_proto::Envelope;

use crate::{
    client::{Client, ClientIdentity},
    config::SessionConfig,
    error::ClientError,
    event::{ClientAction, ClientEvent},
    observer::{SessionEvent, SessionObserver},
    router::{MessageRouter, Route},
    transport::{ConnectionStatus, Transport},
};

/// One user's connection to the relay.
pub struct Session<E, S, T, O>
where
    E: Environment,
    S: KeyStore,
    T: Transport,
    O: SessionObserver,
{
    client: Client<E, S>,
    router: MessageRouter,
    transport: T,
    observer: O,
    status: ConnectionStatus,
    config: SessionConfig,
}

impl<E, S, T, O> Session<E, S, T, O>
where
    E: Environment,
    S: KeyStore,
    T: Transport,
    O: SessionObserver,
{
    /// Create a disconnected session.
    pub fn new(env: E, store: S, transport: T, observer: O, config: SessionConfig) -> Self {
        let client = Client::new(env, ClientIdentity::new(config.username.clone()), store)
            .with_max_pending_per_room(config.max_pending_per_room);
        let router = MessageRouter::new(config.username.clone(), config.default_room.clone());

        Self {
            client,
            router,
            transport,
            observer,
            status: ConnectionStatus::Disconnected,
            config,
        }
    }

    /// Session settings.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Key exchange state machine.
    pub fn client(&self) -> &Client<E, S> {
        &self.client
    }

    /// Mutable access to the state machine.
    pub fn client_mut(&mut self) -> &mut Client<E, S> {
        &mut self.client
    }

    /// Inbound dispatcher.
    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    /// Outbound transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Event observer.
    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Mutable access to the observer.
    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Current link state.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Record a link state change and notify the observer.
    ///
    /// Leaving `Connected` forgets the roster; the relay sends a fresh one on
    /// reconnect.
    pub fn set_status(&mut self, status: ConnectionStatus) {
        if status == self.status {
            return;
        }

        tracing::debug!(username = %self.config.username, ?status, "connection status changed");
        if self.status == ConnectionStatus::Connected {
            self.router.reset();
        }

        self.status = status;
        self.observer.on_event(SessionEvent::StatusChanged(status));
    }

    /// Encrypt and send a message to a room.
    ///
    /// Returns `false` if not connected or if the envelope could not be
    /// handed to the transport.
    pub fn send_message(&mut self, room_id: &str, text: &str) -> bool {
        if self.status != ConnectionStatus::Connected {
            tracing::warn!(room_id, error = %ClientError::TransportUnavailable, "message not sent");
            return false;
        }

        let event =
            ClientEvent::SendMessage { room_id: room_id.to_string(), plaintext: text.into() };
        match self.client.handle(event) {
            Ok(actions) => self.execute(actions),
            Err(err) => {
                self.warn(Some(room_id), &err);
                false
            },
        }
    }

    /// Send a message to the default room.
    pub fn send_to_default_room(&mut self, text: &str) -> bool {
        let room_id = self.config.default_room.clone();
        self.send_message(&room_id, text)
    }

    /// Process one inbound envelope.
    pub fn receive(&mut self, envelope: &Envelope) {
        let routes = match self.router.route(envelope) {
            Ok(routes) => routes,
            Err(err) => {
                self.warn(envelope.room_id.as_deref(), &ClientError::from(err));
                return;
            },
        };

        for route in routes {
            match route {
                Route::Protocol(event) => {
                    let room_id = event_room(&event).map(str::to_string);
                    match self.client.handle(event) {
                        Ok(actions) => {
                            self.execute(actions);
                        },
                        Err(err) => self.warn(room_id.as_deref(), &err),
                    }
                },
                Route::Notify(event) => self.observer.on_event(event),
            }
        }
    }

    /// Parse and process one inbound JSON envelope.
    pub fn receive_json(&mut self, json: &str) {
        match Envelope::decode(json) {
            Ok(envelope) => self.receive(&envelope),
            Err(err) => self.warn(None, &ClientError::from(err)),
        }
    }

    /// End the session: purge every key, the pending queues and the roster,
    /// and mark the link disconnected.
    ///
    /// The session is disconnected even if purging the store fails.
    pub fn logout(&mut self) -> Result<(), ClientError> {
        self.router.reset();
        self.set_status(ConnectionStatus::Disconnected);
        self.client.handle(ClientEvent::Logout)?;

        tracing::info!(username = %self.config.username, "logged out");
        Ok(())
    }

    /// Execute client actions. Returns `false` if any send failed.
    fn execute(&mut self, actions: Vec<ClientAction>) -> bool {
        let mut all_sent = true;

        for action in actions {
            match action {
                ClientAction::Send(envelope) => {
                    if !self.transport.send(&envelope) {
                        tracing::warn!(kind = ?envelope.kind, "transport rejected envelope");
                        all_sent = false;
                    }
                },
                ClientAction::DeliverMessage {
                    room_id,
                    sender,
                    plaintext,
                    was_encrypted,
                    recovered,
                    timestamp,
                } => self.observer.on_event(SessionEvent::MessageDecrypted {
                    room_id,
                    sender,
                    text: String::from_utf8_lossy(&plaintext).into_owned(),
                    was_encrypted,
                    recovered,
                    timestamp,
                }),
                ClientAction::KeyPending { room_id, sender, timestamp } => {
                    self.observer.on_event(SessionEvent::KeyPending { room_id, sender, timestamp });
                },
            }
        }

        all_sent
    }

    fn warn(&mut self, room_id: Option<&str>, err: &ClientError) {
        tracing::warn!(room_id, error = %err, "session operation failed");
        self.observer.on_event(SessionEvent::Warning {
            room_id: room_id.map(str::to_string),
            reason: err.to_string(),
        });
    }
}

fn event_room(event: &ClientEvent) -> Option<&str> {
    match event {
        ClientEvent::SendMessage { room_id, .. }
        | ClientEvent::ChatReceived { room_id, .. }
        | ClientEvent::PeerJoined { room_id, .. }
        | ClientEvent::KeyRequestReceived { room_id, .. }
        | ClientEvent::KeyShareReceived { room_id, .. } => Some(room_id),
        ClientEvent::Logout => None,
    }
}
