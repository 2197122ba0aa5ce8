//! Client library for Twitch chat (TMI), the IRCv3-derived messaging
//! interface.
//!
//! A [`Session`] logs into the chat servers (as a registered user with an
//! OAuth token, or anonymously), joins and leaves channels, sends messages
//! and whispers, and delivers a typed stream of [`Event`]s: joins, parts,
//! messages, whispers, notices, hosts, room-mode changes, moderation
//! actions, user-state updates, subscriptions, raids, and rituals.
//!
//! The network, the clock, and the event consumer are all pluggable seams:
//! install a [`transport::TransportFactory`] (the bundled
//! [`TlsTransport`] reaches the production servers), an optional
//! [`Clock`] for handshake timeouts, and an event channel to drain.
//!
//! # Modules
//!
//! - [`session`] — the session engine and public API
//! - [`event`] — events emitted to the consumer
//! - [`message`] — wire-format line parsing
//! - [`tags`] — IRCv3 tag parsing and typed projections
//! - [`transport`] — the network seam and the bundled TLS transport
//! - [`clock`] — the time seam used for handshake deadlines

pub mod clock;
pub mod event;
pub mod message;
pub mod session;
pub mod tags;
pub mod transport;

mod action;

pub use clock::{Clock, SystemClock};
pub use event::Event;
pub use message::Message;
pub use session::Session;
pub use tags::Tags;
pub use transport::{TlsTransport, Transport, TransportFactory, TransportSink};
