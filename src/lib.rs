//! Federated presence-based message relay.
//!
//! Independent relay processes accept connections from end-user clients and
//! from each other, keep a directory of locally-registered usernames, and
//! forward recipient-addressed text messages either directly or by a
//! single-hop broadcast to peer relays. Each module owns one concern:
//!
//! - [`cli`] parses the command-line interface for serve and client modes.
//! - [`frame`] implements the 6-byte-header wire protocol plus async
//!   read/write helpers.
//! - [`directory`] is the shared registry of live client and peer
//!   connections.
//! - [`session`] runs the per-connection state machine and dispatch loop.
//! - [`router`] decides between direct delivery and single-hop broadcast,
//!   and answers directory-exchange requests.
//! - [`bootstrap`] dials the seed list at startup and performs the one-shot
//!   peer discovery exchange.
//! - [`relay`] binds the listener and drives the accept loop.
//! - [`client`] connects to a relay, multiplexing stdin and incoming
//!   messages for a terminal user.
//!
//! Integration tests use this crate directly to exercise the relay over
//! live TCP connections.

pub mod bootstrap;
pub mod cli;
pub mod client;
pub mod directory;
pub mod frame;
pub mod relay;
pub mod router;
pub mod session;
