//! # Peer Networking Library
//!
//! Turns the simulation into a networked match. One peer hosts the lobby and
//! is authoritative; the others join as clients and relay everything through
//! the host. There is no dedicated server.
//!
//! ## Frame Pipeline
//!
//! Each frame runs the same fixed sequence on every peer:
//! 1. Pending handshake retries are polled
//! 2. The transport is drained and chunked messages reassembled
//! 3. Each message is dispatched to the handler for the local role
//! 4. The world is simulated
//! 5. Whatever the frame queued in the outbox is sent
//!
//! Nothing blocks and nothing runs on another thread, so handlers never race
//! the simulation.
//!
//! ## Module Organization
//!
//! ### Transport (`transport`)
//! The session-oriented delivery and lobby contract, with an in-process
//! implementation for tests and bot matches and a UDP one for real play.
//!
//! ### Network (`network`)
//! Chunking of oversized messages, handshake retry, lobby lifecycle with a
//! bounded retry for connectivity failures, and outbox routing.
//!
//! ### Dispatch (`dispatch`, `handlers`)
//! The tag registry and the host/client handler pair for every message.
//!
//! ### Session (`session`)
//! Ties network, dispatcher and world together and tracks the connection
//! state a front end would display.
//!
//! ### Input (`input`)
//! An autopilot that produces frame input for headless peers.

pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod input;
pub mod network;
pub mod session;
pub mod transport;

pub use dispatch::Dispatcher;
pub use error::NetError;
pub use network::{NetEvent, NetworkManager, Target};
pub use session::{Session, SessionState};
pub use transport::{LoopbackHub, LoopbackTransport, Transport, TransportEvent, UdpTransport};
