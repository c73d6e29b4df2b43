//! Outgoing messages produced by the simulation during a frame.
//!
//! Nothing in the simulation talks to the network directly; it queues
//! encoded text here and the session drains the queue after the frame.

use shared::protocol::WireMessage;
use shared::{PlayerId, Role};

/// Messages from the simulation to the network layer
#[derive(Debug, Clone, PartialEq)]
pub enum GameMessage {
    SendPacket {
        packet: String,
        to: PlayerId,
    },
    BroadcastPacket {
        packet: String,
        exclude: Option<PlayerId>,
    },
    /// Clients route everything authoritative through the host.
    SendToHost {
        packet: String,
    },
}

impl GameMessage {
    pub fn packet(&self) -> &str {
        match self {
            GameMessage::SendPacket { packet, .. }
            | GameMessage::BroadcastPacket { packet, .. }
            | GameMessage::SendToHost { packet } => packet,
        }
    }
}

#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<GameMessage>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broadcast<M: WireMessage>(&mut self, message: &M) {
        self.push(GameMessage::BroadcastPacket {
            packet: message.encode(),
            exclude: None,
        });
    }

    pub fn broadcast_except<M: WireMessage>(&mut self, message: &M, exclude: &PlayerId) {
        self.push(GameMessage::BroadcastPacket {
            packet: message.encode(),
            exclude: Some(exclude.clone()),
        });
    }

    pub fn send_to<M: WireMessage>(&mut self, to: &PlayerId, message: &M) {
        self.push(GameMessage::SendPacket {
            packet: message.encode(),
            to: to.clone(),
        });
    }

    pub fn send_to_host<M: WireMessage>(&mut self, message: &M) {
        self.push(GameMessage::SendToHost {
            packet: message.encode(),
        });
    }

    /// The host tells everyone; a client tells the host, which relays.
    pub fn publish<M: WireMessage>(&mut self, role: Role, message: &M) {
        match role {
            Role::Host => self.broadcast(message),
            Role::Client => self.send_to_host(message),
        }
    }

    pub fn push(&mut self, message: GameMessage) {
        self.queue.push(message);
    }

    pub fn drain(&mut self) -> Vec<GameMessage> {
        std::mem::take(&mut self.queue)
    }

    pub fn messages(&self) -> &[GameMessage] {
        &self.queue
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queued packets whose tag matches, in order. Mostly for tests.
    pub fn packets_with_tag(&self, tag: &str) -> Vec<&str> {
        self.queue
            .iter()
            .map(GameMessage::packet)
            .filter(|p| p.split('|').next() == Some(tag))
            .collect()
    }
}
