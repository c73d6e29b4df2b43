//! Session layer between the simulation and a [`Transport`].
//!
//! Sends are fire-and-forget: failures are logged and the message is dropped,
//! because periodic full syncs repair whatever a lost message broke. The one
//! exception is the connect handshake, which stays queued and is resent on a
//! fixed delay until the host answers or the attempts run out.

use crate::error::NetError;
use crate::transport::{LobbyId, LobbyInfo, Transport, TransportEvent};
use log::{debug, error, info, warn};
use shared::chunk::{split_into_chunks, ChunkAssembler};
use shared::protocol::{split_message, tags, ChunkMsg, WireMessage};
use shared::{
    PlayerId, CHUNK_THRESHOLD, HANDSHAKE_RETRIES, HANDSHAKE_RETRY_DELAY, LOBBY_CREATE_RETRIES,
};
use simulation::GameMessage;
use std::collections::HashMap;

/// Poll rounds per receive; accepting a session releases buffered data that
/// the next round picks up.
const MAX_POLL_ROUNDS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    Message { from: PlayerId, text: String },
    PeerJoined { peer: PlayerId },
    PeerLeft { peer: PlayerId },
    /// Every attempt to deliver the connect handshake went unanswered.
    HandshakeFailed { to: PlayerId },
    LobbyClosed,
}

#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Peer(&'a PlayerId),
    All { exclude: Option<&'a PlayerId> },
}

#[derive(Debug)]
struct PendingHandshake {
    text: String,
    attempts: u32,
    elapsed: f32,
}

pub struct NetworkManager<T: Transport> {
    transport: T,
    lobby: Option<LobbyId>,
    assembler: ChunkAssembler,
    chunk_threshold: usize,
    next_chunk_id: u32,
    handshakes: HashMap<PlayerId, PendingHandshake>,
    send_failures: u64,
}

impl<T: Transport> NetworkManager<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            lobby: None,
            assembler: ChunkAssembler::new(),
            chunk_threshold: CHUNK_THRESHOLD,
            next_chunk_id: 0,
            handshakes: HashMap::new(),
            send_failures: 0,
        }
    }

    pub fn with_chunk_threshold(mut self, threshold: usize) -> Self {
        self.chunk_threshold = threshold;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn local_id(&self) -> &PlayerId {
        self.transport.local_id()
    }

    pub fn lobby(&self) -> Option<LobbyId> {
        self.lobby
    }

    pub fn lobby_owner(&self) -> Option<PlayerId> {
        self.transport.lobby_owner()
    }

    pub fn is_lobby_owner(&self) -> bool {
        self.lobby_owner().as_ref() == Some(self.local_id())
    }

    /// Lobby members other than ourselves.
    pub fn peers(&self) -> Vec<PlayerId> {
        let local = self.local_id().clone();
        self.transport
            .lobby_members()
            .into_iter()
            .filter(|member| *member != local)
            .collect()
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures
    }

    pub fn send_to(&mut self, to: &PlayerId, text: &str) -> bool {
        self.send_chunked(Target::Peer(to), text)
    }

    /// Sends to every other lobby member. Returns how many accepted it.
    pub fn broadcast(&mut self, text: &str, exclude: Option<&PlayerId>) -> usize {
        let mut delivered = 0;
        for peer in self.peers() {
            if exclude == Some(&peer) {
                continue;
            }
            if self.send_to(&peer, text) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Sends `text`, splitting it into chunk messages when it is larger than
    /// the threshold. True only if every piece reached every target.
    pub fn send_chunked(&mut self, target: Target<'_>, text: &str) -> bool {
        let pieces = if text.len() > self.chunk_threshold {
            let chunk_id = self.next_chunk_id;
            self.next_chunk_id = self.next_chunk_id.wrapping_add(1);
            let pieces = split_into_chunks(text, chunk_id, self.chunk_threshold);
            debug!(
                "Splitting {} byte message into {} chunks (id {})",
                text.len(),
                pieces.len(),
                chunk_id
            );
            pieces
        } else {
            vec![text.to_string()]
        };

        match target {
            Target::Peer(to) => self.send_pieces(to, &pieces),
            Target::All { exclude } => {
                let mut all = true;
                for peer in self.peers() {
                    if exclude != Some(&peer) {
                        all &= self.send_pieces(&peer, &pieces);
                    }
                }
                all
            }
        }
    }

    fn send_pieces(&mut self, to: &PlayerId, pieces: &[String]) -> bool {
        for piece in pieces {
            if !self.transport.send(to, piece.as_bytes()) {
                self.send_failures += 1;
                debug!("Send to {} failed, dropping {} bytes", to, piece.len());
                return false;
            }
        }
        true
    }

    /// Sends the connect handshake and keeps it queued for resending until
    /// [`acknowledge`](Self::acknowledge) is called for `to`.
    pub fn send_handshake(&mut self, to: &PlayerId, text: &str) -> bool {
        let sent = self.send_to(to, text);
        if !sent {
            warn!("Handshake to {} failed, will retry", to);
        }
        self.handshakes.insert(
            to.clone(),
            PendingHandshake {
                text: text.to_string(),
                attempts: 1,
                elapsed: 0.0,
            },
        );
        sent
    }

    /// The peer answered our handshake. Returns true if one was pending.
    pub fn acknowledge(&mut self, from: &PlayerId) -> bool {
        self.handshakes.remove(from).is_some()
    }

    pub fn has_pending_handshake(&self, to: &PlayerId) -> bool {
        self.handshakes.contains_key(to)
    }

    /// Polled once per frame: resends due handshakes and ages partial chunks.
    pub fn tick(&mut self, dt: f32) -> Vec<NetEvent> {
        self.assembler.expire(dt);

        let mut events = Vec::new();
        let mut resend = Vec::new();
        self.handshakes.retain(|to, pending| {
            pending.elapsed += dt;
            if pending.elapsed < HANDSHAKE_RETRY_DELAY {
                return true;
            }
            if pending.attempts >= HANDSHAKE_RETRIES {
                error!(
                    "Handshake to {} unanswered after {} attempts",
                    to, pending.attempts
                );
                events.push(NetEvent::HandshakeFailed { to: to.clone() });
                return false;
            }
            pending.attempts += 1;
            pending.elapsed = 0.0;
            resend.push((to.clone(), pending.text.clone(), pending.attempts));
            true
        });

        for (to, text, attempt) in resend {
            info!(
                "Retrying handshake to {} (attempt {}/{})",
                to, attempt, HANDSHAKE_RETRIES
            );
            self.send_to(&to, &text);
        }
        events
    }

    /// Creates a lobby. Only connectivity failures are retried, up to
    /// `LOBBY_CREATE_RETRIES` extra attempts.
    pub fn create_lobby(&mut self, max_members: usize) -> Result<LobbyId, NetError> {
        let mut attempt = 0;
        loop {
            match self.transport.create_lobby(max_members) {
                Ok(lobby) => {
                    info!("Created lobby {} for {} players", lobby, max_members);
                    self.lobby = Some(lobby);
                    return Ok(lobby);
                }
                Err(e) if e.is_retryable() && attempt < LOBBY_CREATE_RETRIES => {
                    attempt += 1;
                    warn!(
                        "Lobby creation failed ({}), retry {}/{}",
                        e, attempt, LOBBY_CREATE_RETRIES
                    );
                }
                Err(e) => {
                    error!("Lobby creation failed: {}", e);
                    return Err(e);
                }
            }
        }
    }

    pub fn join_lobby(&mut self, lobby: LobbyId) -> Result<(), NetError> {
        self.transport.join_lobby(lobby)?;
        info!("Joined lobby {}", lobby);
        self.lobby = Some(lobby);
        Ok(())
    }

    pub fn leave_lobby(&mut self) {
        if let Some(lobby) = self.lobby.take() {
            info!("Leaving lobby {}", lobby);
        }
        self.transport.leave_lobby();
        self.handshakes.clear();
        self.assembler = ChunkAssembler::new();
    }

    /// Best-effort discovery; errors are logged and yield nothing.
    pub fn find_lobbies(&mut self, key: &str, value: &str) -> Vec<LobbyInfo> {
        match self.transport.list_lobbies(key, value) {
            Ok(found) => found,
            Err(e) => {
                warn!("Lobby search failed: {}", e);
                Vec::new()
            }
        }
    }

    pub fn set_lobby_metadata(&mut self, key: &str, value: &str) -> bool {
        self.transport.set_lobby_data(key, value)
    }

    /// Drains the transport. Sessions are accepted only from lobby members,
    /// and chunked messages come out whole.
    pub fn receive_messages(&mut self) -> Vec<NetEvent> {
        let mut events = Vec::new();
        for _ in 0..MAX_POLL_ROUNDS {
            let polled = self.transport.poll_events();
            if polled.is_empty() {
                break;
            }
            for event in polled {
                self.handle_transport_event(event, &mut events);
            }
        }
        events
    }

    fn handle_transport_event(&mut self, event: TransportEvent, events: &mut Vec<NetEvent>) {
        match event {
            TransportEvent::SessionRequest { from } => {
                if self.transport.lobby_members().contains(&from) {
                    debug!("Accepting session from {}", from);
                    self.transport.accept_session(&from);
                } else {
                    warn!("Rejecting session from non-member {}", from);
                    self.transport.reject_session(&from);
                }
            }
            TransportEvent::Data { from, bytes } => {
                let text = match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => {
                        warn!("Dropping non-text message from {}", from);
                        return;
                    }
                };
                if let Some(text) = self.reassemble(&from, text) {
                    events.push(NetEvent::Message { from, text });
                }
            }
            TransportEvent::MemberJoined { member } => {
                info!("{} joined the lobby", member);
                events.push(NetEvent::PeerJoined { peer: member });
            }
            TransportEvent::MemberLeft { member } => {
                info!("{} left the lobby", member);
                self.assembler.forget_sender(&member);
                self.handshakes.remove(&member);
                events.push(NetEvent::PeerLeft { peer: member });
            }
            TransportEvent::LobbyClosed => {
                warn!("Lobby closed");
                self.lobby = None;
                self.handshakes.clear();
                events.push(NetEvent::LobbyClosed);
            }
        }
    }

    fn reassemble(&mut self, from: &PlayerId, text: String) -> Option<String> {
        let (tag, tokens) = split_message(&text);
        if tag != tags::CHUNK {
            return Some(text);
        }
        let chunk = ChunkMsg::decode(&tokens);
        self.assembler.on_chunk(from, chunk)
    }

    /// Routes what the simulation queued this frame. Returns how many
    /// messages went out without a send failure.
    pub fn process_outbox(&mut self, messages: Vec<GameMessage>) -> usize {
        let mut sent = 0;
        for message in messages {
            let ok = match message {
                GameMessage::SendPacket { packet, to } => self.send_to(&to, &packet),
                GameMessage::BroadcastPacket { packet, exclude } => {
                    self.send_chunked(Target::All { exclude: exclude.as_ref() }, &packet)
                }
                GameMessage::SendToHost { packet } => match self.lobby_owner() {
                    Some(owner) if owner != *self.local_id() => self.send_to(&owner, &packet),
                    _ => {
                        debug!("No host to send {} to", split_message(&packet).0);
                        false
                    }
                },
            };
            if ok {
                sent += 1;
            }
        }
        sent
    }
}
