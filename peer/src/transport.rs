//! The session-oriented transport the network manager sits on.
//!
//! A transport delivers byte payloads to peers by identity, raises a
//! session request the first time an unknown peer talks to us, and keeps a
//! lobby roster with a little key/value metadata. Two implementations live
//! here: an in-process hub used by tests and local bot matches, and a UDP
//! transport where the hosting process owns the lobby.

use crate::error::NetError;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use shared::PlayerId;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::rc::Rc;
use tokio::net::UdpSocket;

pub type LobbyId = u64;

/// Joining this id means "whatever lobby the host at that address runs".
pub const ANY_LOBBY: LobbyId = 0;

const MAX_DATAGRAM: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// An unknown peer sent us data; nothing from it is delivered until the
    /// session is accepted.
    SessionRequest { from: PlayerId },
    Data { from: PlayerId, bytes: Vec<u8> },
    MemberJoined { member: PlayerId },
    MemberLeft { member: PlayerId },
    /// The lobby owner went away or refused us.
    LobbyClosed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LobbyInfo {
    pub id: LobbyId,
    pub owner: PlayerId,
    pub members: usize,
    pub max_members: usize,
    pub data: HashMap<String, String>,
}

pub trait Transport {
    fn local_id(&self) -> &PlayerId;

    /// Fire-and-forget reliable send. False means the payload was not handed
    /// to the transport.
    fn send(&mut self, to: &PlayerId, bytes: &[u8]) -> bool;

    fn poll_events(&mut self) -> Vec<TransportEvent>;

    fn accept_session(&mut self, peer: &PlayerId);

    fn reject_session(&mut self, peer: &PlayerId);

    fn create_lobby(&mut self, max_members: usize) -> Result<LobbyId, NetError>;

    fn join_lobby(&mut self, lobby: LobbyId) -> Result<(), NetError>;

    fn leave_lobby(&mut self);

    fn lobby_members(&self) -> Vec<PlayerId>;

    fn lobby_owner(&self) -> Option<PlayerId>;

    fn set_lobby_data(&mut self, key: &str, value: &str) -> bool;

    fn lobby_data(&self, key: &str) -> Option<String>;

    /// Lobbies whose metadata `key` equals `value`.
    fn list_lobbies(&mut self, key: &str, value: &str) -> Result<Vec<LobbyInfo>, NetError>;
}

/// Holds back data from peers whose session we have not accepted yet.
#[derive(Debug, Default)]
struct SessionGate {
    accepted: HashSet<PlayerId>,
    pending: HashMap<PlayerId, Vec<Vec<u8>>>,
    released: VecDeque<TransportEvent>,
}

impl SessionGate {
    fn admit(&mut self, from: PlayerId, bytes: Vec<u8>, out: &mut Vec<TransportEvent>) {
        if self.accepted.contains(&from) {
            out.push(TransportEvent::Data { from, bytes });
            return;
        }
        let buffered = self.pending.entry(from.clone()).or_default();
        buffered.push(bytes);
        if buffered.len() == 1 {
            out.push(TransportEvent::SessionRequest { from });
        }
    }

    fn accept(&mut self, peer: &PlayerId) {
        self.accepted.insert(peer.clone());
        for bytes in self.pending.remove(peer).unwrap_or_default() {
            self.released.push_back(TransportEvent::Data {
                from: peer.clone(),
                bytes,
            });
        }
    }

    /// Drops what the peer sent so far; a later message asks again.
    fn reject(&mut self, peer: &PlayerId) {
        self.pending.remove(peer);
    }

    fn close(&mut self, peer: &PlayerId) {
        self.accepted.remove(peer);
        self.pending.remove(peer);
    }

    fn drain_released(&mut self, out: &mut Vec<TransportEvent>) {
        out.extend(self.released.drain(..));
    }

    fn clear(&mut self) {
        self.accepted.clear();
        self.pending.clear();
        self.released.clear();
    }
}

// ---------------------------------------------------------------------------
// Loopback

enum HubEvent {
    Data { from: PlayerId, bytes: Vec<u8> },
    Member(TransportEvent),
}

struct HubLobby {
    owner: PlayerId,
    members: Vec<PlayerId>,
    max_members: usize,
    data: HashMap<String, String>,
}

#[derive(Default)]
struct HubState {
    queues: HashMap<PlayerId, VecDeque<HubEvent>>,
    lobbies: HashMap<LobbyId, HubLobby>,
    next_lobby: LobbyId,
    failing_sends: HashMap<PlayerId, u32>,
    lobby_errors: VecDeque<NetError>,
}

impl HubState {
    fn lobby_of(&self, peer: &PlayerId) -> Option<LobbyId> {
        self.lobbies
            .iter()
            .find(|(_, lobby)| lobby.members.contains(peer))
            .map(|(id, _)| *id)
    }

    fn notify(&mut self, peer: &PlayerId, event: TransportEvent) {
        if let Some(queue) = self.queues.get_mut(peer) {
            queue.push_back(HubEvent::Member(event));
        }
    }

    fn leave(&mut self, peer: &PlayerId) {
        let Some(id) = self.lobby_of(peer) else {
            return;
        };
        let Some(lobby) = self.lobbies.get_mut(&id) else {
            return;
        };
        lobby.members.retain(|m| m != peer);
        let others = lobby.members.clone();

        if lobby.owner == *peer {
            self.lobbies.remove(&id);
            for other in &others {
                self.notify(other, TransportEvent::LobbyClosed);
            }
        } else {
            for other in &others {
                self.notify(
                    other,
                    TransportEvent::MemberLeft {
                        member: peer.clone(),
                    },
                );
            }
        }
    }
}

/// In-process lobby service and message bus shared by every
/// [`LoopbackTransport`] connected to it.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    state: Rc<RefCell<HubState>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        let hub = Self::default();
        hub.state.borrow_mut().next_lobby = 1;
        hub
    }

    pub fn connect(&self, id: PlayerId) -> LoopbackTransport {
        self.state
            .borrow_mut()
            .queues
            .insert(id.clone(), VecDeque::new());
        LoopbackTransport {
            id,
            hub: self.state.clone(),
            gate: SessionGate::default(),
        }
    }

    /// The next `count` sends from `peer` report failure.
    pub fn fail_next_sends(&self, peer: &PlayerId, count: u32) {
        self.state
            .borrow_mut()
            .failing_sends
            .insert(peer.clone(), count);
    }

    /// Queues an error for the next lobby create or join.
    pub fn queue_lobby_error(&self, error: NetError) {
        self.state.borrow_mut().lobby_errors.push_back(error);
    }

    /// Simulates a peer vanishing without saying goodbye.
    pub fn drop_peer(&self, peer: &PlayerId) {
        let mut state = self.state.borrow_mut();
        state.leave(peer);
        state.queues.remove(peer);
    }

    pub fn lobby_count(&self) -> usize {
        self.state.borrow().lobbies.len()
    }
}

pub struct LoopbackTransport {
    id: PlayerId,
    hub: Rc<RefCell<HubState>>,
    gate: SessionGate,
}

impl Transport for LoopbackTransport {
    fn local_id(&self) -> &PlayerId {
        &self.id
    }

    fn send(&mut self, to: &PlayerId, bytes: &[u8]) -> bool {
        let mut state = self.hub.borrow_mut();
        if let Some(remaining) = state.failing_sends.get_mut(&self.id) {
            if *remaining > 0 {
                *remaining -= 1;
                return false;
            }
        }
        match state.queues.get_mut(to) {
            Some(queue) => {
                queue.push_back(HubEvent::Data {
                    from: self.id.clone(),
                    bytes: bytes.to_vec(),
                });
                true
            }
            None => false,
        }
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        self.gate.drain_released(&mut events);

        let queued: Vec<HubEvent> = match self.hub.borrow_mut().queues.get_mut(&self.id) {
            Some(queue) => queue.drain(..).collect(),
            None => return events,
        };
        for event in queued {
            match event {
                HubEvent::Data { from, bytes } => self.gate.admit(from, bytes, &mut events),
                HubEvent::Member(event) => {
                    if let TransportEvent::MemberLeft { member } = &event {
                        self.gate.close(member);
                    }
                    events.push(event);
                }
            }
        }
        events
    }

    fn accept_session(&mut self, peer: &PlayerId) {
        self.gate.accept(peer);
    }

    fn reject_session(&mut self, peer: &PlayerId) {
        self.gate.reject(peer);
    }

    fn create_lobby(&mut self, max_members: usize) -> Result<LobbyId, NetError> {
        let mut state = self.hub.borrow_mut();
        if let Some(error) = state.lobby_errors.pop_front() {
            return Err(error);
        }
        state.leave(&self.id);
        let id = state.next_lobby;
        state.next_lobby += 1;
        state.lobbies.insert(
            id,
            HubLobby {
                owner: self.id.clone(),
                members: vec![self.id.clone()],
                max_members: max_members.max(1),
                data: HashMap::new(),
            },
        );
        Ok(id)
    }

    fn join_lobby(&mut self, lobby: LobbyId) -> Result<(), NetError> {
        let mut state = self.hub.borrow_mut();
        if let Some(error) = state.lobby_errors.pop_front() {
            return Err(error);
        }
        let target = state.lobbies.get(&lobby).ok_or(NetError::LobbyNotFound)?;
        if target.members.contains(&self.id) {
            return Ok(());
        }
        if target.members.len() >= target.max_members {
            return Err(NetError::LobbyFull);
        }

        state.leave(&self.id);
        let Some(target) = state.lobbies.get_mut(&lobby) else {
            return Err(NetError::LobbyNotFound);
        };
        let existing = target.members.clone();
        target.members.push(self.id.clone());
        for member in &existing {
            state.notify(
                member,
                TransportEvent::MemberJoined {
                    member: self.id.clone(),
                },
            );
        }
        Ok(())
    }

    fn leave_lobby(&mut self) {
        self.hub.borrow_mut().leave(&self.id);
        self.gate.clear();
    }

    fn lobby_members(&self) -> Vec<PlayerId> {
        let state = self.hub.borrow();
        state
            .lobby_of(&self.id)
            .and_then(|id| state.lobbies.get(&id))
            .map(|lobby| lobby.members.clone())
            .unwrap_or_default()
    }

    fn lobby_owner(&self) -> Option<PlayerId> {
        let state = self.hub.borrow();
        let id = state.lobby_of(&self.id)?;
        state.lobbies.get(&id).map(|lobby| lobby.owner.clone())
    }

    fn set_lobby_data(&mut self, key: &str, value: &str) -> bool {
        let mut state = self.hub.borrow_mut();
        let Some(id) = state.lobby_of(&self.id) else {
            return false;
        };
        match state.lobbies.get_mut(&id) {
            Some(lobby) if lobby.owner == self.id => {
                lobby.data.insert(key.to_string(), value.to_string());
                true
            }
            _ => false,
        }
    }

    fn lobby_data(&self, key: &str) -> Option<String> {
        let state = self.hub.borrow();
        let id = state.lobby_of(&self.id)?;
        state.lobbies.get(&id)?.data.get(key).cloned()
    }

    fn list_lobbies(&mut self, key: &str, value: &str) -> Result<Vec<LobbyInfo>, NetError> {
        let state = self.hub.borrow();
        let mut found: Vec<LobbyInfo> = state
            .lobbies
            .iter()
            .filter(|(_, lobby)| lobby.data.get(key).map(String::as_str) == Some(value))
            .map(|(id, lobby)| LobbyInfo {
                id: *id,
                owner: lobby.owner.clone(),
                members: lobby.members.len(),
                max_members: lobby.max_members,
                data: lobby.data.clone(),
            })
            .collect();
        found.sort_by_key(|info| info.id);
        Ok(found)
    }
}

// ---------------------------------------------------------------------------
// UDP

#[derive(Debug, Serialize, Deserialize)]
enum Envelope {
    Join {
        id: PlayerId,
        lobby: LobbyId,
    },
    Leave {
        id: PlayerId,
    },
    Denied {
        reason: String,
    },
    LobbyState {
        lobby: LobbyId,
        owner: PlayerId,
        max_members: usize,
        members: Vec<(PlayerId, SocketAddr)>,
        data: Vec<(String, String)>,
    },
    Closed,
    Data {
        from: PlayerId,
        bytes: Vec<u8>,
    },
}

/// UDP transport where the hosting process keeps the lobby roster and
/// pushes it to members whenever it changes.
pub struct UdpTransport {
    socket: UdpSocket,
    local_id: PlayerId,
    host_addr: Option<SocketAddr>,
    lobby: Option<LobbyId>,
    owner: Option<PlayerId>,
    max_members: usize,
    members: Vec<(PlayerId, SocketAddr)>,
    data: HashMap<String, String>,
    gate: SessionGate,
    buffer: Vec<u8>,
}

impl UdpTransport {
    /// Binds a socket. `host_addr` is where `join_lobby` looks for a host.
    pub async fn bind(
        addr: SocketAddr,
        local_id: PlayerId,
        host_addr: Option<SocketAddr>,
    ) -> Result<Self, NetError> {
        let socket = UdpSocket::bind(addr).await?;
        socket.writable().await?;
        info!("UDP transport for {} bound to {}", local_id, socket.local_addr()?);
        Ok(Self {
            socket,
            local_id,
            host_addr,
            lobby: None,
            owner: None,
            max_members: 0,
            members: Vec::new(),
            data: HashMap::new(),
            gate: SessionGate::default(),
            buffer: vec![0; MAX_DATAGRAM],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.socket.local_addr()?)
    }

    fn is_owner(&self) -> bool {
        self.owner.as_ref() == Some(&self.local_id)
    }

    fn address_of(&self, peer: &PlayerId) -> Option<SocketAddr> {
        self.members
            .iter()
            .find(|(id, _)| id == peer)
            .map(|(_, addr)| *addr)
            .or_else(|| {
                // Before the first lobby update the host is only known by address.
                (self.owner.as_ref() == Some(peer)).then_some(self.host_addr).flatten()
            })
    }

    fn send_envelope(&self, to: SocketAddr, envelope: &Envelope) -> bool {
        let bytes = match bincode::serialize(envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode envelope: {}", e);
                return false;
            }
        };
        match self.socket.try_send_to(&bytes, to) {
            Ok(_) => true,
            Err(e) => {
                debug!("Send to {} failed: {}", to, e);
                false
            }
        }
    }

    fn lobby_state(&self) -> Option<Envelope> {
        Some(Envelope::LobbyState {
            lobby: self.lobby?,
            owner: self.owner.clone()?,
            max_members: self.max_members,
            members: self.members.clone(),
            data: self
                .data
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }

    fn push_lobby_state(&self) {
        let Some(state) = self.lobby_state() else {
            return;
        };
        for (id, addr) in &self.members {
            if *id != self.local_id {
                self.send_envelope(*addr, &state);
            }
        }
    }

    fn handle_envelope(&mut self, envelope: Envelope, addr: SocketAddr, out: &mut Vec<TransportEvent>) {
        match envelope {
            Envelope::Join { id, lobby } => {
                if !self.is_owner() || (lobby != ANY_LOBBY && Some(lobby) != self.lobby) {
                    self.send_envelope(
                        addr,
                        &Envelope::Denied {
                            reason: "lobby not found".to_string(),
                        },
                    );
                    return;
                }
                if let Some(index) = self.members.iter().position(|(m, _)| *m == id) {
                    self.members[index].1 = addr;
                } else if self.members.len() >= self.max_members {
                    self.send_envelope(
                        addr,
                        &Envelope::Denied {
                            reason: "lobby is full".to_string(),
                        },
                    );
                    return;
                } else {
                    info!("{} joined the lobby from {}", id, addr);
                    self.members.push((id.clone(), addr));
                    out.push(TransportEvent::MemberJoined { member: id });
                }
                self.push_lobby_state();
            }
            Envelope::Leave { id } => {
                if !self.is_owner() {
                    return;
                }
                let before = self.members.len();
                self.members.retain(|(m, a)| !(*m == id && *a == addr));
                if self.members.len() != before {
                    self.gate.close(&id);
                    out.push(TransportEvent::MemberLeft { member: id });
                    self.push_lobby_state();
                }
            }
            Envelope::Denied { reason } => {
                warn!("Host at {} refused us: {}", addr, reason);
                self.reset_lobby();
                out.push(TransportEvent::LobbyClosed);
            }
            Envelope::LobbyState {
                lobby,
                owner,
                max_members,
                members,
                data,
            } => {
                if self.is_owner() || Some(addr) != self.host_addr {
                    return;
                }
                let known: HashSet<&PlayerId> = self.members.iter().map(|(id, _)| id).collect();
                let listed: HashSet<&PlayerId> = members.iter().map(|(id, _)| id).collect();
                for (id, _) in &members {
                    if *id != self.local_id && !known.contains(id) {
                        out.push(TransportEvent::MemberJoined { member: id.clone() });
                    }
                }
                for (id, _) in &self.members {
                    if *id != self.local_id && !listed.contains(id) {
                        out.push(TransportEvent::MemberLeft { member: id.clone() });
                    }
                }
                self.lobby = Some(lobby);
                self.owner = Some(owner);
                self.max_members = max_members;
                self.members = members;
                self.data = data.into_iter().collect();
            }
            Envelope::Closed => {
                if Some(addr) == self.host_addr && !self.is_owner() {
                    info!("Host closed the lobby");
                    self.reset_lobby();
                    out.push(TransportEvent::LobbyClosed);
                }
            }
            Envelope::Data { from, bytes } => {
                let spoofed = self
                    .members
                    .iter()
                    .any(|(id, known)| *id == from && *known != addr);
                if spoofed {
                    warn!("Dropping data claiming to be {} from {}", from, addr);
                    return;
                }
                self.gate.admit(from, bytes, out);
            }
        }
    }

    fn reset_lobby(&mut self) {
        self.lobby = None;
        self.owner = None;
        self.members.clear();
        self.data.clear();
        self.gate.clear();
    }
}

impl Transport for UdpTransport {
    fn local_id(&self) -> &PlayerId {
        &self.local_id
    }

    fn send(&mut self, to: &PlayerId, bytes: &[u8]) -> bool {
        let Some(addr) = self.address_of(to) else {
            debug!("No address for {}", to);
            return false;
        };
        let envelope = Envelope::Data {
            from: self.local_id.clone(),
            bytes: bytes.to_vec(),
        };
        self.send_envelope(addr, &envelope)
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        self.gate.drain_released(&mut events);

        loop {
            let (len, addr) = match self.socket.try_recv_from(&mut self.buffer) {
                Ok(received) => received,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    // ICMP port-unreachable surfaces here on some platforms.
                    debug!("UDP receive error: {}", e);
                    break;
                }
            };
            let decoded = bincode::deserialize::<Envelope>(&self.buffer[..len]);
            match decoded {
                Ok(envelope) => self.handle_envelope(envelope, addr, &mut events),
                Err(e) => debug!("Dropping undecodable datagram from {}: {}", addr, e),
            }
        }
        events
    }

    fn accept_session(&mut self, peer: &PlayerId) {
        self.gate.accept(peer);
    }

    fn reject_session(&mut self, peer: &PlayerId) {
        self.gate.reject(peer);
    }

    fn create_lobby(&mut self, max_members: usize) -> Result<LobbyId, NetError> {
        let addr = self.socket.local_addr()?;
        let id = rand::random::<LobbyId>().max(ANY_LOBBY + 1);
        self.lobby = Some(id);
        self.owner = Some(self.local_id.clone());
        self.max_members = max_members.max(1);
        self.members = vec![(self.local_id.clone(), addr)];
        self.data.clear();
        Ok(id)
    }

    fn join_lobby(&mut self, lobby: LobbyId) -> Result<(), NetError> {
        let host = self.host_addr.ok_or(NetError::LobbyNotFound)?;
        let join = Envelope::Join {
            id: self.local_id.clone(),
            lobby,
        };
        if !self.send_envelope(host, &join) {
            return Err(NetError::NoConnection);
        }
        self.lobby = Some(lobby);
        Ok(())
    }

    fn leave_lobby(&mut self) {
        if self.is_owner() {
            for (id, addr) in &self.members {
                if *id != self.local_id {
                    self.send_envelope(*addr, &Envelope::Closed);
                }
            }
        } else if let Some(host) = self.host_addr {
            self.send_envelope(
                host,
                &Envelope::Leave {
                    id: self.local_id.clone(),
                },
            );
        }
        self.reset_lobby();
    }

    fn lobby_members(&self) -> Vec<PlayerId> {
        self.members.iter().map(|(id, _)| id.clone()).collect()
    }

    fn lobby_owner(&self) -> Option<PlayerId> {
        self.owner.clone()
    }

    fn set_lobby_data(&mut self, key: &str, value: &str) -> bool {
        if !self.is_owner() {
            return false;
        }
        self.data.insert(key.to_string(), value.to_string());
        self.push_lobby_state();
        true
    }

    fn lobby_data(&self, key: &str) -> Option<String> {
        self.data.get(key).cloned()
    }

    fn list_lobbies(&mut self, _key: &str, _value: &str) -> Result<Vec<LobbyInfo>, NetError> {
        Err(NetError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(raw: &str) -> PlayerId {
        PlayerId::new(raw)
    }

    #[test]
    fn test_session_request_buffers_until_accepted() {
        let hub = LoopbackHub::new();
        let mut a = hub.connect(id("1"));
        let mut b = hub.connect(id("2"));

        assert!(a.send(&id("2"), b"first"));
        assert!(a.send(&id("2"), b"second"));
        let events = b.poll_events();
        assert_eq!(events, vec![TransportEvent::SessionRequest { from: id("1") }]);

        b.accept_session(&id("1"));
        let events = b.poll_events();
        assert_eq!(
            events,
            vec![
                TransportEvent::Data {
                    from: id("1"),
                    bytes: b"first".to_vec()
                },
                TransportEvent::Data {
                    from: id("1"),
                    bytes: b"second".to_vec()
                },
            ]
        );
    }

    #[test]
    fn test_rejected_session_drops_data() {
        let hub = LoopbackHub::new();
        let mut a = hub.connect(id("1"));
        let mut b = hub.connect(id("2"));

        a.send(&id("2"), b"hello");
        b.poll_events();
        b.reject_session(&id("1"));
        assert!(b.poll_events().is_empty());

        a.send(&id("2"), b"again");
        assert_eq!(
            b.poll_events(),
            vec![TransportEvent::SessionRequest { from: id("1") }]
        );
    }

    #[test]
    fn test_lobby_membership_events() {
        let hub = LoopbackHub::new();
        let mut host = hub.connect(id("1"));
        let mut client = hub.connect(id("2"));

        let lobby = host.create_lobby(4).unwrap();
        client.join_lobby(lobby).unwrap();
        assert_eq!(host.lobby_members(), vec![id("1"), id("2")]);
        assert_eq!(client.lobby_owner(), Some(id("1")));
        assert_eq!(
            host.poll_events(),
            vec![TransportEvent::MemberJoined { member: id("2") }]
        );

        client.leave_lobby();
        assert_eq!(
            host.poll_events(),
            vec![TransportEvent::MemberLeft { member: id("2") }]
        );

        client.join_lobby(lobby).unwrap();
        host.poll_events();
        host.leave_lobby();
        assert_eq!(client.poll_events(), vec![TransportEvent::LobbyClosed]);
        assert_eq!(hub.lobby_count(), 0);
    }

    #[test]
    fn test_lobby_full_and_missing() {
        let hub = LoopbackHub::new();
        let mut host = hub.connect(id("1"));
        let mut second = hub.connect(id("2"));
        let mut third = hub.connect(id("3"));

        let lobby = host.create_lobby(2).unwrap();
        second.join_lobby(lobby).unwrap();
        assert!(matches!(third.join_lobby(lobby), Err(NetError::LobbyFull)));
        assert!(matches!(third.join_lobby(999), Err(NetError::LobbyNotFound)));
    }

    #[test]
    fn test_lobby_data_and_listing() {
        let hub = LoopbackHub::new();
        let mut host = hub.connect(id("1"));
        let mut other = hub.connect(id("2"));
        let mut seeker = hub.connect(id("3"));

        let lobby = host.create_lobby(4).unwrap();
        assert!(host.set_lobby_data("game", "arena"));
        other.create_lobby(4).unwrap();
        other.set_lobby_data("game", "something-else");

        let found = seeker.list_lobbies("game", "arena").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, lobby);
        assert_eq!(found[0].owner, id("1"));

        seeker.join_lobby(lobby).unwrap();
        assert!(!seeker.set_lobby_data("game", "hijack"));
        assert_eq!(seeker.lobby_data("game"), Some("arena".to_string()));
    }

    #[test]
    fn test_fault_injection() {
        let hub = LoopbackHub::new();
        let mut a = hub.connect(id("1"));
        hub.connect(id("2"));

        hub.fail_next_sends(&id("1"), 1);
        assert!(!a.send(&id("2"), b"x"));
        assert!(a.send(&id("2"), b"x"));
        assert!(!a.send(&id("404"), b"x"));

        hub.queue_lobby_error(NetError::NoConnection);
        assert!(matches!(a.create_lobby(4), Err(NetError::NoConnection)));
        assert!(a.create_lobby(4).is_ok());
    }

    async fn poll_until<F>(transport: &mut UdpTransport, mut done: F) -> Vec<TransportEvent>
    where
        F: FnMut(&[TransportEvent]) -> bool,
    {
        let mut seen = Vec::new();
        for _ in 0..100 {
            seen.extend(transport.poll_events());
            if done(&seen) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        seen
    }

    #[tokio::test]
    async fn test_udp_join_and_data() {
        let localhost: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut host = UdpTransport::bind(localhost, id("1"), None).await.unwrap();
        let host_addr = host.local_addr().unwrap();
        let mut client = UdpTransport::bind(localhost, id("2"), Some(host_addr))
            .await
            .unwrap();

        host.create_lobby(4).unwrap();
        client.join_lobby(ANY_LOBBY).unwrap();

        let events = poll_until(&mut host, |e| !e.is_empty()).await;
        assert_eq!(events, vec![TransportEvent::MemberJoined { member: id("2") }]);

        poll_until(&mut client, |_| false).await;
        assert_eq!(client.lobby_owner(), Some(id("1")));
        assert_eq!(client.lobby_members().len(), 2);

        assert!(client.send(&id("1"), b"C|2|bob"));
        let events = poll_until(&mut host, |e| !e.is_empty()).await;
        assert_eq!(events, vec![TransportEvent::SessionRequest { from: id("2") }]);
        host.accept_session(&id("2"));
        assert_eq!(
            host.poll_events(),
            vec![TransportEvent::Data {
                from: id("2"),
                bytes: b"C|2|bob".to_vec()
            }]
        );
    }

    #[tokio::test]
    async fn test_udp_join_without_host_address() {
        let localhost: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut client = UdpTransport::bind(localhost, id("2"), None).await.unwrap();
        assert!(matches!(client.join_lobby(ANY_LOBBY), Err(NetError::LobbyNotFound)));
        assert!(matches!(
            client.list_lobbies("game", "arena"),
            Err(NetError::Unsupported)
        ));
    }
}
