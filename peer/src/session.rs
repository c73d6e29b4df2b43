//! One peer's game session: network, dispatcher and world driven together
//! once per frame.

use crate::dispatch::Dispatcher;
use crate::error::NetError;
use crate::handlers;
use crate::network::{NetEvent, NetworkManager};
use crate::transport::{LobbyId, Transport};
use log::{debug, error, info, warn};
use shared::protocol::{tags, DisconnectMsg, WireMessage};
use shared::{Color, PlayerId, Role, ROSTER_SYNC_INTERVAL};
use simulation::{FrameInput, World};

/// Lobby metadata key and value hosts advertise under.
pub const GAME_KEY: &str = "game";
pub const GAME_NAME: &str = "arena";
pub const HOST_NAME_KEY: &str = "host";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Waiting for the host's roster in answer to our handshake.
    Connecting,
    Connected,
    Failed,
}

pub struct Session<T: Transport> {
    network: NetworkManager<T>,
    dispatcher: Dispatcher,
    world: World,
    state: SessionState,
    host_id: Option<PlayerId>,
    handshake_sent: bool,
    roster_timer: f32,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, name: &str, color: Color, role: Role, seed: u64) -> Self {
        let local_id = transport.local_id().clone();
        let mut dispatcher = Dispatcher::new(role);
        handlers::register_all(&mut dispatcher);
        Self {
            network: NetworkManager::new(transport),
            dispatcher,
            world: World::new(local_id, name, color, role, seed),
            state: SessionState::Idle,
            host_id: None,
            handshake_sent: false,
            roster_timer: 0.0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.world.role()
    }

    pub fn local_id(&self) -> &PlayerId {
        self.world.local_id()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn network(&self) -> &NetworkManager<T> {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut NetworkManager<T> {
        &mut self.network
    }

    /// Opens a lobby and advertises it.
    pub fn host(&mut self, max_members: usize) -> Result<LobbyId, NetError> {
        if !self.role().is_host() {
            return Err(NetError::Unsupported);
        }
        let lobby = self.network.create_lobby(max_members)?;
        let name = self
            .world
            .players()
            .local_player()
            .map(|p| p.base_name.clone())
            .unwrap_or_default();
        self.network.set_lobby_metadata(GAME_KEY, GAME_NAME);
        self.network.set_lobby_metadata(HOST_NAME_KEY, &name);
        self.host_id = Some(self.local_id().clone());
        self.state = SessionState::Connected;
        info!("Hosting lobby {} as {}", lobby, name);
        Ok(lobby)
    }

    /// Joins a lobby and starts the handshake with its owner.
    pub fn join(&mut self, lobby: LobbyId) -> Result<(), NetError> {
        if self.role().is_host() {
            return Err(NetError::Unsupported);
        }
        self.network.join_lobby(lobby)?;
        self.state = SessionState::Connecting;
        self.handshake_sent = false;
        self.try_send_handshake();
        Ok(())
    }

    /// Some transports only learn the lobby owner after the join completes.
    fn try_send_handshake(&mut self) {
        if self.handshake_sent || self.state != SessionState::Connecting {
            return;
        }
        let Some(owner) = self.network.lobby_owner() else {
            return;
        };
        let hello = self.world.players().connect_message().encode();
        info!("Sending handshake to host {}", owner);
        self.network.send_handshake(&owner, &hello);
        self.host_id = Some(owner);
        self.handshake_sent = true;
    }

    /// Runs one frame: handshake retries, network drain and dispatch, the
    /// simulation step, then everything the frame queued goes out.
    pub fn frame(&mut self, dt: f32, input: &FrameInput) {
        for event in self.network.tick(dt) {
            self.handle_event(event);
        }
        for event in self.network.receive_messages() {
            self.handle_event(event);
        }
        self.try_send_handshake();

        if matches!(self.state, SessionState::Connecting | SessionState::Connected) {
            self.world.update(dt, input);
        }

        if self.role().is_host() && self.state == SessionState::Connected {
            self.roster_timer += dt;
            if self.roster_timer >= ROSTER_SYNC_INTERVAL {
                self.roster_timer = 0.0;
                let roster = self.world.players().roster();
                self.world.outbox_mut().broadcast(&roster);
            }
        }

        let outgoing = self.world.drain_outbox();
        self.network.process_outbox(outgoing);
    }

    fn handle_event(&mut self, event: NetEvent) {
        match event {
            NetEvent::Message { from, text } => self.handle_message(from, text),
            NetEvent::PeerJoined { peer } => {
                debug!("{} is in the lobby, waiting for their handshake", peer);
            }
            NetEvent::PeerLeft { peer } => {
                self.world.players_mut().remove_player(&peer);
                if self.role().is_host() {
                    self.world
                        .outbox_mut()
                        .broadcast(&DisconnectMsg { player_id: peer });
                } else if self.host_id.as_ref() == Some(&peer) {
                    warn!("Host {} left", peer);
                    self.state = SessionState::Failed;
                }
            }
            NetEvent::HandshakeFailed { to } => {
                error!("Could not reach host {}", to);
                self.state = SessionState::Failed;
            }
            NetEvent::LobbyClosed => {
                if !self.role().is_host() {
                    self.state = SessionState::Failed;
                }
            }
        }
    }

    fn handle_message(&mut self, from: PlayerId, text: String) {
        let from_host = self.host_id.as_ref() == Some(&from);
        if !self.role().is_host() && !from_host {
            debug!("Dropping message from non-host {}", from);
            return;
        }

        let handled = self.dispatcher.dispatch(&mut self.world, &from, &text);
        if handled == Some(tags::ROSTER) && self.state == SessionState::Connecting {
            self.network.acknowledge(&from);
            self.state = SessionState::Connected;
            info!("Connected to host {}", from);
        }
    }

    /// Says goodbye and leaves the lobby.
    pub fn leave(&mut self) {
        if matches!(self.state, SessionState::Connected | SessionState::Connecting) {
            let bye = DisconnectMsg {
                player_id: self.local_id().clone(),
            };
            let role = self.role();
            self.world.outbox_mut().publish(role, &bye);
            let outgoing = self.world.drain_outbox();
            self.network.process_outbox(outgoing);
        }
        self.network.leave_lobby();
        self.host_id = None;
        self.handshake_sent = false;
        self.state = SessionState::Idle;
    }
}
