//! Player roster, bullets and the messages that keep them in step.

use crate::outbox::Outbox;
use crate::player::{Bullet, DamageOutcome, Player};
use log::{debug, info};
use shared::protocol::{
    BulletMsg, ConnectMsg, DamageMsg, DeathMsg, ForceFieldMsg, KillNotifyMsg, MovementMsg,
    ReadyMsg, RespawnMsg, RosterMsg,
};
use shared::{
    Color, PlayerId, Rect, Role, Vector2, BULLET_MAX_DISTANCE, BULLET_PLAYER_DAMAGE,
    BULLET_RADIUS, ENEMY_KILL_REWARD, FORCE_FIELD_UPGRADE_COST, KILL_REWARD,
    MOVEMENT_SEND_INTERVAL,
};
use std::collections::{HashMap, HashSet};

/// Remembered `(shooter, bullet id)` pairs before the set is reset.
const MAX_SEEN_BULLETS: usize = 4096;

/// One frame of local player intent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameInput {
    /// Desired movement direction; zero to stand still.
    pub movement: Vector2,
    /// World-space aim point.
    pub aim: Option<Vector2>,
    pub shoot: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerKill {
    pub victim: PlayerId,
    pub killer: PlayerId,
}

/// Owns every player in the session and all bullets in flight.
pub struct PlayerManager {
    local_id: PlayerId,
    role: Role,
    players: HashMap<PlayerId, Player>,
    bullets: Vec<Bullet>,
    seen_bullets: HashSet<(PlayerId, u32)>,
    next_bullet_id: u32,
    movement_timer: f32,
    last_sent_position: Option<Vector2>,
}

impl PlayerManager {
    /// Creates the manager around the local player. The local identity is
    /// injected here and never looked up anywhere else.
    pub fn new(local_id: PlayerId, name: &str, color: Color, role: Role, spawn: Vector2) -> Self {
        let mut local = Player::new_local(local_id.clone(), name, color, spawn);
        local.is_host = role.is_host();
        local.refresh_display_name();

        let mut players = HashMap::new();
        players.insert(local_id.clone(), local);

        PlayerManager {
            local_id,
            role,
            players,
            bullets: Vec::new(),
            seen_bullets: HashSet::new(),
            next_bullet_id: 1,
            movement_timer: 0.0,
            last_sent_position: None,
        }
    }

    pub fn local_id(&self) -> &PlayerId {
        &self.local_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_local(&self, id: &PlayerId) -> bool {
        *id == self.local_id
    }

    pub fn local_player(&self) -> Option<&Player> {
        self.players.get(&self.local_id)
    }

    pub fn local_player_mut(&mut self) -> Option<&mut Player> {
        self.players.get_mut(&self.local_id)
    }

    pub fn get(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn get_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.players.contains_key(id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn bullets(&self) -> &[Bullet] {
        &self.bullets
    }

    pub fn bullets_mut(&mut self) -> &mut [Bullet] {
        &mut self.bullets
    }

    /// Centers of every living player; what enemies chase.
    pub fn living_targets(&self) -> Vec<Vector2> {
        self.players
            .values()
            .filter(|p| p.is_alive())
            .map(Player::center)
            .collect()
    }

    pub fn living_bounds(&self) -> Vec<(PlayerId, Rect)> {
        let mut bounds: Vec<_> = self
            .players
            .values()
            .filter(|p| p.is_alive())
            .map(|p| (p.id.clone(), p.bounds()))
            .collect();
        bounds.sort_by(|a, b| a.0.cmp(&b.0));
        bounds
    }

    /// Local input, respawn, movement sends, shooting, remote smoothing and
    /// bullet flight for one frame.
    pub fn update(&mut self, dt: f32, input: &FrameInput, outbox: &mut Outbox) {
        self.update_local(dt, input, outbox);

        for player in self.players.values_mut().filter(|p| !p.is_local) {
            player.interpolate(dt);
        }

        for bullet in &mut self.bullets {
            bullet.update(dt);
        }
    }

    fn update_local(&mut self, dt: f32, input: &FrameInput, outbox: &mut Outbox) {
        let role = self.role;
        let Some(local) = self.players.get_mut(&self.local_id) else {
            return;
        };
        local.tick_cooldowns(dt);

        if local.is_dead {
            if local.tick_respawn(dt) {
                info!("Respawned at ({:.1}, {:.1})", local.position.x, local.position.y);
                outbox.publish(
                    role,
                    &RespawnMsg {
                        player_id: local.id.clone(),
                        position: local.position,
                    },
                );
                self.last_sent_position = Some(local.position);
            }
            return;
        }

        local.apply_movement(input.movement, dt);

        self.movement_timer += dt;
        if self.movement_timer >= MOVEMENT_SEND_INTERVAL {
            self.movement_timer = 0.0;
            if self.last_sent_position != Some(local.position) {
                self.last_sent_position = Some(local.position);
                outbox.publish(
                    role,
                    &MovementMsg {
                        player_id: local.id.clone(),
                        position: local.position,
                    },
                );
            }
        }

        if !input.shoot {
            return;
        }
        let Some((origin, direction)) = input.aim.and_then(|aim| local.try_shoot(aim)) else {
            return;
        };
        let bullet_id = self.next_bullet_id;
        self.next_bullet_id = self.next_bullet_id.wrapping_add(1);
        let shooter = local.id.clone();

        outbox.publish(
            role,
            &BulletMsg {
                shooter: shooter.clone(),
                position: origin,
                direction,
                bullet_id: Some(bullet_id),
            },
        );
        self.seen_bullets.insert((shooter.clone(), bullet_id));
        self.bullets
            .push(Bullet::new(shooter, origin, direction, Some(bullet_id)));
    }

    /// Adds a bullet announced by another peer. Our own echoes and repeats
    /// of an already seen `(shooter, bullet id)` are dropped.
    pub fn spawn_remote_bullet(&mut self, msg: &BulletMsg) -> bool {
        if self.is_local(&msg.shooter) || msg.shooter.is_empty() {
            return false;
        }
        if msg.direction == Vector2::ZERO || !msg.position.is_finite() {
            return false;
        }
        if let Some(id) = msg.bullet_id {
            if self.seen_bullets.len() >= MAX_SEEN_BULLETS {
                self.seen_bullets.clear();
            }
            if !self.seen_bullets.insert((msg.shooter.clone(), id)) {
                return false;
            }
        }
        self.bullets.push(Bullet::new(
            msg.shooter.clone(),
            msg.position,
            msg.direction,
            msg.bullet_id,
        ));
        true
    }

    /// Bullets against players. The shooter is always immune to their own
    /// bullets. The host announces damage, deaths and the killer's totals.
    pub fn check_bullet_collisions(&mut self, outbox: &mut Outbox) -> Vec<PlayerKill> {
        let mut kills = Vec::new();

        for bullet in self.bullets.iter_mut().filter(|b| !b.resolved) {
            let victim_id = self
                .players
                .values()
                .filter(|p| p.is_alive() && p.id != bullet.shooter)
                .filter(|p| p.bounds().intersects_circle(&bullet.position, BULLET_RADIUS))
                .map(|p| p.id.clone())
                .min();
            let Some(victim_id) = victim_id else {
                continue;
            };
            bullet.resolved = true;

            let Some(victim) = self.players.get_mut(&victim_id) else {
                continue;
            };
            let outcome = victim.take_damage(BULLET_PLAYER_DAMAGE);
            if outcome == DamageOutcome::Ignored {
                continue;
            }
            if self.role.is_host() {
                outbox.broadcast(&DamageMsg {
                    player_id: victim_id.clone(),
                    amount: BULLET_PLAYER_DAMAGE,
                    health_after: victim.health,
                });
            }
            if outcome != DamageOutcome::Killed {
                continue;
            }

            let killer = bullet.shooter.clone();
            info!("{} was killed by {}", victim_id, killer);
            if let Some(shooter) = self.players.get_mut(&killer) {
                shooter.kills += 1;
                shooter.money += KILL_REWARD;
                if self.role.is_host() {
                    outbox.broadcast(&DeathMsg {
                        victim: victim_id.clone(),
                        killer: Some(killer.clone()),
                    });
                    outbox.broadcast(&KillNotifyMsg {
                        killer: killer.clone(),
                        kills: shooter.kills,
                        money: shooter.money,
                    });
                }
            } else if self.role.is_host() {
                outbox.broadcast(&DeathMsg {
                    victim: victim_id.clone(),
                    killer: Some(killer.clone()),
                });
            }
            kills.push(PlayerKill {
                victim: victim_id,
                killer,
            });
        }
        kills
    }

    /// Drops spent bullets and those that left the play area around every
    /// living player.
    pub fn cull_bullets(&mut self) {
        let targets = self.living_targets();
        self.bullets.retain(|b| {
            !b.is_expired()
                && targets
                    .iter()
                    .any(|t| t.distance(&b.position) <= BULLET_MAX_DISTANCE)
        });
    }

    /// Money for finishing an enemy. The host announces the new totals.
    pub fn credit_enemy_kill(&mut self, shooter: &PlayerId, outbox: &mut Outbox) {
        let Some(player) = self.players.get_mut(shooter) else {
            return;
        };
        player.money += ENEMY_KILL_REWARD;
        if self.role.is_host() {
            outbox.broadcast(&KillNotifyMsg {
                killer: shooter.clone(),
                kills: player.kills,
                money: player.money,
            });
        }
    }

    /// Host: an enemy touched a player.
    pub fn apply_contact(&mut self, player_id: &PlayerId, damage: i32, outbox: &mut Outbox) {
        let Some(player) = self.players.get_mut(player_id) else {
            return;
        };
        let outcome = player.take_damage(damage);
        if outcome == DamageOutcome::Ignored {
            return;
        }
        outbox.broadcast(&DamageMsg {
            player_id: player_id.clone(),
            amount: damage,
            health_after: player.health,
        });
        if outcome == DamageOutcome::Killed {
            info!("{} was overrun by enemies", player_id);
            outbox.broadcast(&DeathMsg {
                victim: player_id.clone(),
                killer: None,
            });
        }
    }

    /// Remote movement. Players must arrive through a connect or roster
    /// message first; movement for unknown ids is dropped.
    pub fn apply_movement(&mut self, msg: &MovementMsg) -> bool {
        if self.is_local(&msg.player_id) || !msg.position.is_finite() {
            return false;
        }
        match self.players.get_mut(&msg.player_id) {
            Some(player) if player.is_alive() => {
                player.set_network_target(msg.position);
                true
            }
            Some(_) => false,
            None => {
                debug!("Movement for unknown player {}", msg.player_id);
                false
            }
        }
    }

    pub fn apply_death(&mut self, msg: &DeathMsg) -> bool {
        let Some(victim) = self.players.get_mut(&msg.victim) else {
            return false;
        };
        if victim.is_dead {
            return false;
        }
        victim.die();
        true
    }

    pub fn apply_respawn(&mut self, msg: &RespawnMsg) -> bool {
        if self.is_local(&msg.player_id) {
            return false;
        }
        let Some(player) = self.players.get_mut(&msg.player_id) else {
            return false;
        };
        player.respawn(msg.position);
        true
    }

    /// Authoritative health from the host.
    pub fn apply_damage(&mut self, msg: &DamageMsg) -> bool {
        let Some(player) = self.players.get_mut(&msg.player_id) else {
            return false;
        };
        player.set_health(msg.health_after);
        true
    }

    /// Absolute kill and money totals; never incremental.
    pub fn apply_kill_notify(&mut self, msg: &KillNotifyMsg) -> bool {
        let Some(player) = self.players.get_mut(&msg.killer) else {
            return false;
        };
        player.kills = msg.kills;
        player.money = msg.money;
        true
    }

    /// Adds or refreshes a peer from its handshake. Returns true if new.
    pub fn upsert_from_connect(&mut self, msg: &ConnectMsg, spawn: Vector2) -> bool {
        if msg.player_id.is_empty() || self.is_local(&msg.player_id) {
            return false;
        }
        let is_new = !self.players.contains_key(&msg.player_id);
        let player = self
            .players
            .entry(msg.player_id.clone())
            .or_insert_with(|| Player::new_remote(msg.player_id.clone(), &msg.name, msg.color, spawn));
        player.base_name = msg.name.clone();
        player.color = msg.color;
        player.is_ready = msg.is_ready;
        player.is_host = msg.is_host;
        player.refresh_display_name();
        if is_new {
            info!("Player {} ({}) joined", msg.name, msg.player_id);
        }
        is_new
    }

    /// Mirrors the host's roster. Remote players the host no longer lists
    /// are removed; the local entry is left alone.
    pub fn apply_roster(&mut self, msg: &RosterMsg) {
        let listed: HashSet<&PlayerId> = msg.players.iter().map(|e| &e.player_id).collect();
        let gone: Vec<PlayerId> = self
            .players
            .keys()
            .filter(|id| !self.is_local(id) && !listed.contains(id))
            .cloned()
            .collect();
        for id in gone {
            self.remove_player(&id);
        }

        for entry in &msg.players {
            if entry.player_id.is_empty() || self.is_local(&entry.player_id) {
                continue;
            }
            let player = self.players.entry(entry.player_id.clone()).or_insert_with(|| {
                let mut p = Player::new_remote(
                    entry.player_id.clone(),
                    &entry.name,
                    entry.color,
                    entry.position,
                );
                p.set_network_target(entry.position);
                p
            });
            player.base_name = entry.name.clone();
            player.color = entry.color;
            player.is_ready = entry.is_ready;
            player.is_host = entry.is_host;
            player.kills = entry.kills;
            player.money = entry.money;
            player.refresh_display_name();

            match (player.is_dead, entry.is_dead) {
                (false, true) => player.die(),
                (true, false) => player.respawn(entry.position),
                _ => {}
            }
            if !entry.is_dead {
                player.set_health(entry.health.max(1));
            }
        }
    }

    pub fn apply_ready(&mut self, msg: &ReadyMsg) -> bool {
        let Some(player) = self.players.get_mut(&msg.player_id) else {
            return false;
        };
        player.is_ready = msg.is_ready;
        true
    }

    pub fn apply_force_field(&mut self, msg: &ForceFieldMsg) -> bool {
        let Some(player) = self.players.get_mut(&msg.player_id) else {
            return false;
        };
        player.force_field.apply_message(msg);
        true
    }

    /// Removes a remote player and their bullets. The local player stays.
    pub fn remove_player(&mut self, id: &PlayerId) -> Option<Player> {
        if self.is_local(id) {
            return None;
        }
        let removed = self.players.remove(id)?;
        self.bullets.retain(|b| b.shooter != *id);
        info!("Player {} ({}) left", removed.base_name, id);
        Some(removed)
    }

    pub fn set_local_ready(&mut self, ready: bool, outbox: &mut Outbox) {
        let role = self.role;
        if let Some(local) = self.local_player_mut() {
            local.is_ready = ready;
            let msg = ReadyMsg {
                player_id: local.id.clone(),
                is_ready: ready,
            };
            outbox.publish(role, &msg);
        }
    }

    /// Spends money on the local force field and announces the new
    /// parameters. False when the player cannot afford it.
    pub fn purchase_force_field(&mut self, outbox: &mut Outbox) -> bool {
        let role = self.role;
        let Some(local) = self.local_player_mut() else {
            return false;
        };
        if local.money < FORCE_FIELD_UPGRADE_COST {
            return false;
        }
        local.money -= FORCE_FIELD_UPGRADE_COST;
        local.force_field.upgrade();
        let msg = local.force_field.to_message(&local.id);
        outbox.publish(role, &msg);
        true
    }

    /// Handshake announcing the local player.
    pub fn connect_message(&self) -> ConnectMsg {
        let mut msg = ConnectMsg {
            player_id: self.local_id.clone(),
            is_host: self.role.is_host(),
            ..ConnectMsg::default()
        };
        if let Some(local) = self.local_player() {
            msg.name = local.base_name.clone();
            msg.color = local.color;
            msg.is_ready = local.is_ready;
        }
        msg
    }

    /// Full roster, sorted by id so every peer sees the same order.
    pub fn roster(&self) -> RosterMsg {
        let mut players: Vec<_> = self.players.values().map(Player::to_roster_entry).collect();
        players.sort_by(|a, b| a.player_id.cmp(&b.player_id));
        RosterMsg { players }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::{parse_message, ParsedMessage};
    use shared::PLAYER_MAX_HEALTH;

    fn host_manager() -> PlayerManager {
        PlayerManager::new(
            PlayerId::new("76561198000000001"),
            "host",
            Color::new(10, 10, 10),
            Role::Host,
            Vector2::new(100.0, 100.0),
        )
    }

    fn join(manager: &mut PlayerManager, id: &str, at: Vector2) -> PlayerId {
        let msg = ConnectMsg {
            player_id: PlayerId::new(id),
            name: format!("p{}", id),
            ..ConnectMsg::default()
        };
        manager.upsert_from_connect(&msg, at);
        PlayerId::new(id)
    }

    fn bullet_into(manager: &PlayerManager, shooter: &PlayerId, victim: &PlayerId) -> BulletMsg {
        let center = manager.get(victim).map(Player::center).unwrap_or_default();
        BulletMsg {
            shooter: shooter.clone(),
            position: center,
            direction: Vector2::new(1.0, 0.0),
            bullet_id: None,
        }
    }

    #[test]
    fn test_self_damage_immunity_across_spellings() {
        let mut manager = host_manager();
        let local = manager.local_id().clone();
        let hex_spelling = format!("0x{:x}", 76_561_198_000_000_001u64);

        let mut msg = bullet_into(&manager, &local, &local);
        msg.shooter = PlayerId::new(&hex_spelling);
        manager.bullets.push(Bullet::new(msg.shooter.clone(), msg.position, msg.direction, None));

        let mut outbox = Outbox::new();
        for _ in 0..10 {
            manager.check_bullet_collisions(&mut outbox);
        }
        assert_eq!(
            manager.local_player().map(|p| p.health),
            Some(PLAYER_MAX_HEALTH)
        );
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_self_damage_immunity_account_forms() {
        let account = 76_561_198_000_000_001u64 - 76_561_197_960_265_728;
        let spellings = [
            format!("STEAM_0:{}:{}", account % 2, account / 2),
            format!("[U:1:{}]", account),
        ];

        for spelling in spellings {
            let mut manager = host_manager();
            let local = manager.local_id().clone();
            let shooter = PlayerId::new(&spelling);
            assert_eq!(shooter, local, "spelling {}", spelling);

            let msg = bullet_into(&manager, &local, &local);
            manager.bullets.push(Bullet::new(shooter, msg.position, msg.direction, None));

            let mut outbox = Outbox::new();
            let kills = manager.check_bullet_collisions(&mut outbox);
            assert!(kills.is_empty());
            assert_eq!(
                manager.local_player().map(|p| p.health),
                Some(PLAYER_MAX_HEALTH),
                "spelling {}",
                spelling
            );
            assert!(outbox.packets_with_tag("H").is_empty());
        }
    }

    #[test]
    fn test_kill_bookkeeping() {
        let mut manager = host_manager();
        let a = join(&mut manager, "11", Vector2::new(500.0, 500.0));
        let b = join(&mut manager, "22", Vector2::new(900.0, 900.0));
        if let Some(victim) = manager.get_mut(&b) {
            victim.health = BULLET_PLAYER_DAMAGE;
        }

        let msg = bullet_into(&manager, &a, &b);
        assert!(manager.spawn_remote_bullet(&msg));
        let mut outbox = Outbox::new();
        let kills = manager.check_bullet_collisions(&mut outbox);

        assert_eq!(
            kills,
            vec![PlayerKill {
                victim: b.clone(),
                killer: a.clone(),
            }]
        );
        let shooter = manager.get(&a).cloned();
        assert_eq!(shooter.as_ref().map(|p| p.kills), Some(1));
        assert_eq!(shooter.map(|p| p.money), Some(KILL_REWARD));
        assert_eq!(manager.get(&b).map(|p| (p.is_dead, p.health)), Some((true, 0)));

        assert_eq!(outbox.packets_with_tag("K"), vec!["K|22|11"]);
        assert_eq!(outbox.packets_with_tag("N"), vec!["N|11|1|50"]);
        assert_eq!(outbox.packets_with_tag("H").len(), 1);
    }

    #[test]
    fn test_client_does_not_announce_kills() {
        let mut manager = PlayerManager::new(
            PlayerId::new("5"),
            "me",
            Color::default(),
            Role::Client,
            Vector2::new(100.0, 100.0),
        );
        let a = join(&mut manager, "11", Vector2::new(500.0, 500.0));
        let b = join(&mut manager, "22", Vector2::new(900.0, 900.0));
        let msg = bullet_into(&manager, &a, &b);
        manager.spawn_remote_bullet(&msg);
        let mut outbox = Outbox::new();
        manager.check_bullet_collisions(&mut outbox);
        assert_eq!(
            manager.get(&b).map(|p| p.health),
            Some(PLAYER_MAX_HEALTH - BULLET_PLAYER_DAMAGE)
        );
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_bullet_dedup_by_shooter_and_id() {
        let mut manager = host_manager();
        let a = join(&mut manager, "11", Vector2::new(500.0, 500.0));
        let msg = BulletMsg {
            shooter: a.clone(),
            position: Vector2::new(10.0, 10.0),
            direction: Vector2::new(0.0, 1.0),
            bullet_id: Some(4),
        };
        assert!(manager.spawn_remote_bullet(&msg));
        assert!(!manager.spawn_remote_bullet(&msg));

        let mut respelled = msg.clone();
        respelled.shooter = PlayerId::new(" 0011");
        assert!(!manager.spawn_remote_bullet(&respelled));

        let mut own = msg;
        own.shooter = manager.local_id().clone();
        assert!(!manager.spawn_remote_bullet(&own));
        assert_eq!(manager.bullets().len(), 1);
    }

    #[test]
    fn test_local_shooting_publishes_by_role() {
        let mut manager = host_manager();
        let mut outbox = Outbox::new();
        let input = FrameInput {
            movement: Vector2::ZERO,
            aim: Some(Vector2::new(1000.0, 115.0)),
            shoot: true,
        };
        manager.update(0.016, &input, &mut outbox);
        manager.update(0.016, &input, &mut outbox);
        let shots = outbox.packets_with_tag("B");
        assert_eq!(shots.len(), 1);
        match parse_message(shots[0]) {
            Some(ParsedMessage::Bullet(msg)) => {
                assert_eq!(msg.bullet_id, Some(1));
                assert_eq!(&msg.shooter, manager.local_id());
            }
            other => panic!("expected bullet, got {:?}", other),
        }
        assert!(outbox
            .messages()
            .iter()
            .all(|m| matches!(m, crate::outbox::GameMessage::BroadcastPacket { .. })));
        assert_eq!(manager.bullets().len(), 1);
    }

    #[test]
    fn test_movement_sent_periodically_only_when_moving() {
        let mut manager = host_manager();
        let mut outbox = Outbox::new();
        let still = FrameInput::default();
        for _ in 0..10 {
            manager.update(MOVEMENT_SEND_INTERVAL, &still, &mut outbox);
        }
        assert_eq!(outbox.packets_with_tag("M").len(), 1);

        let moving = FrameInput {
            movement: Vector2::new(1.0, 0.0),
            ..FrameInput::default()
        };
        manager.update(MOVEMENT_SEND_INTERVAL, &moving, &mut outbox);
        assert_eq!(outbox.packets_with_tag("M").len(), 2);
    }

    #[test]
    fn test_local_respawn_publishes() {
        let mut manager = host_manager();
        if let Some(local) = manager.local_player_mut() {
            local.take_damage(PLAYER_MAX_HEALTH);
        }
        let mut outbox = Outbox::new();
        manager.update(shared::RESPAWN_TIME + 0.1, &FrameInput::default(), &mut outbox);
        assert_eq!(outbox.packets_with_tag("P").len(), 1);
        assert_eq!(
            manager.local_player().map(|p| p.health),
            Some(PLAYER_MAX_HEALTH)
        );
    }

    #[test]
    fn test_unknown_movement_dropped() {
        let mut manager = host_manager();
        assert!(!manager.apply_movement(&MovementMsg {
            player_id: PlayerId::new("999"),
            position: Vector2::new(1.0, 1.0),
        }));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_roster_upsert_and_prune() {
        let mut client = PlayerManager::new(
            PlayerId::new("5"),
            "me",
            Color::default(),
            Role::Client,
            Vector2::new(100.0, 100.0),
        );
        join(&mut client, "7", Vector2::new(0.0, 0.0));

        let mut host = host_manager();
        join(&mut host, "5", Vector2::new(100.0, 100.0));
        join(&mut host, "8", Vector2::new(300.0, 300.0));
        if let Some(p) = host.get_mut(&PlayerId::new("8")) {
            p.kills = 3;
            p.money = 70;
        }

        client.apply_roster(&host.roster());
        assert!(!client.contains(&PlayerId::new("7")));
        assert!(client.contains(&PlayerId::new("8")));
        assert!(client.contains(host.local_id()));
        assert_eq!(client.len(), 3);
        assert_eq!(client.get(&PlayerId::new("8")).map(|p| p.money), Some(70));
        assert_eq!(client.local_id(), &PlayerId::new("5"));
    }

    #[test]
    fn test_kill_notify_is_absolute() {
        let mut manager = host_manager();
        let a = join(&mut manager, "11", Vector2::new(500.0, 500.0));
        let msg = KillNotifyMsg {
            killer: a.clone(),
            kills: 4,
            money: 200,
        };
        manager.apply_kill_notify(&msg);
        manager.apply_kill_notify(&msg);
        assert_eq!(manager.get(&a).map(|p| (p.kills, p.money)), Some((4, 200)));
    }

    #[test]
    fn test_cull_bullets_far_from_everyone() {
        let mut manager = host_manager();
        let shooter = manager.local_id().clone();
        manager.bullets.push(Bullet::new(shooter.clone(), Vector2::new(120.0, 120.0), Vector2::new(1.0, 0.0), None));
        manager.bullets.push(Bullet::new(shooter, Vector2::new(1990.0, 1990.0), Vector2::new(1.0, 0.0), None));
        if let Some(b) = manager.bullets.last_mut() {
            b.position = Vector2::new(5000.0, 5000.0);
        }
        manager.cull_bullets();
        assert_eq!(manager.bullets().len(), 1);
    }

    #[test]
    fn test_purchase_force_field() {
        let mut manager = host_manager();
        let mut outbox = Outbox::new();
        assert!(!manager.purchase_force_field(&mut outbox));
        if let Some(local) = manager.local_player_mut() {
            local.money = FORCE_FIELD_UPGRADE_COST + 5;
        }
        assert!(manager.purchase_force_field(&mut outbox));
        assert_eq!(manager.local_player().map(|p| p.money), Some(5));
        assert!(manager
            .local_player()
            .map(|p| p.force_field.enabled)
            .unwrap_or(false));
        assert_eq!(outbox.packets_with_tag("Q").len(), 1);
    }

    #[test]
    fn test_remove_player_keeps_local() {
        let mut manager = host_manager();
        let a = join(&mut manager, "11", Vector2::new(500.0, 500.0));
        let local = manager.local_id().clone();
        assert!(manager.remove_player(&local).is_none());
        assert!(manager.remove_player(&a).is_some());
        assert_eq!(manager.len(), 1);
    }
}
