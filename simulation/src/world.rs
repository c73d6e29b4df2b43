//! The whole simulated match for one peer.
//!
//! `World` ties players and enemies together and fixes the order in which a
//! frame is simulated. Everything it wants to tell other peers ends up in its
//! outbox.

use crate::enemy_manager::{EnemyKill, EnemyManager};
use crate::outbox::{GameMessage, Outbox};
use crate::player_manager::{FrameInput, PlayerManager};
use log::debug;
use shared::protocol::ZapMsg;
use shared::{Color, PlayerId, Role, Vector2, ENEMY_RADIUS, FORCE_FIELD_DAMAGE, WORLD_HEIGHT, WORLD_WIDTH};

/// Extra reach granted to zaps reported by clients, to cover latency.
const ZAP_RANGE_SLACK: f32 = ENEMY_RADIUS * 2.0;

/// Spawn points spread around the arena center by join order.
pub fn spawn_point(slot: usize) -> Vector2 {
    let center = Vector2::new(WORLD_WIDTH / 2.0, WORLD_HEIGHT / 2.0);
    if slot == 0 {
        return center;
    }
    let angle = slot as f32 * std::f32::consts::FRAC_PI_4;
    center + Vector2::new(angle.cos(), angle.sin()).scale(150.0)
}

pub struct World {
    role: Role,
    players: PlayerManager,
    enemies: EnemyManager,
    outbox: Outbox,
    frame: u64,
}

impl World {
    pub fn new(local_id: PlayerId, name: &str, color: Color, role: Role, seed: u64) -> Self {
        World {
            role,
            players: PlayerManager::new(local_id, name, color, role, spawn_point(0)),
            enemies: EnemyManager::new(seed).with_auto_waves(role.is_host()),
            outbox: Outbox::new(),
            frame: 0,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn local_id(&self) -> &PlayerId {
        self.players.local_id()
    }

    pub fn players(&self) -> &PlayerManager {
        &self.players
    }

    pub fn players_mut(&mut self) -> &mut PlayerManager {
        &mut self.players
    }

    pub fn enemies(&self) -> &EnemyManager {
        &self.enemies
    }

    pub fn enemies_mut(&mut self) -> &mut EnemyManager {
        &mut self.enemies
    }

    pub fn outbox_mut(&mut self) -> &mut Outbox {
        &mut self.outbox
    }

    /// Split borrow for handlers that touch both rosters and the outbox.
    pub fn parts_mut(&mut self) -> (&mut PlayerManager, &mut EnemyManager, &mut Outbox) {
        (&mut self.players, &mut self.enemies, &mut self.outbox)
    }

    pub fn drain_outbox(&mut self) -> Vec<GameMessage> {
        self.outbox.drain()
    }

    /// Where the next joining player appears.
    pub fn next_spawn_point(&self) -> Vector2 {
        spawn_point(self.players.len())
    }

    /// Simulates one frame: players, enemies, bullet hits on enemies, bullet
    /// hits on players, kill credit, enemy contact, force fields, cleanup.
    pub fn update(&mut self, dt: f32, input: &FrameInput) {
        let role = self.role;
        self.players.update(dt, input, &mut self.outbox);

        let targets = self.players.living_targets();
        self.enemies.update(dt, &targets, role, &mut self.outbox);

        let enemy_kills =
            self.enemies
                .check_bullet_collisions(self.players.bullets_mut(), role, &mut self.outbox);
        self.players.check_bullet_collisions(&mut self.outbox);
        self.credit_kills(&enemy_kills);

        if role.is_host() {
            let bounds = self.players.living_bounds();
            for contact in self.enemies.check_player_collisions(&bounds, &mut self.outbox) {
                self.players
                    .apply_contact(&contact.player_id, contact.damage, &mut self.outbox);
            }
        }

        self.run_force_field(dt);

        self.players.cull_bullets();
        self.enemies.remove_dead();

        self.frame += 1;
        if self.frame % 60 == 0 {
            debug!(
                "Frame {}: {} players, {} enemies (tiers {:?}), {} bullets",
                self.frame,
                self.players.len(),
                self.enemies.len(),
                self.enemies.tier_counts(),
                self.players.bullets().len()
            );
        }
    }

    fn credit_kills(&mut self, kills: &[EnemyKill]) {
        for kill in kills {
            if let Some(shooter) = &kill.shooter {
                self.players.credit_enemy_kill(shooter, &mut self.outbox);
            }
        }
    }

    /// Fires the local player's force field when its cooldown elapses. The
    /// host resolves the damage itself; a client asks the host with zaps.
    fn run_force_field(&mut self, dt: f32) {
        let Some(local) = self.players.local_player_mut() else {
            return;
        };
        if local.is_dead || !local.force_field.tick(dt) {
            return;
        }
        let field = local.force_field;
        let center = local.center();
        let player_id = local.id.clone();

        let targets = self
            .enemies
            .nearest_within(center, field.radius, field.chain as usize);
        let mut kills = Vec::new();
        for enemy_id in targets {
            if self.role.is_host() {
                if let Some(kill) =
                    self.enemies
                        .apply_damage(enemy_id, field.damage, Some(&player_id), &mut self.outbox)
                {
                    kills.push(kill);
                }
            } else {
                self.outbox.send_to_host(&ZapMsg {
                    player_id: player_id.clone(),
                    enemy_id,
                    damage: field.damage,
                });
            }
        }
        self.credit_kills(&kills);
    }

    /// Host: a client's force field hit an enemy. The claim is checked
    /// against the player's position and field before damage is applied.
    pub fn apply_zap(&mut self, msg: &ZapMsg) -> bool {
        if !self.role.is_host() {
            return false;
        }
        let Some(player) = self.players.get(&msg.player_id) else {
            return false;
        };
        if player.is_dead {
            return false;
        }
        let field = player.force_field;
        let center = player.center();
        let in_range = self
            .enemies
            .get(msg.enemy_id)
            .map(|e| e.position.distance(&center) <= field.radius + ZAP_RANGE_SLACK)
            .unwrap_or(false);
        if !in_range {
            debug!("Rejected zap on enemy {} from {}", msg.enemy_id, msg.player_id);
            return false;
        }

        let damage = msg.damage.clamp(0, field.damage.max(FORCE_FIELD_DAMAGE));
        let kill = self
            .enemies
            .apply_damage(msg.enemy_id, damage, Some(&msg.player_id), &mut self.outbox);
        if let Some(kill) = kill {
            self.credit_kills(&[kill]);
        }
        true
    }
}
