//! Ownership, scheduling, collision and replication of every enemy.
//!
//! The host is the only side that moves enemies with AI, resolves damage and
//! emits sync traffic. Clients hold mirrors that are created, moved and
//! removed exclusively by host messages.

use crate::enemy::{Enemy, EnemyArena, EnemyHandle, UpdateTier};
use crate::outbox::Outbox;
use crate::player::Bullet;
use crate::spatial::SpatialGrid;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::protocol::{
    EnemyFullSyncMsg, EnemyHitMsg, EnemyKind, EnemySpawnMsg, EnemyState, EnemySyncMsg,
};
use shared::{
    PlayerId, Rect, Role, Vector2, BULLET_DAMAGE, BULLET_RADIUS, COLLISION_PAD,
    DELTA_SYNC_INTERVAL, ENEMY_CONTACT_DAMAGE, ENEMY_RADIUS, FULL_SYNC_INTERVAL,
    INTERP_DURATION, MIN_SYNC_DELTA, WAVE_BASE_COUNT, WAVE_DELAY, WAVE_GROWTH,
    WAVE_SPAWN_MAX_DISTANCE, WAVE_SPAWN_MIN_DISTANCE,
};
use std::collections::{HashMap, HashSet};

/// An enemy died and who, if anyone, gets the credit.
#[derive(Debug, Clone, PartialEq)]
pub struct EnemyKill {
    pub enemy_id: u32,
    pub shooter: Option<PlayerId>,
}

/// An enemy ran into a player; the enemy is already gone.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerContact {
    pub player_id: PlayerId,
    pub enemy_id: u32,
    pub damage: i32,
}

pub struct EnemyManager {
    arena: EnemyArena,
    by_id: HashMap<u32, EnemyHandle>,
    grid: SpatialGrid<EnemyHandle>,
    /// Accumulated time per tier, indexed by `UpdateTier::index`.
    tier_timers: [f32; 3],
    delta_timer: f32,
    full_sync_timer: f32,
    /// Set when an enemy was added since tiers were last assigned.
    tiers_stale: bool,
    next_id: u32,
    wave: u32,
    wave_countdown: Option<f32>,
    auto_waves: bool,
    rng: StdRng,
}

impl EnemyManager {
    pub fn new(seed: u64) -> Self {
        EnemyManager {
            arena: EnemyArena::new(),
            by_id: HashMap::new(),
            grid: SpatialGrid::default(),
            tier_timers: [0.0; 3],
            delta_timer: 0.0,
            full_sync_timer: 0.0,
            tiers_stale: false,
            next_id: 1,
            wave: 0,
            wave_countdown: None,
            auto_waves: false,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Spawns the next wave automatically once the arena is clear (host only).
    pub fn with_auto_waves(mut self, enabled: bool) -> Self {
        self.auto_waves = enabled;
        self
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn living_count(&self) -> usize {
        self.arena.iter().filter(|(_, e)| e.is_alive()).count()
    }

    pub fn wave(&self) -> u32 {
        self.wave
    }

    pub fn get(&self, id: u32) -> Option<&Enemy> {
        self.by_id.get(&id).and_then(|h| self.arena.get(*h))
    }

    pub fn enemies(&self) -> impl Iterator<Item = &Enemy> {
        self.arena.iter().map(|(_, enemy)| enemy)
    }

    /// Sorted ids of every enemy currently held.
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.by_id.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of enemies in each tier, close to far.
    pub fn tier_counts(&self) -> [usize; 3] {
        let mut counts = [0; 3];
        for enemy in self.enemies() {
            counts[enemy.tier.index()] += 1;
        }
        counts
    }

    pub fn grid_is_consistent(&self) -> bool {
        self.grid.is_consistent() && self.grid.len() == self.arena.len()
    }

    /// Nearest of `targets` to `from`, or `None` when nobody is alive.
    pub fn find_closest_player_position(from: Vector2, targets: &[Vector2]) -> Option<Vector2> {
        targets
            .iter()
            .copied()
            .min_by(|a, b| a.distance_squared(&from).total_cmp(&b.distance_squared(&from)))
    }

    /// Adds an enemy with a fresh id. It reaches clients through the next
    /// delta sync, which creates unknown ids on first reference. Its tier is
    /// assigned at the start of the next host update.
    pub fn add_enemy(&mut self, position: Vector2, kind: EnemyKind) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.insert_enemy(Enemy::new(id, position, kind));
        self.tiers_stale = true;
        id
    }

    fn insert_enemy(&mut self, enemy: Enemy) -> Option<EnemyHandle> {
        if self.by_id.contains_key(&enemy.id) {
            debug!("Ignoring duplicate enemy id {}", enemy.id);
            return None;
        }
        self.next_id = self.next_id.max(enemy.id.saturating_add(1));
        let id = enemy.id;
        let position = enemy.position;
        let handle = self.arena.insert(enemy);
        self.by_id.insert(id, handle);
        self.grid.insert(handle, position);
        Some(handle)
    }

    /// Drops an enemy from the arena, the id map and the grid together.
    fn retire(&mut self, id: u32) -> Option<Enemy> {
        let handle = self.by_id.remove(&id)?;
        self.grid.remove(handle);
        self.arena.remove(handle)
    }

    pub fn remove_enemy(&mut self, id: u32) -> bool {
        self.retire(id).is_some()
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.by_id.clear();
        self.grid.clear();
    }

    /// Host: creates a wave on a ring around random living players and
    /// broadcasts it as one batch.
    pub fn spawn_wave(&mut self, wave: u32, targets: &[Vector2], outbox: &mut Outbox) -> Vec<u32> {
        let count = WAVE_BASE_COUNT + WAVE_GROWTH * wave.saturating_sub(1) as usize;
        let mut records = Vec::with_capacity(count);

        for i in 0..count {
            let anchor = if targets.is_empty() {
                Vector2::new(shared::WORLD_WIDTH / 2.0, shared::WORLD_HEIGHT / 2.0)
            } else {
                targets[self.rng.gen_range(0..targets.len())]
            };
            let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
            let distance = self
                .rng
                .gen_range(WAVE_SPAWN_MIN_DISTANCE..WAVE_SPAWN_MAX_DISTANCE);
            let position = anchor + Vector2::new(angle.cos(), angle.sin()).scale(distance);

            let id = self.add_enemy(position, kind_for_slot(wave, i));
            if let Some(enemy) = self.by_id.get(&id).and_then(|h| self.arena.get_mut(*h)) {
                enemy.last_sent_position = Some(enemy.position);
                records.push(enemy.to_record());
            }
        }

        self.wave = self.wave.max(wave);
        self.assign_tiers(targets);
        info!("Spawned wave {} with {} enemies", wave, records.len());

        let ids = records.iter().map(|r| r.id).collect();
        outbox.broadcast(&EnemySpawnMsg {
            wave,
            enemies: records,
        });
        ids
    }

    /// Batch describing every living enemy, sent to players who join late.
    pub fn spawn_message_for_all(&self) -> EnemySpawnMsg {
        let mut enemies: Vec<_> = self
            .enemies()
            .filter(|e| e.is_alive())
            .map(Enemy::to_record)
            .collect();
        enemies.sort_by_key(|r| r.id);
        EnemySpawnMsg {
            wave: self.wave,
            enemies,
        }
    }

    /// Buckets every enemy by distance to its nearest target. The host calls
    /// this on spawn and after every full sync; in between, tiers lag behind
    /// movement.
    pub fn assign_tiers(&mut self, targets: &[Vector2]) {
        self.tiers_stale = false;
        for handle in self.arena.handles() {
            if let Some(enemy) = self.arena.get_mut(handle) {
                let distance = Self::find_closest_player_position(enemy.position, targets)
                    .map(|p| p.distance(&enemy.position));
                enemy.tier = UpdateTier::for_distance(distance);
            }
        }
    }

    pub fn update(&mut self, dt: f32, targets: &[Vector2], role: Role, outbox: &mut Outbox) {
        match role {
            Role::Host => self.update_host(dt, targets, outbox),
            Role::Client => self.update_client(dt),
        }
    }

    fn update_host(&mut self, dt: f32, targets: &[Vector2], outbox: &mut Outbox) {
        self.tick_waves(dt, targets, outbox);
        if self.tiers_stale {
            self.assign_tiers(targets);
        }

        for tier in UpdateTier::ALL {
            let timer = &mut self.tier_timers[tier.index()];
            *timer += dt;
            if *timer < tier.interval() {
                continue;
            }
            let elapsed = std::mem::take(timer);
            self.run_tier(tier, elapsed, targets);
        }

        self.tick_sync(dt, targets, outbox);
    }

    fn run_tier(&mut self, tier: UpdateTier, elapsed: f32, targets: &[Vector2]) {
        for handle in self.arena.handles() {
            let Some(enemy) = self.arena.get_mut(handle) else {
                continue;
            };
            if enemy.tier != tier || !enemy.is_alive() {
                continue;
            }
            let target = Self::find_closest_player_position(enemy.position, targets);
            enemy.think(target, elapsed);
            self.grid.update_position(handle, enemy.position);
        }
    }

    fn tick_waves(&mut self, dt: f32, targets: &[Vector2], outbox: &mut Outbox) {
        if !self.auto_waves || targets.is_empty() || self.living_count() > 0 {
            self.wave_countdown = None;
            return;
        }
        let countdown = self.wave_countdown.get_or_insert(WAVE_DELAY);
        *countdown -= dt;
        if *countdown <= 0.0 {
            self.wave_countdown = None;
            let next = self.wave + 1;
            self.spawn_wave(next, targets, outbox);
        }
    }

    fn tick_sync(&mut self, dt: f32, targets: &[Vector2], outbox: &mut Outbox) {
        self.delta_timer += dt;
        if self.delta_timer >= DELTA_SYNC_INTERVAL {
            self.delta_timer = 0.0;
            let enemies = self.collect_delta();
            if !enemies.is_empty() {
                outbox.broadcast(&EnemySyncMsg { enemies });
            }
        }

        self.full_sync_timer += dt;
        if self.full_sync_timer >= FULL_SYNC_INTERVAL {
            self.full_sync_timer = 0.0;
            let msg = self.full_sync_message();
            debug!("Full enemy sync with {} ids", msg.ids.len());
            outbox.broadcast(&msg);
            self.assign_tiers(targets);
        }
    }

    /// Living enemies that moved at least `MIN_SYNC_DELTA` since they were
    /// last broadcast. Marks the returned ones as sent.
    pub fn collect_delta(&mut self) -> Vec<EnemyState> {
        let mut batch = Vec::new();
        for handle in self.arena.handles() {
            let Some(enemy) = self.arena.get_mut(handle) else {
                continue;
            };
            if !enemy.is_alive() {
                continue;
            }
            let moved = enemy
                .last_sent_position
                .map(|last| last.distance(&enemy.position) >= MIN_SYNC_DELTA)
                .unwrap_or(true);
            if moved {
                enemy.last_sent_position = Some(enemy.position);
                batch.push(EnemyState {
                    id: enemy.id,
                    position: enemy.position,
                    health: enemy.health,
                });
            }
        }
        batch.sort_by_key(|s| s.id);
        batch
    }

    pub fn full_sync_message(&self) -> EnemyFullSyncMsg {
        let mut ids: Vec<u32> = self
            .enemies()
            .filter(|e| e.is_alive())
            .map(|e| e.id)
            .collect();
        ids.sort_unstable();
        EnemyFullSyncMsg { ids }
    }

    fn update_client(&mut self, dt: f32) {
        let t = if INTERP_DURATION > 0.0 {
            (dt / INTERP_DURATION).min(1.0)
        } else {
            1.0
        };
        for handle in self.arena.handles() {
            let Some(enemy) = self.arena.get_mut(handle) else {
                continue;
            };
            let Some(target) = enemy.network_target else {
                continue;
            };
            let next = enemy.position.lerp(&target, t);
            let step = next - enemy.position;
            if step != Vector2::ZERO {
                enemy.direction = step.normalize();
            }
            enemy.position = next;
            self.grid.update_position(handle, next);
        }
    }

    /// Bullets against enemies. Every hit resolves the bullet; only the host
    /// applies damage and announces it, clients wait for the hit message.
    pub fn check_bullet_collisions(
        &mut self,
        bullets: &mut [Bullet],
        role: Role,
        outbox: &mut Outbox,
    ) -> Vec<EnemyKill> {
        let mut kills = Vec::new();
        for bullet in bullets.iter_mut().filter(|b| !b.resolved) {
            let candidates = self
                .grid
                .query_radius(bullet.position, BULLET_RADIUS + COLLISION_PAD);

            let hit = candidates.into_iter().find_map(|handle| {
                self.arena
                    .get(handle)
                    .filter(|e| e.is_alive())
                    .filter(|e| e.position.distance(&bullet.position) <= BULLET_RADIUS + e.radius())
                    .map(|e| e.id)
            });
            let Some(enemy_id) = hit else {
                continue;
            };
            bullet.resolved = true;

            if role.is_host() {
                if let Some(kill) =
                    self.apply_damage(enemy_id, BULLET_DAMAGE, Some(&bullet.shooter), outbox)
                {
                    kills.push(kill);
                }
            }
        }
        kills
    }

    /// Host-authoritative damage from any source. Broadcasts the hit and
    /// returns the kill when this damage finished the enemy off.
    pub fn apply_damage(
        &mut self,
        enemy_id: u32,
        damage: i32,
        shooter: Option<&PlayerId>,
        outbox: &mut Outbox,
    ) -> Option<EnemyKill> {
        let handle = *self.by_id.get(&enemy_id)?;
        let enemy = self.arena.get_mut(handle)?;
        if !enemy.is_alive() {
            return None;
        }
        let killed = enemy.take_damage(damage);
        outbox.broadcast(&EnemyHitMsg {
            enemy_id,
            damage,
            killed,
            shooter: shooter.cloned(),
        });
        if !killed {
            return None;
        }
        self.retire(enemy_id);
        debug!("Enemy {} destroyed", enemy_id);
        Some(EnemyKill {
            enemy_id,
            shooter: shooter.cloned(),
        })
    }

    /// Host: enemies touching a living player hurt them and die instantly.
    pub fn check_player_collisions(
        &mut self,
        players: &[(PlayerId, Rect)],
        outbox: &mut Outbox,
    ) -> Vec<PlayerContact> {
        let mut contacts = Vec::new();
        for (player_id, bounds) in players {
            for handle in self.grid.query_rect(&bounds.expand(ENEMY_RADIUS)) {
                let Some(enemy) = self.arena.get_mut(handle) else {
                    continue;
                };
                if !enemy.is_alive() || !bounds.intersects_circle(&enemy.position, enemy.radius()) {
                    continue;
                }
                enemy.kill();
                let enemy_id = enemy.id;
                outbox.broadcast(&EnemyHitMsg {
                    enemy_id,
                    damage: ENEMY_CONTACT_DAMAGE,
                    killed: true,
                    shooter: None,
                });
                self.retire(enemy_id);
                contacts.push(PlayerContact {
                    player_id: player_id.clone(),
                    enemy_id,
                    damage: ENEMY_CONTACT_DAMAGE,
                });
            }
        }
        contacts
    }

    /// Client: applies a host position/health batch. Unknown ids are created
    /// on first reference; health only ever moves down.
    pub fn apply_position_batch(&mut self, states: &[EnemyState]) {
        for state in states {
            let Some(handle) = self.by_id.get(&state.id).copied() else {
                if state.health > 0 {
                    let mut enemy = Enemy::new(state.id, state.position, EnemyKind::default());
                    enemy.health = state.health.min(enemy.max_health);
                    self.insert_enemy(enemy);
                }
                continue;
            };

            let Some(enemy) = self.arena.get_mut(handle) else {
                continue;
            };
            if enemy.awaiting_position {
                enemy.awaiting_position = false;
                enemy.position = state.position;
                self.grid.update_position(handle, state.position);
            }
            enemy.network_target = Some(state.position);

            if state.health < enemy.health {
                enemy.take_damage(enemy.health - state.health);
            }
            if !enemy.is_alive() {
                self.retire(state.id);
            }
        }
    }

    /// Client: keeps exactly the ids the host lists. Listed ids we never saw
    /// become placeholders until a position for them arrives.
    pub fn apply_full_sync(&mut self, ids: &[u32], targets: &[Vector2]) {
        let valid: HashSet<u32> = ids.iter().copied().collect();
        let stale: Vec<u32> = self
            .by_id
            .keys()
            .filter(|id| !valid.contains(id))
            .copied()
            .collect();
        for id in &stale {
            self.retire(*id);
        }

        let mut created = 0;
        for id in ids {
            if !self.by_id.contains_key(id) && self.insert_enemy(Enemy::placeholder(*id)).is_some() {
                created += 1;
            }
        }
        if !stale.is_empty() || created > 0 {
            debug!(
                "Full sync removed {} and created {} enemies",
                stale.len(),
                created
            );
        }
        self.assign_tiers(targets);
    }

    /// Client: adds a spawned wave. Ids we already hold are refreshed instead.
    pub fn apply_spawn_batch(&mut self, msg: &EnemySpawnMsg, targets: &[Vector2]) {
        for record in &msg.enemies {
            match self.by_id.get(&record.id).copied() {
                Some(handle) => {
                    if let Some(enemy) = self.arena.get_mut(handle) {
                        enemy.kind = record.kind;
                        enemy.network_target = Some(record.position);
                        if enemy.awaiting_position {
                            enemy.awaiting_position = false;
                            enemy.position = record.position;
                            self.grid.update_position(handle, record.position);
                        }
                    }
                }
                None if record.health > 0 => {
                    self.insert_enemy(Enemy::from_record(record));
                }
                None => {}
            }
        }
        self.wave = self.wave.max(msg.wave);
        self.assign_tiers(targets);
    }

    /// Client: host-reported damage. A host kill always wins, even when the
    /// local health disagrees. Returns true if the enemy died.
    pub fn apply_hit(&mut self, msg: &EnemyHitMsg) -> bool {
        let Some(enemy) = self.by_id.get(&msg.enemy_id).and_then(|h| self.arena.get_mut(*h)) else {
            return false;
        };
        enemy.take_damage(msg.damage);
        if msg.killed {
            enemy.kill();
        }
        if enemy.is_alive() {
            return false;
        }
        self.retire(msg.enemy_id);
        true
    }

    /// Ids of living enemies within `radius` of `position`.
    pub fn query_radius(&self, position: Vector2, radius: f32) -> Vec<u32> {
        self.grid
            .query_radius(position, radius)
            .into_iter()
            .filter_map(|h| self.arena.get(h))
            .filter(|e| e.is_alive())
            .map(|e| e.id)
            .collect()
    }

    /// Up to `limit` living enemies within `radius`, nearest first.
    pub fn nearest_within(&self, position: Vector2, radius: f32, limit: usize) -> Vec<u32> {
        let mut found: Vec<(f32, u32)> = self
            .grid
            .query_radius(position, radius)
            .into_iter()
            .filter_map(|h| self.arena.get(h))
            .filter(|e| e.is_alive())
            .map(|e| (e.position.distance_squared(&position), e.id))
            .collect();
        found.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        found.into_iter().take(limit).map(|(_, id)| id).collect()
    }

    /// Purges enemies that died without going through a removal path.
    pub fn remove_dead(&mut self) -> usize {
        let dead: Vec<u32> = self
            .enemies()
            .filter(|e| !e.is_alive())
            .map(|e| e.id)
            .collect();
        for id in &dead {
            self.retire(*id);
        }
        dead.len()
    }
}

/// Wave composition: squares join from wave 2, pentagons from wave 3.
fn kind_for_slot(wave: u32, slot: usize) -> EnemyKind {
    if wave >= 3 && slot % 6 == 5 {
        EnemyKind::Pentagon
    } else if wave >= 2 && slot % 4 == 3 {
        EnemyKind::Square
    } else {
        EnemyKind::Triangle
    }
}
