use crate::behavior::{self, BehaviorContext, BehaviorState, Motion};
use shared::protocol::{EnemyKind, EnemyRecord, FieldReader, FieldWriter};
use shared::{
    Vector2, CLOSE_TIER_DISTANCE, CLOSE_TIER_INTERVAL, ENEMY_HEALTH, ENEMY_RADIUS, ENEMY_SPEED,
    FAR_TIER_INTERVAL, MEDIUM_TIER_DISTANCE, MEDIUM_TIER_INTERVAL, WORLD_HEIGHT, WORLD_WIDTH,
};

/// Distance bucket that decides how often an enemy is simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpdateTier {
    Close,
    Medium,
    #[default]
    Far,
}

impl UpdateTier {
    pub const ALL: [UpdateTier; 3] = [UpdateTier::Close, UpdateTier::Medium, UpdateTier::Far];

    /// Picks the tier for an enemy whose nearest living player is `distance` away.
    /// Enemies with no target at all fall into the far tier.
    pub fn for_distance(distance: Option<f32>) -> Self {
        match distance {
            Some(d) if d <= CLOSE_TIER_DISTANCE => UpdateTier::Close,
            Some(d) if d <= MEDIUM_TIER_DISTANCE => UpdateTier::Medium,
            _ => UpdateTier::Far,
        }
    }

    pub fn interval(self) -> f32 {
        match self {
            UpdateTier::Close => CLOSE_TIER_INTERVAL,
            UpdateTier::Medium => MEDIUM_TIER_INTERVAL,
            UpdateTier::Far => FAR_TIER_INTERVAL,
        }
    }

    pub fn index(self) -> usize {
        match self {
            UpdateTier::Close => 0,
            UpdateTier::Medium => 1,
            UpdateTier::Far => 2,
        }
    }
}

pub fn max_health_for(kind: EnemyKind) -> i32 {
    match kind {
        EnemyKind::Triangle => ENEMY_HEALTH,
        EnemyKind::Square => ENEMY_HEALTH * 3 / 2,
        EnemyKind::Pentagon => ENEMY_HEALTH * 2,
    }
}

pub fn speed_for(kind: EnemyKind) -> f32 {
    match kind {
        EnemyKind::Triangle => ENEMY_SPEED,
        EnemyKind::Square => ENEMY_SPEED * 0.8,
        EnemyKind::Pentagon => ENEMY_SPEED * 0.7,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enemy {
    pub id: u32,
    pub kind: EnemyKind,
    pub position: Vector2,
    /// Always within `[0, max_health]`; zero means dead.
    pub health: i32,
    pub max_health: i32,
    /// Unit vector toward the last target. Orientation only.
    pub direction: Vector2,
    pub behavior: BehaviorState,
    pub tier: UpdateTier,
    /// Latest host position on clients; the local copy glides toward it.
    pub network_target: Option<Vector2>,
    /// Position included in the last delta broadcast (host only).
    pub last_sent_position: Option<Vector2>,
    /// Created from an id list before any position arrived.
    pub awaiting_position: bool,
}

impl Enemy {
    pub fn new(id: u32, position: Vector2, kind: EnemyKind) -> Self {
        let max_health = max_health_for(kind);
        Enemy {
            id,
            kind,
            position: clamp_to_world(position),
            health: max_health,
            max_health,
            direction: Vector2::ZERO,
            behavior: BehaviorState::initial(kind),
            tier: UpdateTier::default(),
            network_target: None,
            last_sent_position: None,
            awaiting_position: false,
        }
    }

    /// Stand-in for an id the host knows about but we never saw spawn.
    pub fn placeholder(id: u32) -> Self {
        let mut enemy = Enemy::new(id, Vector2::ZERO, EnemyKind::default());
        enemy.awaiting_position = true;
        enemy
    }

    pub fn from_record(record: &EnemyRecord) -> Self {
        let mut enemy = Enemy::new(record.id, record.position, record.kind);
        enemy.health = record.health.clamp(0, enemy.max_health);
        enemy
    }

    pub fn to_record(&self) -> EnemyRecord {
        EnemyRecord {
            id: self.id,
            kind: self.kind,
            position: self.position,
            health: self.health,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    pub fn radius(&self) -> f32 {
        ENEMY_RADIUS
    }

    pub fn speed(&self) -> f32 {
        speed_for(self.kind)
    }

    /// Applies damage. Returns true only when this call killed the enemy.
    pub fn take_damage(&mut self, amount: i32) -> bool {
        if !self.is_alive() || amount <= 0 {
            return false;
        }
        self.health = (self.health - amount).max(0);
        !self.is_alive()
    }

    /// Kills outright. Returns true if the enemy was alive.
    pub fn kill(&mut self) -> bool {
        let was_alive = self.is_alive();
        self.health = 0;
        was_alive
    }

    /// Moves toward `target` by at most `speed * dt` without overshooting.
    pub fn move_towards(&mut self, target: Vector2, speed: f32, dt: f32) {
        let step = behavior::step_towards(self.position, target, speed * dt);
        self.apply_motion(Motion::Move(step));
    }

    /// Runs one behavior step for the accumulated `dt`.
    pub fn think(&mut self, target: Option<Vector2>, dt: f32) {
        if !self.is_alive() {
            return;
        }
        let ctx = BehaviorContext {
            enemy_id: self.id,
            position: self.position,
            target,
            speed: self.speed(),
            dt,
        };
        let (next, motion) = behavior::step(self.behavior, &ctx);
        self.behavior = next;
        self.apply_motion(motion);
    }

    fn apply_motion(&mut self, motion: Motion) {
        match motion {
            Motion::Hold => {}
            Motion::Move(delta) => {
                if delta != Vector2::ZERO {
                    self.direction = delta.normalize();
                }
                self.position = clamp_to_world(self.position + delta);
            }
            Motion::Teleport(position) => {
                self.position = clamp_to_world(position);
            }
        }
    }

    /// Compact `id|kind|x,y|health` fragment.
    pub fn serialize(&self) -> String {
        let mut out = FieldWriter::default();
        self.to_record().write(&mut out);
        out.into_fragment()
    }

    /// Lenient inverse of [`Enemy::serialize`]; missing fields become defaults.
    pub fn deserialize(text: &str) -> Self {
        let tokens: Vec<&str> = text.split(shared::protocol::DELIMITER).collect();
        let record = EnemyRecord::read(&mut FieldReader::new(&tokens));
        Enemy::from_record(&record)
    }
}

fn clamp_to_world(position: Vector2) -> Vector2 {
    Vector2::new(
        position.x.clamp(0.0, WORLD_WIDTH),
        position.y.clamp(0.0, WORLD_HEIGHT),
    )
}

/// Stable reference into an [`EnemyArena`]. A handle outlives nothing: once
/// its slot is freed and reused the generation differs and lookups miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnemyHandle {
    index: u32,
    generation: u32,
}

struct Slot {
    generation: u32,
    enemy: Option<Enemy>,
}

/// Generational slot storage owning every enemy.
#[derive(Default)]
pub struct EnemyArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl EnemyArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, enemy: Enemy) -> EnemyHandle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.enemy = Some(enemy);
            return EnemyHandle {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            enemy: Some(enemy),
        });
        EnemyHandle {
            index,
            generation: 0,
        }
    }

    pub fn remove(&mut self, handle: EnemyHandle) -> Option<Enemy> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let enemy = slot.enemy.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        Some(enemy)
    }

    pub fn get(&self, handle: EnemyHandle) -> Option<&Enemy> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.enemy.as_ref())
    }

    pub fn get_mut(&mut self, handle: EnemyHandle) -> Option<&mut Enemy> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.enemy.as_mut())
    }

    pub fn iter(&self) -> impl Iterator<Item = (EnemyHandle, &Enemy)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.enemy.as_ref().map(|enemy| {
                (
                    EnemyHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    enemy,
                )
            })
        })
    }

    pub fn handles(&self) -> Vec<EnemyHandle> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.len = 0;
    }
}
