//! Types, tuning constants and the wire protocol shared by every peer.
//!
//! Both roles run the same simulation code, so anything that must agree
//! between host and client (world dimensions, damage numbers, sync cadence,
//! message layout) lives here.

pub mod chunk;
pub mod identity;
pub mod math;
pub mod protocol;

use serde::{Deserialize, Serialize};

pub use identity::{normalize_id, PlayerId};
pub use math::{Color, Rect, Vector2};

pub const WORLD_WIDTH: f32 = 2000.0;
pub const WORLD_HEIGHT: f32 = 2000.0;

pub const PLAYER_SPEED: f32 = 220.0;
pub const PLAYER_SIZE: f32 = 30.0;
pub const PLAYER_MAX_HEALTH: i32 = 100;
pub const RESPAWN_TIME: f32 = 3.0;
pub const INTERP_DURATION: f32 = 0.1;
pub const MOVEMENT_SEND_INTERVAL: f32 = 0.05;
pub const KILL_REWARD: u32 = 50;
pub const ENEMY_KILL_REWARD: u32 = 10;

pub const SHOOT_COOLDOWN: f32 = 0.2;
pub const BULLET_SPEED: f32 = 600.0;
pub const BULLET_LIFETIME: f32 = 2.0;
pub const BULLET_RADIUS: f32 = 4.0;
pub const BULLET_MAX_DISTANCE: f32 = 1500.0;
pub const BULLET_DAMAGE: i32 = 10;
pub const BULLET_PLAYER_DAMAGE: i32 = 20;
pub const COLLISION_PAD: f32 = 16.0;

pub const ENEMY_RADIUS: f32 = 12.0;
pub const ENEMY_SPEED: f32 = 90.0;
pub const ENEMY_HEALTH: i32 = 30;
pub const ENEMY_CONTACT_DAMAGE: i32 = 10;

pub const CELL_SIZE: f32 = 100.0;

pub const CLOSE_TIER_DISTANCE: f32 = 300.0;
pub const MEDIUM_TIER_DISTANCE: f32 = 800.0;
pub const CLOSE_TIER_INTERVAL: f32 = 0.0;
pub const MEDIUM_TIER_INTERVAL: f32 = 0.033;
pub const FAR_TIER_INTERVAL: f32 = 0.066;

pub const DELTA_SYNC_INTERVAL: f32 = 0.1;
pub const FULL_SYNC_INTERVAL: f32 = 5.0;
pub const MIN_SYNC_DELTA: f32 = 1.0;
pub const ROSTER_SYNC_INTERVAL: f32 = 2.0;

pub const WAVE_BASE_COUNT: usize = 8;
pub const WAVE_GROWTH: usize = 4;
pub const WAVE_DELAY: f32 = 3.0;
pub const WAVE_SPAWN_MIN_DISTANCE: f32 = 500.0;
pub const WAVE_SPAWN_MAX_DISTANCE: f32 = 900.0;

pub const FORCE_FIELD_RADIUS: f32 = 120.0;
pub const FORCE_FIELD_DAMAGE: i32 = 5;
pub const FORCE_FIELD_COOLDOWN: f32 = 1.0;
pub const FORCE_FIELD_CHAIN: u32 = 1;
pub const FORCE_FIELD_UPGRADE_COST: u32 = 100;

pub const CHUNK_THRESHOLD: usize = 800;
pub const HANDSHAKE_RETRIES: u32 = 5;
pub const HANDSHAKE_RETRY_DELAY: f32 = 0.5;
pub const LOBBY_CREATE_RETRIES: u32 = 3;

/// Which side of the session this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Host,
    Client,
}

impl Role {
    pub fn is_host(self) -> bool {
        matches!(self, Role::Host)
    }
}

/// Palette used for players that did not pick a color
pub fn generate_color(slot: usize) -> Color {
    const COLORS: [(u8, u8, u8); 8] = [
        (66, 135, 245),
        (235, 64, 52),
        (72, 199, 116),
        (155, 89, 182),
        (243, 156, 18),
        (26, 188, 156),
        (232, 67, 147),
        (241, 196, 15),
    ];
    let (r, g, b) = COLORS[slot % COLORS.len()];
    Color::new(r, g, b)
}
