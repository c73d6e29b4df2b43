//! # Match Simulation Library
//!
//! Everything a peer simulates locally: players, bullets, enemies and the
//! spatial index that makes collision queries cheap with hundreds of enemies.
//! The same code runs on the host and on clients; the `Role` passed in decides
//! who is allowed to resolve damage and emit authoritative messages.
//!
//! ## Authority
//!
//! ### Host
//! Spawns waves, moves enemies with AI, resolves every hit and broadcasts the
//! outcome. Periodic delta and full enemy syncs let clients heal from lost
//! messages.
//!
//! ### Client
//! Predicts its own movement and bullets, mirrors enemies from host messages
//! and smooths remote players and enemies toward their last known positions.
//!
//! ## Module Organization
//!
//! ### Spatial (`spatial`)
//! Uniform-cell grid with a reverse index for O(1) removal and updates.
//!
//! ### Enemies (`enemy`, `behavior`, `enemy_manager`)
//! A generational arena of enemies, pure per-kind behavior state machines,
//! and the manager that runs tiered update scheduling, collisions and sync.
//!
//! ### Players (`player`, `player_manager`)
//! Player state, respawn, shooting and force fields, plus the roster and
//! bullet bookkeeping with identity-normalized self-damage immunity.
//!
//! ### World (`world`, `outbox`)
//! Fixed per-frame ordering over both managers. Outgoing traffic is queued in
//! an outbox instead of touching the network directly, so the simulation is
//! fully testable without a transport.

pub mod behavior;
pub mod enemy;
pub mod enemy_manager;
pub mod outbox;
pub mod player;
pub mod player_manager;
pub mod spatial;
pub mod world;

pub use enemy::{Enemy, EnemyArena, EnemyHandle, UpdateTier};
pub use enemy_manager::{EnemyKill, EnemyManager, PlayerContact};
pub use outbox::{GameMessage, Outbox};
pub use player::{Bullet, DamageOutcome, ForceField, Player};
pub use player_manager::{FrameInput, PlayerKill, PlayerManager};
pub use spatial::SpatialGrid;
pub use world::World;
