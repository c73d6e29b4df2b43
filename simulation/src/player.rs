use shared::protocol::{ForceFieldMsg, RosterEntry};
use shared::{
    Color, PlayerId, Rect, Vector2, BULLET_LIFETIME, BULLET_RADIUS, BULLET_SPEED,
    FORCE_FIELD_CHAIN, FORCE_FIELD_COOLDOWN, FORCE_FIELD_DAMAGE, FORCE_FIELD_RADIUS,
    INTERP_DURATION, PLAYER_MAX_HEALTH, PLAYER_SIZE, PLAYER_SPEED, RESPAWN_TIME, SHOOT_COOLDOWN,
    WORLD_HEIGHT, WORLD_WIDTH,
};

/// What a hit did to a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    /// Already dead, or a non-positive amount.
    Ignored,
    Hurt,
    Killed,
}

/// Smoothing state for a remote player between two network positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolation {
    pub previous: Vector2,
    pub target: Vector2,
    pub elapsed: f32,
    pub duration: f32,
}

/// Passive area weapon bought with kill money.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceField {
    pub radius: f32,
    pub damage: i32,
    pub cooldown: f32,
    pub chain: u32,
    pub enabled: bool,
    timer: f32,
}

impl Default for ForceField {
    fn default() -> Self {
        ForceField {
            radius: FORCE_FIELD_RADIUS,
            damage: FORCE_FIELD_DAMAGE,
            cooldown: FORCE_FIELD_COOLDOWN,
            chain: FORCE_FIELD_CHAIN,
            enabled: false,
            timer: FORCE_FIELD_COOLDOWN,
        }
    }
}

impl ForceField {
    /// First purchase switches the field on; later ones strengthen it.
    pub fn upgrade(&mut self) {
        if !self.enabled {
            self.enabled = true;
            self.timer = self.cooldown;
            return;
        }
        self.radius += 20.0;
        self.damage += 2;
        self.cooldown = (self.cooldown * 0.9).max(0.2);
        self.chain += 1;
    }

    /// Advances the cooldown; true when the field should fire this frame.
    pub fn tick(&mut self, dt: f32) -> bool {
        if !self.enabled {
            return false;
        }
        self.timer -= dt;
        if self.timer > 0.0 {
            return false;
        }
        self.timer = self.cooldown;
        true
    }

    pub fn to_message(&self, player_id: &PlayerId) -> ForceFieldMsg {
        ForceFieldMsg {
            player_id: player_id.clone(),
            radius: self.radius,
            damage: self.damage,
            cooldown: self.cooldown,
            chain: self.chain,
            enabled: self.enabled,
        }
    }

    pub fn apply_message(&mut self, msg: &ForceFieldMsg) {
        self.radius = msg.radius.max(0.0);
        self.damage = msg.damage.max(0);
        self.cooldown = msg.cooldown.max(0.05);
        self.chain = msg.chain;
        self.enabled = msg.enabled;
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    /// Top-left corner of the player's square.
    pub position: Vector2,
    pub size: f32,
    pub color: Color,
    pub base_name: String,
    pub display_name: String,
    pub is_ready: bool,
    pub is_host: bool,
    pub is_local: bool,
    pub kills: u32,
    pub money: u32,
    /// Clamped to `[0, max_health]`; zero exactly when dead.
    pub health: i32,
    pub max_health: i32,
    pub is_dead: bool,
    pub respawn_timer: f32,
    pub respawn_position: Vector2,
    pub shoot_cooldown: f32,
    pub force_field: ForceField,
    /// Only remote players interpolate.
    pub interpolation: Option<Interpolation>,
}

impl Player {
    fn new(id: PlayerId, name: &str, color: Color, position: Vector2, is_local: bool) -> Self {
        let position = clamp_to_world(position);
        let mut player = Player {
            id,
            position,
            size: PLAYER_SIZE,
            color,
            base_name: name.to_string(),
            display_name: String::new(),
            is_ready: false,
            is_host: false,
            is_local,
            kills: 0,
            money: 0,
            health: PLAYER_MAX_HEALTH,
            max_health: PLAYER_MAX_HEALTH,
            is_dead: false,
            respawn_timer: 0.0,
            respawn_position: position,
            shoot_cooldown: 0.0,
            force_field: ForceField::default(),
            interpolation: None,
        };
        player.refresh_display_name();
        player
    }

    pub fn new_local(id: PlayerId, name: &str, color: Color, position: Vector2) -> Self {
        Self::new(id, name, color, position, true)
    }

    pub fn new_remote(id: PlayerId, name: &str, color: Color, position: Vector2) -> Self {
        Self::new(id, name, color, position, false)
    }

    pub fn refresh_display_name(&mut self) {
        self.display_name = if self.is_host {
            format!("{} [host]", self.base_name)
        } else {
            self.base_name.clone()
        };
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.position.x, self.position.y, self.size, self.size)
    }

    pub fn center(&self) -> Vector2 {
        self.bounds().center()
    }

    pub fn is_alive(&self) -> bool {
        !self.is_dead
    }

    pub fn take_damage(&mut self, amount: i32) -> DamageOutcome {
        if self.is_dead || amount <= 0 {
            return DamageOutcome::Ignored;
        }
        self.health = (self.health - amount).clamp(0, self.max_health);
        if self.health == 0 {
            self.die();
            DamageOutcome::Killed
        } else {
            DamageOutcome::Hurt
        }
    }

    /// Marks the player dead and starts the respawn countdown.
    pub fn die(&mut self) {
        self.is_dead = true;
        self.health = 0;
        self.respawn_timer = RESPAWN_TIME;
        self.interpolation = None;
    }

    /// Counts down while dead. Only the owner of a player drives this; it
    /// returns true on the frame the player came back.
    pub fn tick_respawn(&mut self, dt: f32) -> bool {
        if !self.is_dead {
            return false;
        }
        self.respawn_timer -= dt;
        if self.respawn_timer > 0.0 {
            return false;
        }
        let position = self.respawn_position;
        self.respawn(position);
        true
    }

    pub fn respawn(&mut self, position: Vector2) {
        self.is_dead = false;
        self.health = self.max_health;
        self.respawn_timer = 0.0;
        self.position = clamp_to_world(position);
        if let Some(interp) = self.interpolation.as_mut() {
            interp.previous = self.position;
            interp.target = self.position;
            interp.elapsed = interp.duration;
        }
    }

    /// Authoritative health from the network. Reaching zero kills.
    pub fn set_health(&mut self, health: i32) {
        self.health = health.clamp(0, self.max_health);
        if self.health == 0 && !self.is_dead {
            self.die();
        }
    }

    pub fn tick_cooldowns(&mut self, dt: f32) {
        self.shoot_cooldown = (self.shoot_cooldown - dt).max(0.0);
    }

    /// Fires toward `aim` if the cooldown allows. Returns the bullet origin
    /// (player center) and unit direction.
    pub fn try_shoot(&mut self, aim: Vector2) -> Option<(Vector2, Vector2)> {
        if self.is_dead || self.shoot_cooldown > 0.0 {
            return None;
        }
        let origin = self.center();
        let delta = aim - origin;
        if delta.magnitude() <= f32::EPSILON {
            return None;
        }
        self.shoot_cooldown = SHOOT_COOLDOWN;
        Some((origin, delta.normalize()))
    }

    /// Input-driven movement of the local player.
    pub fn apply_movement(&mut self, direction: Vector2, dt: f32) {
        if self.is_dead || direction == Vector2::ZERO {
            return;
        }
        let step = direction.normalize().scale(PLAYER_SPEED * dt);
        self.position = clamp_to_world(self.position + step);
    }

    /// Starts gliding from the current position to `target`.
    pub fn set_network_target(&mut self, target: Vector2) {
        self.interpolation = Some(Interpolation {
            previous: self.position,
            target,
            elapsed: 0.0,
            duration: INTERP_DURATION,
        });
    }

    pub fn interpolate(&mut self, dt: f32) {
        let Some(interp) = self.interpolation.as_mut() else {
            return;
        };
        interp.elapsed += dt;
        let t = if interp.duration > 0.0 {
            (interp.elapsed / interp.duration).clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.position = interp.previous.lerp(&interp.target, t);
    }

    pub fn to_roster_entry(&self) -> RosterEntry {
        RosterEntry {
            player_id: self.id.clone(),
            name: self.base_name.clone(),
            color: self.color,
            is_ready: self.is_ready,
            is_host: self.is_host,
            position: self.position,
            health: self.health,
            kills: self.kills,
            money: self.money,
            is_dead: self.is_dead,
        }
    }
}

pub fn clamp_to_world(position: Vector2) -> Vector2 {
    Vector2::new(
        position.x.clamp(0.0, WORLD_WIDTH - PLAYER_SIZE),
        position.y.clamp(0.0, WORLD_HEIGHT - PLAYER_SIZE),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bullet {
    pub position: Vector2,
    pub velocity: Vector2,
    /// Seconds left before the bullet disappears.
    pub lifetime: f32,
    pub shooter: PlayerId,
    pub bullet_id: Option<u32>,
    /// Already hit something this frame or earlier.
    pub resolved: bool,
}

impl Bullet {
    pub fn new(shooter: PlayerId, position: Vector2, direction: Vector2, bullet_id: Option<u32>) -> Self {
        Bullet {
            position,
            velocity: direction.normalize().scale(BULLET_SPEED),
            lifetime: BULLET_LIFETIME,
            shooter,
            bullet_id,
            resolved: false,
        }
    }

    pub fn update(&mut self, dt: f32) {
        self.position += self.velocity * dt;
        self.lifetime -= dt;
    }

    pub fn radius(&self) -> f32 {
        BULLET_RADIUS
    }

    pub fn is_expired(&self) -> bool {
        self.resolved || self.lifetime <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn player() -> Player {
        Player::new_local(
            PlayerId::new("1"),
            "alice",
            Color::new(1, 2, 3),
            Vector2::new(100.0, 100.0),
        )
    }

    #[test]
    fn test_respawn_round_trip() {
        let mut p = player();
        p.respawn_position = Vector2::new(400.0, 300.0);
        p.position = Vector2::new(10.0, 10.0);

        assert_eq!(p.take_damage(30), DamageOutcome::Hurt);
        assert_eq!(p.take_damage(p.health), DamageOutcome::Killed);
        assert!(p.is_dead);
        assert_eq!(p.health, 0);
        assert_eq!(p.take_damage(5), DamageOutcome::Ignored);

        assert!(!p.tick_respawn(RESPAWN_TIME / 2.0));
        assert!(p.is_dead);
        assert!(p.tick_respawn(RESPAWN_TIME / 2.0 + 0.01));
        assert!(!p.is_dead);
        assert_eq!(p.health, PLAYER_MAX_HEALTH);
        assert_eq!(p.position, Vector2::new(400.0, 300.0));
    }

    #[test]
    fn test_overkill_clamps_to_zero() {
        let mut p = player();
        assert_eq!(p.take_damage(10_000), DamageOutcome::Killed);
        assert_eq!(p.health, 0);
        p.set_health(500);
        assert_eq!(p.health, PLAYER_MAX_HEALTH);
    }

    #[test]
    fn test_shoot_cooldown() {
        let mut p = player();
        let aim = p.center() + Vector2::new(100.0, 0.0);
        let (origin, direction) = p.try_shoot(aim).expect("first shot");
        assert_eq!(origin, p.center());
        assert_approx_eq!(direction.x, 1.0, 1e-5);
        assert!(p.try_shoot(aim).is_none());

        p.tick_cooldowns(SHOOT_COOLDOWN);
        assert!(p.try_shoot(aim).is_some());
        p.tick_cooldowns(SHOOT_COOLDOWN);
        assert!(p.try_shoot(p.center()).is_none());
    }

    #[test]
    fn test_remote_interpolation_is_clamped() {
        let mut p = Player::new_remote(
            PlayerId::new("2"),
            "bob",
            Color::new(0, 0, 0),
            Vector2::new(0.0, 0.0),
        );
        p.set_network_target(Vector2::new(100.0, 0.0));
        p.interpolate(INTERP_DURATION / 2.0);
        assert_approx_eq!(p.position.x, 50.0, 1e-3);
        p.interpolate(INTERP_DURATION * 5.0);
        assert_approx_eq!(p.position.x, 100.0, 1e-3);
    }

    #[test]
    fn test_movement_clamped_to_world() {
        let mut p = player();
        p.apply_movement(Vector2::new(-1.0, 0.0), 10.0);
        assert_eq!(p.position.x, 0.0);
        p.apply_movement(Vector2::new(0.0, 1.0), 100.0);
        assert_eq!(p.position.y, WORLD_HEIGHT - PLAYER_SIZE);
    }

    #[test]
    fn test_force_field_upgrade_and_tick() {
        let mut field = ForceField::default();
        assert!(!field.tick(10.0));
        field.upgrade();
        assert!(field.enabled);
        assert_eq!(field.chain, FORCE_FIELD_CHAIN);
        assert!(!field.tick(FORCE_FIELD_COOLDOWN / 2.0));
        assert!(field.tick(FORCE_FIELD_COOLDOWN / 2.0));

        field.upgrade();
        assert_eq!(field.chain, FORCE_FIELD_CHAIN + 1);
        assert!(field.radius > FORCE_FIELD_RADIUS);
    }

    #[test]
    fn test_bullet_lifetime() {
        let mut bullet = Bullet::new(PlayerId::new("1"), Vector2::ZERO, Vector2::new(0.0, 2.0), Some(1));
        bullet.update(BULLET_LIFETIME / 2.0);
        assert_approx_eq!(bullet.position.y, BULLET_SPEED * BULLET_LIFETIME / 2.0, 1e-2);
        assert!(!bullet.is_expired());
        bullet.update(BULLET_LIFETIME / 2.0);
        assert!(bullet.is_expired());
    }

    #[test]
    fn test_display_name_marks_host() {
        let mut p = player();
        p.is_host = true;
        p.refresh_display_name();
        assert_eq!(p.display_name, "alice [host]");
    }
}
