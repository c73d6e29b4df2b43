//! Headless input for bots and unattended peers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Vector2, WORLD_HEIGHT, WORLD_WIDTH};
use simulation::{FrameInput, World};

/// Enemies closer than this are shot at.
const AIM_RANGE: f32 = 450.0;
/// Distance at which a wander point counts as reached.
const ARRIVE_DISTANCE: f32 = 20.0;
const WANDER_MARGIN: f32 = 100.0;

/// Wanders between random points and shoots the nearest enemy in range.
pub struct Autopilot {
    rng: StdRng,
    wander_target: Option<Vector2>,
    retarget_timer: f32,
}

impl Autopilot {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            wander_target: None,
            retarget_timer: 0.0,
        }
    }

    pub fn next_input(&mut self, world: &World, dt: f32) -> FrameInput {
        let Some(local) = world.players().local_player() else {
            return FrameInput::default();
        };
        if local.is_dead {
            return FrameInput::default();
        }
        let center = local.center();

        self.retarget_timer -= dt;
        let arrived = self
            .wander_target
            .map(|target| target.distance(&center) < ARRIVE_DISTANCE)
            .unwrap_or(true);
        if arrived || self.retarget_timer <= 0.0 {
            self.wander_target = Some(self.random_point());
            self.retarget_timer = self.rng.gen_range(2.0..5.0);
        }
        let movement = self
            .wander_target
            .map(|target| (target - center).normalize())
            .unwrap_or(Vector2::ZERO);

        let aim = world
            .enemies()
            .nearest_within(center, AIM_RANGE, 1)
            .first()
            .and_then(|id| world.enemies().get(*id))
            .map(|enemy| enemy.position);

        FrameInput {
            movement,
            aim,
            shoot: aim.is_some(),
        }
    }

    fn random_point(&mut self) -> Vector2 {
        Vector2::new(
            self.rng.gen_range(WANDER_MARGIN..WORLD_WIDTH - WANDER_MARGIN),
            self.rng.gen_range(WANDER_MARGIN..WORLD_HEIGHT - WANDER_MARGIN),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::EnemyKind;
    use shared::{Color, PlayerId, Role};

    fn world() -> World {
        World::new(PlayerId::new("1"), "bot", Color::default(), Role::Host, 1)
    }

    #[test]
    fn test_wanders_without_enemies() {
        let mut pilot = Autopilot::new(4);
        let input = pilot.next_input(&world(), 0.016);
        assert!(!input.shoot);
        assert!(input.aim.is_none());
        assert!(input.movement.magnitude() > 0.9);
    }

    #[test]
    fn test_aims_at_nearest_enemy() {
        let mut w = world();
        let center = w.players().local_player().map(|p| p.center()).unwrap_or_default();
        let near = center + Vector2::new(100.0, 0.0);
        w.enemies_mut().add_enemy(near, EnemyKind::Triangle);
        w.enemies_mut()
            .add_enemy(center + Vector2::new(300.0, 0.0), EnemyKind::Triangle);

        let mut pilot = Autopilot::new(4);
        let input = pilot.next_input(&w, 0.016);
        assert!(input.shoot);
        assert_eq!(input.aim, Some(near));
    }

    #[test]
    fn test_same_seed_same_path() {
        let w = world();
        let mut a = Autopilot::new(9);
        let mut b = Autopilot::new(9);
        for _ in 0..10 {
            assert_eq!(a.next_input(&w, 0.5), b.next_input(&w, 0.5));
        }
    }
}
