//! Kind-specific enemy movement as pure state transitions.
//!
//! Each step takes the current state plus a read-only context and returns the
//! next state together with the motion to apply. Nothing here touches the
//! enemy itself, which keeps every transition testable in isolation.

use shared::protocol::EnemyKind;
use shared::Vector2;

const SQUARE_ALIGN_TOLERANCE: f32 = 4.0;
const SQUARE_CHARGE_MULTIPLIER: f32 = 2.5;
const SQUARE_CHARGE_TIME: f32 = 0.8;

const PENTAGON_STALK_RANGE: f32 = 250.0;
const PENTAGON_CHARGE_TIME: f32 = 0.6;
const PENTAGON_CHARGE_MULTIPLIER: f32 = 3.0;
const PENTAGON_PULSE_TIME: f32 = 0.8;
const PENTAGON_ENCIRCLE_TIME: f32 = 2.0;
const PENTAGON_ENCIRCLE_RADIUS: f32 = 150.0;
const PENTAGON_ANGULAR_SPEED: f32 = 2.0;
const PENTAGON_TELEPORT_WINDUP: f32 = 0.3;
const PENTAGON_TELEPORT_DISTANCE: f32 = 120.0;
/// Golden angle in radians; spreads teleport landing spots by enemy id.
const GOLDEN_ANGLE: f32 = 2.399_963;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SquareState {
    /// Heading for the nearest point that shares a row or column with the target.
    Aligning,
    Charging { axis: Axis, sign: f32, remaining: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PentagonState {
    Stalking,
    Charging { direction: Vector2, remaining: f32 },
    Pulsating { remaining: f32 },
    Encircling { angle: f32, remaining: f32 },
    Teleporting { remaining: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BehaviorState {
    Chase,
    Square(SquareState),
    Pentagon(PentagonState),
}

impl BehaviorState {
    pub fn initial(kind: EnemyKind) -> Self {
        match kind {
            EnemyKind::Triangle => BehaviorState::Chase,
            EnemyKind::Square => BehaviorState::Square(SquareState::Aligning),
            EnemyKind::Pentagon => BehaviorState::Pentagon(PentagonState::Stalking),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    Hold,
    Move(Vector2),
    Teleport(Vector2),
}

#[derive(Debug, Clone, Copy)]
pub struct BehaviorContext {
    pub enemy_id: u32,
    pub position: Vector2,
    pub target: Option<Vector2>,
    pub speed: f32,
    pub dt: f32,
}

/// Displacement that moves `from` toward `to` by at most `max_step`.
pub fn step_towards(from: Vector2, to: Vector2, max_step: f32) -> Vector2 {
    let delta = to - from;
    let distance = delta.magnitude();
    if distance <= max_step || distance == 0.0 {
        delta
    } else {
        delta.normalize().scale(max_step)
    }
}

pub fn step(state: BehaviorState, ctx: &BehaviorContext) -> (BehaviorState, Motion) {
    let Some(target) = ctx.target else {
        return (state, Motion::Hold);
    };

    match state {
        BehaviorState::Chase => (
            BehaviorState::Chase,
            Motion::Move(step_towards(ctx.position, target, ctx.speed * ctx.dt)),
        ),
        BehaviorState::Square(s) => {
            let (next, motion) = step_square(s, ctx, target);
            (BehaviorState::Square(next), motion)
        }
        BehaviorState::Pentagon(s) => {
            let (next, motion) = step_pentagon(s, ctx, target);
            (BehaviorState::Pentagon(next), motion)
        }
    }
}

fn step_square(state: SquareState, ctx: &BehaviorContext, target: Vector2) -> (SquareState, Motion) {
    match state {
        SquareState::Aligning => {
            let column_gap = (target.x - ctx.position.x).abs();
            let row_gap = (target.y - ctx.position.y).abs();

            // Sharing a column means the charge runs vertically, and vice versa.
            let (axis, gap, waypoint) = if column_gap <= row_gap {
                (Axis::Vertical, column_gap, Vector2::new(target.x, ctx.position.y))
            } else {
                (Axis::Horizontal, row_gap, Vector2::new(ctx.position.x, target.y))
            };

            if gap <= SQUARE_ALIGN_TOLERANCE {
                let sign = match axis {
                    Axis::Vertical => (target.y - ctx.position.y).signum(),
                    Axis::Horizontal => (target.x - ctx.position.x).signum(),
                };
                let next = SquareState::Charging {
                    axis,
                    sign,
                    remaining: SQUARE_CHARGE_TIME,
                };
                return (next, Motion::Hold);
            }

            (
                SquareState::Aligning,
                Motion::Move(step_towards(ctx.position, waypoint, ctx.speed * ctx.dt)),
            )
        }
        SquareState::Charging {
            axis,
            sign,
            remaining,
        } => {
            let distance = sign * ctx.speed * SQUARE_CHARGE_MULTIPLIER * ctx.dt;
            let displacement = match axis {
                Axis::Horizontal => Vector2::new(distance, 0.0),
                Axis::Vertical => Vector2::new(0.0, distance),
            };
            let remaining = remaining - ctx.dt;
            let next = if remaining <= 0.0 {
                SquareState::Aligning
            } else {
                SquareState::Charging {
                    axis,
                    sign,
                    remaining,
                }
            };
            (next, Motion::Move(displacement))
        }
    }
}

fn step_pentagon(
    state: PentagonState,
    ctx: &BehaviorContext,
    target: Vector2,
) -> (PentagonState, Motion) {
    match state {
        PentagonState::Stalking => {
            if ctx.position.distance(&target) <= PENTAGON_STALK_RANGE {
                let next = PentagonState::Charging {
                    direction: (target - ctx.position).normalize(),
                    remaining: PENTAGON_CHARGE_TIME,
                };
                (next, Motion::Hold)
            } else {
                (
                    PentagonState::Stalking,
                    Motion::Move(step_towards(ctx.position, target, ctx.speed * ctx.dt)),
                )
            }
        }
        PentagonState::Charging {
            direction,
            remaining,
        } => {
            let motion = Motion::Move(direction.scale(ctx.speed * PENTAGON_CHARGE_MULTIPLIER * ctx.dt));
            let remaining = remaining - ctx.dt;
            let next = if remaining <= 0.0 {
                PentagonState::Pulsating {
                    remaining: PENTAGON_PULSE_TIME,
                }
            } else {
                PentagonState::Charging {
                    direction,
                    remaining,
                }
            };
            (next, motion)
        }
        PentagonState::Pulsating { remaining } => {
            let remaining = remaining - ctx.dt;
            if remaining <= 0.0 {
                let offset = ctx.position - target;
                let next = PentagonState::Encircling {
                    angle: offset.y.atan2(offset.x),
                    remaining: PENTAGON_ENCIRCLE_TIME,
                };
                (next, Motion::Hold)
            } else {
                (PentagonState::Pulsating { remaining }, Motion::Hold)
            }
        }
        PentagonState::Encircling { angle, remaining } => {
            let angle = angle + PENTAGON_ANGULAR_SPEED * ctx.dt;
            let orbit_point =
                target + Vector2::new(angle.cos(), angle.sin()).scale(PENTAGON_ENCIRCLE_RADIUS);
            let motion = Motion::Move(step_towards(
                ctx.position,
                orbit_point,
                ctx.speed * 1.5 * ctx.dt,
            ));
            let remaining = remaining - ctx.dt;
            let next = if remaining <= 0.0 {
                PentagonState::Teleporting {
                    remaining: PENTAGON_TELEPORT_WINDUP,
                }
            } else {
                PentagonState::Encircling { angle, remaining }
            };
            (next, motion)
        }
        PentagonState::Teleporting { remaining } => {
            let remaining = remaining - ctx.dt;
            if remaining <= 0.0 {
                (
                    PentagonState::Stalking,
                    Motion::Teleport(target + teleport_offset(ctx.enemy_id)),
                )
            } else {
                (PentagonState::Teleporting { remaining }, Motion::Hold)
            }
        }
    }
}

fn teleport_offset(enemy_id: u32) -> Vector2 {
    let angle = (enemy_id % 1024) as f32 * GOLDEN_ANGLE;
    Vector2::new(angle.cos(), angle.sin()).scale(PENTAGON_TELEPORT_DISTANCE)
}
