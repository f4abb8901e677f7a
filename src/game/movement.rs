//! Combatant movement and facing

use glam::Vec2;

use super::world::WorldQuery;

/// Impulse velocity (dash) decays at this rate per second
const IMPULSE_DAMPING: f32 = 6.0;

/// Kinematic body of a combatant on the arena plane
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub position: Vec2,
    /// Unit facing direction
    pub facing: Vec2,
    /// Velocity from abilities, decays over time
    pub impulse: Vec2,
    /// Movement magnitude of the last tick relative to walking speed
    /// (0 = still, 1 = walking, > 1 sprinting or dashing)
    pub movement: f32,
}

impl Body {
    pub fn new(position: Vec2, facing: Vec2) -> Self {
        Self {
            position,
            facing: facing.try_normalize().unwrap_or(Vec2::Y),
            impulse: Vec2::ZERO,
            movement: 0.0,
        }
    }

    /// Face toward `direction` when it is non-zero
    pub fn look(&mut self, direction: Vec2) {
        if let Some(dir) = direction.try_normalize() {
            self.facing = dir;
        }
    }

    pub fn add_impulse(&mut self, direction: Vec2, strength: f32) {
        let dir = direction.try_normalize().unwrap_or(self.facing);
        self.impulse += dir * strength;
    }
}

/// Movement integration
pub struct MovementSystem;

impl MovementSystem {
    /// Advance `body` one tick. `move_vector` has magnitude ≤ 1, `speed` is
    /// the walking speed already scaled by sprint.
    pub fn integrate(
        body: &mut Body,
        move_vector: Vec2,
        speed: f32,
        walk_speed: f32,
        radius: f32,
        dt: f32,
        world: &dyn WorldQuery,
    ) {
        let walk = move_vector.clamp_length_max(1.0) * speed;
        let velocity = walk + body.impulse;

        let next = body.position + velocity * dt;
        body.position = world.resolve_position(next, radius);

        body.movement = if walk_speed > 0.0 {
            velocity.length() / walk_speed
        } else {
            0.0
        };

        body.impulse *= (-IMPULSE_DAMPING * dt).exp();
        if body.impulse.length_squared() < 1e-4 {
            body.impulse = Vec2::ZERO;
        }
    }
}
