//! Closed-form solutions used as reference values.
//!
//! Only motions the solver can reproduce exactly belong here: a particle
//! with no neighbors inside the smoothing radius feels gravity alone, and
//! every integration scheme integrates constant acceleration without
//! truncation error.

use glam::Vec2;

/// Position after `t` seconds of constant acceleration `g`.
///
/// ```text
/// p(t) = p0 + v0 t + g t^2 / 2
/// ```
pub fn ballistic_position(p0: Vec2, v0: Vec2, g: Vec2, t: f32) -> Vec2 {
    p0 + v0 * t + 0.5 * g * t * t
}

/// Velocity after `t` seconds of constant acceleration `g`.
pub fn ballistic_velocity(v0: Vec2, g: Vec2, t: f32) -> Vec2 {
    v0 + g * t
}

/// Density of a particle with one neighbor at distance `r`.
///
/// The self term contributes exactly `rho0`, so an isolated particle sits at
/// rest density; each neighbor inside `h` adds `rho0 (1 - r^2/h^2)^3`.
pub fn pair_density(rest_density: f32, r: f32, h: f32) -> f32 {
    if r >= h {
        return rest_density;
    }
    let q = 1.0 - (r * r) / (h * h);
    rest_density * (1.0 + q * q * q)
}
