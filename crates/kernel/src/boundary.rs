//! Domain walls.
//!
//! The domain is the axis-aligned box `[-half_extents, half_extents]`. A
//! particle that ends a sub-step outside it is clamped back onto the wall,
//! and the velocity component pointing out of the domain is reflected and
//! scaled by the restitution coefficient.

use glam::Vec2;

use crate::context::{ComputeKernel, ExecutionContext};

/// Wall restitution used when none is configured.
pub const DEFAULT_RESTITUTION: f32 = 0.5;

/// Clamp one axis to `[lo, hi]`, reflecting an outward velocity.
#[inline]
fn resolve_axis(p: &mut f32, v: &mut f32, lo: f32, hi: f32, restitution: f32) {
    if *p < lo {
        *p = lo;
        if *v < 0.0 {
            *v = -*v * restitution;
        }
    } else if *p > hi {
        *p = hi;
        if *v > 0.0 {
            *v = -*v * restitution;
        }
    }
}

/// Clamp a single particle into the box.
#[inline]
pub fn resolve_particle(p: &mut Vec2, v: &mut Vec2, half_extents: Vec2, restitution: f32) {
    resolve_axis(&mut p.x, &mut v.x, -half_extents.x, half_extents.x, restitution);
    resolve_axis(&mut p.y, &mut v.y, -half_extents.y, half_extents.y, restitution);
}

/// Boundary pass over every particle.
pub fn resolve_boundaries(
    ctx: &ExecutionContext,
    positions: &mut [Vec2],
    velocities: &mut [Vec2],
    half_extents: Vec2,
    restitution: f32,
) {
    ctx.dispatch_pair(ComputeKernel::Collision, positions, velocities, |_, p, v| {
        resolve_particle(p, v, half_extents, restitution);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inside_particles_untouched() {
        let mut p = Vec2::new(0.2, -0.3);
        let mut v = Vec2::new(1.0, -1.0);
        resolve_particle(&mut p, &mut v, Vec2::ONE, 0.5);
        assert_eq!(p, Vec2::new(0.2, -0.3));
        assert_eq!(v, Vec2::new(1.0, -1.0));
    }

    #[test]
    fn floor_contact_reflects_and_damps() {
        let mut p = Vec2::new(0.0, -1.2);
        let mut v = Vec2::new(0.3, -2.0);
        resolve_particle(&mut p, &mut v, Vec2::ONE, 0.5);
        assert_eq!(p, Vec2::new(0.0, -1.0));
        assert_eq!(v, Vec2::new(0.3, 1.0));
    }

    #[test]
    fn inward_velocity_not_reflected() {
        // Outside but already moving back in: clamp only.
        let mut p = Vec2::new(1.1, 0.0);
        let mut v = Vec2::new(-0.4, 0.0);
        resolve_particle(&mut p, &mut v, Vec2::ONE, 0.5);
        assert_eq!(p.x, 1.0);
        assert_eq!(v.x, -0.4);
    }

    #[test]
    fn corner_resolves_both_axes() {
        let mut p = Vec2::new(2.0, 3.0);
        let mut v = Vec2::new(1.0, 1.0);
        resolve_particle(&mut p, &mut v, Vec2::new(1.0, 0.5), 1.0);
        assert_eq!(p, Vec2::new(1.0, 0.5));
        assert_eq!(v, Vec2::new(-1.0, -1.0));
    }

    #[test]
    fn pass_contains_all_particles() {
        let ctx = ExecutionContext::parallel().unwrap();
        let mut pos: Vec<Vec2> = (0..500)
            .map(|i| Vec2::new((i as f32 * 0.37).sin() * 3.0, (i as f32 * 0.11).cos() * 3.0))
            .collect();
        let mut vel = vec![Vec2::new(5.0, -5.0); 500];
        resolve_boundaries(&ctx, &mut pos, &mut vel, Vec2::ONE, DEFAULT_RESTITUTION);
        assert!(pos.iter().all(|p| p.x.abs() <= 1.0 && p.y.abs() <= 1.0));
    }
}
