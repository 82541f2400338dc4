//! Particle state in struct-of-arrays layout.

use glam::Vec2;

use crate::buffers::try_filled;
use crate::error::Result;

/// Canonical particle state.
///
/// All arrays are parallel: index `i` in every array is particle `i`, and the
/// index is stable for the lifetime of the buffer set. Position and velocity
/// change only in the final integrator combine and the boundary resolver;
/// density and pressure are rewritten by every density evaluation.
#[derive(Debug, Clone, Default)]
pub struct ParticleArrays {
    // ---- Kinematics ----
    /// Positions (world units)
    pub positions: Vec<Vec2>,
    /// Velocities (world units / s)
    pub velocities: Vec<Vec2>,

    // ---- Scalar fields ----
    /// Density from the most recent evaluation
    pub density: Vec<f32>,
    /// Pressure from the most recent evaluation
    pub pressure: Vec<f32>,
}

impl ParticleArrays {
    /// `n` particles at the origin, at rest, with zeroed fields.
    pub fn zeroed(n: usize) -> Result<Self> {
        Ok(Self {
            positions: try_filled("positions", n, Vec2::ZERO)?,
            velocities: try_filled("velocities", n, Vec2::ZERO)?,
            density: try_filled("density", n, 0.0)?,
            pressure: try_filled("pressure", n, 0.0)?,
        })
    }

    /// Return the number of particles currently stored.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Return `true` if there are no particles.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Zero velocity, density and pressure, leaving positions untouched.
    pub fn clear_dynamics(&mut self) {
        self.velocities.fill(Vec2::ZERO);
        self.density.fill(0.0);
        self.pressure.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_particle_arrays() {
        let pa = ParticleArrays::default();
        assert_eq!(pa.len(), 0);
        assert!(pa.is_empty());
    }

    #[test]
    fn zeroed_sizes_every_array() {
        let pa = ParticleArrays::zeroed(5).unwrap();
        assert_eq!(pa.len(), 5);
        assert!(!pa.is_empty());
        assert_eq!(pa.velocities.len(), 5);
        assert_eq!(pa.density.len(), 5);
        assert_eq!(pa.pressure.len(), 5);
        assert!(pa.positions.iter().all(|p| *p == Vec2::ZERO));
    }

    #[test]
    fn clear_dynamics_keeps_positions() {
        let mut pa = ParticleArrays::zeroed(3).unwrap();
        pa.positions[1] = Vec2::new(0.3, 0.4);
        pa.velocities[1] = Vec2::ONE;
        pa.density[2] = 1000.0;
        pa.clear_dynamics();
        assert_eq!(pa.positions[1], Vec2::new(0.3, 0.4));
        assert!(pa.velocities.iter().all(|v| *v == Vec2::ZERO));
        assert!(pa.density.iter().all(|d| *d == 0.0));
    }
}
