//! Solver configuration and validation.
//!
//! Every field has a serde default, so a partial JSON object is a valid
//! configuration. [`SolverConfig::validate`] runs before any buffer is
//! allocated; a rejected configuration leaves a running solver untouched.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::boundary::DEFAULT_RESTITUTION;
use crate::eos::DEFAULT_REST_DENSITY;
use crate::error::{Result, SolverError};
use crate::integrator::IntegrationScheme;

/// Physical and numerical parameters of one solver instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Number of particles.
    #[serde(default = "default_particle_count")]
    pub particle_count: usize,
    /// Particle radius; the smoothing radius and cell size are four radii.
    #[serde(default = "default_particle_radius")]
    pub particle_radius: f32,
    /// Equation-of-state stiffness.
    #[serde(default = "default_stiffness")]
    pub stiffness: f32,
    /// Rest density.
    #[serde(default = "default_rest_density")]
    pub rest_density: f32,
    /// Viscosity coefficient.
    #[serde(default = "default_viscosity")]
    pub viscosity: f32,
    /// Near-pressure coefficient; 0 disables the short-range repulsion.
    #[serde(default)]
    pub near_pressure: f32,
    /// Multiplier on standard gravity (negative flips it).
    #[serde(default = "default_gravity_multiplier")]
    pub gravity_multiplier: f32,
    /// Physics step (seconds).
    #[serde(default = "default_dt")]
    pub dt: f32,
    /// Physics steps per frame; 0 runs one.
    #[serde(default = "default_substeps")]
    pub substeps: u32,
    /// Integration scheme.
    #[serde(default)]
    pub scheme: IntegrationScheme,
    /// Domain half-width and half-height.
    #[serde(default = "default_half_extents")]
    pub half_extents: [f32; 2],
    /// Neighborhood half-width in cells.
    #[serde(default = "default_neighbor_radius_cells")]
    pub neighbor_radius_cells: u32,
    /// Fraction of the outward velocity kept on wall contact.
    #[serde(default = "default_restitution")]
    pub restitution: f32,
    /// Initial particle placement.
    #[serde(default)]
    pub seed: SeedConfig,
}

/// Where and how the initializer lays particles out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Lower-left corner of the seed region, as a fraction of the domain (0..1).
    #[serde(default = "default_region_min")]
    pub region_min: [f32; 2],
    /// Upper-right corner of the seed region, as a fraction of the domain (0..1).
    #[serde(default = "default_region_max")]
    pub region_max: [f32; 2],
    /// Preferred lattice spacing in particle radii; shrunk if the region is too small.
    #[serde(default = "default_spacing_factor")]
    pub spacing_factor: f32,
    /// Random offset per particle, as a fraction of the spacing.
    #[serde(default)]
    pub jitter: f32,
    /// RNG seed for the jitter.
    #[serde(default)]
    pub rng_seed: u64,
}

// Default values
fn default_particle_count() -> usize {
    8192
}

fn default_particle_radius() -> f32 {
    0.005
}

fn default_stiffness() -> f32 {
    2000.0
}

fn default_rest_density() -> f32 {
    DEFAULT_REST_DENSITY
}

fn default_viscosity() -> f32 {
    0.01
}

fn default_gravity_multiplier() -> f32 {
    1.0
}

fn default_dt() -> f32 {
    2.0e-5
}

fn default_substeps() -> u32 {
    4
}

fn default_half_extents() -> [f32; 2] {
    [1.0, 1.0]
}

fn default_neighbor_radius_cells() -> u32 {
    1
}

fn default_restitution() -> f32 {
    DEFAULT_RESTITUTION
}

fn default_region_min() -> [f32; 2] {
    [0.05, 0.05]
}

fn default_region_max() -> [f32; 2] {
    [0.55, 0.95]
}

fn default_spacing_factor() -> f32 {
    3.0
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            particle_count: default_particle_count(),
            particle_radius: default_particle_radius(),
            stiffness: default_stiffness(),
            rest_density: default_rest_density(),
            viscosity: default_viscosity(),
            near_pressure: 0.0,
            gravity_multiplier: default_gravity_multiplier(),
            dt: default_dt(),
            substeps: default_substeps(),
            scheme: IntegrationScheme::default(),
            half_extents: default_half_extents(),
            neighbor_radius_cells: default_neighbor_radius_cells(),
            restitution: default_restitution(),
            seed: SeedConfig::default(),
        }
    }
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            region_min: default_region_min(),
            region_max: default_region_max(),
            spacing_factor: default_spacing_factor(),
            jitter: 0.0,
            rng_seed: 0,
        }
    }
}

fn finite(field: &'static str, value: f32) -> Result<f32> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SolverError::invalid(field, format!("must be finite, got {value}")))
    }
}

fn positive(field: &'static str, value: f32) -> Result<()> {
    if finite(field, value)? > 0.0 {
        Ok(())
    } else {
        Err(SolverError::invalid(field, format!("must be positive, got {value}")))
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<()> {
    if finite(field, value)? >= 0.0 {
        Ok(())
    } else {
        Err(SolverError::invalid(field, format!("must be non-negative, got {value}")))
    }
}

impl SolverConfig {
    /// Domain half-extents as a vector.
    pub fn half_extents(&self) -> Vec2 {
        Vec2::from(self.half_extents)
    }

    /// Physics steps per frame, never zero.
    pub fn effective_substeps(&self) -> u32 {
        self.substeps.max(1)
    }

    /// Check every field; the first violation is returned.
    pub fn validate(&self) -> Result<()> {
        if self.particle_count == 0 {
            return Err(SolverError::invalid("particle_count", "must be at least 1"));
        }
        if self.particle_count > u32::MAX as usize {
            return Err(SolverError::invalid(
                "particle_count",
                format!("must fit 32-bit particle ids, got {}", self.particle_count),
            ));
        }
        positive("particle_radius", self.particle_radius)?;
        non_negative("stiffness", self.stiffness)?;
        positive("rest_density", self.rest_density)?;
        non_negative("viscosity", self.viscosity)?;
        non_negative("near_pressure", self.near_pressure)?;
        finite("gravity_multiplier", self.gravity_multiplier)?;
        positive("dt", self.dt)?;
        positive("half_extents.x", self.half_extents[0])?;
        positive("half_extents.y", self.half_extents[1])?;
        if self.neighbor_radius_cells == 0 {
            return Err(SolverError::invalid(
                "neighbor_radius_cells",
                "must be at least 1 so the smoothing radius stays covered",
            ));
        }
        if !(0.0..=1.0).contains(&finite("restitution", self.restitution)?) {
            return Err(SolverError::invalid(
                "restitution",
                format!("must lie in [0, 1], got {}", self.restitution),
            ));
        }
        self.seed.validate()
    }
}

impl SeedConfig {
    /// Check the seed region and spacing.
    pub fn validate(&self) -> Result<()> {
        for axis in 0..2 {
            let lo = finite("seed.region_min", self.region_min[axis])?;
            let hi = finite("seed.region_max", self.region_max[axis])?;
            if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) || lo >= hi {
                return Err(SolverError::invalid(
                    "seed.region",
                    format!(
                        "needs 0 <= min < max <= 1 on every axis, got {:?}..{:?}",
                        self.region_min, self.region_max
                    ),
                ));
            }
        }
        positive("seed.spacing_factor", self.spacing_factor)?;
        if !(0.0..0.5).contains(&finite("seed.jitter", self.jitter)?) {
            return Err(SolverError::invalid(
                "seed.jitter",
                format!("must lie in [0, 0.5), got {}", self.jitter),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: SolverError) -> &'static str {
        match err {
            SolverError::InvalidConfig { field, .. } => field,
            other => panic!("expected InvalidConfig, got {other}"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        SolverConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: SolverConfig =
            serde_json::from_str(r#"{ "particle_count": 16, "scheme": "Verlet" }"#).unwrap();
        assert_eq!(cfg.particle_count, 16);
        assert_eq!(cfg.scheme, IntegrationScheme::Verlet);
        assert_eq!(cfg.dt, default_dt());
        assert_eq!(cfg.seed, SeedConfig::default());
    }

    #[test]
    fn rejects_zero_count() {
        let cfg = SolverConfig {
            particle_count: 0,
            ..SolverConfig::default()
        };
        assert_eq!(field_of(cfg.validate().unwrap_err()), "particle_count");
    }

    #[test]
    fn rejects_non_positive_radius() {
        for radius in [0.0, -0.01, f32::NAN] {
            let cfg = SolverConfig {
                particle_radius: radius,
                ..SolverConfig::default()
            };
            assert_eq!(field_of(cfg.validate().unwrap_err()), "particle_radius");
        }
    }

    #[test]
    fn rejects_bad_dt_and_restitution() {
        let cfg = SolverConfig {
            dt: 0.0,
            ..SolverConfig::default()
        };
        assert_eq!(field_of(cfg.validate().unwrap_err()), "dt");

        let cfg = SolverConfig {
            restitution: 1.5,
            ..SolverConfig::default()
        };
        assert_eq!(field_of(cfg.validate().unwrap_err()), "restitution");
    }

    #[test]
    fn rejects_empty_seed_region() {
        let mut cfg = SolverConfig::default();
        cfg.seed.region_min = [0.5, 0.1];
        cfg.seed.region_max = [0.5, 0.9];
        assert_eq!(field_of(cfg.validate().unwrap_err()), "seed.region");
    }

    #[test]
    fn zero_substeps_run_once() {
        let cfg = SolverConfig {
            substeps: 0,
            ..SolverConfig::default()
        };
        cfg.validate().unwrap();
        assert_eq!(cfg.effective_substeps(), 1);
    }
}
