//! Equation of state.
//!
//! A linear, clamped stiffness law: particles only push each other apart,
//! regions below rest density carry zero pressure.

/// Lower bound applied to every evaluated density.
pub const DENSITY_FLOOR: f32 = 1.0e-6;

/// Rest density used when none is configured.
pub const DEFAULT_REST_DENSITY: f32 = 1000.0;

/// Clamped linear equation of state.
///
/// ```text
/// P = max(0, k * (rho - rho0))
/// ```
///
/// # Arguments
/// * `density` - Current density.
/// * `rest_density` - Reference density rho0.
/// * `stiffness` - Stiffness k.
pub fn linear_eos(density: f32, rest_density: f32, stiffness: f32) -> f32 {
    (stiffness * (density - rest_density)).max(0.0)
}

/// Apply the density floor.
#[inline]
pub fn floor_density(density: f32) -> f32 {
    density.max(DENSITY_FLOOR)
}
