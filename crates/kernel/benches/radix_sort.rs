//! Radix sort throughput, serial vs. parallel executor.
//!
//! Run with: cargo bench -p sph2d-kernel --bench radix_sort

use std::time::Instant;

use glam::Vec2;
use kernel::grid::{index_particles, GridParams};
use kernel::radix::RadixSorter;
use kernel::ExecutionContext;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_positions(n: usize, seed: u64) -> Vec<Vec2> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| Vec2::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)))
        .collect()
}

fn main() {
    println!("=== Radix Sort Throughput ===\n");

    let contexts = [
        ("serial", ExecutionContext::serial().expect("serial context")),
        ("parallel", ExecutionContext::parallel().expect("thread pool")),
    ];
    let grid = GridParams::new(0.002, Vec2::ONE, 1).expect("grid");
    println!(
        "grid {}x{}, {} key bits\n",
        grid.dims.x, grid.dims.y, grid.morton_bits
    );

    let counts = [16_384, 65_536, 262_144, 1_048_576];
    let reps = 10;

    println!(
        "{:>10} {:>10} {:>12} {:>14}",
        "Particles", "Executor", "ms/sort", "Mkeys/s"
    );

    for &n in &counts {
        let positions = random_positions(n, 0x5eed);
        for (name, ctx) in &contexts {
            let mut sorter = RadixSorter::new(n).unwrap();

            // Warmup
            index_particles(ctx, &grid, &positions, sorter.live());
            sorter.sort(ctx, grid.morton_bits);

            let mut elapsed = 0.0_f64;
            for _ in 0..reps {
                index_particles(ctx, &grid, &positions, sorter.live());
                let start = Instant::now();
                sorter.sort(ctx, grid.morton_bits);
                elapsed += start.elapsed().as_secs_f64();
            }
            let per_sort = elapsed / reps as f64;
            println!(
                "{:>10} {:>10} {:>12.3} {:>14.1}",
                n,
                name,
                per_sort * 1000.0,
                n as f64 / per_sort / 1.0e6
            );
        }
    }
}
