//! CPU micro-benchmarks for comparing boards.

use rand::Rng;
use std::time::{Duration, Instant};
use tracing::info;

pub const MONTE_CARLO_POINTS: u64 = 10_000_000;
pub const RESIDUE_MODULUS: i64 = 5000;

/// Nested 1..1000 loops folding into a sum mod 100000.
pub fn loop_sum() -> i64 {
    let mut sum = 0i64;
    for i in 1..1000i64 {
        for j in 1..1000i64 {
            sum = (sum + i + j) % 100_000;
        }
    }
    sum
}

pub fn monte_carlo_pi<R: Rng>(rng: &mut R, points: u64) -> f64 {
    if points == 0 {
        return 0.0;
    }
    let mut inside = 0u64;
    for _ in 0..points {
        let x: f64 = rng.gen();
        let y: f64 = rng.gen();
        if x * x + y * y <= 1.0 {
            inside += 1;
        }
    }
    4.0 * inside as f64 / points as f64
}

fn is_quadratic_residue(n: i64, m: i64) -> bool {
    (0..m).any(|i| i * i % m == n)
}

/// Count of n in 0..m that are squares mod m.
pub fn quadratic_residues(m: i64) -> i64 {
    (0..m).filter(|n| is_quadratic_residue(*n, m)).count() as i64
}

fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let value = f();
    (value, start.elapsed())
}

pub fn run() {
    println!("Starting loop test");
    let (sum, elapsed) = timed(loop_sum);
    println!("Loop test complete. Final sum: {}", sum);
    println!("Time taken: {} ms", elapsed.as_millis());

    println!("Starting Monte Carlo Pi test");
    let (pi, elapsed) = timed(|| monte_carlo_pi(&mut rand::thread_rng(), MONTE_CARLO_POINTS));
    println!("Monte Carlo Pi test complete. pi = {}", pi);
    println!("Time taken: {} ms", elapsed.as_millis());

    println!("Starting function call test");
    let (count, elapsed) = timed(|| quadratic_residues(RESIDUE_MODULUS));
    println!("Function call test complete. Number of QR: {}", count);
    println!("Time taken: {} ms", elapsed.as_millis());
    info!("benchmarks done");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn loop_sum_is_deterministic() {
        let expected = (1..1000i64)
            .flat_map(|i| (1..1000i64).map(move |j| i + j))
            .fold(0, |acc, v| (acc + v) % 100_000);
        assert_eq!(loop_sum(), expected);
    }

    #[test]
    fn pi_estimate_is_close() {
        let pi = monte_carlo_pi(&mut StdRng::seed_from_u64(7), 200_000);
        assert!((pi - std::f64::consts::PI).abs() < 0.02, "{}", pi);
        assert_eq!(monte_carlo_pi(&mut StdRng::seed_from_u64(7), 0), 0.0);
    }

    #[test]
    fn residues_of_small_moduli() {
        // squares mod 7: 0, 1, 2, 4
        assert_eq!(quadratic_residues(7), 4);
        // squares mod 8: 0, 1, 4
        assert_eq!(quadratic_residues(8), 3);
    }
}
