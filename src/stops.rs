//! Random delivery stops around a depot.

use rand::Rng;
use tracing::debug;

use crate::coordinate::Coordinate;

/// Placement attempts per stop before it is skipped.
pub const MAX_PLACEMENT_ATTEMPTS: usize = 50;

#[derive(Debug, Clone)]
pub struct StopOptions {
    /// Width of the square around the depot, in degrees.
    pub spread_degrees: f64,
    /// Minimum planar separation from the depot and every other stop.
    pub min_distance_degrees: f64,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self {
            spread_degrees: 0.03,
            min_distance_degrees: 0.003,
        }
    }
}

/// Places up to `count` stops uniformly within `spread / 2` of the depot.
///
/// A stop that cannot be placed after [`MAX_PLACEMENT_ATTEMPTS`] tries is
/// left out, so fewer than `count` stops may come back in crowded settings.
pub fn generate_stops<R: Rng + ?Sized>(
    depot: Coordinate,
    count: usize,
    options: &StopOptions,
    rng: &mut R,
) -> Vec<Coordinate> {
    let half = options.spread_degrees / 2.0;
    let mut stops: Vec<Coordinate> = Vec::with_capacity(count);

    for _ in 0..count {
        let placed = (0..MAX_PLACEMENT_ATTEMPTS).find_map(|_| {
            let candidate = depot.offset(
                rng.random_range(-half..=half),
                rng.random_range(-half..=half),
            );
            let clear = std::iter::once(&depot)
                .chain(stops.iter())
                .all(|other| candidate.planar_distance(other) >= options.min_distance_degrees);
            clear.then_some(candidate)
        });

        match placed {
            Some(stop) => stops.push(stop),
            None => debug!(placed = stops.len(), "no free spot for another stop"),
        }
    }
    stops
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_stops_keep_their_distance() {
        let depot = Coordinate::new(24.848, 67.032);
        let options = StopOptions::default();
        let stops = generate_stops(depot, 8, &options, &mut StdRng::seed_from_u64(3));

        assert_eq!(stops.len(), 8);
        let all: Vec<Coordinate> = std::iter::once(depot).chain(stops.iter().copied()).collect();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert!(a.planar_distance(b) >= options.min_distance_degrees);
            }
        }
        for stop in &stops {
            assert!((stop.lat - depot.lat).abs() <= 0.015 + 1e-12);
            assert!((stop.lon - depot.lon).abs() <= 0.015 + 1e-12);
        }
    }

    #[test]
    fn test_crowded_area_returns_fewer() {
        let depot = Coordinate::new(0.0, 0.0);
        let options = StopOptions {
            spread_degrees: 0.001,
            min_distance_degrees: 0.01,
        };
        let stops = generate_stops(depot, 4, &options, &mut StdRng::seed_from_u64(1));
        assert!(stops.is_empty());
    }
}
