//! Strategies for picking a template from the synthetic parcel table.

use std::sync::atomic::{AtomicUsize, Ordering};

use parcel_map_parcel_models::Coordinate;

/// Picks an index into a table of `len` entries for a coordinate.
pub trait ParcelSelector: Send + Sync {
    /// Returns an index in `0..len`. `len` is never zero.
    fn select(&self, coordinate: Coordinate, len: usize) -> usize;
}

/// Content-based selection: the same seed and coordinate always pick the
/// same entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinateHashSelector {
    seed: u64,
}

impl CoordinateHashSelector {
    /// Creates a selector. Different seeds spread coordinates differently.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl ParcelSelector for CoordinateHashSelector {
    #[allow(clippy::cast_possible_truncation)]
    fn select(&self, coordinate: Coordinate, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        let mut context = md5::Context::new();
        context.consume(self.seed.to_le_bytes());
        context.consume(coordinate.longitude.to_bits().to_le_bytes());
        context.consume(coordinate.latitude.to_bits().to_le_bytes());
        let digest = context.finalize();

        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.0[..8]);
        (u64::from_le_bytes(head) % len as u64) as usize
    }
}

/// Cycles through the table in order, regardless of coordinate.
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    next: AtomicUsize,
}

impl RoundRobinSelector {
    /// Creates a selector starting at index 0.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicUsize::new(0),
        }
    }
}

impl ParcelSelector for RoundRobinSelector {
    fn select(&self, _coordinate: Coordinate, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.next.fetch_add(1, Ordering::Relaxed) % len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(lng: f64, lat: f64) -> Coordinate {
        Coordinate::new(lng, lat).unwrap()
    }

    #[test]
    fn hash_selection_is_deterministic() {
        let selector = CoordinateHashSelector::new(7);
        let first = selector.select(at(-92.33, 38.95), 4);
        for _ in 0..10 {
            assert_eq!(selector.select(at(-92.33, 38.95), 4), first);
        }
        assert!(first < 4);
    }

    #[test]
    fn hash_selection_spreads_across_table() {
        let selector = CoordinateHashSelector::new(0);
        let mut seen = [false; 4];
        for i in 0..200 {
            let idx = selector.select(at(-92.0 - f64::from(i) * 0.001, 38.9), 4);
            seen[idx] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn round_robin_cycles() {
        let selector = RoundRobinSelector::new();
        let picks: Vec<usize> = (0..6).map(|_| selector.select(at(0.0, 0.0), 4)).collect();
        assert_eq!(picks, vec![0, 1, 2, 3, 0, 1]);
    }
}
