//! In-flight tracking for viewport requests.
//!
//! Rapid panning can fire the same viewport request several times. The
//! guard lets the first one through and turns the duplicates away until it
//! finishes.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use parcel_map_parcel_models::BoundingBox;

type ViewportKey = [i64; 4];

/// Tracks viewports currently being generated.
#[derive(Debug, Default)]
pub struct ViewportGuard {
    in_flight: Mutex<BTreeSet<ViewportKey>>,
}

impl ViewportGuard {
    /// Creates an empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `bounds` as in flight.
    ///
    /// Returns `None` if the same viewport (to a micro-degree) is already
    /// in flight. The returned permit releases the viewport when dropped.
    #[must_use]
    pub fn try_acquire(self: &Arc<Self>, bounds: &BoundingBox) -> Option<ViewportPermit> {
        let key = viewport_key(bounds);
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);

        inserted.then(|| ViewportPermit {
            guard: Arc::clone(self),
            key,
        })
    }

    /// Number of viewports currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn viewport_key(bounds: &BoundingBox) -> ViewportKey {
    [bounds.west, bounds.south, bounds.east, bounds.north].map(|v| (v * 1e6).round() as i64)
}

/// Releases its viewport on drop.
#[derive(Debug)]
pub struct ViewportPermit {
    guard: Arc<ViewportGuard>,
    key: ViewportKey,
}

impl Drop for ViewportPermit {
    fn drop(&mut self) {
        self.guard
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> BoundingBox {
        BoundingBox::new(-92.34, 38.94, -92.33, 38.95)
    }

    #[test]
    fn duplicate_viewport_is_rejected_while_in_flight() {
        let guard = Arc::new(ViewportGuard::new());
        let permit = guard.try_acquire(&viewport());
        assert!(permit.is_some());
        assert!(guard.try_acquire(&viewport()).is_none());
        assert_eq!(guard.in_flight(), 1);

        drop(permit);
        assert_eq!(guard.in_flight(), 0);
        assert!(guard.try_acquire(&viewport()).is_some());
    }

    #[test]
    fn different_viewports_do_not_block_each_other() {
        let guard = Arc::new(ViewportGuard::new());
        let _a = guard.try_acquire(&viewport()).unwrap();
        let _b = guard
            .try_acquire(&BoundingBox::new(-92.35, 38.94, -92.33, 38.95))
            .unwrap();
        assert_eq!(guard.in_flight(), 2);
    }
}
