//! Viewport parcel generation.
//!
//! There is no spatial index over real parcel boundaries yet, so the map
//! viewport is tiled with a grid of synthetic parcels. Callers go through
//! [`BoundsParcelSource`] so a real query can replace the grid.

use std::sync::Arc;

use parcel_map_parcel_models::{
    BoundingBox, Coordinate, DataQuality, InvalidCoordinateError, ParcelFeature, ParcelProperties,
};
use thiserror::Error;

use crate::mock::MOCK_PARCELS;
use crate::selector::{CoordinateHashSelector, ParcelSelector};

/// Grid spacing in degrees (roughly 500 m).
pub const GRID_SPACING: f64 = 0.008;

/// Upper bound on features returned for one viewport.
pub const MAX_BOUNDS_FEATURES: usize = 2500;

const CELL_EPSILON: f64 = 1e-9;

/// Rejected viewport bounds.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidBoundsError {
    /// Bounds must be exactly `[southwest, northeast]`.
    #[error("Bounds must contain exactly 2 points, got {0}")]
    PointCount(usize),

    /// A corner is not a `[lng, lat]` pair.
    #[error("Bounds point {index} must be a [lng, lat] pair")]
    Malformed {
        /// Index of the offending corner.
        index: usize,
    },

    /// A corner is outside the WGS84 range.
    #[error(transparent)]
    Coordinate(#[from] InvalidCoordinateError),

    /// West is not strictly less than east.
    #[error("West ({west}) must be less than east ({east})")]
    Longitude {
        /// Western longitude.
        west: f64,
        /// Eastern longitude.
        east: f64,
    },

    /// South is not strictly less than north.
    #[error("South ({south}) must be less than north ({north})")]
    Latitude {
        /// Southern latitude.
        south: f64,
        /// Northern latitude.
        north: f64,
    },
}

/// Validates `[southwest, northeast]` corners into a bounding box.
///
/// # Errors
///
/// Returns [`InvalidBoundsError`] if there are not exactly two `[lng, lat]`
/// corners, a value is out of range, or the box is empty or inverted.
pub fn parse_bounds<P: AsRef<[f64]>>(corners: &[P]) -> Result<BoundingBox, InvalidBoundsError> {
    if corners.len() != 2 {
        return Err(InvalidBoundsError::PointCount(corners.len()));
    }

    let mut points = [Coordinate {
        longitude: 0.0,
        latitude: 0.0,
    }; 2];
    for (index, corner) in corners.iter().enumerate() {
        let &[lng, lat] = corner.as_ref() else {
            return Err(InvalidBoundsError::Malformed { index });
        };
        points[index] = Coordinate::new(lng, lat)?;
    }

    let [sw, ne] = points;
    if sw.longitude >= ne.longitude {
        return Err(InvalidBoundsError::Longitude {
            west: sw.longitude,
            east: ne.longitude,
        });
    }
    if sw.latitude >= ne.latitude {
        return Err(InvalidBoundsError::Latitude {
            south: sw.latitude,
            north: ne.latitude,
        });
    }

    Ok(BoundingBox::new(
        sw.longitude,
        sw.latitude,
        ne.longitude,
        ne.latitude,
    ))
}

/// Parcels covering a viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundsParcels {
    /// Parcel features, at most the source's cap.
    pub features: Vec<ParcelFeature>,
    /// Whether the source stopped early at its cap.
    pub truncated: bool,
}

/// Something that can list the parcels inside a bounding box.
pub trait BoundsParcelSource: Send + Sync {
    /// Returns the parcels inside `bounds`. `bounds` is already validated.
    fn parcels_in(&self, bounds: &BoundingBox) -> BoundsParcels;
}

/// Tiles a viewport with synthetic cell-sized parcels.
pub struct GridParcelGenerator {
    spacing: f64,
    max_features: usize,
    selector: Arc<dyn ParcelSelector>,
}

impl Default for GridParcelGenerator {
    fn default() -> Self {
        Self::new(Arc::new(CoordinateHashSelector::default()))
    }
}

impl GridParcelGenerator {
    /// Creates a generator with the default spacing and cap.
    #[must_use]
    pub fn new(selector: Arc<dyn ParcelSelector>) -> Self {
        Self {
            spacing: GRID_SPACING,
            max_features: MAX_BOUNDS_FEATURES,
            selector,
        }
    }

    /// Overrides the feature cap.
    #[must_use]
    pub const fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = max_features;
        self
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn cells(&self, extent: f64) -> usize {
        (extent / self.spacing - CELL_EPSILON).ceil().max(0.0) as usize
    }

    /// Smallest lattice step that keeps a capped grid within
    /// `max_features` while still spanning the whole viewport.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn stride(&self, columns: usize, rows: usize) -> usize {
        if self.max_features == 0 {
            return columns.max(rows).max(1);
        }
        let ratio = (columns as f64 * rows as f64) / self.max_features as f64;
        let mut stride = (ratio.sqrt().ceil() as usize).max(1);
        while columns.div_ceil(stride) * rows.div_ceil(stride) > self.max_features {
            stride += 1;
        }
        stride
    }

    #[allow(clippy::cast_possible_truncation)]
    fn cell(&self, object_id: usize, lng: f64, lat: f64) -> ParcelFeature {
        let anchor = Coordinate {
            longitude: lng,
            latitude: lat,
        };
        let template =
            &MOCK_PARCELS[self.selector.select(anchor, MOCK_PARCELS.len()) % MOCK_PARCELS.len()];

        let mut extra = serde_json::Map::new();
        extra.insert("OBJECTID".to_string(), object_id.into());

        let mut properties = ParcelProperties::new(
            template.owner.to_string(),
            template.acres,
            format!(
                "{}-{}-{}",
                template.parcel_id,
                (lng * 1000.0).floor() as i64,
                (lat * 1000.0).floor() as i64,
            ),
            DataQuality::Synthetic,
            extra,
        );
        properties.selected = false;

        ParcelFeature {
            geometry: parcel_map_geometry::cell_polygon(lng, lat, self.spacing),
            properties,
        }
    }
}

impl BoundsParcelSource for GridParcelGenerator {
    #[allow(clippy::cast_precision_loss)]
    fn parcels_in(&self, bounds: &BoundingBox) -> BoundsParcels {
        let columns = self.cells(bounds.width());
        let rows = self.cells(bounds.height());
        let total = columns.saturating_mul(rows);
        let truncated = total > self.max_features;

        let stride = if truncated {
            self.stride(columns, rows)
        } else {
            1
        };

        let mut features = Vec::with_capacity(total.min(self.max_features));
        'grid: for i in (0..columns).step_by(stride) {
            let lng = (i as f64).mul_add(self.spacing, bounds.west);
            for j in (0..rows).step_by(stride) {
                if features.len() >= self.max_features {
                    break 'grid;
                }
                let lat = (j as f64).mul_add(self.spacing, bounds.south);
                features.push(self.cell(features.len() + 1, lng, lat));
            }
        }

        log::debug!("Generated {} parcels for viewport", features.len());

        BoundsParcels {
            features,
            truncated,
        }
    }
}

/// Validates `corners` and asks `source` for the parcels inside them.
///
/// # Errors
///
/// Returns [`InvalidBoundsError`] if the corners do not describe a valid
/// viewport.
pub fn generate_parcels_for_bounds<P: AsRef<[f64]>>(
    source: &dyn BoundsParcelSource,
    corners: &[P],
) -> Result<BoundsParcels, InvalidBoundsError> {
    let bounds = parse_bounds(corners)?;
    Ok(source.parcels_in(&bounds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::RoundRobinSelector;
    use parcel_map_parcel_models::NormalizedGeometry;

    fn generator() -> GridParcelGenerator {
        GridParcelGenerator::new(Arc::new(CoordinateHashSelector::new(1)))
    }

    #[test]
    fn small_viewport_yields_two_by_two_grid() {
        let parcels =
            generate_parcels_for_bounds(&generator(), &[[-92.34, 38.94], [-92.33, 38.95]])
                .unwrap();
        assert_eq!(parcels.features.len(), 4);
        assert!(!parcels.truncated);

        for feature in &parcels.features {
            let NormalizedGeometry::Polygon(rings) = &feature.geometry else {
                panic!("expected polygon");
            };
            assert!(parcel_map_geometry::is_closed_ring(&rings[0]));
            assert!(!feature.properties.selected);
            assert_eq!(feature.data_quality(), DataQuality::Synthetic);
        }
    }

    #[test]
    fn object_ids_are_sequential() {
        let parcels =
            generate_parcels_for_bounds(&generator(), &[[-92.34, 38.94], [-92.33, 38.95]])
                .unwrap();
        let ids: Vec<_> = parcels
            .features
            .iter()
            .map(|f| f.properties.extra["OBJECTID"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn parcel_ids_encode_cell_anchor() {
        let generator = GridParcelGenerator::new(Arc::new(RoundRobinSelector::new()));
        let parcels =
            generate_parcels_for_bounds(&generator, &[[-92.5, 38.5], [-92.495, 38.505]])
                .unwrap();
        assert_eq!(parcels.features.len(), 1);
        let props = &parcels.features[0].properties;
        assert_eq!(props.owner, MOCK_PARCELS[0].owner);
        assert_eq!(props.parcel_id, "BC-2024-001245--92500-38500");
    }

    #[test]
    fn exact_multiple_of_spacing_is_not_over_counted() {
        let parcels = generate_parcels_for_bounds(&generator(), &[[0.0, 0.0], [0.016, 0.008]])
            .unwrap();
        assert_eq!(parcels.features.len(), 2);
    }

    #[test]
    fn cells_are_cell_sized_squares() {
        let parcels = generate_parcels_for_bounds(&generator(), &[[10.0, 20.0], [10.001, 20.001]])
            .unwrap();
        let NormalizedGeometry::Polygon(rings) = &parcels.features[0].geometry else {
            panic!("expected polygon");
        };
        assert!(rings[0].contains(&vec![10.0, 20.0]));
        assert!(rings[0].contains(&vec![10.0 + GRID_SPACING, 20.0 + GRID_SPACING]));
    }

    fn southwest_corner(feature: &ParcelFeature) -> (f64, f64) {
        let NormalizedGeometry::Polygon(rings) = &feature.geometry else {
            panic!("expected polygon");
        };
        rings[0].iter().fold((f64::MAX, f64::MAX), |(lng, lat), p| {
            (lng.min(p[0]), lat.min(p[1]))
        })
    }

    #[test]
    fn large_viewport_is_capped() {
        let generator = generator().with_max_features(10);
        let parcels =
            generate_parcels_for_bounds(&generator, &[[-93.0, 38.0], [-92.0, 39.0]]).unwrap();
        assert!(!parcels.features.is_empty());
        assert!(parcels.features.len() <= 10);
        assert!(parcels.truncated);
    }

    #[test]
    fn capped_grid_spans_the_whole_viewport() {
        let generator = generator().with_max_features(10);
        let parcels =
            generate_parcels_for_bounds(&generator, &[[-93.0, 38.0], [-92.0, 39.0]]).unwrap();

        let corners: Vec<_> = parcels.features.iter().map(southwest_corner).collect();
        let east = corners.iter().map(|c| c.0).fold(f64::MIN, f64::max);
        let north = corners.iter().map(|c| c.1).fold(f64::MIN, f64::max);
        assert!(east > -92.5, "grid stops at longitude {east}");
        assert!(north > 38.5, "grid stops at latitude {north}");

        let ids: Vec<_> = parcels
            .features
            .iter()
            .map(|f| f.properties.extra["OBJECTID"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, (1..=parcels.features.len() as u64).collect::<Vec<_>>());
    }

    #[test]
    fn default_cap_applies() {
        let parcels =
            generate_parcels_for_bounds(&generator(), &[[-100.0, 30.0], [-90.0, 40.0]]).unwrap();
        assert!(parcels.features.len() <= MAX_BOUNDS_FEATURES);
        assert!(parcels.features.len() > MAX_BOUNDS_FEATURES / 2);
        assert!(parcels.truncated);
    }

    #[test]
    fn zero_cap_yields_no_features() {
        let generator = generator().with_max_features(0);
        let parcels =
            generate_parcels_for_bounds(&generator, &[[-92.34, 38.94], [-92.33, 38.95]]).unwrap();
        assert!(parcels.features.is_empty());
        assert!(parcels.truncated);
    }

    #[test]
    fn wrong_point_count_is_rejected() {
        let err = parse_bounds(&[[-92.34, 38.94]]).unwrap_err();
        assert_eq!(err, InvalidBoundsError::PointCount(1));

        let err = parse_bounds::<[f64; 2]>(&[]).unwrap_err();
        assert_eq!(err, InvalidBoundsError::PointCount(0));
    }

    #[test]
    fn malformed_corner_is_rejected() {
        let err = parse_bounds(&[vec![-92.34, 38.94], vec![-92.33]]).unwrap_err();
        assert_eq!(err, InvalidBoundsError::Malformed { index: 1 });
    }

    #[test]
    fn out_of_range_corner_is_rejected() {
        let err = parse_bounds(&[[-192.0, 38.94], [-92.33, 38.95]]).unwrap_err();
        assert!(matches!(err, InvalidBoundsError::Coordinate(_)));
    }

    #[test]
    fn inverted_or_empty_boxes_are_rejected() {
        assert!(matches!(
            parse_bounds(&[[-92.33, 38.94], [-92.34, 38.95]]),
            Err(InvalidBoundsError::Longitude { .. })
        ));
        assert!(matches!(
            parse_bounds(&[[-92.34, 38.95], [-92.33, 38.95]]),
            Err(InvalidBoundsError::Latitude { .. })
        ));
    }
}
