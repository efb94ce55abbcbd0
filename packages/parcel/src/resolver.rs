//! Coordinate-to-parcel resolution with synthetic fallback.
//!
//! One attempt against the cadastral service, bounded by a timeout. If the
//! service answers, its first feature wins (no distance ranking is done
//! here or upstream). If it fails, a synthetic parcel from
//! [`MOCK_PARCELS`](crate::mock::MOCK_PARCELS) is centered on the
//! coordinate, unless the fallback has been disabled.

use std::sync::Arc;
use std::time::Duration;

use parcel_map_arcgis::{ArcGisFeature, CadastralService, DEFAULT_TIMEOUT, extract_record};
use parcel_map_parcel_models::events::{EventKind, EventReporter, ObservabilityEvent};
use parcel_map_parcel_models::{
    Coordinate, DataQuality, ParcelFeature, ParcelProperties, ParcelRecord,
};

use crate::ParcelError;
use crate::mock::MOCK_PARCELS;
use crate::selector::ParcelSelector;

/// Resolves coordinates to parcel features.
pub struct ParcelResolver {
    service: Arc<dyn CadastralService>,
    selector: Arc<dyn ParcelSelector>,
    reporter: Arc<dyn EventReporter>,
    timeout: Duration,
    fallback_enabled: bool,
}

impl ParcelResolver {
    /// Creates a resolver with the default timeout and the synthetic
    /// fallback enabled.
    #[must_use]
    pub fn new(
        service: Arc<dyn CadastralService>,
        selector: Arc<dyn ParcelSelector>,
        reporter: Arc<dyn EventReporter>,
    ) -> Self {
        Self {
            service,
            selector,
            reporter,
            timeout: DEFAULT_TIMEOUT,
            fallback_enabled: true,
        }
    }

    /// Sets the upper bound on a single upstream attempt.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables or disables the synthetic fallback.
    #[must_use]
    pub const fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    /// Resolves the parcel at `coordinate`.
    ///
    /// Returns `Ok(None)` when the service has no parcel there or its
    /// geometry cannot be displayed.
    ///
    /// # Errors
    ///
    /// Returns [`ParcelError`] only when the service fails and the
    /// fallback is disabled.
    pub async fn resolve(&self, coordinate: Coordinate) -> Result<Option<ParcelFeature>, ParcelError> {
        let result = match tokio::time::timeout(self.timeout, self.service.query_point(coordinate))
            .await
        {
            Ok(Ok(features)) => Ok(features),
            Ok(Err(e)) => Err(ParcelError::Upstream(e)),
            Err(_) => Err(ParcelError::Timeout(self.timeout)),
        };

        match result {
            Ok(features) => Ok(self.first_feature(&features, coordinate)),
            Err(e) if self.fallback_enabled => {
                let feature = self.synthesize(coordinate);
                self.reporter.report(
                    &ObservabilityEvent::new(
                        EventKind::UpstreamFallback,
                        "Cadastral service unavailable, served synthetic parcel",
                    )
                    .with("coordinate", coordinate)
                    .with("upstream", self.service.describe())
                    .with("error", &e)
                    .with("parcel_id", &feature.properties.parcel_id),
                );
                Ok(Some(feature))
            }
            Err(e) => {
                self.reporter.report(
                    &ObservabilityEvent::new(EventKind::UpstreamFailure, "Cadastral service failed")
                        .with("coordinate", coordinate)
                        .with("upstream", self.service.describe())
                        .with("error", &e),
                );
                Err(e)
            }
        }
    }

    /// Builds a synthetic parcel centered on `coordinate`.
    #[must_use]
    pub fn synthesize(&self, coordinate: Coordinate) -> ParcelFeature {
        let idx = self.selector.select(coordinate, MOCK_PARCELS.len());
        MOCK_PARCELS[idx % MOCK_PARCELS.len()].synthesize(coordinate)
    }

    fn first_feature(
        &self,
        features: &[ArcGisFeature],
        coordinate: Coordinate,
    ) -> Option<ParcelFeature> {
        let Some(first) = features.first() else {
            self.reporter.report(
                &ObservabilityEvent::new(EventKind::ParcelNotFound, "No parcel at this location")
                    .with("coordinate", coordinate),
            );
            return None;
        };

        if features.len() > 1 {
            log::debug!(
                "{} parcels intersect {coordinate}, using the first",
                features.len()
            );
        }

        let record = extract_record(first, coordinate);
        let parcel_id = record.parcel_id.clone();
        let feature = feature_from_record(record, DataQuality::Live);
        if feature.is_none() {
            self.reporter.report(
                &ObservabilityEvent::new(
                    EventKind::UngeometrizableParcel,
                    "Parcel geometry could not be converted to GeoJSON",
                )
                .with("coordinate", coordinate)
                .with("parcel_id", parcel_id),
            );
        }
        feature
    }
}

/// Normalizes a record's geometry and wraps it as a displayable feature.
///
/// Returns `None` if the geometry is missing or unrecognizable.
#[must_use]
pub fn feature_from_record(record: ParcelRecord, data_quality: DataQuality) -> Option<ParcelFeature> {
    let geometry = parcel_map_geometry::normalize(record.geometry.as_ref())?;
    // Raw attributes are kept but never override the resolved owner,
    // acreage, or parcel ID.
    Some(ParcelFeature {
        geometry,
        properties: ParcelProperties::new(
            record.owner,
            record.acres,
            record.parcel_id,
            data_quality,
            record.extra_attributes,
        ),
    })
}
