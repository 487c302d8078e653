use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::user::GeoPoint;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Assumed travel speed when no routing provider supplied a duration.
const FALLBACK_SPEED_MPS: f64 = 15.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RouteEstimate {
    pub distance_m: f64,
    pub duration_s: f64,
}

#[derive(Debug, Error)]
#[error("route lookup failed: {0}")]
pub struct RouteError(pub String);

/// Seam for an external routing provider (road distance, live traffic).
/// The engine never depends on it succeeding; see [`estimate`].
#[async_trait]
pub trait RouteEstimator: Send + Sync {
    async fn route(&self, origin: &GeoPoint, destination: &GeoPoint)
    -> Result<RouteEstimate, RouteError>;
}

/// Built-in estimator: great-circle distance at the fallback speed.
pub struct GreatCircleEstimator;

#[async_trait]
impl RouteEstimator for GreatCircleEstimator {
    async fn route(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
    ) -> Result<RouteEstimate, RouteError> {
        let distance_m = haversine_m(origin, destination);
        Ok(RouteEstimate {
            distance_m,
            duration_s: distance_m / FALLBACK_SPEED_MPS,
        })
    }
}

/// Route estimate that never fails. A missing coordinate yields an infinite
/// distance so distance filters reject it; an estimator error falls back to
/// the great-circle computation.
pub async fn estimate(
    estimator: &dyn RouteEstimator,
    origin: Option<&GeoPoint>,
    destination: Option<&GeoPoint>,
) -> RouteEstimate {
    let (Some(origin), Some(destination)) = (origin, destination) else {
        return RouteEstimate {
            distance_m: f64::INFINITY,
            duration_s: f64::INFINITY,
        };
    };

    match estimator.route(origin, destination).await {
        Ok(route) => route,
        Err(err) => {
            tracing::warn!(error = %err, "route lookup failed; using great-circle fallback");
            let distance_m = haversine_m(origin, destination);
            RouteEstimate {
                distance_m,
                duration_s: distance_m / FALLBACK_SPEED_MPS,
            }
        }
    }
}

pub fn haversine_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_M * central_angle
}
