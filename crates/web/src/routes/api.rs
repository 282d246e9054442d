//! JSON API handlers used by the front-end scripts.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use delicious_core::{GeoPoint, StoreId};

use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::{NearbyStore, Store, User};
use crate::services::StoreService;
use crate::state::AppState;

/// Query parameters for the text search.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Query parameters for the proximity search.
#[derive(Debug, Deserialize)]
pub struct NearQuery {
    pub lat: Option<String>,
    pub lng: Option<String>,
}

impl NearQuery {
    fn point(&self) -> Result<GeoPoint, AppError> {
        let parse = |name: &str, raw: Option<&str>| -> Result<f64, AppError> {
            raw.map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| AppError::BadRequest(format!("Missing {name}")))?
                .parse::<f64>()
                .map_err(|_| AppError::BadRequest(format!("Invalid {name}")))
        };
        let lng = parse("lng", self.lng.as_deref())?;
        let lat = parse("lat", self.lat.as_deref())?;
        GeoPoint::new(lng, lat).map_err(|e| AppError::BadRequest(e.to_string()))
    }
}

/// Stores matching the search text, best match first.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Store>>, AppError> {
    let stores = StoreService::new(state.pool()).search(&query.q).await?;
    Ok(Json(stores))
}

/// Stores within 10 km of a point, nearest first.
pub async fn near(
    State(state): State<AppState>,
    Query(query): Query<NearQuery>,
) -> Result<Json<Vec<NearbyStore>>, AppError> {
    let point = query.point()?;
    let stores = StoreService::new(state.pool()).near(point).await?;
    Ok(Json(stores))
}

/// Toggle a heart and return the updated user.
pub async fn heart(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<StoreId>,
) -> Result<Json<User>, AppError> {
    let user = StoreService::new(state.pool())
        .toggle_heart(user.id, id)
        .await?;
    Ok(Json(user))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn query(lat: Option<&str>, lng: Option<&str>) -> NearQuery {
        NearQuery {
            lat: lat.map(ToString::to_string),
            lng: lng.map(ToString::to_string),
        }
    }

    #[test]
    fn test_near_query_parses_point() {
        let point = query(Some("43.65"), Some(" -79.38 ")).point().unwrap();
        assert!((point.lat() - 43.65).abs() < f64::EPSILON);
        assert!((point.lng() + 79.38).abs() < f64::EPSILON);
    }

    #[test]
    fn test_near_query_rejects_bad_input() {
        for q in [
            query(None, Some("1")),
            query(Some("1"), Some("")),
            query(Some("north"), Some("1")),
            query(Some("91"), Some("0")),
            query(Some("0"), Some("181")),
        ] {
            let err = q.point().unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)));
        }
    }
}
