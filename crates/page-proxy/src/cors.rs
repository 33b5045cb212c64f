use crate::config::{ConfigError, CorsConfig};
use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// CORS policy: configured origin(s), GET and OPTIONS only.
pub fn cors_layer(config: &CorsConfig) -> Result<CorsLayer, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        field: "cors.origin",
        reason,
    };

    let origin = match config.allowed_origins().map_err(invalid)? {
        None => AllowOrigin::any(),
        // Unlike a static header, a list only answers with the request's own
        // Origin when it matches; other origins get no Allow-Origin at all.
        Some(origins) => {
            let values = origins
                .iter()
                .map(|o| HeaderValue::from_str(o).map_err(|e| invalid(format!("{o:?}: {e}"))))
                .collect::<Result<Vec<_>, _>>()?;
            AllowOrigin::list(values)
        }
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::OPTIONS]))
}
