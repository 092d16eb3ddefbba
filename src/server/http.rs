//! Static asset server with single-page-app fallback.

use axum::http::{header, HeaderValue};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use super::config::HttpConfig;
use super::ServerError;

/// Sent on every response so browsers always revalidate.
pub const CACHE_CONTROL: &str = "no-cache, must-revalidate";

/// Normalize configured prefixes to `/segment[/segment..]`, dropping
/// duplicates and entries that are empty or contain route syntax.
fn mount_points(prefixes: &[String]) -> Vec<String> {
    let mut mounts: Vec<String> = Vec::new();
    for raw in prefixes {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() || trimmed.contains(['{', '}', '*']) {
            tracing::warn!(prefix = %raw, "ignoring static prefix");
            continue;
        }
        let mount = format!("/{trimmed}");
        if !mounts.contains(&mount) {
            mounts.push(mount);
        }
    }
    mounts
}

/// Build the HTTP routes for `config`.
///
/// Each static prefix is served from the matching directory under the
/// document root; every other path gets `index.html`.
pub fn router(config: &HttpConfig) -> Router {
    let mut app = Router::new();
    for mount in mount_points(&config.static_prefixes) {
        let dir = config.root.join(mount.trim_start_matches('/'));
        app = app.nest_service(&mount, ServeDir::new(dir));
    }

    app.fallback_service(ServeFile::new(config.root.join("index.html")))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL),
        ))
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` fires.
pub async fn serve(config: HttpConfig, shutdown: CancellationToken) -> Result<(), ServerError> {
    let app = router(&config);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .map_err(|e| ServerError::Http(format!("bind :{}: {e}", config.port)))?;
    tracing::info!(port = config.port, root = %config.root.display(), "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| ServerError::Http(format!("axum serve: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_points_normalized() {
        let prefixes = vec![
            "/js".to_string(),
            "css/".to_string(),
            "/js/".to_string(),
            "/".to_string(),
            "".to_string(),
            "/{id}".to_string(),
            "/images/icons".to_string(),
        ];
        assert_eq!(mount_points(&prefixes), vec!["/js", "/css", "/images/icons"]);
    }
}
