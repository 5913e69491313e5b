//! Pipeline stage feeding [`MetricsAggregator`].

use std::sync::Arc;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::metrics::MetricsAggregator;

/// Route label for requests that matched no route.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Measure the rest of the chain and record its outcome.
///
/// Routes are keyed by their matched template (`/users/{id}`) so path
/// parameters do not multiply the number of tracked routes. The in-flight
/// guard records a 500 and releases the active-connection gauge if the
/// request never completes.
pub async fn track_metrics(
    State(metrics): State<Arc<MetricsAggregator>>,
    req: Request,
    next: Next,
) -> Response {
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map_or(UNMATCHED_ROUTE, MatchedPath::as_str)
        .to_owned();

    let in_flight = metrics.start_request(req.method().as_str(), &path);
    let response = next.run(req).await;
    in_flight.finish(response.status().as_u16());

    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use axum::Router;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn test_records_by_route_template() {
        let metrics = Arc::new(MetricsAggregator::new());
        let app = Router::new()
            .route("/users/{id}", get(|| async { StatusCode::NOT_FOUND }))
            .layer(from_fn_with_state(metrics.clone(), track_metrics));

        for id in [1, 2, 3] {
            app.clone()
                .oneshot(
                    Request::builder()
                        .uri(format!("/users/{id}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.error_count, 3);
        assert_eq!(snapshot.endpoints["GET /users/{id}"].count, 3);
        assert_eq!(snapshot.status_codes[&404], 3);
        assert_eq!(snapshot.active_connections, 0);
    }
}
