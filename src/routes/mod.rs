use crate::models::AppState;
use axum::Router;
use serde::Serialize;

pub mod appointment_routes;
pub mod event_routes;
pub mod health_routes;
pub mod queue_routes;
pub mod service_routes;

/// Success envelope shared by every JSON endpoint.
#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/services", service_routes::router())
        .nest("/api/v1", appointment_routes::router())
        .nest("/api/v1", queue_routes::router())
        .nest("/api/v1", event_routes::router())
        .merge(health_routes::router())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_http {
    use axum::body::Body;
    use axum::http::{Request, Response};
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::models::Role;
    use crate::scheduling::test_support::Fixture;

    pub fn request(method: &str, uri: &str, caller: Option<(Uuid, Role)>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((id, role)) = caller {
            builder = builder
                .header("x-caller-id", id.to_string())
                .header("x-caller-role", role.as_str());
        }
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    pub async fn send(fx: &Fixture, req: Request<Body>) -> Response<Body> {
        super::router(fx.state()).oneshot(req).await.unwrap()
    }

    pub async fn response_json(response: Response<Body>) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }
}
