// src/routes/event_routes.rs

use std::convert::Infallible;

use axum::{
    Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};

use crate::{
    error::{ApiError, SchedulingError},
    middleware::auth_context::AuthContext,
    models::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(stream_events))
}

/* ============================================================
   GET /events (staff, text/event-stream)
   ============================================================ */

pub async fn stream_events(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if !auth.role.is_staff() {
        return Err(SchedulingError::Unauthorized("only staff can watch appointment events").into());
    }

    tracing::debug!(user_id = %auth.user_id, "event stream opened");
    let stream = BroadcastStream::new(state.events.subscribe()).filter_map(|msg| match msg {
        Ok(event) => match Event::default().event(event.kind.as_str()).json_data(&event) {
            Ok(sse) => Some(Ok(sse)),
            Err(e) => {
                tracing::warn!(error = %e, "dropping unserializable event");
                None
            }
        },
        Err(lagged) => {
            tracing::warn!(error = %lagged, "event subscriber lagged");
            None
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use axum::http::{StatusCode, header};
    use uuid::Uuid;

    use crate::models::Role;
    use crate::routes::test_http::{request, send};
    use crate::scheduling::test_support::Fixture;

    #[tokio::test]
    async fn students_cannot_watch_events() {
        let fx = Fixture::new().await;
        let response = send(&fx, request("GET", "/api/v1/events", Some((Uuid::new_v4(), Role::Student)), None)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn staff_get_an_event_stream() {
        let fx = Fixture::new().await;
        let response = send(&fx, request("GET", "/api/v1/events", Some((Uuid::new_v4(), Role::Staff)), None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
    }
}
