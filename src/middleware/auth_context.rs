use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue};
use axum_extra::TypedHeader;
use headers::{Error as HeaderError, Header};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{Caller, Role};

/*
Identity is established upstream by the campus auth gateway, which forwards:
X-Caller-Id:   <uuid>
X-Caller-Role: student | staff | admin
*/
static X_CALLER_ID: HeaderName = HeaderName::from_static("x-caller-id");
static X_CALLER_ROLE: HeaderName = HeaderName::from_static("x-caller-role");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub Uuid);

impl Header for CallerId {
    fn name() -> &'static HeaderName {
        &X_CALLER_ID
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, HeaderError>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(HeaderError::invalid)?;
        let raw = value.to_str().map_err(|_| HeaderError::invalid())?;
        Uuid::parse_str(raw.trim())
            .map(CallerId)
            .map_err(|_| HeaderError::invalid())
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(&self.0.to_string()) {
            values.extend(std::iter::once(value));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerRole(pub Role);

impl Header for CallerRole {
    fn name() -> &'static HeaderName {
        &X_CALLER_ROLE
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, HeaderError>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(HeaderError::invalid)?;
        let raw = value.to_str().map_err(|_| HeaderError::invalid())?;
        Role::parse(raw).map(CallerRole).ok_or_else(HeaderError::invalid)
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        values.extend(std::iter::once(HeaderValue::from_static(self.0.as_str())));
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    pub fn caller(&self) -> Caller {
        Caller {
            user_id: self.user_id,
            role: self.role,
        }
    }
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let TypedHeader(CallerId(user_id)) = TypedHeader::<CallerId>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::missing_identity())?;
            let TypedHeader(CallerRole(role)) = TypedHeader::<CallerRole>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::missing_identity())?;

            Ok(AuthContext { user_id, role })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;

    async fn extract(headers: &[(&str, &str)]) -> Result<AuthContext, ApiError> {
        let mut req = Request::builder().uri("/");
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        let (mut parts, _) = req.body(()).unwrap().into_parts();
        AuthContext::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_forwarded_identity() {
        let id = Uuid::new_v4();
        let raw_id = id.to_string();
        let ctx = extract(&[("x-caller-id", raw_id.as_str()), ("x-caller-role", "Staff")])
            .await
            .unwrap();
        assert_eq!(ctx.caller(), Caller::staff(id));
    }

    #[tokio::test]
    async fn missing_or_garbled_identity_is_rejected() {
        let id = Uuid::new_v4().to_string();
        for headers in [
            vec![],
            vec![("x-caller-id", id.as_str())],
            vec![("x-caller-id", "not-a-uuid"), ("x-caller-role", "student")],
            vec![("x-caller-id", id.as_str()), ("x-caller-role", "dean")],
        ] {
            let err = extract(&headers).await.unwrap_err();
            assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        }
    }
}
