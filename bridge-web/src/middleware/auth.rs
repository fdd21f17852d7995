//! Shared-secret authentication middleware.
//!
//! Protected routes and the device transport require the `X-Api-Key` header
//! to match the configured secret; absence or mismatch yields 401. The
//! secret is immutable configuration loaded once at startup.

use actix_service::{Service, Transform};
use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    error::ErrorInternalServerError,
    http::Method,
    Error, HttpResponse,
};
use bridge_common::BridgeAppContext;
use bridge_models::{constants::API_KEY_HEADER, web::WebResponse};
use futures::{
    future::{ok, LocalBoxFuture, Ready},
    FutureExt,
};
use std::{
    cell::RefCell,
    rc::Rc,
    task::{Context, Poll},
};

/// API-key middleware factory.
pub struct ApiKeyAuth;

impl<S, B> Transform<S, ServiceRequest> for ApiKeyAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = ApiKeyAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(ApiKeyAuthMiddleware {
            service: Rc::new(RefCell::new(service)),
        })
    }
}

pub struct ApiKeyAuthMiddleware<S> {
    service: Rc<RefCell<S>>,
}

impl<S, B> Service<ServiceRequest> for ApiKeyAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = S::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();
        async move {
            // Fast path for OPTIONS requests
            if Method::OPTIONS == req.method() {
                return srv.call(req).await.map(|res| res.map_into_left_body());
            }

            let expected = {
                let ctx = BridgeAppContext::instance().await;
                ctx.settings()
                    .map_err(ErrorInternalServerError)?
                    .web
                    .api_key
                    .clone()
            };

            let presented = req
                .headers()
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok());

            let authorized = presented
                .map(|key| constant_time_eq(key.as_bytes(), expected.as_bytes()))
                .unwrap_or(false);
            if !authorized {
                return Ok(req
                    .into_response(
                        HttpResponse::Unauthorized()
                            .json(WebResponse::<()>::error("Invalid or missing API key")),
                    )
                    .map_into_right_body());
            }

            srv.call(req).await.map(|res| res.map_into_left_body())
        }
        .boxed_local()
    }
}

/// Length-guarded constant-time comparison; the fold never short-circuits
/// on a mismatching byte.
#[inline]
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::constant_time_eq;

    #[test]
    fn equality_by_content() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret "));
        assert!(!constant_time_eq(b"", b"secret"));
        assert!(constant_time_eq(b"", b""));
    }
}
