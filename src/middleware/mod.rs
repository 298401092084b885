mod key;

pub use key::{KeyError, KeyStrategy};

use crate::limiter::{RateLimitStatus, RateLimiter};
use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use actix_web::{HttpResponse, ResponseError};
use futures::future::{ok, LocalBoxFuture, Ready};
use once_cell::sync::Lazy;
use serde_json::json;
use std::rc::Rc;

pub static X_RATELIMIT_LIMIT: Lazy<HeaderName> =
    Lazy::new(|| HeaderName::from_static("x-ratelimit-limit"));

pub static X_RATELIMIT_REMAINING: Lazy<HeaderName> =
    Lazy::new(|| HeaderName::from_static("x-ratelimit-remaining"));

pub static X_RATELIMIT_RESET: Lazy<HeaderName> =
    Lazy::new(|| HeaderName::from_static("x-ratelimit-reset"));

/// Admission middleware that guards a route with a [RateLimiter].
///
/// Requests are keyed by the client's apparent network origin. Denied requests receive a
/// `429 Too Many Requests` JSON response with `retry-after` and `x-ratelimit-*` headers; allowed
/// responses carry the same `x-ratelimit-*` headers.
pub struct RateLimitGuard {
    limiter: RateLimiter,
    strategy: KeyStrategy,
}

impl RateLimitGuard {
    pub fn new(limiter: RateLimiter) -> Self {
        Self {
            limiter,
            strategy: KeyStrategy::RealIp,
        }
    }

    /// Key requests by the connection peer IP rather than the proxy-reported client IP.
    ///
    /// Suitable when clients connect directly to the application.
    pub fn key_by_peer_ip(mut self) -> Self {
        self.strategy = KeyStrategy::PeerIp;
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Transform = RateLimitMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RateLimitMiddleware {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            strategy: self.strategy,
        })
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    limiter: RateLimiter,
    strategy: KeyStrategy,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let limiter = self.limiter.clone();
        let strategy = self.strategy;

        Box::pin(async move {
            let key = match key::client_key(&req, strategy) {
                Ok(key) => key,
                Err(e) => {
                    log::error!("Unable to derive rate limit key: {e}");
                    return Ok(req.into_response(e.error_response()).map_into_right_body());
                }
            };

            let status = limiter.check(&key);
            if !status.allowed {
                log::debug!("Rate limit exceeded for {key}");
                return Ok(req
                    .into_response(denied_response(&status))
                    .map_into_right_body());
            }

            let mut service_response = service.call(req).await?;
            insert_status_headers(service_response.headers_mut(), &status);
            Ok(service_response.map_into_left_body())
        })
    }
}

fn insert_status_headers(map: &mut HeaderMap, status: &RateLimitStatus) {
    map.insert(X_RATELIMIT_LIMIT.clone(), HeaderValue::from(status.limit));
    map.insert(
        X_RATELIMIT_REMAINING.clone(),
        HeaderValue::from(status.remaining),
    );
    map.insert(
        X_RATELIMIT_RESET.clone(),
        HeaderValue::from(status.seconds_until_reset()),
    );
}

fn denied_response(status: &RateLimitStatus) -> HttpResponse {
    let mut response = HttpResponse::TooManyRequests()
        .json(json!({ "error": "Rate limit exceeded, try again later" }));
    let map = response.headers_mut();
    insert_status_headers(map, status);
    map.insert(RETRY_AFTER, HeaderValue::from(status.seconds_until_reset()));
    response
}
