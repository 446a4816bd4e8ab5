use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    middleware::Logger,
    Error,
};
use futures::future::LocalBoxFuture;
use log::info;
use std::rc::Rc;
use std::time::Instant;

use crate::auth::gate::TOKEN_PARAM;

/// Request logging middleware
///
/// Logs method, path, status and latency of every request. Token values in
/// the query string are masked.
pub struct LoggerMiddleware;

/// Query string with the value of every `token` parameter replaced
fn redact_query(query: &str) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if key == TOKEN_PARAM => format!("{}=[REDACTED]", key),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Path plus redacted query string
fn redacted_target(req: &ServiceRequest) -> String {
    let query = redact_query(req.query_string());
    if query.is_empty() {
        req.path().to_string()
    } else {
        format!("{}?{}", req.path(), query)
    }
}

/// Access log in the usual actix layout, with the request line rebuilt from
/// the redacted target instead of the raw `%r`
pub fn access_log() -> Logger {
    Logger::new(r#"%a "%{request_line}xi" %s %b %T"#).custom_request_replace(
        "request_line",
        |req: &ServiceRequest| {
            format!("{} {} {:?}", req.method(), redacted_target(req), req.version())
        },
    )
}

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggerMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(LoggerMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();

        info!("Request started: {} {}", method, redacted_target(&req));

        let service = self.service.clone();

        Box::pin(async move {
            let res = service.call(req).await?;

            info!(
                "Request completed: {} {} - Status: {} ({}ms)",
                method,
                path,
                res.status().as_u16(),
                start_time.elapsed().as_millis()
            );

            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_query_masks_tokens_only() {
        assert_eq!(redact_query(""), "");
        assert_eq!(redact_query("page=2"), "page=2");
        assert_eq!(
            redact_query("token=abc.def.ghi&page=2"),
            "token=[REDACTED]&page=2"
        );
    }

    #[test]
    fn test_redacted_target() {
        let req = actix_web::test::TestRequest::with_uri("/auth/verify?token=abc.def.ghi")
            .to_srv_request();
        assert_eq!(redacted_target(&req), "/auth/verify?token=[REDACTED]");

        let req = actix_web::test::TestRequest::with_uri("/health_check").to_srv_request();
        assert_eq!(redacted_target(&req), "/health_check");
    }
}
