/// Auth Gate Middleware
///
/// Authenticates the token from the `Authorization` header or the `token`
/// query parameter and injects the `AuthenticatedSubject` into request
/// extensions for use by route handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::AuthGate;
use crate::error::AppError;

/// Must wrap every scope that requires authentication
pub struct AuthGateMiddleware {
    gate: AuthGate,
}

impl AuthGateMiddleware {
    pub fn new(gate: AuthGate) -> Self {
        Self { gate }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthGateMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthGateMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(AuthGateMiddlewareService {
            service: Rc::new(service),
            gate: self.gate.clone(),
        }))
    }
}

pub struct AuthGateMiddlewareService<S> {
    service: Rc<S>,
    gate: AuthGate,
}

impl<S, B> Service<ServiceRequest> for AuthGateMiddlewareService<S>
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
        match self.gate.authenticate(req.request()) {
            Ok(subject) => {
                req.extensions_mut().insert(subject);

                tracing::debug!(user_id = subject.user_id, "Token accepted");

                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            Err(e) => {
                let error: Error = AppError::from(e).into();
                Box::pin(async move { Err(error) })
            }
        }
    }
}
