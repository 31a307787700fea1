// Authentication middleware for Whisper Gateway
//
// Verifies the bearer token of incoming requests and attaches the resulting
// `AuthenticatedUser` to the request. OPTIONS requests and the public paths
// (health, catalogs, metrics) are let through untouched.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    web, Error, FromRequest, HttpMessage, HttpRequest, ResponseError,
};
use futures::future::{ok, ready, LocalBoxFuture, Ready};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use crate::config::env_flag;
use crate::error::HandlerError;
use crate::metrics::Metrics;

/// Default setting for authorization requirement
const DEFAULT_ENABLE_AUTHORIZATION: bool = true;

/// Paths reachable without a token
pub const PUBLIC_PATHS: &[&str] = &["/health", "/models", "/languages", "/metrics"];

/// Helper function to check if authorization is enabled
pub fn is_authorization_enabled() -> bool {
    env_flag("ENABLE_AUTHORIZATION", DEFAULT_ENABLE_AUTHORIZATION)
}

/// Identity attached to an authenticated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub uid: String,
    pub email: Option<String>,
    pub is_anonymous: bool,
}

impl AuthenticatedUser {
    pub fn anonymous() -> Self {
        Self {
            uid: "anonymous".to_string(),
            email: None,
            is_anonymous: true,
        }
    }
}

/// Available to handlers behind the middleware
impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthenticatedUser>()
                .cloned()
                .ok_or_else(|| HandlerError::Unauthorized("No authenticated user".to_string()).into()),
        )
    }
}

/// Turns a bearer token into an identity
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Option<AuthenticatedUser>;
}

/// Fixed token table, configured as `token=uid[:email],...`
#[derive(Debug, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, AuthenticatedUser>,
}

impl StaticTokenVerifier {
    /// Reads the table from `API_TOKENS`
    pub fn from_env() -> Self {
        let verifier = Self::parse(&env::var("API_TOKENS").unwrap_or_default());
        if verifier.is_empty() && is_authorization_enabled() {
            warn!("API_TOKENS is empty: every authenticated request will be rejected");
        }
        verifier
    }

    /// Malformed entries are skipped with a warning
    pub fn parse(table: &str) -> Self {
        let mut tokens = HashMap::new();

        for entry in table.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((token, identity)) = entry.split_once('=') else {
                warn!("Ignoring API_TOKENS entry without '=': {}", entry);
                continue;
            };
            let token = token.trim();
            let (uid, email) = match identity.split_once(':') {
                Some((uid, email)) => (uid.trim(), Some(email.trim())),
                None => (identity.trim(), None),
            };
            if token.is_empty() || uid.is_empty() {
                warn!("Ignoring incomplete API_TOKENS entry");
                continue;
            }
            tokens.insert(
                token.to_string(),
                AuthenticatedUser {
                    uid: uid.to_string(),
                    email: email.filter(|e| !e.is_empty()).map(str::to_string),
                    is_anonymous: false,
                },
            );
        }

        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Option<AuthenticatedUser> {
        self.tokens.get(token).cloned()
    }
}

/// Middleware factory for authentication
#[derive(Clone)]
pub struct Authentication {
    verifier: Arc<dyn TokenVerifier>,
    enabled: bool,
}

impl Authentication {
    pub fn new(verifier: Arc<dyn TokenVerifier>, enabled: bool) -> Self {
        Self { verifier, enabled }
    }

    /// Token table from `API_TOKENS`, switch from `ENABLE_AUTHORIZATION`
    pub fn from_env() -> Self {
        Self::new(
            Arc::new(StaticTokenVerifier::from_env()),
            is_authorization_enabled(),
        )
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthenticationMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        if !self.enabled {
            info!("Authentication requirement is disabled via configuration");
        }
        ok(AuthenticationMiddleware {
            service,
            verifier: Arc::clone(&self.verifier),
            enabled: self.enabled,
        })
    }
}

/// Authentication middleware implementation
pub struct AuthenticationMiddleware<S> {
    service: S,
    verifier: Arc<dyn TokenVerifier>,
    enabled: bool,
}

impl<S, B> Service<ServiceRequest> for AuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if req.method() == actix_web::http::Method::OPTIONS
            || PUBLIC_PATHS.contains(&req.path())
        {
            debug!("{} {} - bypassing authentication check", req.method(), req.path());
            let fut = self.service.call(req);
            return Box::pin(async move { Ok(fut.await?.map_into_left_body()) });
        }

        let metrics = req.app_data::<web::Data<Metrics>>().cloned();

        match self.authenticate(&req) {
            Ok(user) => {
                debug!("Request authenticated as {}", user.uid);
                let status = if user.is_anonymous { "anonymous" } else { "success" };
                req.extensions_mut().insert(user);
                let fut = self.service.call(req);
                Box::pin(async move {
                    if let Some(metrics) = metrics {
                        metrics.record_auth_attempt(status).await;
                    }
                    Ok(fut.await?.map_into_left_body())
                })
            }
            Err((status, error)) => Box::pin(async move {
                if let Some(metrics) = metrics {
                    metrics.record_auth_attempt(status).await;
                }
                let response = error.error_response().map_into_right_body();
                Ok(req.into_response(response))
            }),
        }
    }
}

impl<S> AuthenticationMiddleware<S> {
    /// Resolves the caller, or the metrics label and error to reject with
    fn authenticate(
        &self,
        req: &ServiceRequest,
    ) -> Result<AuthenticatedUser, (&'static str, HandlerError)> {
        if !self.enabled {
            return Ok(AuthenticatedUser::anonymous());
        }

        let Some(auth_header) = req.headers().get(header::AUTHORIZATION) else {
            warn!("Missing Authorization header");
            return Err((
                "missing_header",
                HandlerError::Unauthorized("Authorization header is required".to_string()),
            ));
        };

        let token = auth_header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty());

        let Some(token) = token else {
            warn!("Invalid Authorization header format, missing 'Bearer' prefix");
            return Err((
                "malformed_header",
                HandlerError::Unauthorized(
                    "Invalid Authorization header format. Must be 'Bearer <token>'".to_string(),
                ),
            ));
        };

        self.verifier.verify(token).ok_or_else(|| {
            warn!("Rejected unknown bearer token");
            (
                "invalid_token",
                HandlerError::Unauthorized("Invalid token".to_string()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_table() {
        let verifier = StaticTokenVerifier::parse(
            "abc=alice:alice@example.com, def = bob ,broken, =nouser, ghi=",
        );

        assert_eq!(verifier.len(), 2);
        assert_eq!(
            verifier.verify("abc"),
            Some(AuthenticatedUser {
                uid: "alice".to_string(),
                email: Some("alice@example.com".to_string()),
                is_anonymous: false,
            })
        );
        assert_eq!(verifier.verify("def").map(|u| u.uid), Some("bob".to_string()));
        assert!(verifier.verify("ghi").is_none());
        assert!(verifier.verify("nope").is_none());
    }

    #[test]
    fn empty_table() {
        assert!(StaticTokenVerifier::parse("").is_empty());
    }
}
