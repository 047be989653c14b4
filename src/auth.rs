//! Bearer-token validation and role capabilities.
//!
//! [`JwtAuth`] wraps the `/api` scope: it decodes the token, refuses revoked
//! identifiers and leaves an [`AuthUser`] in the request extensions. Handlers then
//! state the roles they accept through the [`Authorized`] extractor, which runs
//! before the handler body.

use std::future::{ready, Ready};
use std::marker::PhantomData;
use std::ops::Deref;
use std::rc::Rc;
use std::sync::Arc;

use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, FromRequest, HttpMessage, HttpRequest,
};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::ServiceError;
use crate::models::UserRole;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub jti: String,
    pub exp: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i32,
    pub role: UserRole,
    pub jti: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Token issuance belongs to the identity service; this exists for tooling and tests.
pub fn issue_token(user_id: i32, role: UserRole, secret: &str, ttl: Duration) -> Result<String, ServiceError> {
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.as_str().to_string(),
        jti: Uuid::new_v4().simple().to_string(),
        exp: (Utc::now() + ttl).timestamp().max(0) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| ServiceError::internal(format!("Failed to sign token: {}", e)))
}

pub fn decode_token(token: &str, secret: &str) -> Result<AuthUser, ServiceError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| ServiceError::Auth(format!("Invalid token: {}", e)))?;

    let id = data
        .claims
        .sub
        .parse::<i32>()
        .map_err(|_| ServiceError::Auth("Invalid token subject".to_string()))?;
    let role = data
        .claims
        .role
        .parse::<UserRole>()
        .map_err(|_| ServiceError::Auth("Invalid token role".to_string()))?;

    Ok(AuthUser {
        id,
        role,
        jti: data.claims.jti,
    })
}

pub fn bearer_token(req: &ServiceRequest) -> Result<String, ServiceError> {
    let header = req
        .headers()
        .get("Authorization")
        .ok_or_else(|| ServiceError::Auth("Missing Authorization header".to_string()))?;
    let value = header
        .to_str()
        .map_err(|_| ServiceError::Auth("Malformed Authorization header".to_string()))?;
    value
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ServiceError::Auth("Expected a bearer token".to_string()))
}

pub fn is_revoked(conn: &mut PgConnection, token_id: &str) -> Result<bool, ServiceError> {
    use crate::schema::token_blocklist::dsl::{jti, token_blocklist};

    let found: Option<String> = token_blocklist
        .filter(jti.eq(token_id))
        .select(jti)
        .first(conn)
        .optional()?;
    Ok(found.is_some())
}

pub fn revoke(conn: &mut PgConnection, token_id: &str) -> Result<(), ServiceError> {
    use crate::schema::token_blocklist::dsl::{jti, revoked_at, token_blocklist};

    diesel::insert_into(token_blocklist)
        .values((jti.eq(token_id), revoked_at.eq(Utc::now().naive_utc())))
        .on_conflict_do_nothing()
        .execute(conn)?;
    Ok(())
}

/// Middleware that requires a valid, unrevoked bearer token.
///
/// ```rust,ignore
/// web::scope("/api")
///     .wrap(JwtAuth::new(config.jwt_secret.clone()))
///     .service(list_meetings)
/// ```
pub struct JwtAuth {
    secret: Arc<String>,
}

impl JwtAuth {
    pub fn new(secret: String) -> Self {
        Self {
            secret: Arc::new(secret),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddleware {
            service: Rc::new(service),
            secret: self.secret.clone(),
        }))
    }
}

pub struct JwtAuthMiddleware<S> {
    service: Rc<S>,
    secret: Arc<String>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddleware<S>
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
        let svc = self.service.clone();
        let secret = self.secret.clone();

        Box::pin(async move {
            let token = bearer_token(&req)?;
            let user = decode_token(&token, &secret)?;

            let pool = req
                .app_data::<web::Data<DbPool>>()
                .ok_or_else(|| ServiceError::internal("Database pool not configured"))?
                .clone();
            let token_id = user.jti.clone();
            let revoked = web::block(move || {
                let mut conn = pool.get()?;
                is_revoked(&mut conn, &token_id)
            })
            .await
            .map_err(ServiceError::from)??;

            if revoked {
                log::warn!("Rejected revoked token for user {}", user.id);
                return Err(ServiceError::Auth("Token has been revoked".to_string()).into());
            }

            req.extensions_mut().insert(user);
            svc.call(req).await
        })
    }
}

impl FromRequest for AuthUser {
    type Error = ServiceError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| ServiceError::Auth("Authentication required".to_string())),
        )
    }
}

/// A set of roles allowed to reach a handler.
pub trait Capability {
    const ROLES: &'static [UserRole];
    const DESCRIPTION: &'static str;
}

pub struct AdminOnly;
pub struct SellerOnly;
pub struct BuyerOnly;
pub struct AnyRole;

impl Capability for AdminOnly {
    const ROLES: &'static [UserRole] = &[UserRole::Admin];
    const DESCRIPTION: &'static str = "admin";
}

impl Capability for SellerOnly {
    const ROLES: &'static [UserRole] = &[UserRole::Seller];
    const DESCRIPTION: &'static str = "seller";
}

impl Capability for BuyerOnly {
    const ROLES: &'static [UserRole] = &[UserRole::Buyer];
    const DESCRIPTION: &'static str = "buyer";
}

impl Capability for AnyRole {
    const ROLES: &'static [UserRole] = &[UserRole::Buyer, UserRole::Seller, UserRole::Admin];
    const DESCRIPTION: &'static str = "authenticated";
}

/// Authenticated user whose role is one of `C::ROLES`.
pub struct Authorized<C: Capability> {
    pub user: AuthUser,
    _capability: PhantomData<C>,
}

impl<C: Capability> Authorized<C> {
    pub fn check(user: AuthUser) -> Result<Self, ServiceError> {
        if C::ROLES.contains(&user.role) {
            Ok(Self {
                user,
                _capability: PhantomData,
            })
        } else {
            Err(ServiceError::forbidden(format!(
                "{} access required, caller is {}",
                C::DESCRIPTION,
                user.role
            )))
        }
    }

    pub fn into_inner(self) -> AuthUser {
        self.user
    }
}

impl<C: Capability> Deref for Authorized<C> {
    type Target = AuthUser;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl<C: Capability> FromRequest for Authorized<C> {
    type Error = ServiceError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let user = req
            .extensions()
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ServiceError::Auth("Authentication required".to_string()));
        ready(user.and_then(Self::check))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_token_round_trip() {
        let token = issue_token(42, UserRole::Seller, SECRET, Duration::hours(1)).unwrap();
        let user = decode_token(&token, SECRET).unwrap();
        assert_eq!(user.id, 42);
        assert_eq!(user.role, UserRole::Seller);
        assert_eq!(user.jti.len(), 32);
    }

    #[test]
    fn test_wrong_secret_is_auth_error() {
        let token = issue_token(1, UserRole::Buyer, SECRET, Duration::hours(1)).unwrap();
        let err = decode_token(&token, "other-secret").unwrap_err();
        assert_eq!(err.kind(), "AUTH");
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let token = issue_token(1, UserRole::Buyer, SECRET, Duration::hours(-2)).unwrap();
        assert!(decode_token(&token, SECRET).is_err());
    }

    #[test]
    fn test_bearer_token_extraction() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc.def.ghi"))
            .to_srv_request();
        assert_eq!(bearer_token(&req).unwrap(), "abc.def.ghi");

        let req = TestRequest::default()
            .insert_header(("Authorization", "Basic Zm9vOmJhcg=="))
            .to_srv_request();
        assert!(bearer_token(&req).is_err());

        let req = TestRequest::default().to_srv_request();
        assert!(bearer_token(&req).is_err());
    }

    fn user(role: UserRole) -> AuthUser {
        AuthUser {
            id: 7,
            role,
            jti: "j".into(),
        }
    }

    #[test]
    fn test_capability_checks() {
        assert!(Authorized::<AdminOnly>::check(user(UserRole::Admin)).is_ok());
        assert!(Authorized::<SellerOnly>::check(user(UserRole::Seller)).is_ok());
        assert!(Authorized::<AnyRole>::check(user(UserRole::Buyer)).is_ok());

        let err = Authorized::<AdminOnly>::check(user(UserRole::Seller)).err().unwrap();
        assert_eq!(err.kind(), "FORBIDDEN");
        let err = Authorized::<BuyerOnly>::check(user(UserRole::Seller)).err().unwrap();
        assert_eq!(err.kind(), "FORBIDDEN");
    }

    #[actix_web::test]
    async fn test_extractor_reads_request_extensions() {
        let req = TestRequest::default().to_http_request();
        req.extensions_mut().insert(user(UserRole::Buyer));

        let authorized = Authorized::<BuyerOnly>::extract(&req).await.unwrap();
        assert_eq!(authorized.id, 7);
        assert!(Authorized::<SellerOnly>::extract(&req).await.is_err());
    }

    async fn whoami(user: AuthUser) -> actix_web::HttpResponse {
        actix_web::HttpResponse::Ok().body(user.id.to_string())
    }

    macro_rules! status_of {
        ($app:expr, $req:expr) => {
            match actix_web::test::try_call_service(&$app, $req).await {
                Ok(res) => res.status(),
                Err(err) => err.as_response_error().status_code(),
            }
        };
    }

    #[actix_web::test]
    async fn test_middleware_rejects_before_touching_the_database() {
        let app = actix_web::test::init_service(
            actix_web::App::new().service(
                web::scope("/api")
                    .wrap(JwtAuth::new(SECRET.to_string()))
                    .route("/me", web::get().to(whoami)),
            ),
        )
        .await;

        let req = TestRequest::get().uri("/api/me").to_request();
        assert_eq!(status_of!(app, req), 401);

        let forged = issue_token(3, UserRole::Admin, "other-secret", Duration::hours(1)).unwrap();
        let req = TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", format!("Bearer {}", forged)))
            .to_request();
        assert_eq!(status_of!(app, req), 401);

        let req = TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", "Token abc"))
            .to_request();
        assert_eq!(status_of!(app, req), 401);

        // A well-formed token still needs the blocklist lookup.
        let token = issue_token(3, UserRole::Admin, SECRET, Duration::hours(1)).unwrap();
        let req = TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        assert_eq!(status_of!(app, req), 500);
    }

    #[actix_web::test]
    async fn test_missing_user_is_unauthenticated() {
        let req = TestRequest::default().to_http_request();
        let err = AuthUser::extract(&req).await.unwrap_err();
        assert_eq!(err.kind(), "AUTH");
    }
}
