//! Session extraction and the sign-in endpoints.

use std::sync::{Arc, OnceLock};

use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse};
use cb_core::error::AppError;
use cb_core::models::{Role, User};
use cb_core::traits::AuthProvider;
use chrono::{DateTime, Utc};
use futures_util::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::users::hash_off_thread;
use crate::AppState;

/// Cookie carrying the session token for browser clients.
pub const SESSION_COOKIE: &str = "cb_session";

/// An authenticated staff member. Extracting it rejects anonymous requests with 401.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub token_digest: String,
}

impl Session {
    /// Account management is reserved to admins.
    pub fn require_admin(&self) -> Result<(), ApiError> {
        match self.user.role {
            Role::Admin => Ok(()),
            Role::Editor => Err(ApiError(AppError::Forbidden("admin role required".into()))),
        }
    }
}

impl FromRequest for Session {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let token = presented_token(req);

        Box::pin(async move {
            let state = state.ok_or_else(|| ApiError(AppError::Internal("application state is not registered".into())))?;
            let token = token.ok_or_else(|| unauthorized("sign in required"))?;

            let digest = state.auth.token_digest(&token);
            let user = state
                .users
                .find_session(&digest, state.clock.now())
                .await?
                .ok_or_else(|| unauthorized("session expired or unknown"))?;

            Ok(Session {
                user,
                token_digest: digest,
            })
        })
    }
}

/// `Authorization: Bearer <token>` wins over the cookie.
fn presented_token(req: &HttpRequest) -> Option<String> {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

    bearer.or_else(|| req.cookie(SESSION_COOKIE).map(|cookie| cookie.value().to_string()))
}

fn unauthorized(message: &str) -> ApiError {
    ApiError(AppError::Unauthorized(message.to_string()))
}

/// Hash checked against when the email is unknown. Computed on first use.
static DECOY_HASH: OnceLock<String> = OnceLock::new();

async fn decoy_hash(auth: &Arc<dyn AuthProvider>) -> Result<String, ApiError> {
    if let Some(hash) = DECOY_HASH.get() {
        return Ok(hash.clone());
    }
    let hash = hash_off_thread(auth.clone(), "no account has this password".into()).await?;
    Ok(DECOY_HASH.get_or_init(|| hash).clone())
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SignedIn {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

pub async fn sign_in(data: web::Data<AppState>, body: web::Json<SignInRequest>) -> Result<HttpResponse, ApiError> {
    let SignInRequest { email, password } = body.into_inner();

    // 1. Credentials. An unknown email still pays for one verification,
    //    so response time does not reveal which accounts exist.
    let user = data.users.find_user_by_email(email.trim()).await?;
    let hash = match &user {
        Some(user) => user.password_hash.clone(),
        None => decoy_hash(&data.auth).await?,
    };
    let verified = data.auth.verify_password(&password, &hash).await;
    let user = match user {
        Some(user) if verified => user,
        _ => {
            log::info!("Rejected sign-in for {}", email.trim());
            return Err(unauthorized("invalid email or password"));
        }
    };

    // 2. Session. Only the digest is persisted.
    let token = data.auth.new_session_token()?;
    let expires_at = data.clock.now() + data.settings.session_ttl;
    data.users
        .create_session(&data.auth.token_digest(&token), &user.id, expires_at)
        .await?;
    log::info!("{} signed in", user.email);

    let cookie = Cookie::build(SESSION_COOKIE, token.clone())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(data.settings.secure_cookies)
        .max_age(time::Duration::seconds(data.settings.session_ttl.num_seconds()))
        .finish();

    Ok(HttpResponse::Ok().cookie(cookie).json(SignedIn {
        token,
        expires_at,
        user,
    }))
}

pub async fn sign_out(data: web::Data<AppState>, session: Session) -> Result<HttpResponse, ApiError> {
    data.users.delete_session(&session.token_digest).await?;
    log::info!("{} signed out", session.user.email);

    let mut cookie = Cookie::build(SESSION_COOKIE, "").path("/").finish();
    cookie.make_removal();
    Ok(HttpResponse::NoContent().cookie(cookie).finish())
}

pub async fn me(session: Session) -> HttpResponse {
    HttpResponse::Ok().json(session.user)
}
