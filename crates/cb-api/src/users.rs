//! Staff account management. Every endpoint here is admin-only.

use std::sync::Arc;

use actix_web::{web, HttpResponse};
use cb_core::error::AppError;
use cb_core::models::{Role, User, UserDraft};
use cb_core::traits::{AuthProvider, UserRepo};
use serde::Deserialize;

use crate::auth::Session;
use crate::error::{invalid, not_found, ApiError};
use crate::AppState;

/// Shortest password accepted for a staff account.
pub const MIN_PASSWORD_LEN: usize = 10;

fn check_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(invalid(format!("password must be at least {MIN_PASSWORD_LEN} characters")));
    }
    Ok(())
}

/// Runs the CPU-bound password hash on actix's blocking pool.
pub(crate) async fn hash_off_thread(auth: Arc<dyn AuthProvider>, password: String) -> Result<String, ApiError> {
    let hashed = web::block(move || auth.hash_password(&password))
        .await
        .map_err(|err| ApiError(AppError::Internal(format!("password hashing task failed: {err}"))))?;
    Ok(hashed?)
}

#[derive(Debug, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub password: String,
}

/// Validates and hashes a new account, then stores it.
///
/// Also used at startup to create the bootstrap admin.
pub async fn register(users: &dyn UserRepo, auth: Arc<dyn AuthProvider>, new_user: NewUser) -> Result<User, ApiError> {
    let email = new_user.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(invalid("a valid email is required"));
    }
    let display_name = new_user.display_name.trim().to_string();
    if display_name.is_empty() {
        return Err(invalid("display name is required"));
    }
    check_password(&new_user.password)?;

    let draft = UserDraft {
        email,
        display_name,
        role: new_user.role,
        password_hash: hash_off_thread(auth, new_user.password).await?,
    };
    Ok(users.create_user(draft).await?)
}

pub async fn list(data: web::Data<AppState>, session: Session) -> Result<HttpResponse, ApiError> {
    session.require_admin()?;
    Ok(HttpResponse::Ok().json(data.users.list_users().await?))
}

pub async fn create(
    data: web::Data<AppState>,
    session: Session,
    body: web::Json<NewUser>,
) -> Result<HttpResponse, ApiError> {
    session.require_admin()?;
    let user = register(data.users.as_ref(), data.auth.clone(), body.into_inner()).await?;

    log::info!("{} created {} account {}", session.user.email, user.role.as_str(), user.email);
    Ok(HttpResponse::Created().json(user))
}

#[derive(Debug, Default, Deserialize)]
pub struct UserChanges {
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub password: Option<String>,
}

pub async fn update(
    data: web::Data<AppState>,
    session: Session,
    path: web::Path<String>,
    body: web::Json<UserChanges>,
) -> Result<HttpResponse, ApiError> {
    session.require_admin()?;
    let id = path.into_inner();
    let changes = body.into_inner();
    let mut user = data.users.get_user(&id).await?.ok_or_else(|| not_found("user", &id))?;

    if let Some(display_name) = changes.display_name {
        let display_name = display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(invalid("display name is required"));
        }
        user.display_name = display_name;
    }
    if let Some(role) = changes.role {
        // Demoting yourself could leave nobody able to manage accounts.
        if user.id == session.user.id && role != Role::Admin {
            return Err(ApiError(AppError::Conflict("admins cannot demote themselves".into())));
        }
        user.role = role;
    }
    if let Some(password) = changes.password {
        check_password(&password)?;
        user.password_hash = hash_off_thread(data.auth.clone(), password).await?;
    }

    if !data.users.update_user(user.clone()).await? {
        return Err(not_found("user", &id));
    }
    log::info!("{} updated account {}", session.user.email, user.email);
    Ok(HttpResponse::Ok().json(user))
}

pub async fn delete(data: web::Data<AppState>, session: Session, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    session.require_admin()?;
    let id = path.into_inner();
    if id == session.user.id {
        return Err(ApiError(AppError::Conflict("admins cannot delete their own account".into())));
    }
    if !data.users.delete_user(&id).await? {
        return Err(not_found("user", &id));
    }
    log::info!("{} deleted account {id}", session.user.email);
    Ok(HttpResponse::NoContent().finish())
}
