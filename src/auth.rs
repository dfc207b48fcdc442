//! Bearer-token authentication.
//!
//! Tokens are opaque strings issued at registration. Anything fancier
//! (passwords, JWT, refresh) belongs in front of this service.

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use uuid::Uuid;

use crate::db::Database;
use crate::dto::RegisterInput;
use crate::error::AppError;
use crate::models::{NewUser, User};
use crate::query;

const MAX_USERNAME: usize = 150;

/// The user a request acts for. Handlers taking this reject
/// unauthenticated requests with 401 before running.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl AuthenticatedUser {
    pub fn id(&self) -> i32 {
        self.0.id
    }
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return None;
    }
    Some(token.trim().to_string())
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let token = bearer_token(req);
        let database = req.app_data::<web::Data<Database>>().cloned();

        Box::pin(async move {
            let token = token.ok_or(AppError::Unauthorized)?;
            let database = database.ok_or_else(|| {
                log::error!("database missing from app data");
                AppError::Unavailable
            })?;

            database
                .run(move |conn| query::find_user_by_token(conn, &token))
                .await?
                .map(AuthenticatedUser)
                .ok_or(AppError::Unauthorized)
        })
    }
}

pub fn register(conn: &mut diesel::SqliteConnection, input: &RegisterInput) -> Result<User, AppError> {
    if input.username.trim().is_empty() {
        return Err(AppError::validation("username: This field may not be blank."));
    }
    if input.username.chars().count() > MAX_USERNAME {
        return Err(AppError::validation(format!(
            "username: Ensure this field has no more than {MAX_USERNAME} characters."
        )));
    }
    if !input.email.contains('@') {
        return Err(AppError::validation("email: Enter a valid email address."));
    }

    let token = Uuid::new_v4().simple().to_string();
    let user = query::insert_user(
        conn,
        &NewUser {
            username: &input.username,
            email: &input.email,
            token: &token,
        },
    )?;
    log::info!("registered user {}", user.id);
    Ok(user)
}
