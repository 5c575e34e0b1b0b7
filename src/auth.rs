use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::error;
use mongodb::bson::doc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::{PublicUser, User};

pub const AUTH_COOKIE: &str = "token";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

#[derive(Deserialize)]
pub struct SignupRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub profile_pic: Option<String>,
}

// Session JWT, 24h lifetime.
pub fn create_jwt(user_id: &str, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = Utc::now() + Duration::hours(24);
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration.timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Authenticated user id stashed in request extensions by the gate middleware.
pub fn current_user(req: &HttpRequest) -> Option<String> {
    req.extensions().get::<String>().cloned()
}

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

pub fn valid_email(email: &str) -> bool {
    // Shape check only; deliverability is the SMTP relay's problem.
    EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"))
        .is_match(email)
}

fn auth_cookie(token: String) -> Cookie<'static> {
    Cookie::build(AUTH_COOKIE, token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::hours(24))
        .finish()
}

fn cleared_cookie() -> Cookie<'static> {
    Cookie::build(AUTH_COOKIE, "")
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::ZERO)
        .finish()
}

// POST /api/auth/signup
pub async fn signup(
    data: web::Data<AppState>,
    payload: web::Json<SignupRequest>,
) -> impl Responder {
    if !valid_email(&payload.email) {
        return HttpResponse::BadRequest().json(serde_json::json!({ "message": "Invalid email address" }));
    }
    if payload.password.len() < 6 {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({ "message": "Password must be at least 6 characters" }));
    }
    if payload.full_name.trim().is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({ "message": "Full name is required" }));
    }

    let users = data.mongodb.db.collection::<User>("users");

    match users.find_one(doc! { "email": &payload.email }).await {
        Ok(Some(_)) => {
            return HttpResponse::BadRequest()
                .json(serde_json::json!({ "message": "Email already in use" }));
        }
        Ok(None) => {}
        Err(e) => {
            error!("Error checking existing user: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }));
        }
    }

    let hashed = match hash(&payload.password, DEFAULT_COST) {
        Ok(h) => h,
        Err(e) => {
            error!("Error hashing password: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }));
        }
    };

    let new_user = User {
        user_id: Uuid::new_v4().to_string(),
        full_name: payload.full_name.clone(),
        email: payload.email.clone(),
        password: hashed,
        profile_pic: String::new(),
        created_at: Utc::now(),
    };

    if let Err(e) = users.insert_one(&new_user).await {
        error!("Error creating user: {}", e);
        return HttpResponse::InternalServerError()
            .json(serde_json::json!({ "message": "Internal Server Error" }));
    }

    let token = match create_jwt(&new_user.user_id, &data.config.jwt_secret) {
        Ok(t) => t,
        Err(e) => {
            error!("Error signing session token: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }));
        }
    };

    HttpResponse::Created()
        .cookie(auth_cookie(token))
        .json(PublicUser::from(new_user))
}

// POST /api/auth/login
pub async fn login(
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> impl Responder {
    let users = data.mongodb.db.collection::<User>("users");

    let user = match users.find_one(doc! { "email": &payload.email }).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({ "message": "Invalid credentials" }));
        }
        Err(e) => {
            error!("Error logging in: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }));
        }
    };

    if !verify(&payload.password, &user.password).unwrap_or(false) {
        return HttpResponse::Unauthorized()
            .json(serde_json::json!({ "message": "Invalid credentials" }));
    }

    let token = match create_jwt(&user.user_id, &data.config.jwt_secret) {
        Ok(t) => t,
        Err(e) => {
            error!("Error signing session token: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }));
        }
    };

    HttpResponse::Ok()
        .cookie(auth_cookie(token))
        .json(PublicUser::from(user))
}

// POST /api/auth/logout
pub async fn logout() -> impl Responder {
    HttpResponse::Ok()
        .cookie(cleared_cookie())
        .json(serde_json::json!({ "message": "Logged out" }))
}

// GET /api/auth/check
// Session restore for the SPA: returns the user behind the cookie.
pub async fn check(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let current = match current_user(&req) {
        Some(uid) => uid,
        None => {
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({ "message": "Unauthorized" }));
        }
    };

    let users = data.mongodb.db.collection::<User>("users");
    match users.find_one(doc! { "user_id": &current }).await {
        Ok(Some(user)) => HttpResponse::Ok().json(PublicUser::from(user)),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({ "message": "User not found" })),
        Err(e) => {
            error!("Error fetching user: {}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }))
        }
    }
}

// PUT /api/auth/update-profile
pub async fn update_profile(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<UpdateProfileRequest>,
) -> impl Responder {
    let current = match current_user(&req) {
        Some(uid) => uid,
        None => {
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({ "message": "Unauthorized" }));
        }
    };

    let mut set_doc = doc! {};
    if let Some(full_name) = &payload.full_name {
        if full_name.trim().is_empty() {
            return HttpResponse::BadRequest()
                .json(serde_json::json!({ "message": "Full name cannot be empty" }));
        }
        set_doc.insert("full_name", full_name);
    }
    if let Some(profile_pic) = &payload.profile_pic {
        set_doc.insert("profile_pic", profile_pic);
    }
    if set_doc.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({ "message": "No fields to update" }));
    }

    let users = data.mongodb.db.collection::<User>("users");
    if let Err(e) = users
        .update_one(doc! { "user_id": &current }, doc! { "$set": set_doc })
        .await
    {
        error!("Error updating profile: {}", e);
        return HttpResponse::InternalServerError()
            .json(serde_json::json!({ "message": "Internal Server Error" }));
    }

    match users.find_one(doc! { "user_id": &current }).await {
        Ok(Some(user)) => HttpResponse::Ok().json(PublicUser::from(user)),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({ "message": "User not found" })),
        Err(e) => {
            error!("Error fetching user: {}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwt_round_trip() {
        let token = create_jwt("user-123", "test-secret").unwrap();
        let claims = validate_jwt(&token, "test-secret").unwrap();
        assert_eq!(claims.sub, "user-123");
    }

    #[test]
    fn jwt_rejects_wrong_secret() {
        let token = create_jwt("user-123", "test-secret").unwrap();
        assert!(validate_jwt(&token, "other-secret").is_err());
    }

    #[test]
    fn jwt_rejects_expired() {
        let expired = Claims {
            sub: "user-123".to_string(),
            exp: (Utc::now() - Duration::hours(2)).timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &expired,
            &EncodingKey::from_secret("test-secret".as_ref()),
        )
        .unwrap();
        assert!(validate_jwt(&token, "test-secret").is_err());
    }

    #[test]
    fn email_shape_check() {
        assert!(valid_email("dev@example.com"));
        assert!(valid_email("a.b+c@sub.domain.io"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing@tld"));
        assert!(!valid_email("spaces in@mail.com"));
    }
}
