use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{error, info, warn};
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::{current_user, valid_email};
use crate::models::{Invite, Project, Role, TeamMember, User};

/// Invite tokens live for 48 hours.
const INVITE_TTL_HOURS: i64 = 48;

/// Signed payload of an invite link: who may accept it, with which role,
/// into which project.
#[derive(Debug, Serialize, Deserialize)]
pub struct InviteClaims {
    pub email: String,
    pub role: Role,
    pub project_id: String,
    pub exp: usize,
}

#[derive(Debug, Deserialize)]
pub struct SendInviteRequest {
    pub email: String,
    pub role: Role,
    pub project_id: String,
}

pub fn issue_invite_token(
    email: &str,
    role: Role,
    project_id: &str,
    secret: &str,
    issued_at: DateTime<Utc>,
) -> Result<(String, DateTime<Utc>), jsonwebtoken::errors::Error> {
    let expires_at = issued_at + Duration::hours(INVITE_TTL_HOURS);
    let claims = InviteClaims {
        email: email.to_string(),
        role,
        project_id: project_id.to_string(),
        exp: expires_at.timestamp() as usize,
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))?;
    Ok((token, expires_at))
}

pub fn decode_invite_token(
    token: &str,
    secret: &str,
) -> Result<InviteClaims, jsonwebtoken::errors::Error> {
    let data = decode::<InviteClaims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

// POST /api/invite
// Owner/admin of the project signs a time-bound token for the invitee's
// email and mails the accept link. The invite document is kept for tracking
// and consumed on accept.
pub async fn send_invite(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<SendInviteRequest>,
) -> impl Responder {
    let current = match current_user(&req) {
        Some(uid) => uid,
        None => {
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({ "message": "Unauthorized" }));
        }
    };

    if !valid_email(&payload.email) {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({ "message": "Invalid email address" }));
    }

    let projects = data.mongodb.db.collection::<Project>("projects");
    let project = match projects.find_one(doc! { "project_id": &payload.project_id }).await {
        Ok(Some(project)) => project,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({ "message": "Project not found" }));
        }
        Err(e) => {
            error!("Error fetching project: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }));
        }
    };

    match project.member_role(&current) {
        Some(role) if role.can_manage() => {}
        Some(_) | None => {
            return HttpResponse::Forbidden()
                .json(serde_json::json!({ "message": "Access denied. Admins and owners only." }));
        }
    }

    let (token, expires_at) = match issue_invite_token(
        &payload.email,
        payload.role,
        &payload.project_id,
        &data.config.jwt_secret,
        Utc::now(),
    ) {
        Ok(pair) => pair,
        Err(e) => {
            error!("Error signing invite token: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }));
        }
    };

    let invite = Invite {
        invite_id: Uuid::new_v4().to_string(),
        email: payload.email.clone(),
        role: payload.role,
        token: token.clone(),
        project: payload.project_id.clone(),
        expires_at,
        created_at: Utc::now(),
    };

    let invites = data.mongodb.db.collection::<Invite>("invites");
    if let Err(e) = invites.insert_one(&invite).await {
        error!("Error saving invite: {}", e);
        return HttpResponse::InternalServerError()
            .json(serde_json::json!({ "message": "Internal Server Error" }));
    }

    // Best effort: a failed email leaves a valid invite in the database.
    if let Some(mailer) = &data.mailer {
        let invite_link = format!("{}/accept-invite/{}", data.config.frontend_origin, token);
        if let Err(e) = mailer.send_invite(&payload.email, &project.name, &invite_link).await {
            warn!("Failed to send invite email to {}: {}", payload.email, e);
        }
    } else {
        warn!("SMTP not configured, invite email to {} skipped", payload.email);
    }

    info!("Invite sent for project {} to {}", payload.project_id, payload.email);
    HttpResponse::Ok().json(serde_json::json!({ "message": "Invite sent" }))
}

// GET /api/invite/{token}
// Lets the SPA decide whether to route the invitee to signup or login.
pub async fn get_invite_info(
    data: web::Data<AppState>,
    token: web::Path<String>,
) -> impl Responder {
    let claims = match decode_invite_token(&token, &data.config.jwt_secret) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("Invalid invite token: {}", e);
            return HttpResponse::BadRequest()
                .json(serde_json::json!({ "message": "Invalid or expired invite link." }));
        }
    };

    let users = data.mongodb.db.collection::<User>("users");
    let has_account = match users.find_one(doc! { "email": &claims.email }).await {
        Ok(found) => found.is_some(),
        Err(e) => {
            error!("Error looking up invitee: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }));
        }
    };

    let projects = data.mongodb.db.collection::<Project>("projects");
    let project_name = match projects.find_one(doc! { "project_id": &claims.project_id }).await {
        Ok(found) => found.map(|p| p.name).unwrap_or_default(),
        Err(e) => {
            error!("Error fetching project: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }));
        }
    };

    HttpResponse::Ok().json(serde_json::json!({
        "email": claims.email,
        "role": claims.role,
        "project_id": claims.project_id,
        "project_name": project_name,
        "has_account": has_account,
    }))
}

// POST /api/invite/accept/{token}
// Linear validation chain: signature/expiry, email match, token not yet
// consumed, project exists, not already a member. Then the team entry is
// appended and the invite record deleted, making the token single-use.
pub async fn accept_invite(
    req: HttpRequest,
    data: web::Data<AppState>,
    token: web::Path<String>,
) -> impl Responder {
    let current = match current_user(&req) {
        Some(uid) => uid,
        None => {
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({ "message": "Unauthorized" }));
        }
    };

    let claims = match decode_invite_token(&token, &data.config.jwt_secret) {
        Ok(claims) => claims,
        Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
            // The record is dead weight once the token can never verify
            // again; purge it on the way out.
            let invites = data.mongodb.db.collection::<Invite>("invites");
            if let Err(e) = invites.delete_one(doc! { "token": &*token }).await {
                warn!("Failed to purge expired invite: {}", e);
            }
            return HttpResponse::BadRequest()
                .json(serde_json::json!({ "message": "Invite token has expired." }));
        }
        Err(e) => {
            warn!("Invalid invite token: {}", e);
            return HttpResponse::BadRequest()
                .json(serde_json::json!({ "message": "Invalid invite token." }));
        }
    };

    let users = data.mongodb.db.collection::<User>("users");
    let user = match users.find_one(doc! { "user_id": &current }).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({ "message": "User not found" }));
        }
        Err(e) => {
            error!("Error fetching user: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }));
        }
    };

    if user.email != claims.email {
        return HttpResponse::Forbidden()
            .json(serde_json::json!({ "message": "This invite doesn't match your account." }));
    }

    // Consumed tokens must 404 even if the signature still verifies.
    let invites = data.mongodb.db.collection::<Invite>("invites");
    match invites.find_one(doc! { "token": &*token }).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({ "message": "Invite record not found or already used." }));
        }
        Err(e) => {
            error!("Error fetching invite: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }));
        }
    }

    let projects = data.mongodb.db.collection::<Project>("projects");
    let mut project = match projects.find_one(doc! { "project_id": &claims.project_id }).await {
        Ok(Some(project)) => project,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({ "message": "Project not found." }));
        }
        Err(e) => {
            error!("Error fetching project: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }));
        }
    };

    if project.is_member(&current) {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({ "message": "Already part of the team." }));
    }

    project.team.push(TeamMember { user: current.clone(), role: claims.role });
    project.updated_at = Utc::now();

    if let Err(e) = projects
        .replace_one(doc! { "project_id": &project.project_id }, &project)
        .await
    {
        error!("Error adding member to project: {}", e);
        return HttpResponse::InternalServerError()
            .json(serde_json::json!({ "message": "Internal Server Error" }));
    }

    if let Err(e) = invites.delete_one(doc! { "token": &*token }).await {
        error!("Error consuming invite: {}", e);
        return HttpResponse::InternalServerError()
            .json(serde_json::json!({ "message": "Internal Server Error" }));
    }

    info!("User {} joined project {} via invite", current, project.project_id);
    HttpResponse::Ok().json(serde_json::json!({ "message": "Successfully joined the project!" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn token_round_trip_preserves_claims() {
        let (token, expires_at) =
            issue_invite_token("dev@example.com", Role::Admin, "p1", SECRET, Utc::now()).unwrap();
        let claims = decode_invite_token(&token, SECRET).unwrap();

        assert_eq!(claims.email, "dev@example.com");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.project_id, "p1");
        assert_eq!(claims.exp as i64, expires_at.timestamp());
    }

    #[test]
    fn expiry_is_48_hours_out() {
        let issued = Utc::now();
        let (_, expires_at) =
            issue_invite_token("dev@example.com", Role::Regular, "p1", SECRET, issued).unwrap();
        assert_eq!(expires_at - issued, Duration::hours(48));
    }

    #[test]
    fn expired_token_is_rejected_as_expired() {
        let issued = Utc::now() - Duration::hours(72);
        let (token, _) =
            issue_invite_token("dev@example.com", Role::Regular, "p1", SECRET, issued).unwrap();

        let err = decode_invite_token(&token, SECRET).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ExpiredSignature));
    }

    #[test]
    fn tampered_secret_is_rejected() {
        let (token, _) =
            issue_invite_token("dev@example.com", Role::Regular, "p1", SECRET, Utc::now()).unwrap();
        assert!(decode_invite_token(&token, "other-secret").is_err());
    }
}
