use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::{error, info};
use mongodb::bson::doc;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::models::{Project, ProjectStatus, Role, TeamMember};

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: Option<ProjectStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    /// `null` clears the end date, an absent key keeps it.
    #[serde(default, deserialize_with = "crate::models::double_option")]
    pub end_date: Option<Option<DateTime<Utc>>>,
    pub status: Option<ProjectStatus>,
    /// New members to add. Existing entries are never replaced or re-roled
    /// through this path.
    pub team: Option<Vec<TeamMember>>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveMemberRequest {
    pub member_id: String,
}

/// Appends only the members whose user id is not already on the team.
/// Returns how many entries were added.
pub fn merge_team(team: &mut Vec<TeamMember>, incoming: Vec<TeamMember>) -> usize {
    let mut added = 0;
    for member in incoming {
        if !team.iter().any(|m| m.user == member.user) {
            team.push(member);
            added += 1;
        }
    }
    added
}

pub fn remove_member(team: &mut Vec<TeamMember>, user_id: &str) -> bool {
    let before = team.len();
    team.retain(|m| m.user != user_id);
    team.len() != before
}

async fn fetch_project(data: &AppState, project_id: &str) -> Result<Option<Project>, HttpResponse> {
    let projects = data.mongodb.db.collection::<Project>("projects");
    match projects.find_one(doc! { "project_id": project_id }).await {
        Ok(found) => Ok(found),
        Err(e) => {
            error!("Error fetching project {}: {}", project_id, e);
            Err(HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" })))
        }
    }
}

// POST /api/project
// The creator becomes the sole team entry, with role "owner".
pub async fn create_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateProjectRequest>,
) -> impl Responder {
    let current = match current_user(&req) {
        Some(uid) => uid,
        None => {
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({ "message": "Unauthorized" }));
        }
    };

    if payload.name.trim().is_empty() {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({ "message": "Project name is required" }));
    }

    let now = Utc::now();
    let new_project = Project {
        project_id: Uuid::new_v4().to_string(),
        name: payload.name.clone(),
        description: payload.description.clone().unwrap_or_default(),
        start_date: payload.start_date.unwrap_or(now),
        end_date: payload.end_date,
        status: payload.status.unwrap_or(ProjectStatus::Active),
        team: vec![TeamMember { user: current.clone(), role: Role::Owner }],
        created_by: current,
        created_at: now,
        updated_at: now,
    };

    let projects = data.mongodb.db.collection::<Project>("projects");
    match projects.insert_one(&new_project).await {
        Ok(_) => {
            info!("Project created: {}", new_project.project_id);
            HttpResponse::Created().json(new_project)
        }
        Err(e) => {
            error!("Error creating project: {}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }))
        }
    }
}

// GET /api/project
// Every project the caller appears in, team-wise.
pub async fn list_projects(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let current = match current_user(&req) {
        Some(uid) => uid,
        None => {
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({ "message": "Unauthorized" }));
        }
    };

    let projects = data.mongodb.db.collection::<Project>("projects");
    let mut cursor = match projects.find(doc! { "team.user": &current }).await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching projects: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }));
        }
    };

    let mut found = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(project) => found.push(project),
            Err(e) => {
                error!("Error iterating projects: {}", e);
                return HttpResponse::InternalServerError()
                    .json(serde_json::json!({ "message": "Internal Server Error" }));
            }
        }
    }
    HttpResponse::Ok().json(found)
}

// GET /api/project/{id}
pub async fn get_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
) -> impl Responder {
    let current = match current_user(&req) {
        Some(uid) => uid,
        None => {
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({ "message": "Unauthorized" }));
        }
    };

    let project = match fetch_project(&data, &project_id).await {
        Ok(Some(project)) => project,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({ "message": "Project not found" }));
        }
        Err(resp) => return resp,
    };

    if !project.is_member(&current) {
        return HttpResponse::Forbidden()
            .json(serde_json::json!({ "message": "Not authorized to view this project" }));
    }

    HttpResponse::Ok().json(project)
}

// PATCH /api/project/{id}
// Owner/admin only. Scalar fields overwrite; a "team" payload is merged,
// never replaced, so existing members keep their roles.
pub async fn update_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
    payload: web::Json<UpdateProjectRequest>,
) -> impl Responder {
    let current = match current_user(&req) {
        Some(uid) => uid,
        None => {
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({ "message": "Unauthorized" }));
        }
    };

    let mut project = match fetch_project(&data, &project_id).await {
        Ok(Some(project)) => project,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({ "message": "Project not found" }));
        }
        Err(resp) => return resp,
    };

    match project.member_role(&current) {
        Some(role) if role.can_manage() => {}
        Some(_) | None => {
            return HttpResponse::Forbidden()
                .json(serde_json::json!({ "message": "Access denied. Admins and owners only." }));
        }
    }

    let payload = payload.into_inner();
    if let Some(name) = payload.name {
        if name.trim().is_empty() {
            return HttpResponse::BadRequest()
                .json(serde_json::json!({ "message": "Project name cannot be empty" }));
        }
        project.name = name;
    }
    if let Some(description) = payload.description {
        project.description = description;
    }
    if let Some(start_date) = payload.start_date {
        project.start_date = start_date;
    }
    if let Some(end_date) = payload.end_date {
        project.end_date = end_date;
    }
    if let Some(status) = payload.status {
        project.status = status;
    }
    if let Some(incoming) = payload.team {
        merge_team(&mut project.team, incoming);
    }
    project.updated_at = Utc::now();

    let projects = data.mongodb.db.collection::<Project>("projects");
    match projects
        .replace_one(doc! { "project_id": &project.project_id }, &project)
        .await
    {
        Ok(_) => HttpResponse::Ok().json(project),
        Err(e) => {
            error!("Error updating project: {}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }))
        }
    }
}

// PATCH /api/project/{id}/remove-member
pub async fn remove_team_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
    payload: web::Json<RemoveMemberRequest>,
) -> impl Responder {
    let current = match current_user(&req) {
        Some(uid) => uid,
        None => {
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({ "message": "Unauthorized" }));
        }
    };

    let mut project = match fetch_project(&data, &project_id).await {
        Ok(Some(project)) => project,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({ "message": "Project not found" }));
        }
        Err(resp) => return resp,
    };

    match project.member_role(&current) {
        Some(role) if role.can_manage() => {}
        Some(_) | None => {
            return HttpResponse::Forbidden()
                .json(serde_json::json!({ "message": "Access denied. Admins and owners only." }));
        }
    }

    if current == payload.member_id {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({ "message": "You can't remove yourself" }));
    }

    if !remove_member(&mut project.team, &payload.member_id) {
        return HttpResponse::NotFound()
            .json(serde_json::json!({ "message": "Member not found in team" }));
    }
    project.updated_at = Utc::now();

    let projects = data.mongodb.db.collection::<Project>("projects");
    match projects
        .replace_one(doc! { "project_id": &project.project_id }, &project)
        .await
    {
        Ok(_) => {
            info!("Removed {} from project {}", payload.member_id, project.project_id);
            HttpResponse::Ok()
                .json(serde_json::json!({ "message": "Team member removed", "team": project.team }))
        }
        Err(e) => {
            error!("Error removing team member: {}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }))
        }
    }
}

// DELETE /api/project/{id}
// Tasks and issues keep their project reference; no cascade.
pub async fn delete_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
) -> impl Responder {
    let current = match current_user(&req) {
        Some(uid) => uid,
        None => {
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({ "message": "Unauthorized" }));
        }
    };

    let project = match fetch_project(&data, &project_id).await {
        Ok(Some(project)) => project,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({ "message": "Project not found" }));
        }
        Err(resp) => return resp,
    };

    match project.member_role(&current) {
        Some(role) if role.can_manage() => {}
        Some(_) | None => {
            return HttpResponse::Forbidden()
                .json(serde_json::json!({ "message": "Access denied. Admins and owners only." }));
        }
    }

    let projects = data.mongodb.db.collection::<Project>("projects");
    match projects
        .delete_one(doc! { "project_id": &project.project_id })
        .await
    {
        Ok(res) if res.deleted_count == 1 => {
            info!("Project deleted: {}", project.project_id);
            HttpResponse::Ok().json(serde_json::json!({ "message": "Project deleted successfully" }))
        }
        Ok(_) => HttpResponse::NotFound().json(serde_json::json!({ "message": "Project not found" })),
        Err(e) => {
            error!("Error deleting project: {}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(user: &str, role: Role) -> TeamMember {
        TeamMember { user: user.into(), role }
    }

    #[test]
    fn merge_skips_existing_users() {
        let mut team = vec![member("u1", Role::Owner), member("u2", Role::Regular)];
        let added = merge_team(
            &mut team,
            vec![
                member("u2", Role::Admin), // already present, role must not change
                member("u3", Role::Regular),
            ],
        );

        assert_eq!(added, 1);
        assert_eq!(team.len(), 3);
        assert_eq!(team[1].role, Role::Regular);
        assert_eq!(team[2].user, "u3");
    }

    #[test]
    fn merge_empty_incoming_is_noop() {
        let mut team = vec![member("u1", Role::Owner)];
        assert_eq!(merge_team(&mut team, vec![]), 0);
        assert_eq!(team.len(), 1);
    }

    #[test]
    fn patch_distinguishes_null_from_absent_end_date() {
        let cleared: UpdateProjectRequest =
            serde_json::from_str(r#"{ "end_date": null }"#).unwrap();
        assert_eq!(cleared.end_date, Some(None));

        let untouched: UpdateProjectRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(untouched.end_date, None);
    }

    #[test]
    fn remove_member_filters_by_id() {
        let mut team = vec![member("u1", Role::Owner), member("u2", Role::Regular)];
        assert!(remove_member(&mut team, "u2"));
        assert_eq!(team.len(), 1);
        assert!(!remove_member(&mut team, "u2"));
    }
}
