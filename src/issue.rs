use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use futures_util::StreamExt;
use log::{error, info};
use mongodb::bson::doc;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::models::{Issue, IssueStatus, Project};

#[derive(Debug, Deserialize)]
pub struct CreateIssueRequest {
    pub description: String,
    pub project: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateIssueRequest {
    pub description: Option<String>,
    pub status: Option<IssueStatus>,
    pub resolution: Option<String>,
    pub project: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IssueQuery {
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
}

async fn project_exists(data: &AppState, project_id: &str) -> Result<bool, HttpResponse> {
    let projects = data.mongodb.db.collection::<Project>("projects");
    match projects.find_one(doc! { "project_id": project_id }).await {
        Ok(found) => Ok(found.is_some()),
        Err(e) => {
            error!("Error fetching project {}: {}", project_id, e);
            Err(HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" })))
        }
    }
}

// POST /api/issues
pub async fn create_issue(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateIssueRequest>,
) -> impl Responder {
    let current = match current_user(&req) {
        Some(uid) => uid,
        None => {
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({ "message": "Unauthorized" }));
        }
    };

    if payload.description.trim().is_empty() {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({ "message": "Description is required" }));
    }
    if payload.project.trim().is_empty() {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({ "message": "Project is required" }));
    }

    match project_exists(&data, &payload.project).await {
        Ok(true) => {}
        Ok(false) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({ "message": "Project not found" }));
        }
        Err(resp) => return resp,
    }

    let now = Utc::now();
    let new_issue = Issue {
        issue_id: Uuid::new_v4().to_string(),
        description: payload.description.clone(),
        project: payload.project.clone(),
        reported_by: current,
        status: IssueStatus::Open,
        resolution: String::new(),
        created_at: now,
        updated_at: now,
    };

    let issues = data.mongodb.db.collection::<Issue>("issues");
    match issues.insert_one(&new_issue).await {
        Ok(_) => {
            info!("Issue created: {}", new_issue.issue_id);
            HttpResponse::Created().json(new_issue)
        }
        Err(e) => {
            error!("Error creating issue: {}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }))
        }
    }
}

// GET /api/issues?projectId=
pub async fn get_all_issues(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<IssueQuery>,
) -> impl Responder {
    if current_user(&req).is_none() {
        return HttpResponse::Unauthorized().json(serde_json::json!({ "message": "Unauthorized" }));
    }

    let project_id = match &query.project_id {
        Some(id) => id.clone(),
        None => {
            return HttpResponse::BadRequest()
                .json(serde_json::json!({ "message": "Project ID is required to fetch issues" }));
        }
    };

    match project_exists(&data, &project_id).await {
        Ok(true) => {}
        Ok(false) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({ "message": "Project not found" }));
        }
        Err(resp) => return resp,
    }

    let issues = data.mongodb.db.collection::<Issue>("issues");
    let mut cursor = match issues.find(doc! { "project": &project_id }).await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching issues: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }));
        }
    };

    let mut found = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(issue) => found.push(issue),
            Err(e) => {
                error!("Error iterating issues: {}", e);
                return HttpResponse::InternalServerError()
                    .json(serde_json::json!({ "message": "Internal Server Error" }));
            }
        }
    }
    HttpResponse::Ok().json(found)
}

// GET /api/issues/{id}
pub async fn get_issue_by_id(
    req: HttpRequest,
    data: web::Data<AppState>,
    issue_id: web::Path<String>,
) -> impl Responder {
    if current_user(&req).is_none() {
        return HttpResponse::Unauthorized().json(serde_json::json!({ "message": "Unauthorized" }));
    }

    let issues = data.mongodb.db.collection::<Issue>("issues");
    match issues.find_one(doc! { "issue_id": &*issue_id }).await {
        Ok(Some(issue)) => HttpResponse::Ok().json(issue),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({ "message": "Issue not found" })),
        Err(e) => {
            error!("Error fetching issue: {}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }))
        }
    }
}

// PATCH /api/issues/{id}
pub async fn update_issue(
    req: HttpRequest,
    data: web::Data<AppState>,
    issue_id: web::Path<String>,
    payload: web::Json<UpdateIssueRequest>,
) -> impl Responder {
    if current_user(&req).is_none() {
        return HttpResponse::Unauthorized().json(serde_json::json!({ "message": "Unauthorized" }));
    }

    let issues = data.mongodb.db.collection::<Issue>("issues");
    let mut issue = match issues.find_one(doc! { "issue_id": &*issue_id }).await {
        Ok(Some(issue)) => issue,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({ "message": "Issue not found" }));
        }
        Err(e) => {
            error!("Error fetching issue: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }));
        }
    };

    let payload = payload.into_inner();
    if let Some(status) = payload.status {
        issue.status = status;
    }
    if let Some(resolution) = payload.resolution {
        issue.resolution = resolution;
    }
    if let Some(description) = payload.description {
        if description.trim().is_empty() {
            return HttpResponse::BadRequest()
                .json(serde_json::json!({ "message": "Description cannot be empty" }));
        }
        issue.description = description;
    }
    if let Some(project_id) = payload.project {
        match project_exists(&data, &project_id).await {
            Ok(true) => issue.project = project_id,
            Ok(false) => {
                return HttpResponse::NotFound()
                    .json(serde_json::json!({ "message": "Project not found" }));
            }
            Err(resp) => return resp,
        }
    }
    issue.updated_at = Utc::now();

    match issues.replace_one(doc! { "issue_id": &issue.issue_id }, &issue).await {
        Ok(_) => HttpResponse::Ok().json(issue),
        Err(e) => {
            error!("Error updating issue: {}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }))
        }
    }
}

// DELETE /api/issues/{id}
pub async fn delete_issue(
    req: HttpRequest,
    data: web::Data<AppState>,
    issue_id: web::Path<String>,
) -> impl Responder {
    if current_user(&req).is_none() {
        return HttpResponse::Unauthorized().json(serde_json::json!({ "message": "Unauthorized" }));
    }

    let issues = data.mongodb.db.collection::<Issue>("issues");
    match issues.delete_one(doc! { "issue_id": &*issue_id }).await {
        Ok(res) if res.deleted_count == 1 => {
            HttpResponse::Ok().json(serde_json::json!({ "message": "Issue deleted successfully" }))
        }
        Ok(_) => HttpResponse::NotFound().json(serde_json::json!({ "message": "Issue not found" })),
        Err(e) => {
            error!("Error deleting issue: {}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }))
        }
    }
}
