use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::{error, info, warn};
use mongodb::bson::doc;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::models::{Priority, Project, Task, TaskStatus};
use crate::notification::create_notification;

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub project: Option<String>,
    pub assigned_to: Option<Vec<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub project: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    /// `null` clears the deadline, an absent key keeps it.
    #[serde(default, deserialize_with = "crate::models::double_option")]
    pub deadline: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub assigned_to: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
}

#[derive(Debug)]
pub struct AssignmentMerge {
    /// Union of previous and requested assignees, deduplicated, previous first.
    pub merged: Vec<String>,
    pub newly_added: Vec<String>,
}

/// Merges requested assignees into the existing set. All-or-nothing: if any
/// requested id is not on the team, the whole merge is rejected and the
/// offending ids are returned.
pub fn merge_assignees(
    existing: &[String],
    requested: &[String],
    team: &[String],
) -> Result<AssignmentMerge, Vec<String>> {
    let invalid: Vec<String> = requested
        .iter()
        .filter(|id| !team.contains(id))
        .cloned()
        .collect();
    if !invalid.is_empty() {
        return Err(invalid);
    }

    let mut merged = existing.to_vec();
    let mut newly_added = Vec::new();
    for id in requested {
        if !merged.contains(id) {
            merged.push(id.clone());
            newly_added.push(id.clone());
        }
    }

    Ok(AssignmentMerge { merged, newly_added })
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

// POST /api/task
pub async fn create_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateTaskRequest>,
) -> impl Responder {
    let current = match current_user(&req) {
        Some(uid) => uid,
        None => {
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({ "message": "Unauthorized" }));
        }
    };

    if payload.title.trim().is_empty() {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({ "message": "Title is required" }));
    }

    let mut assigned_to = payload.assigned_to.clone().unwrap_or_default();

    // Assignees only make sense against a project team.
    if let Some(project_id) = &payload.project {
        let project = match fetch_project(&data, project_id).await {
            Ok(Some(project)) => project,
            Ok(None) => {
                return HttpResponse::NotFound()
                    .json(serde_json::json!({ "message": "Project not found" }));
            }
            Err(resp) => return resp,
        };

        let team_ids: Vec<String> = project.team.iter().map(|m| m.user.clone()).collect();
        match merge_assignees(&[], &assigned_to, &team_ids) {
            Ok(merge) => assigned_to = merge.merged,
            Err(_) => {
                return HttpResponse::BadRequest().json(
                    serde_json::json!({ "message": "Some assigned users are not in the project team" }),
                );
            }
        }
    } else if !assigned_to.is_empty() {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({ "message": "Cannot assign users on a task without a project" }));
    }

    let now = Utc::now();
    let new_task = Task {
        task_id: Uuid::new_v4().to_string(),
        title: payload.title.clone(),
        description: payload.description.clone().unwrap_or_default(),
        project: payload.project.clone(),
        assigned_to,
        status: payload.status.unwrap_or(TaskStatus::ToDo),
        priority: payload.priority.unwrap_or(Priority::Medium),
        deadline: payload.deadline,
        created_by: current,
        created_at: now,
        updated_at: now,
    };

    let tasks = data.mongodb.db.collection::<Task>("tasks");
    match tasks.insert_one(&new_task).await {
        Ok(_) => {
            info!("Task created: {}", new_task.task_id);
            HttpResponse::Created().json(new_task)
        }
        Err(e) => {
            error!("Error creating task: {}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }))
        }
    }
}

// GET /api/task[?projectId=]
pub async fn get_all_tasks(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<TaskQuery>,
) -> impl Responder {
    if current_user(&req).is_none() {
        return HttpResponse::Unauthorized().json(serde_json::json!({ "message": "Unauthorized" }));
    }

    let filter = match &query.project_id {
        Some(project_id) => doc! { "project": project_id },
        None => doc! {},
    };

    let tasks = data.mongodb.db.collection::<Task>("tasks");
    let mut cursor = match tasks.find(filter).sort(doc! { "deadline": 1 }).await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching tasks: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }));
        }
    };

    let mut found = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(task) => found.push(task),
            Err(e) => {
                error!("Error iterating tasks: {}", e);
                return HttpResponse::InternalServerError()
                    .json(serde_json::json!({ "message": "Internal Server Error" }));
            }
        }
    }
    HttpResponse::Ok().json(found)
}

// GET /api/task/{id}
pub async fn get_task_by_id(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
) -> impl Responder {
    if current_user(&req).is_none() {
        return HttpResponse::Unauthorized().json(serde_json::json!({ "message": "Unauthorized" }));
    }

    let tasks = data.mongodb.db.collection::<Task>("tasks");
    match tasks.find_one(doc! { "task_id": &*task_id }).await {
        Ok(Some(task)) => HttpResponse::Ok().json(task),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({ "message": "Task not found" })),
        Err(e) => {
            error!("Error fetching task: {}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }))
        }
    }
}

// PATCH /api/task/{id}
pub async fn update_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
    payload: web::Json<UpdateTaskRequest>,
) -> impl Responder {
    if current_user(&req).is_none() {
        return HttpResponse::Unauthorized().json(serde_json::json!({ "message": "Unauthorized" }));
    }

    let tasks = data.mongodb.db.collection::<Task>("tasks");
    let mut task = match tasks.find_one(doc! { "task_id": &*task_id }).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({ "message": "Task not found" }));
        }
        Err(e) => {
            error!("Error fetching task: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }));
        }
    };

    let payload = payload.into_inner();
    if let Some(title) = payload.title {
        if title.trim().is_empty() {
            return HttpResponse::BadRequest()
                .json(serde_json::json!({ "message": "Title cannot be empty" }));
        }
        task.title = title;
    }
    if let Some(description) = payload.description {
        task.description = description;
    }
    if let Some(project_id) = payload.project {
        match fetch_project(&data, &project_id).await {
            Ok(Some(_)) => task.project = Some(project_id),
            Ok(None) => {
                return HttpResponse::NotFound()
                    .json(serde_json::json!({ "message": "Project not found" }));
            }
            Err(resp) => return resp,
        }
    }
    if let Some(status) = payload.status {
        task.status = status;
    }
    if let Some(priority) = payload.priority {
        task.priority = priority;
    }
    if let Some(deadline) = payload.deadline {
        task.deadline = deadline;
    }
    task.updated_at = Utc::now();

    match tasks.replace_one(doc! { "task_id": &task.task_id }, &task).await {
        Ok(_) => HttpResponse::Ok().json(task),
        Err(e) => {
            error!("Error updating task: {}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }))
        }
    }
}

// DELETE /api/task/{id}
// Deletes the task only; the project is untouched.
pub async fn delete_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
) -> impl Responder {
    if current_user(&req).is_none() {
        return HttpResponse::Unauthorized().json(serde_json::json!({ "message": "Unauthorized" }));
    }

    let tasks = data.mongodb.db.collection::<Task>("tasks");
    match tasks.delete_one(doc! { "task_id": &*task_id }).await {
        Ok(res) if res.deleted_count == 1 => {
            info!("Task deleted: {}", task_id);
            HttpResponse::Ok().json(serde_json::json!({ "message": "Task deleted successfully" }))
        }
        Ok(_) => HttpResponse::NotFound().json(serde_json::json!({ "message": "Task not found" })),
        Err(e) => {
            error!("Error deleting task: {}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }))
        }
    }
}

// PATCH /api/task/{id}/assign
// Validates the requested ids against the project team, merges them into the
// existing assignment set and notifies each newly added assignee.
pub async fn assign_users_to_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
    payload: web::Json<AssignRequest>,
) -> impl Responder {
    if current_user(&req).is_none() {
        return HttpResponse::Unauthorized().json(serde_json::json!({ "message": "Unauthorized" }));
    }

    let tasks = data.mongodb.db.collection::<Task>("tasks");
    let mut task = match tasks.find_one(doc! { "task_id": &*task_id }).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({ "message": "Task not found" }));
        }
        Err(e) => {
            error!("Error fetching task: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }));
        }
    };

    let project_id = match &task.project {
        Some(id) => id.clone(),
        None => {
            return HttpResponse::BadRequest()
                .json(serde_json::json!({ "message": "Task does not belong to a project" }));
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

    let team_ids: Vec<String> = project.team.iter().map(|m| m.user.clone()).collect();
    let merge = match merge_assignees(&task.assigned_to, &payload.assigned_to, &team_ids) {
        Ok(merge) => merge,
        Err(invalid) => {
            warn!("Rejected assignment on task {}: {:?} not on team", task.task_id, invalid);
            return HttpResponse::BadRequest()
                .json(serde_json::json!({ "message": "Some users are not in the project team" }));
        }
    };

    task.assigned_to = merge.merged;
    task.updated_at = Utc::now();

    if let Err(e) = tasks.replace_one(doc! { "task_id": &task.task_id }, &task).await {
        error!("Error saving assignment: {}", e);
        return HttpResponse::InternalServerError()
            .json(serde_json::json!({ "message": "Internal Server Error" }));
    }

    // One notification per new assignee, only after the task is saved.
    for user_id in merge.newly_added {
        let message = format!("You have been assigned to task \"{}\"", task.title);
        if let Err(e) =
            create_notification(&data, vec![user_id], message, Some(task.task_id.clone())).await
        {
            error!("Error creating assignment notification: {}", e);
        }
    }

    HttpResponse::Ok().json(task)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn merge_is_union_without_duplicates() {
        let merge = merge_assignees(
            &ids(&["u1", "u2"]),
            &ids(&["u2", "u3"]),
            &ids(&["u1", "u2", "u3"]),
        )
        .unwrap();

        assert_eq!(merge.merged, ids(&["u1", "u2", "u3"]));
        assert_eq!(merge.newly_added, ids(&["u3"]));
    }

    #[test]
    fn one_invalid_id_rejects_the_whole_request() {
        let err = merge_assignees(
            &ids(&["u1"]),
            &ids(&["u2", "outsider"]),
            &ids(&["u1", "u2"]),
        )
        .unwrap_err();

        assert_eq!(err, ids(&["outsider"]));
    }

    #[test]
    fn reassigning_existing_users_adds_nothing() {
        let merge = merge_assignees(&ids(&["u1"]), &ids(&["u1"]), &ids(&["u1"])).unwrap();
        assert_eq!(merge.merged, ids(&["u1"]));
        assert!(merge.newly_added.is_empty());
    }

    #[test]
    fn patch_distinguishes_null_from_absent_deadline() {
        let cleared: UpdateTaskRequest = serde_json::from_str(r#"{ "deadline": null }"#).unwrap();
        assert_eq!(cleared.deadline, Some(None));

        let untouched: UpdateTaskRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(untouched.deadline, None);

        let set: UpdateTaskRequest =
            serde_json::from_str(r#"{ "deadline": "2026-09-01T12:00:00Z" }"#).unwrap();
        assert!(matches!(set.deadline, Some(Some(_))));
    }

    #[test]
    fn duplicate_requested_ids_are_collapsed() {
        let merge = merge_assignees(&[], &ids(&["u1", "u1", "u2"]), &ids(&["u1", "u2"])).unwrap();
        assert_eq!(merge.merged, ids(&["u1", "u2"]));
        assert_eq!(merge.newly_added, ids(&["u1", "u2"]));
    }
}
