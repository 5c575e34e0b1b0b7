use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use futures_util::StreamExt;
use log::error;
use mongodb::bson::doc;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::models::{Notification, NotificationRecipient};
use crate::notification_server::Notify;

/// Saves a notification document and then fans it out over the socket rooms.
/// The emit happens strictly after the save; delivery itself is best effort.
pub async fn create_notification(
    state: &AppState,
    recipients: Vec<String>,
    message: String,
    task_id: Option<String>,
) -> Result<Notification, mongodb::error::Error> {
    let notification = Notification {
        notification_id: Uuid::new_v4().to_string(),
        recipients: recipients
            .iter()
            .map(|user| NotificationRecipient { user: user.clone(), read: false })
            .collect(),
        message: message.clone(),
        task: task_id.clone(),
        created_at: Utc::now(),
    };

    let notifications = state.mongodb.db.collection::<Notification>("notifications");
    notifications.insert_one(&notification).await?;

    state.notifier.do_send(Notify {
        recipients,
        message,
        task_id,
    });

    Ok(notification)
}

// GET /api/notifications/{user_id}
// Newest first. Users can only read their own feed.
pub async fn get_user_notifications(
    req: HttpRequest,
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> impl Responder {
    let current = match current_user(&req) {
        Some(uid) => uid,
        None => {
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({ "message": "Unauthorized" }));
        }
    };

    if current != *user_id {
        return HttpResponse::Forbidden()
            .json(serde_json::json!({ "message": "Cannot access other user's notifications" }));
    }

    let notifications = data.mongodb.db.collection::<Notification>("notifications");
    let mut cursor = match notifications
        .find(doc! { "recipients.user": &*user_id })
        .sort(doc! { "created_at": -1 })
        .await
    {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching notifications: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }));
        }
    };

    let mut found = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(notification) => found.push(notification),
            Err(e) => {
                error!("Error iterating notifications: {}", e);
                return HttpResponse::InternalServerError()
                    .json(serde_json::json!({ "message": "Internal Server Error" }));
            }
        }
    }
    HttpResponse::Ok().json(found)
}

// PATCH /api/notifications/{id}/read
// Flips the caller's own read flag; other recipients are untouched.
pub async fn mark_notification_read(
    req: HttpRequest,
    data: web::Data<AppState>,
    notification_id: web::Path<String>,
) -> impl Responder {
    let current = match current_user(&req) {
        Some(uid) => uid,
        None => {
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({ "message": "Unauthorized" }));
        }
    };

    let notifications = data.mongodb.db.collection::<Notification>("notifications");
    let filter = doc! {
        "notification_id": &*notification_id,
        "recipients.user": &current,
    };
    let update = doc! { "$set": { "recipients.$.read": true } };

    match notifications.update_one(filter, update).await {
        Ok(res) if res.matched_count == 1 => {
            HttpResponse::Ok().json(serde_json::json!({ "message": "Notification marked as read" }))
        }
        Ok(_) => HttpResponse::NotFound()
            .json(serde_json::json!({ "message": "Notification not found" })),
        Err(e) => {
            error!("Error marking notification read: {}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }))
        }
    }
}
