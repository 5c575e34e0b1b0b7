// src/main.rs

mod app_state;
mod auth;
mod config;
mod db;
mod email;
mod invite;
mod issue;
mod models;
mod notification;
mod notification_server;
mod project;
mod task;
mod web_socket_server;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix::Actor;
use actix_cors::Cors;
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http,
    middleware::Logger,
    web, App, Error, HttpMessage, HttpResponse, HttpServer,
};
use env_logger::Env;
use futures::future::{ok, Ready};
use log::info;

use crate::app_state::AppState;
use crate::auth::{check, login, logout, signup, update_profile, validate_jwt, AUTH_COOKIE};
use crate::email::InviteMailer;
use crate::invite::{accept_invite, get_invite_info, send_invite};
use crate::issue::{create_issue, delete_issue, get_all_issues, get_issue_by_id, update_issue};
use crate::notification::{get_user_notifications, mark_notification_read};
use crate::notification_server::NotificationServer;
use crate::project::{
    create_project, delete_project, get_project, list_projects, remove_team_member, update_project,
};
use crate::task::{
    assign_users_to_task, create_task, delete_task, get_all_tasks, get_task_by_id, update_task,
};
use crate::web_socket_server::ws_index;

/// Gate middleware: decodes the session JWT (HTTP-only cookie, Bearer header
/// as fallback) and stashes the user id in request extensions. Requests
/// without a token, or with one that no longer validates, pass through with
/// no identity; handlers reject them individually. The gate must not 401 on
/// its own: browsers auto-attach the cookie, and a stale one would otherwise
/// lock clients out of login and logout.
#[derive(Debug)]
pub struct Authentication;

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware { service })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
}

fn extract_token(req: &ServiceRequest) -> Option<String> {
    if let Some(cookie) = req.request().cookie(AUTH_COOKIE) {
        return Some(cookie.value().to_string());
    }
    let auth_header = req.headers().get(http::header::AUTHORIZATION)?;
    let auth_str = auth_header.to_str().ok()?;
    auth_str
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(token) = extract_token(&req) {
            let secret = req
                .app_data::<web::Data<AppState>>()
                .map(|data| data.config.jwt_secret.clone())
                .unwrap_or_default();

            match validate_jwt(&token, &secret) {
                Ok(claims) => {
                    req.extensions_mut().insert(claims.sub);
                }
                Err(e) => {
                    log::debug!("Ignoring invalid session token: {}", e);
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("Task Management API is running!")
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = config::Config::from_env();
    let mongodb = Arc::new(db::MongoDB::init(&config.mongo_uri, &config.database_name).await);
    let notifier = NotificationServer::new().start();

    let mailer = match &config.smtp {
        Some(smtp) => match InviteMailer::new(smtp) {
            Ok(mailer) => Some(Arc::new(mailer)),
            Err(e) => {
                log::warn!("SMTP disabled: {}", e);
                None
            }
        },
        None => None,
    };

    let bind_addr = ("0.0.0.0", config.port);
    info!("Server running at http://{}:{}", bind_addr.0, bind_addr.1);
    info!("Allowed CORS origin: {}", config.frontend_origin);

    let frontend_origin = config.frontend_origin.clone();

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Authentication)
            .app_data(web::Data::new(AppState {
                notifier: notifier.clone(),
                mongodb: mongodb.clone(),
                mailer: mailer.clone(),
                config: config.clone(),
            }))
            .route("/", web::get().to(health))
            .service(
                web::scope("/api")
                    .service(
                        web::scope("/auth")
                            .route("/signup", web::post().to(signup))
                            .route("/login", web::post().to(login))
                            .route("/logout", web::post().to(logout))
                            .route("/check", web::get().to(check))
                            .route("/update-profile", web::put().to(update_profile)),
                    )
                    .service(
                        web::scope("/project")
                            .route("", web::post().to(create_project))
                            .route("", web::get().to(list_projects))
                            .route("/{id}", web::get().to(get_project))
                            .route("/{id}", web::patch().to(update_project))
                            .route("/{id}", web::delete().to(delete_project))
                            .route("/{id}/remove-member", web::patch().to(remove_team_member)),
                    )
                    .service(
                        web::scope("/task")
                            .route("", web::post().to(create_task))
                            .route("", web::get().to(get_all_tasks))
                            .route("/{id}", web::get().to(get_task_by_id))
                            .route("/{id}", web::patch().to(update_task))
                            .route("/{id}", web::delete().to(delete_task))
                            .route("/{id}/assign", web::patch().to(assign_users_to_task)),
                    )
                    .service(
                        web::scope("/issues")
                            .route("", web::post().to(create_issue))
                            .route("", web::get().to(get_all_issues))
                            .route("/{id}", web::get().to(get_issue_by_id))
                            .route("/{id}", web::patch().to(update_issue))
                            .route("/{id}", web::delete().to(delete_issue)),
                    )
                    .service(
                        web::scope("/invite")
                            .route("", web::post().to(send_invite))
                            .route("/accept/{token}", web::post().to(accept_invite))
                            .route("/{token}", web::get().to(get_invite_info)),
                    )
                    .service(
                        web::scope("/notifications")
                            .route("/{user_id}", web::get().to(get_user_notifications))
                            .route("/{id}/read", web::patch().to(mark_notification_read)),
                    ),
            )
            .service(web::resource("/ws").route(web::get().to(ws_index)))
    })
    .bind(bind_addr)?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, HttpRequest};

    use crate::auth::{create_jwt, current_user};
    use crate::project::list_projects;

    const SECRET: &str = "test-secret";

    // The driver connects lazily, so building state does no I/O.
    async fn test_state() -> AppState {
        AppState {
            notifier: NotificationServer::new().start(),
            mongodb: Arc::new(db::MongoDB::init("mongodb://localhost:27017", "taskorbit_test").await),
            mailer: None,
            config: config::Config {
                mongo_uri: "mongodb://localhost:27017".to_string(),
                database_name: "taskorbit_test".to_string(),
                jwt_secret: SECRET.to_string(),
                frontend_origin: "http://localhost:5173".to_string(),
                port: 8080,
                smtp: None,
            },
        }
    }

    async fn whoami(req: HttpRequest) -> HttpResponse {
        match current_user(&req) {
            Some(uid) => HttpResponse::Ok().body(uid),
            None => HttpResponse::Unauthorized().finish(),
        }
    }

    #[actix_web::test]
    async fn logout_succeeds_with_a_stale_cookie() {
        let state = test_state().await;
        let app = test::init_service(
            App::new()
                .wrap(Authentication)
                .app_data(web::Data::new(state))
                .route("/api/auth/logout", web::post().to(logout)),
        )
        .await;

        // Browsers keep sending the cookie after e.g. a secret rotation; the
        // gate must still let the client clear it.
        let req = test::TestRequest::post()
            .uri("/api/auth/logout")
            .insert_header((http::header::COOKIE, "token=garbage-not-a-jwt"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn protected_route_rejects_a_stale_cookie() {
        let state = test_state().await;
        let app = test::init_service(
            App::new()
                .wrap(Authentication)
                .app_data(web::Data::new(state))
                .route("/api/project", web::get().to(list_projects)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/project")
            .insert_header((http::header::COOKIE, "token=garbage-not-a-jwt"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn valid_cookie_sets_the_identity() {
        let state = test_state().await;
        let app = test::init_service(
            App::new()
                .wrap(Authentication)
                .app_data(web::Data::new(state))
                .route("/whoami", web::get().to(whoami)),
        )
        .await;

        let token = create_jwt("user-42", SECRET).unwrap();
        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header((http::header::COOKIE, format!("token={}", token)))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "user-42");
    }
}
