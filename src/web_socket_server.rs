use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::app_state::AppState;
use crate::notification_server::{Join, Leave, NotificationEvent, NotificationServer};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// The only client-to-server frame: `{"event":"join","user_id":"..."}`.
#[derive(Deserialize)]
struct IncomingFrame {
    event: String,
    user_id: Option<String>,
}

pub struct NotificationSocket {
    /// Set once the client has joined its room.
    user_id: Option<String>,
    hb: Instant,
    server: Addr<NotificationServer>,
}

impl NotificationSocket {
    pub fn new(server: Addr<NotificationServer>) -> Self {
        NotificationSocket {
            user_id: None,
            hb: Instant::now(),
            server,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                log::warn!("Notification socket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for NotificationSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        if let Some(user_id) = self.user_id.take() {
            self.server.do_send(Leave {
                user_id,
                addr: ctx.address().recipient(),
            });
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for NotificationSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<IncomingFrame>(&text) {
                Ok(frame) if frame.event == "join" => {
                    if let Some(user_id) = frame.user_id {
                        if self.user_id.as_deref() != Some(user_id.as_str()) {
                            // Re-joining under another id moves the session;
                            // it must not linger in the old user's room.
                            if let Some(prev) = self.user_id.take() {
                                self.server.do_send(Leave {
                                    user_id: prev,
                                    addr: ctx.address().recipient(),
                                });
                            }
                            self.user_id = Some(user_id.clone());
                            self.server.do_send(Join {
                                user_id,
                                addr: ctx.address().recipient(),
                            });
                        }
                    }
                }
                Ok(frame) => {
                    log::debug!("Ignoring unknown socket event: {}", frame.event);
                }
                Err(e) => {
                    log::debug!("Failed to parse socket frame: {}", e);
                }
            },
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                log::warn!("WebSocket error: {}", e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

impl Handler<NotificationEvent> for NotificationSocket {
    type Result = ();

    fn handle(&mut self, event: NotificationEvent, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(&event) {
            Ok(payload) => ctx.text(payload),
            Err(e) => log::error!("Failed to serialize notification event: {}", e),
        }
    }
}

// GET /ws
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    ws::start(NotificationSocket::new(data.notifier.clone()), &req, stream)
}
