use actix::prelude::*;
use log::info;
use serde::Serialize;
use std::collections::HashMap;

/// Event pushed down a live socket. Mirrors the SPA contract:
/// `{"event":"new-notification","message":...,"task_id":...}`.
#[derive(Message, Serialize, Clone, Debug)]
#[rtype(result = "()")]
pub struct NotificationEvent {
    pub event: &'static str,
    pub message: String,
    pub task_id: Option<String>,
}

impl NotificationEvent {
    pub fn new(message: String, task_id: Option<String>) -> Self {
        NotificationEvent {
            event: "new-notification",
            message,
            task_id,
        }
    }
}

/// A socket session joining its user's room.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Join {
    pub user_id: String,
    pub addr: Recipient<NotificationEvent>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Leave {
    pub user_id: String,
    pub addr: Recipient<NotificationEvent>,
}

/// Fan a notification out to every live session of each recipient.
/// Best effort: disconnected users are simply skipped.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Notify {
    pub recipients: Vec<String>,
    pub message: String,
    pub task_id: Option<String>,
}

/// Room registry: user id -> all of that user's active socket sessions.
pub struct NotificationServer {
    rooms: HashMap<String, Vec<Recipient<NotificationEvent>>>,
}

impl NotificationServer {
    pub fn new() -> Self {
        NotificationServer { rooms: HashMap::new() }
    }

    pub fn join(&mut self, user_id: String, addr: Recipient<NotificationEvent>) {
        self.rooms.entry(user_id).or_default().push(addr);
    }

    pub fn leave(&mut self, user_id: &str, addr: &Recipient<NotificationEvent>) {
        if let Some(addrs) = self.rooms.get_mut(user_id) {
            addrs.retain(|a| a != addr);
            if addrs.is_empty() {
                self.rooms.remove(user_id);
            }
        }
    }

    pub fn session_count(&self, user_id: &str) -> usize {
        self.rooms.get(user_id).map_or(0, |a| a.len())
    }
}

impl Default for NotificationServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Actor for NotificationServer {
    type Context = Context<Self>;
}

impl Handler<Join> for NotificationServer {
    type Result = ();

    fn handle(&mut self, msg: Join, _: &mut Context<Self>) {
        info!("User {} joined their notification room", msg.user_id);
        self.join(msg.user_id, msg.addr);
    }
}

impl Handler<Leave> for NotificationServer {
    type Result = ();

    fn handle(&mut self, msg: Leave, _: &mut Context<Self>) {
        info!("User {} left their notification room", msg.user_id);
        self.leave(&msg.user_id, &msg.addr);
    }
}

impl Handler<Notify> for NotificationServer {
    type Result = ();

    fn handle(&mut self, msg: Notify, _: &mut Context<Self>) {
        for user_id in &msg.recipients {
            if let Some(addrs) = self.rooms.get(user_id) {
                for addr in addrs {
                    addr.do_send(NotificationEvent::new(msg.message.clone(), msg.task_id.clone()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sink;

    impl Actor for Sink {
        type Context = Context<Self>;
    }

    impl Handler<NotificationEvent> for Sink {
        type Result = ();
        fn handle(&mut self, _: NotificationEvent, _: &mut Context<Self>) {}
    }

    #[actix_web::test]
    async fn rooms_track_multiple_sessions_per_user() {
        let mut server = NotificationServer::new();
        let a = Sink.start().recipient();
        let b = Sink.start().recipient();

        server.join("u1".into(), a.clone());
        server.join("u1".into(), b);
        assert_eq!(server.session_count("u1"), 2);

        server.leave("u1", &a);
        assert_eq!(server.session_count("u1"), 1);
    }

    #[actix_web::test]
    async fn leaving_last_session_drops_the_room() {
        let mut server = NotificationServer::new();
        let a = Sink.start().recipient();

        server.join("u1".into(), a.clone());
        server.leave("u1", &a);
        assert_eq!(server.session_count("u1"), 0);
        assert!(server.rooms.is_empty());
    }

    #[actix_web::test]
    async fn rejoining_under_a_new_user_moves_the_session() {
        let mut server = NotificationServer::new();
        let a = Sink.start().recipient();

        // A socket switching identity leaves its old room before joining the
        // new one, so the old room never keeps a stale recipient.
        server.join("u1".into(), a.clone());
        server.leave("u1", &a);
        server.join("u2".into(), a);

        assert_eq!(server.session_count("u1"), 0);
        assert_eq!(server.session_count("u2"), 1);
        assert!(!server.rooms.contains_key("u1"));
    }

    #[actix_web::test]
    async fn leave_unknown_user_is_noop() {
        let mut server = NotificationServer::new();
        let a = Sink.start().recipient();
        server.leave("ghost", &a);
        assert_eq!(server.session_count("ghost"), 0);
    }

    #[test]
    fn event_payload_shape() {
        let event = NotificationEvent::new("assigned".into(), Some("t1".into()));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "new-notification");
        assert_eq!(json["message"], "assigned");
        assert_eq!(json["task_id"], "t1");
    }
}
