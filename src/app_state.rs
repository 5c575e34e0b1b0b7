use crate::config::Config;
use crate::db::MongoDB;
use crate::email::InviteMailer;
use crate::notification_server::NotificationServer;
use actix::Addr;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub notifier: Addr<NotificationServer>,
    pub mongodb: Arc<MongoDB>,
    pub mailer: Option<Arc<InviteMailer>>,
    pub config: Config,
}
