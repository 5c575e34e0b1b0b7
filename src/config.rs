use std::env;

#[derive(Clone)]
pub struct Config {
    pub mongo_uri: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub frontend_origin: String,
    pub port: u16,
    pub smtp: Option<SmtpConfig>,
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub from: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        Self {
            mongo_uri: env::var("MONGO_URI").expect("MONGO_URI must be set"),
            database_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "taskorbit".to_string()),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            frontend_origin: env::var("FRONTEND_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port,
            smtp: SmtpConfig::from_env(),
        }
    }
}

impl SmtpConfig {
    // Invitation emails are optional: without SMTP settings the server still
    // runs, invite links just never leave the database.
    fn from_env() -> Option<Self> {
        let host = env::var("SMTP_HOST").ok()?;
        let user = env::var("SMTP_USER").ok()?;
        let pass = env::var("SMTP_PASS").ok()?;
        let from = env::var("SMTP_FROM").unwrap_or_else(|_| user.clone());
        let port = env::var("SMTP_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse()
            .unwrap_or(587);

        Some(Self { host, port, user, pass, from })
    }
}
