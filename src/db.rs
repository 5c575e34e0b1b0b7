use log::info;
use mongodb::{options::ClientOptions, Client, Database};

/// Handle to the one database everything lives in. The driver connects
/// lazily, so init only validates the connection string.
pub struct MongoDB {
    pub db: Database,
}

impl MongoDB {
    pub async fn init(uri: &str, db_name: &str) -> Self {
        let options = ClientOptions::parse(uri)
            .await
            .expect("MONGO_URI is not a valid connection string");
        let client = Client::with_options(options).expect("Failed to build MongoDB client");
        info!("Using MongoDB database {}", db_name);
        MongoDB {
            db: client.database(db_name),
        }
    }
}
