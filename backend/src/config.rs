use dotenv::dotenv;
use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    /// Shared secret gating listing creation. Absence is a legal
    /// configuration: every verification attempt then fails closed.
    pub verification_code: Option<String>,
    pub session_secret: String,
    pub storage_url: String,
    pub storage_service_key: String,
    pub storage_bucket: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        dotenv().ok(); // Load .env file if present
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            port: env::var("PORT").unwrap_or_else(|_| "3001".to_string()).parse()?,
            verification_code: env::var("CAR_ADD_VERIFICATION_CODE").ok(),
            session_secret: env::var("SESSION_SECRET")?,
            storage_url: env::var("STORAGE_URL")?,
            storage_service_key: env::var("STORAGE_SERVICE_KEY")?,
            storage_bucket: env::var("STORAGE_BUCKET").unwrap_or_else(|_| "car_images".to_string()),
        })
    }
}
