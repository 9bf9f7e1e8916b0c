use std::net::SocketAddr;
use std::sync::Arc;

use signature_cars_backend::config::AppConfig;
use signature_cars_backend::db;
use signature_cars_backend::handlers::{router, AppState};
use signature_cars_backend::leads::LeadSubmitter;
use signature_cars_backend::repo::PgRepo;
use signature_cars_backend::session::SessionStore;
use signature_cars_backend::staging::ImageStager;
use signature_cars_backend::storage::HttpObjectStore;
use signature_cars_backend::submission::ListingSubmitter;
use signature_cars_backend::verification::{CodeVerifier, VerificationGate};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let config = AppConfig::load()?;
    log::info!("Starting with storage bucket {:?}", config.storage_bucket);

    db::check_connectivity(&config.database_url)?;

    let sessions = Arc::new(SessionStore::new());
    let gate = Arc::new(VerificationGate::new(
        CodeVerifier::new(config.verification_code.clone()),
        sessions,
    ));
    let store = Arc::new(HttpObjectStore::new(&config)?);
    let stager = Arc::new(ImageStager::new(store));
    let repo = Arc::new(PgRepo::new(config.database_url.clone()));
    let submitter = Arc::new(ListingSubmitter::new(stager.clone(), repo.clone()));
    let leads = Arc::new(LeadSubmitter::new(repo.clone()));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    log::info!("Starting server on {}", addr);

    let state = AppState {
        config,
        gate,
        stager,
        listings: repo,
        submitter,
        leads,
    };

    let app = router(state);
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service(),
    )
    .await?;

    Ok(())
}
