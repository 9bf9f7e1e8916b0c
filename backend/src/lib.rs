pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod leads;
pub mod models;
pub mod repo;
pub mod schema;
pub mod session;
pub mod staging;
pub mod storage;
pub mod submission;
pub mod validation;
pub mod verification;

pub use config::AppConfig;
pub use error::{ApiError, FieldError, PersistError, UploadError, VerificationError};
pub use handlers::{router, AppState};
pub use leads::LeadSubmitter;
pub use session::SessionStore;
pub use staging::ImageStager;
pub use submission::{ListingSubmitter, Submission, SubmissionState};
pub use verification::{CodeVerifier, VerificationGate};
