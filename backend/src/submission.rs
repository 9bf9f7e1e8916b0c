use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use thiserror::Error;
use uuid::Uuid;

use crate::error::{ApiError, FieldError, PersistError, UploadError};
use crate::models::{Car, CarForm, STATUS_ACTIVE};
use crate::repo::ListingRepo;
use crate::staging::ImageStager;
use crate::validation::validate_car_form;

/// Which step of the pipeline failed. Decides where a retry re-enters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    UploadFailed,
    PersistFailed,
}

/// The submission pipeline as a tagged union. Every transition is handled
/// exhaustively; there are no side-channel boolean flags.
///
/// `Editing -> AwaitingVerification -> (Locked | Uploading) -> Persisting
/// -> (Succeeded | Failed)`, with `Failed` re-entering `Uploading` or
/// `Persisting` on a caller-initiated retry.
#[derive(Debug)]
pub enum SubmissionState {
    Editing,
    AwaitingVerification,
    Locked,
    Uploading,
    Persisting { images: Vec<String> },
    Succeeded { car: Car },
    Failed { reason: FailureReason, images: Option<Vec<String>> },
}

impl SubmissionState {
    fn name(&self) -> &'static str {
        match self {
            SubmissionState::Editing => "editing",
            SubmissionState::AwaitingVerification => "awaiting_verification",
            SubmissionState::Locked => "locked",
            SubmissionState::Uploading => "uploading",
            SubmissionState::Persisting { .. } => "persisting",
            SubmissionState::Succeeded { .. } => "succeeded",
            SubmissionState::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::InvalidTransition { .. } => ApiError::BadRequest(e.to_string()),
            SubmitError::Upload(e) => ApiError::Upload(e),
            SubmitError::Persist(e) => ApiError::Persist(e),
        }
    }
}

/// One listing submission: the draft form plus its position in the
/// pipeline. The draft is never dropped on failure, so a retry does not
/// re-enter `Editing`.
#[derive(Debug)]
pub struct Submission {
    /// Scopes uploaded objects before a database id exists; becomes the
    /// record id at persistence.
    listing_key: Uuid,
    draft: CarForm,
    state: SubmissionState,
}

impl Submission {
    pub fn new(draft: CarForm) -> Self {
        Self {
            listing_key: Uuid::new_v4(),
            draft,
            state: SubmissionState::Editing,
        }
    }

    pub fn state(&self) -> &SubmissionState {
        &self.state
    }

    pub fn listing_key(&self) -> Uuid {
        self.listing_key
    }

    pub fn draft(&self) -> &CarForm {
        &self.draft
    }

    /// Submit action out of `Editing`. Invalid input stays in `Editing`
    /// with field-level errors; nothing has touched the network yet.
    pub fn submit(&mut self) -> Result<(), Vec<FieldError>> {
        match self.state {
            SubmissionState::Editing => match validate_car_form(&self.draft) {
                Ok(()) => {
                    self.state = SubmissionState::AwaitingVerification;
                    Ok(())
                }
                Err(errors) => Err(errors),
            },
            // A submit anywhere else is a no-op; the pipeline is already
            // past field validation.
            _ => Ok(()),
        }
    }

    /// The verification gate reported success.
    pub fn verification_succeeded(&mut self) -> Result<(), SubmitError> {
        match self.state {
            SubmissionState::AwaitingVerification => {
                self.state = SubmissionState::Uploading;
                Ok(())
            }
            ref s => Err(SubmitError::InvalidTransition {
                action: "verify",
                state: s.name(),
            }),
        }
    }

    /// The verification gate reported failure. With attempts left the
    /// submission stays put for another try; an exhausted budget is
    /// terminal for the session.
    pub fn verification_failed(&mut self, locked: bool) -> Result<(), SubmitError> {
        match self.state {
            SubmissionState::AwaitingVerification => {
                if locked {
                    warn!("submission {} locked out", self.listing_key);
                    self.state = SubmissionState::Locked;
                }
                Ok(())
            }
            ref s => Err(SubmitError::InvalidTransition {
                action: "verify",
                state: s.name(),
            }),
        }
    }

    /// Resolves the draft's image sequence to durable URLs. All-or-nothing:
    /// a failure moves to `Failed` with the draft (and its previews)
    /// retained for a retry.
    pub async fn upload(&mut self, stager: &ImageStager) -> Result<(), SubmitError> {
        match self.state {
            SubmissionState::Uploading => {
                match stager.resolve(self.listing_key, &self.draft.images).await {
                    Ok(images) => {
                        self.state = SubmissionState::Persisting { images };
                        Ok(())
                    }
                    Err(e) => {
                        self.state = SubmissionState::Failed {
                            reason: FailureReason::UploadFailed,
                            images: None,
                        };
                        Err(e.into())
                    }
                }
            }
            ref s => Err(SubmitError::InvalidTransition {
                action: "upload",
                state: s.name(),
            }),
        }
    }

    /// Assembles the final record and issues the single insert. Server-side
    /// defaults are fixed here: `is_verified = true`, `status = "active"`,
    /// fresh timestamps.
    pub async fn persist(&mut self, repo: &dyn ListingRepo) -> Result<Car, SubmitError> {
        let images = match &self.state {
            SubmissionState::Persisting { images } => images.clone(),
            s => {
                return Err(SubmitError::InvalidTransition {
                    action: "persist",
                    state: s.name(),
                })
            }
        };

        let now = Utc::now().naive_utc();
        let record = Car {
            id: self.listing_key,
            brand: self.draft.brand.clone(),
            model: self.draft.model.clone(),
            year: self.draft.year,
            price: self.draft.price,
            mileage: self.draft.mileage,
            fuel_type: self.draft.fuel_type.clone(),
            transmission: self.draft.transmission.clone(),
            color: self.draft.color.clone(),
            body_type: self.draft.body_type.clone(),
            engine_size: self.draft.engine_size,
            power: self.draft.power,
            seats: self.draft.seats,
            doors: self.draft.doors,
            description: self.draft.description.clone(),
            images,
            featured: self.draft.featured,
            is_verified: true,
            status: STATUS_ACTIVE.to_string(),
            created_at: now,
            updated_at: now,
        };

        match repo.insert_car(record).await {
            Ok(stored) => {
                info!("listing {} persisted", stored.id);
                self.state = SubmissionState::Succeeded { car: stored.clone() };
                Ok(stored)
            }
            Err(e) => {
                let images = match std::mem::replace(&mut self.state, SubmissionState::Editing) {
                    SubmissionState::Persisting { images } => Some(images),
                    _ => None,
                };
                self.state = SubmissionState::Failed {
                    reason: FailureReason::PersistFailed,
                    images,
                };
                Err(e.into())
            }
        }
    }

    /// Caller-initiated retry out of `Failed`: re-enters the step that
    /// failed, never `Editing`. There is no automatic retry loop.
    pub fn retry(&mut self) -> Result<(), SubmitError> {
        match std::mem::replace(&mut self.state, SubmissionState::Editing) {
            SubmissionState::Failed {
                reason: FailureReason::UploadFailed,
                ..
            } => {
                self.state = SubmissionState::Uploading;
                Ok(())
            }
            SubmissionState::Failed {
                reason: FailureReason::PersistFailed,
                images: Some(images),
            } => {
                self.state = SubmissionState::Persisting { images };
                Ok(())
            }
            SubmissionState::Failed {
                reason: FailureReason::PersistFailed,
                images: None,
            } => {
                // Resolved URLs were lost; redo the upload step.
                self.state = SubmissionState::Uploading;
                Ok(())
            }
            s => {
                let name = s.name();
                self.state = s;
                Err(SubmitError::InvalidTransition {
                    action: "retry",
                    state: name,
                })
            }
        }
    }
}

/// Drives a verified submission through upload and persistence. Strictly
/// sequential: persistence does not start until every image resolved.
pub struct ListingSubmitter {
    stager: Arc<ImageStager>,
    repo: Arc<dyn ListingRepo>,
}

impl ListingSubmitter {
    pub fn new(stager: Arc<ImageStager>, repo: Arc<dyn ListingRepo>) -> Self {
        Self { stager, repo }
    }

    pub async fn run(&self, submission: &mut Submission) -> Result<Car, SubmitError> {
        submission.upload(&self.stager).await?;
        let car = submission.persist(self.repo.as_ref()).await?;
        // Previews outlive a failed persist so a retried submission can
        // resolve them again; only a stored listing releases them.
        self.stager.release(&submission.draft.images);
        Ok(car)
    }
}
