use std::sync::Arc;

use chrono::Utc;
use log::info;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{Lead, LeadForm};
use crate::repo::LeadRepo;
use crate::validation::validate_lead_form;

/// Reference numbers are the fixed prefix plus the last 8 digits of the
/// submission timestamp in milliseconds.
pub const REFERENCE_PREFIX: &str = "TSC";

pub fn reference_number(timestamp_millis: i64) -> String {
    let digits = timestamp_millis.to_string();
    let tail_start = digits.len().saturating_sub(8);
    format!("{}{}", REFERENCE_PREFIX, &digits[tail_start..])
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadReceipt {
    pub lead_id: Uuid,
    pub reference_number: String,
}

/// The simpler sibling of the listing pipeline: validate, persist, hand
/// back a reference number. No verification gate.
pub struct LeadSubmitter {
    repo: Arc<dyn LeadRepo>,
}

impl LeadSubmitter {
    pub fn new(repo: Arc<dyn LeadRepo>) -> Self {
        Self { repo }
    }

    /// Validates and persists in one step. A backend failure propagates as
    /// an error; no reference number is fabricated for a lead that was
    /// never durably stored.
    pub async fn submit(
        &self,
        form: LeadForm,
        car_id: Option<Uuid>,
    ) -> Result<LeadReceipt, ApiError> {
        validate_lead_form(&form).map_err(ApiError::Validation)?;

        let now = Utc::now();
        let lead = Lead {
            id: Uuid::new_v4(),
            full_name: form.full_name.trim().to_string(),
            email: form.email.trim().to_string(),
            phone: form.phone,
            looking_for: form.looking_for,
            budget: form.budget,
            message: form.message,
            car_id,
            reference_number: reference_number(now.timestamp_millis()),
            created_at: now.naive_utc(),
        };

        let stored = self.repo.insert_lead(lead).await?;
        info!(
            "lead {} stored with reference {}",
            stored.id, stored.reference_number
        );
        Ok(LeadReceipt {
            lead_id: stored.id,
            reference_number: stored.reference_number,
        })
    }
}
