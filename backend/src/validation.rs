use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{Datelike, Utc};
use regex::Regex;

use crate::error::FieldError;
use crate::models::{BodyType, CarForm, FuelType, LeadForm, Transmission};
use crate::staging::MAX_IMAGES;

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{10}$").expect("phone regex"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"))
}

fn require(field: &'static str, value: &str, errors: &mut Vec<FieldError>) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, "is required"));
    }
}

fn check_enum<T: FromStr>(
    field: &'static str,
    value: &str,
    allowed: &[&str],
    errors: &mut Vec<FieldError>,
) {
    if T::from_str(value).is_err() {
        errors.push(FieldError::new(
            field,
            format!("must be one of: {}", allowed.join(", ")),
        ));
    }
}

/// Local field validation for the listing form. Runs before any network
/// call; a non-empty error list keeps the submission in `Editing`.
pub fn validate_car_form(form: &CarForm) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    require("brand", &form.brand, &mut errors);
    require("model", &form.model, &mut errors);
    require("color", &form.color, &mut errors);
    require("description", &form.description, &mut errors);

    let max_year = Utc::now().year() + 1;
    if form.year < 1900 || form.year > max_year {
        errors.push(FieldError::new(
            "year",
            format!("must be between 1900 and {}", max_year),
        ));
    }
    if form.price <= 0 {
        errors.push(FieldError::new("price", "must be positive"));
    }
    if form.mileage < 0 {
        errors.push(FieldError::new("mileage", "must not be negative"));
    }
    if form.engine_size <= 0.0 {
        errors.push(FieldError::new("engine_size", "must be positive"));
    }
    if form.power <= 0 {
        errors.push(FieldError::new("power", "must be positive"));
    }
    if !(1..=9).contains(&form.seats) {
        errors.push(FieldError::new("seats", "must be between 1 and 9"));
    }
    if !(2..=5).contains(&form.doors) {
        errors.push(FieldError::new("doors", "must be between 2 and 5"));
    }

    check_enum::<FuelType>("fuel_type", &form.fuel_type, FuelType::ALL, &mut errors);
    check_enum::<Transmission>(
        "transmission",
        &form.transmission,
        Transmission::ALL,
        &mut errors,
    );
    check_enum::<BodyType>("body_type", &form.body_type, BodyType::ALL, &mut errors);

    if form.images.len() > MAX_IMAGES {
        errors.push(FieldError::new(
            "images",
            format!("at most {} images are allowed", MAX_IMAGES),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Local field validation for the lead form. Invalid input fails fast with
/// field-level errors and no partial submission.
pub fn validate_lead_form(form: &LeadForm) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    if form.full_name.trim().len() < 2 {
        errors.push(FieldError::new(
            "full_name",
            "must be at least 2 characters",
        ));
    }
    if !email_re().is_match(form.email.trim()) {
        errors.push(FieldError::new("email", "must be a valid email address"));
    }
    if !phone_re().is_match(&form.phone) {
        errors.push(FieldError::new("phone", "must be exactly 10 digits"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageRef;

    fn valid_car_form() -> CarForm {
        CarForm {
            brand: "Toyota".to_string(),
            model: "Camry".to_string(),
            year: 2023,
            price: 1_500_000,
            mileage: 5000,
            fuel_type: "Petrol".to_string(),
            transmission: "Automatic".to_string(),
            color: "White".to_string(),
            body_type: "Sedan".to_string(),
            engine_size: 2.5,
            power: 200,
            seats: 5,
            doors: 4,
            description: "Well maintained".to_string(),
            featured: false,
            images: Vec::new(),
        }
    }

    fn valid_lead_form() -> LeadForm {
        LeadForm {
            full_name: "Jane Doe".to_string(),
            email: "jane@example.com".to_string(),
            phone: "9876543210".to_string(),
            looking_for: Some("SUV".to_string()),
            budget: None,
            message: None,
        }
    }

    #[test]
    fn accepts_valid_car_form() {
        assert!(validate_car_form(&valid_car_form()).is_ok());
    }

    #[test]
    fn rejects_bad_enum_members() {
        let mut form = valid_car_form();
        form.fuel_type = "Steam".to_string();
        form.body_type = "Truck".to_string();
        let errors = validate_car_form(&form).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"fuel_type"));
        assert!(fields.contains(&"body_type"));
    }

    #[test]
    fn rejects_out_of_range_numerics() {
        let mut form = valid_car_form();
        form.year = 1899;
        form.price = 0;
        form.seats = 10;
        form.doors = 1;
        let errors = validate_car_form(&form).unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn rejects_more_than_ten_images() {
        let mut form = valid_car_form();
        form.images = (0..11)
            .map(|i| ImageRef::Url {
                url: format!("https://cdn.example.com/{}.jpg", i),
            })
            .collect();
        let errors = validate_car_form(&form).unwrap_err();
        assert_eq!(errors[0].field, "images");
    }

    #[test]
    fn accepts_valid_lead_form() {
        assert!(validate_lead_form(&valid_lead_form()).is_ok());
    }

    #[test]
    fn rejects_short_phone_with_field_error() {
        let mut form = valid_lead_form();
        form.phone = "12345".to_string();
        let errors = validate_lead_form(&form).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "phone");
    }

    #[test]
    fn rejects_malformed_email_and_name() {
        let mut form = valid_lead_form();
        form.full_name = "J".to_string();
        form.email = "not-an-email".to_string();
        let errors = validate_lead_form(&form).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["full_name", "email"]);
    }
}
