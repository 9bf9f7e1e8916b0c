use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Listing status at persistence time. Only "active" is produced by the
/// submission flow; the column is free-form to leave room for moderation.
pub const STATUS_ACTIVE: &str = "active";

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [&'static str] = &[$($text),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(()),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(FuelType {
    Petrol => "Petrol",
    Diesel => "Diesel",
    Electric => "Electric",
    Hybrid => "Hybrid",
});

string_enum!(Transmission {
    Automatic => "Automatic",
    Manual => "Manual",
});

string_enum!(BodyType {
    Sedan => "Sedan",
    Suv => "SUV",
    Hatchback => "Hatchback",
    Coupe => "Coupe",
    Convertible => "Convertible",
    Wagon => "Wagon",
});

/// A persisted car listing. Field order matches `schema::cars`.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = crate::schema::cars)]
pub struct Car {
    pub id: Uuid,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub price: i64,
    pub mileage: i64,
    pub fuel_type: String,
    pub transmission: String,
    pub color: String,
    pub body_type: String,
    pub engine_size: f64,
    pub power: i32,
    pub seats: i16,
    pub doors: i16,
    pub description: String,
    pub images: Vec<String>,
    pub featured: bool,
    pub is_verified: bool,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A persisted sales inquiry. Field order matches `schema::leads`.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = crate::schema::leads)]
pub struct Lead {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub looking_for: Option<String>,
    pub budget: Option<String>,
    pub message: Option<String>,
    pub car_id: Option<Uuid>,
    pub reference_number: String,
    pub created_at: NaiveDateTime,
}

/// One entry of a draft listing's image sequence: either a durable URL that
/// passes through resolution unchanged, or a staged preview still awaiting
/// upload. No `Preview` survives past persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageRef {
    Url { url: String },
    Preview { handle: Uuid },
}

/// Client-submitted listing form, pre-validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarForm {
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub price: i64,
    pub mileage: i64,
    pub fuel_type: String,
    pub transmission: String,
    pub color: String,
    pub body_type: String,
    pub engine_size: f64,
    pub power: i32,
    pub seats: i16,
    pub doors: i16,
    pub description: String,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

/// Client-submitted lead form, pre-validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadForm {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub looking_for: Option<String>,
    #[serde(default)]
    pub budget: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
