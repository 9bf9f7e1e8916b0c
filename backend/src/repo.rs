use async_trait::async_trait;
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::establish_connection;
use crate::error::PersistError;
use crate::models::{Car, Lead, STATUS_ACTIVE};

/// Browse/search filters for the public listing endpoints. All fields
/// compose; absent fields do not constrain.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CarFilter {
    pub brand: Option<String>,
    pub fuel_type: Option<String>,
    pub transmission: Option<String>,
    pub body_type: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub query: Option<String>,
}

#[async_trait]
pub trait ListingRepo: Send + Sync {
    /// Single insert of a fully assembled record; the stored row is
    /// returned so callers see exactly what was persisted.
    async fn insert_car(&self, car: Car) -> Result<Car, PersistError>;
    async fn list_cars(&self, filter: CarFilter) -> Result<Vec<Car>, PersistError>;
    async fn find_car(&self, id: Uuid) -> Result<Option<Car>, PersistError>;
}

#[async_trait]
pub trait LeadRepo: Send + Sync {
    async fn insert_lead(&self, lead: Lead) -> Result<Lead, PersistError>;
}

/// Diesel-backed repository. Connections are established per call and the
/// blocking work runs on the tokio blocking pool.
#[derive(Clone)]
pub struct PgRepo {
    database_url: String,
}

impl PgRepo {
    pub fn new(database_url: String) -> Self {
        Self { database_url }
    }

    async fn run<T, F>(&self, f: F) -> Result<T, PersistError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, PersistError> + Send + 'static,
    {
        let database_url = self.database_url.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&database_url)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| PersistError::Database(format!("blocking task failed: {}", e)))?
    }
}

#[async_trait]
impl ListingRepo for PgRepo {
    async fn insert_car(&self, car: Car) -> Result<Car, PersistError> {
        use crate::schema::cars;
        self.run(move |conn| {
            let stored = diesel::insert_into(cars::table)
                .values(&car)
                .get_result::<Car>(conn)?;
            Ok(stored)
        })
        .await
    }

    async fn list_cars(&self, filter: CarFilter) -> Result<Vec<Car>, PersistError> {
        use crate::schema::cars;
        self.run(move |conn| {
            let mut query = cars::table
                .filter(cars::status.eq(STATUS_ACTIVE))
                .order(cars::created_at.desc())
                .into_boxed();

            if let Some(brand) = filter.brand {
                query = query.filter(cars::brand.eq(brand));
            }
            if let Some(fuel_type) = filter.fuel_type {
                query = query.filter(cars::fuel_type.eq(fuel_type));
            }
            if let Some(transmission) = filter.transmission {
                query = query.filter(cars::transmission.eq(transmission));
            }
            if let Some(body_type) = filter.body_type {
                query = query.filter(cars::body_type.eq(body_type));
            }
            if let Some(min_price) = filter.min_price {
                query = query.filter(cars::price.ge(min_price));
            }
            if let Some(max_price) = filter.max_price {
                query = query.filter(cars::price.le(max_price));
            }
            if let Some(text) = filter.query {
                let pattern = format!("%{}%", text);
                query = query.filter(
                    cars::brand
                        .ilike(pattern.clone())
                        .or(cars::model.ilike(pattern.clone()))
                        .or(cars::description.ilike(pattern)),
                );
            }

            let rows = query.load::<Car>(conn)?;
            Ok(rows)
        })
        .await
    }

    async fn find_car(&self, id: Uuid) -> Result<Option<Car>, PersistError> {
        use crate::schema::cars;
        self.run(move |conn| {
            let row = cars::table
                .find(id)
                .first::<Car>(conn)
                .optional()?;
            Ok(row)
        })
        .await
    }
}

#[async_trait]
impl LeadRepo for PgRepo {
    async fn insert_lead(&self, lead: Lead) -> Result<Lead, PersistError> {
        use crate::schema::leads;
        self.run(move |conn| {
            let stored = diesel::insert_into(leads::table)
                .values(&lead)
                .get_result::<Lead>(conn)?;
            Ok(stored)
        })
        .await
    }
}

/// In-memory repository used by tests and local development.
#[derive(Debug, Default)]
pub struct MemoryRepo {
    cars: std::sync::Mutex<Vec<Car>>,
    leads: std::sync::Mutex<Vec<Lead>>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn car_count(&self) -> usize {
        self.cars.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn lead_count(&self) -> usize {
        self.leads.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl ListingRepo for MemoryRepo {
    async fn insert_car(&self, car: Car) -> Result<Car, PersistError> {
        self.cars
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(car.clone());
        Ok(car)
    }

    async fn list_cars(&self, filter: CarFilter) -> Result<Vec<Car>, PersistError> {
        let cars = self.cars.lock().unwrap_or_else(|e| e.into_inner());
        Ok(cars
            .iter()
            .filter(|c| c.status == STATUS_ACTIVE)
            .filter(|c| filter.brand.as_ref().is_none_or(|b| &c.brand == b))
            .filter(|c| filter.fuel_type.as_ref().is_none_or(|f| &c.fuel_type == f))
            .filter(|c| {
                filter
                    .transmission
                    .as_ref()
                    .is_none_or(|t| &c.transmission == t)
            })
            .filter(|c| filter.body_type.as_ref().is_none_or(|b| &c.body_type == b))
            .filter(|c| filter.min_price.is_none_or(|p| c.price >= p))
            .filter(|c| filter.max_price.is_none_or(|p| c.price <= p))
            .filter(|c| {
                filter.query.as_ref().is_none_or(|q| {
                    let q = q.to_lowercase();
                    c.brand.to_lowercase().contains(&q)
                        || c.model.to_lowercase().contains(&q)
                        || c.description.to_lowercase().contains(&q)
                })
            })
            .cloned()
            .collect())
    }

    async fn find_car(&self, id: Uuid) -> Result<Option<Car>, PersistError> {
        let cars = self.cars.lock().unwrap_or_else(|e| e.into_inner());
        Ok(cars.iter().find(|c| c.id == id).cloned())
    }
}

#[async_trait]
impl LeadRepo for MemoryRepo {
    async fn insert_lead(&self, lead: Lead) -> Result<Lead, PersistError> {
        self.leads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(lead.clone());
        Ok(lead)
    }
}
