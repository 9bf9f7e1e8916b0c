use diesel::pg::PgConnection;
use diesel::prelude::*;
use log::{error, info};

pub fn establish_connection(database_url: &str) -> Result<PgConnection, ConnectionError> {
    match PgConnection::establish(database_url) {
        Ok(conn) => Ok(conn),
        Err(e) => {
            error!("Failed to establish database connection: {}", e);
            Err(e)
        }
    }
}

/// Startup probe: run a trivial query so misconfiguration fails loudly
/// before the server starts accepting requests.
pub fn check_connectivity(database_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = establish_connection(database_url)?;
    let test_query: i32 =
        diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("1")).get_result(&mut conn)?;
    info!("Database test query result: {}", test_query);
    Ok(())
}
