use anyhow::{Context, Result};
use diesel::pg::PgConnection;
use diesel::Connection;

pub fn establish_connection(database_url: &str) -> Result<PgConnection> {
    PgConnection::establish(database_url)
        .with_context(|| format!("error connecting to {}", database_url))
}
