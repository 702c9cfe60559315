pub mod connection;
pub mod db_persister;
pub mod models;
pub mod persister;
pub mod queries;
pub mod schema;
pub mod setup;
pub mod views;

pub use connection::establish_connection;
pub use db_persister::DatabasePersister;
pub use persister::{Persister, ProposalSeed};
