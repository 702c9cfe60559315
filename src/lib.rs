#[macro_use]
extern crate diesel;

pub mod abi;
pub mod chain;
pub mod config;
pub mod db;
pub mod events;
pub mod scanner;
pub mod util;
