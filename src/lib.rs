pub mod admin;
pub mod auction;
pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod message_broker;
pub mod notify;
pub mod query;
pub mod scheduler;
pub mod trade;
