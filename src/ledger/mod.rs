/// 소유권/에스크로 원장
pub mod model;
pub mod queries;
pub mod store;

pub use store::{LedgerStore, NewAuction};
