pub mod engine;
pub mod rules;

pub use engine::{AuctionEngine, CreateAuctionCommand, PlaceBidCommand};
