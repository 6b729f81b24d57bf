pub mod handlers;
pub mod queries;

pub use handlers::{AuctionView, GiftView, ListingView, Page};
