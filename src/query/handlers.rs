// region:    --- Imports
use super::queries;
use crate::auction::rules::progress_percentage;
use crate::database::DatabaseManager;
use crate::error::{MarketError, Result};
use crate::ledger::model::{Auction, AuctionBid, User};
use crate::ledger::queries as ledger_queries;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
// endregion: --- Imports

// region:    --- Views
/// 사용자 보유 선물
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GiftView {
    pub id: i64,
    pub owner_id: i64,
    pub product_id: i64,
    pub improved: bool,
    pub improved_image: Option<String>,
    pub collection_number: Option<i32>,
    pub listing_id: Option<i64>,
    pub listing_price: Option<i64>,
    pub auction_id: Option<i64>,
}

/// 판매 목록 항목
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ListingView {
    pub id: i64,
    pub gift_id: i64,
    pub seller_id: i64,
    pub seller_name: String,
    pub price: i64,
    pub product_id: i64,
    pub improved: bool,
    pub collection_number: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct AuctionRow {
    #[sqlx(flatten)]
    auction: Auction,
    product_id: i64,
}

/// 진행 중인 경매 항목
#[derive(Debug, Clone, Serialize)]
pub struct AuctionView {
    #[serde(flatten)]
    pub auction: Auction,
    pub product_id: i64,
    pub progress: i64,
}

/// 목록 페이지 (기본 20건, 최대 100건)
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "Page::default_limit")]
    pub limit: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: Self::default_limit(),
        }
    }
}

impl Page {
    fn default_limit() -> i64 {
        20
    }

    fn bounds(&self) -> (i64, i64) {
        (self.limit.clamp(1, 100), self.offset.max(0))
    }
}
// endregion: --- Views

// region:    --- Query Handlers

/// 사용자 조회
pub async fn get_user(db_manager: &DatabaseManager, user_id: i64) -> Result<User> {
    info!("{:<12} --> 사용자 조회 id: {}", "Query", user_id);
    db_manager
        .transaction(move |tx| {
            Box::pin(async move {
                sqlx::query_as::<_, User>(ledger_queries::GET_USER)
                    .bind(user_id)
                    .fetch_optional(&mut **tx)
                    .await?
                    .ok_or(MarketError::UserNotFound)
            })
        })
        .await
}

/// 사용자 선물 조회
pub async fn get_user_gifts(db_manager: &DatabaseManager, user_id: i64) -> Result<Vec<GiftView>> {
    info!("{:<12} --> 사용자 선물 조회 id: {}", "Query", user_id);
    db_manager
        .transaction(move |tx| {
            Box::pin(async move {
                let gifts = sqlx::query_as::<_, GiftView>(queries::GET_USER_GIFTS)
                    .bind(user_id)
                    .fetch_all(&mut **tx)
                    .await?;
                Ok(gifts)
            })
        })
        .await
}

/// 판매 목록 조회
pub async fn get_market_listings(db_manager: &DatabaseManager, page: Page) -> Result<Vec<ListingView>> {
    let (limit, offset) = page.bounds();
    info!("{:<12} --> 판매 목록 조회 offset: {}", "Query", offset);
    db_manager
        .transaction(move |tx| {
            Box::pin(async move {
                let listings = sqlx::query_as::<_, ListingView>(queries::GET_MARKET_LISTINGS)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&mut **tx)
                    .await?;
                Ok(listings)
            })
        })
        .await
}

/// 진행 중인 경매 조회
pub async fn get_active_auctions(
    db_manager: &DatabaseManager,
    page: Page,
    now: DateTime<Utc>,
) -> Result<Vec<AuctionView>> {
    let (limit, offset) = page.bounds();
    info!("{:<12} --> 진행 중인 경매 조회 offset: {}", "Query", offset);
    let rows = db_manager
        .transaction(move |tx| {
            Box::pin(async move {
                let rows = sqlx::query_as::<_, AuctionRow>(queries::GET_ACTIVE_AUCTIONS)
                    .bind(now)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&mut **tx)
                    .await?;
                Ok(rows)
            })
        })
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| AuctionView {
            progress: progress_percentage(&row.auction, now),
            auction: row.auction,
            product_id: row.product_id,
        })
        .collect())
}

/// 입찰 이력 조회 (높은 금액 순)
pub async fn get_bid_history(db_manager: &DatabaseManager, auction_id: i64) -> Result<Vec<AuctionBid>> {
    info!("{:<12} --> 입찰 이력 조회 id: {}", "Query", auction_id);
    db_manager
        .transaction(move |tx| {
            Box::pin(async move {
                let exists = sqlx::query_scalar::<_, bool>(queries::AUCTION_EXISTS)
                    .bind(auction_id)
                    .fetch_one(&mut **tx)
                    .await?;
                if !exists {
                    return Err(MarketError::AuctionNotFound);
                }
                let bids = sqlx::query_as::<_, AuctionBid>(queries::GET_BID_HISTORY)
                    .bind(auction_id)
                    .fetch_all(&mut **tx)
                    .await?;
                Ok(bids)
            })
        })
        .await
}

/// 상품별 누적 구매 수량
pub async fn get_product_bought(db_manager: &DatabaseManager, product_id: i64) -> Result<i64> {
    db_manager
        .transaction(move |tx| {
            Box::pin(async move {
                let bought = sqlx::query_scalar::<_, i64>(queries::GET_PRODUCT_BOUGHT)
                    .bind(product_id)
                    .fetch_one(&mut **tx)
                    .await?;
                Ok(bought)
            })
        })
        .await
}
// endregion: --- Query Handlers

// endregion: --- Tests
