// region:    --- Imports
use crate::admin::{AdminService, BlockCommand, GrantCommand, PriceLimitsCommand};
use crate::auction::{AuctionEngine, CreateAuctionCommand, PlaceBidCommand};
use crate::catalog::Catalog;
use crate::config::MarketConfig;
use crate::error::{MarketError, Result};
use crate::ledger::LedgerStore;
use crate::notify::Notifier;
use crate::query::{self, Page};
use crate::trade::pending::{PendingTransfers, TransferKey};
use crate::trade::{
    BuyProductCommand, DelistCommand, ImproveCommand, ListCommand, PurchaseCommand,
    TradeEngine, TransferCommand,
};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
// endregion: --- Imports

// region:    --- App State
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerStore>,
    pub trade: Arc<TradeEngine>,
    pub auctions: Arc<AuctionEngine>,
    pub admin: Arc<AdminService>,
    /// 없으면 관리자 API 는 항상 거절된다
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    /// 원장 위에 거래/경매/관리자 서비스를 구성한다
    pub fn new(
        ledger: Arc<LedgerStore>,
        catalog: Arc<dyn Catalog>,
        notifier: Notifier,
        market: &MarketConfig,
        admin_token: Option<String>,
    ) -> Self {
        let pending = Arc::new(PendingTransfers::new());
        let trade = TradeEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&catalog),
            notifier.clone(),
            Arc::clone(&pending),
            market.improve_cost,
        );
        let auctions = AuctionEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&catalog),
            notifier,
            pending,
            market.default_auction_hours,
        );
        let admin = AdminService::new(Arc::clone(&ledger), catalog);

        Self {
            ledger,
            trade: Arc::new(trade),
            auctions: Arc::new(auctions),
            admin: Arc::new(admin),
            admin_token: admin_token.map(Arc::from),
        }
    }
}

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let provided = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    match (state.admin_token.as_deref(), provided) {
        (Some(expected), Some(provided)) if expected == provided => Ok(()),
        _ => {
            warn!("{:<12} --> 관리자 인증 실패", "Admin");
            Err(MarketError::Unauthorized)
        }
    }
}
// endregion: --- App State

// region:    --- Router
pub fn router(state: AppState) -> Router {
    // 테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/users", post(handle_register_user))
        .route("/users/:id", get(handle_get_user))
        .route("/users/:id/gifts", get(handle_get_user_gifts))
        .route("/shop/buy", post(handle_buy_product))
        .route("/gifts/improve", post(handle_improve_gift))
        .route("/market", get(handle_get_market))
        .route("/market/list", post(handle_list))
        .route("/market/delist", post(handle_delist))
        .route("/market/purchase", post(handle_purchase))
        .route("/auctions", get(handle_get_auctions).post(handle_create_auction))
        .route("/auctions/bid", post(handle_bid))
        .route("/auctions/:id/bids", get(handle_get_bid_history))
        .route("/transfers", post(handle_initiate_transfer))
        .route("/transfers/:key/confirm", post(handle_confirm_transfer))
        .route("/transfers/:key/cancel", post(handle_cancel_transfer))
        .route("/admin/grant", post(handle_admin_grant))
        .route("/admin/block", post(handle_admin_block))
        .route("/admin/market/remove", post(handle_admin_remove_listing))
        .route("/admin/price-limits", post(handle_admin_price_limits))
        .layer(cors)
        .with_state(state)
}
// endregion: --- Router

// region:    --- User Handlers
#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub external_id: i64,
    pub username: String,
}

/// 사용자 등록 (이미 있으면 그대로 반환)
pub async fn handle_register_user(
    State(state): State<AppState>,
    Json(req): Json<RegisterUserRequest>,
) -> Result<impl IntoResponse> {
    info!("{:<12} --> 사용자 등록 요청: {:?}", "Handler", req);
    let user = state.ledger.ensure_user(req.external_id, &req.username).await?;
    Ok((StatusCode::OK, Json(json!({ "user": user }))))
}

/// 사용자 조회
pub async fn handle_get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let user = query::handlers::get_user(state.ledger.database(), id).await?;
    Ok(Json(json!({ "user": user })))
}

/// 사용자 보유 선물 조회
pub async fn handle_get_user_gifts(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let gifts = query::handlers::get_user_gifts(state.ledger.database(), id).await?;
    Ok(Json(json!({ "gifts": gifts })))
}

/// 상점 구매
pub async fn handle_buy_product(
    State(state): State<AppState>,
    Json(cmd): Json<BuyProductCommand>,
) -> Result<impl IntoResponse> {
    let receipt = state.trade.buy_product(cmd).await?;
    Ok(Json(json!({
        "message": "상품을 구매했습니다.",
        "gift": receipt.gift,
        "balance": receipt.balance,
        "remaining": receipt.remaining,
    })))
}

/// 선물 개선
pub async fn handle_improve_gift(
    State(state): State<AppState>,
    Json(cmd): Json<ImproveCommand>,
) -> Result<impl IntoResponse> {
    let (gift, balance) = state.trade.improve_gift(cmd).await?;
    Ok(Json(json!({
        "message": "선물이 개선되었습니다.",
        "gift": gift,
        "balance": balance,
    })))
}
// endregion: --- User Handlers

// region:    --- Market Handlers
/// 판매 목록 조회
pub async fn handle_get_market(
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse> {
    let listings = query::handlers::get_market_listings(state.ledger.database(), page).await?;
    let limits = state.ledger.price_limits().await?;
    Ok(Json(json!({ "listings": listings, "limits": limits })))
}

/// 판매 등록
pub async fn handle_list(
    State(state): State<AppState>,
    Json(cmd): Json<ListCommand>,
) -> Result<impl IntoResponse> {
    let listing = state.trade.list(cmd).await?;
    Ok((StatusCode::CREATED, Json(json!({ "listing": listing }))))
}

/// 판매 취소
pub async fn handle_delist(
    State(state): State<AppState>,
    Json(cmd): Json<DelistCommand>,
) -> Result<impl IntoResponse> {
    let listing = state.trade.delist(cmd).await?;
    Ok(Json(json!({ "listing": listing })))
}

/// 즉시 구매
pub async fn handle_purchase(
    State(state): State<AppState>,
    Json(cmd): Json<PurchaseCommand>,
) -> Result<impl IntoResponse> {
    let receipt = state.trade.purchase(cmd).await?;
    Ok(Json(json!({
        "message": "구매가 성공적으로 처리되었습니다.",
        "gift_id": receipt.listing.gift_id,
        "price": receipt.listing.price,
        "balance": receipt.buyer.balance,
    })))
}
// endregion: --- Market Handlers

// region:    --- Auction Handlers
/// 진행 중인 경매 조회
pub async fn handle_get_auctions(
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse> {
    let auctions =
        query::handlers::get_active_auctions(state.ledger.database(), page, Utc::now()).await?;
    Ok(Json(json!({ "auctions": auctions })))
}

/// 경매 생성
pub async fn handle_create_auction(
    State(state): State<AppState>,
    Json(cmd): Json<CreateAuctionCommand>,
) -> Result<impl IntoResponse> {
    let auction = state.auctions.create_auction(cmd).await?;
    Ok((StatusCode::CREATED, Json(json!({ "auction": auction }))))
}

/// 입찰
pub async fn handle_bid(
    State(state): State<AppState>,
    Json(cmd): Json<PlaceBidCommand>,
) -> Result<impl IntoResponse> {
    let bid_amount = cmd.amount;
    let receipt = state.auctions.place_bid(cmd).await?;
    Ok(Json(json!({
        "message": "입찰이 성공적으로 처리되었습니다.",
        "current_price": receipt.auction.current_price,
        "bid_amount": bid_amount,
        "balance": receipt.bidder.balance,
    })))
}

/// 입찰 이력 조회
pub async fn handle_get_bid_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let bids = query::handlers::get_bid_history(state.ledger.database(), id).await?;
    Ok(Json(json!({ "bids": bids })))
}
// endregion: --- Auction Handlers

// region:    --- Transfer Handlers
fn parse_transfer_key(raw: &str) -> Result<TransferKey> {
    raw.parse().map_err(|_| MarketError::TransferNotFound)
}

/// 선물 직접 전송 요청
pub async fn handle_initiate_transfer(
    State(state): State<AppState>,
    Json(cmd): Json<TransferCommand>,
) -> Result<impl IntoResponse> {
    let key = state.trade.initiate_direct_transfer(cmd).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "전송 확인을 기다리는 중입니다.",
            "key": key.to_string(),
        })),
    ))
}

/// 전송 확인/취소 요청자
#[derive(Debug, Deserialize)]
pub struct ResolveTransferRequest {
    pub sender_id: i64,
}

/// 선물 전송 확인
pub async fn handle_confirm_transfer(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<ResolveTransferRequest>,
) -> Result<impl IntoResponse> {
    let key = parse_transfer_key(&key)?;
    let receipt = state.trade.confirm_transfer_by(&key, req.sender_id).await?;
    Ok(Json(json!({
        "message": "선물이 전송되었습니다.",
        "gift": receipt.gift,
    })))
}

/// 선물 전송 취소
pub async fn handle_cancel_transfer(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<ResolveTransferRequest>,
) -> Result<impl IntoResponse> {
    let key = parse_transfer_key(&key)?;
    state.trade.cancel_transfer_by(&key, req.sender_id)?;
    Ok(Json(json!({ "message": "선물 전송이 취소되었습니다." })))
}
// endregion: --- Transfer Handlers

// region:    --- Admin Handlers
pub async fn handle_admin_grant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(cmd): Json<GrantCommand>,
) -> Result<impl IntoResponse> {
    require_admin(&state, &headers)?;
    let result = state.admin.grant(cmd).await?;
    Ok(Json(json!({ "user": result.user, "gift": result.gift })))
}

pub async fn handle_admin_block(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(cmd): Json<BlockCommand>,
) -> Result<impl IntoResponse> {
    require_admin(&state, &headers)?;
    let user = state.admin.block(cmd).await?;
    Ok(Json(json!({ "user": user })))
}

#[derive(Debug, Deserialize)]
pub struct RemoveListingRequest {
    pub listing_id: i64,
}

pub async fn handle_admin_remove_listing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RemoveListingRequest>,
) -> Result<impl IntoResponse> {
    require_admin(&state, &headers)?;
    let listing = state.admin.remove_listing(req.listing_id).await?;
    Ok(Json(json!({ "listing": listing })))
}

pub async fn handle_admin_price_limits(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(cmd): Json<PriceLimitsCommand>,
) -> Result<impl IntoResponse> {
    require_admin(&state, &headers)?;
    let limits = state.admin.set_price_limits(cmd).await?;
    Ok(Json(json!({ "limits": limits })))
}
// endregion: --- Admin Handlers
