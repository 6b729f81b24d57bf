// region:    --- Imports
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
// endregion: --- Imports

// region:    --- Market Error
/// 거래/경매 요청 처리 중 발생하는 오류
#[derive(Error, Debug)]
pub enum MarketError {
    #[error("해당 선물의 소유자가 아닙니다.")]
    NotOwner,

    #[error("판매 목록을 찾을 수 없습니다.")]
    InvalidListing,

    #[error("경매를 찾을 수 없거나 이미 종료되었습니다.")]
    AuctionNotFound,

    #[error("잔액이 부족합니다. (필요: {needed}, 보유: {available})")]
    InsufficientFunds { needed: i64, available: i64 },

    #[error("가격은 {min}에서 {max} 사이여야 합니다. (요청: {price})")]
    PriceOutOfRange { price: i64, min: i64, max: i64 },

    #[error("이미 판매 중이거나 경매 중인 선물입니다.")]
    AlreadyListed,

    #[error("자신의 경매에는 입찰할 수 없습니다.")]
    SelfBidForbidden,

    #[error("입찰 금액이 현재 가격보다 높아야 합니다. (입찰: {amount}, 현재: {current_price})")]
    InvalidBid { amount: i64, current_price: i64 },

    #[error("사용자를 찾을 수 없습니다.")]
    UserNotFound,

    #[error("차단된 사용자입니다.")]
    UserBlocked,

    #[error("상품을 찾을 수 없습니다. (id: {0})")]
    ProductNotFound(i64),

    #[error("상품 구매 한도에 도달했습니다.")]
    ProductSoldOut,

    #[error("이미 개선된 선물입니다.")]
    AlreadyImproved,

    #[error("개선할 수 없는 상품입니다.")]
    NotImprovable,

    #[error("경매 기간은 1시간에서 {max_hours}시간 사이여야 합니다. (요청: {hours})")]
    InvalidDuration { hours: i64, max_hours: i64 },

    #[error("잘못된 가격 범위입니다. (min: {min}, max: {max})")]
    InvalidPriceLimits { min: i64, max: i64 },

    #[error("자신의 상품은 구매할 수 없습니다.")]
    SelfPurchaseForbidden,

    #[error("자기 자신에게는 선물을 보낼 수 없습니다.")]
    SelfTransferForbidden,

    #[error("전송 요청이 만료되었거나 존재하지 않습니다.")]
    TransferNotFound,

    #[error("권한이 없습니다.")]
    Unauthorized,

    #[error("데이터베이스 오류: {0}")]
    Database(#[from] sqlx::Error),

    #[error("저장소 응답 시간 초과")]
    Timeout,
}

impl MarketError {
    /// 외부에 노출되는 오류 코드
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotOwner => "NOT_OWNER",
            Self::InvalidListing => "INVALID_LISTING",
            Self::AuctionNotFound => "INVALID_AUCTION",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::PriceOutOfRange { .. } => "PRICE_OUT_OF_RANGE",
            Self::AlreadyListed => "ALREADY_LISTED",
            Self::SelfBidForbidden => "SELF_BID_FORBIDDEN",
            Self::InvalidBid { .. } => "INVALID_BID",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::UserBlocked => "USER_BLOCKED",
            Self::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            Self::ProductSoldOut => "PRODUCT_SOLD_OUT",
            Self::AlreadyImproved => "ALREADY_IMPROVED",
            Self::NotImprovable => "NOT_IMPROVABLE",
            Self::InvalidDuration { .. } => "INVALID_DURATION",
            Self::InvalidPriceLimits { .. } => "INVALID_PRICE_LIMITS",
            Self::SelfPurchaseForbidden => "SELF_PURCHASE_FORBIDDEN",
            Self::SelfTransferForbidden => "SELF_TRANSFER_FORBIDDEN",
            Self::TransferNotFound => "TRANSFER_NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Database(_) | Self::Timeout => "SERVER_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidListing
            | Self::AuctionNotFound
            | Self::UserNotFound
            | Self::ProductNotFound(_)
            | Self::TransferNotFound => StatusCode::NOT_FOUND,
            Self::NotOwner | Self::UserBlocked | Self::Unauthorized => StatusCode::FORBIDDEN,
            Self::AlreadyListed => StatusCode::CONFLICT,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// 저장소 경합(직렬화 실패, 교착 상태)으로 재시도 가능한 오류인지 여부
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db_err)) => {
                matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
            }
            Self::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }

    /// 저장소/전송 계층 오류 여부
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Timeout)
    }
}

/// 고유 제약 조건 위반(23505) 여부
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        }));
        (self.status(), body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, MarketError>;
// endregion: --- Market Error

// endregion: --- Tests
