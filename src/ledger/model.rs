use crate::error::MarketError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// 사용자 모델
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    /// 메시징 채널상의 사용자 식별자
    pub external_id: i64,
    pub username: String,
    pub balance: i64,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// 거래 주체로 행동할 수 있는지 확인
    pub fn ensure_active(&self) -> Result<(), MarketError> {
        if self.is_blocked {
            return Err(MarketError::UserBlocked);
        }
        Ok(())
    }

    pub fn ensure_funds(&self, needed: i64) -> Result<(), MarketError> {
        if self.balance < needed {
            return Err(MarketError::InsufficientFunds {
                needed,
                available: self.balance,
            });
        }
        Ok(())
    }
}

// 선물 모델
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Gift {
    pub id: i64,
    pub owner_id: i64,
    pub product_id: i64,
    pub improved: bool,
    pub improved_image: Option<String>,
    pub collection_number: Option<i32>,
    pub created_at: DateTime<Utc>,
}

// 판매 목록 모델
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MarketListing {
    pub id: i64,
    pub gift_id: i64,
    pub seller_id: i64,
    pub price: i64,
    pub created_at: DateTime<Utc>,
}

/// 경매 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuctionStatus {
    Active,
    Completed,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
        }
    }
}

// 경매 모델
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Auction {
    pub id: i64,
    pub gift_id: i64,
    pub seller_id: i64,
    pub start_price: i64,
    pub current_price: i64,
    pub current_bidder_id: Option<i64>,
    pub step_price: i64,
    pub end_time: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Auction {
    pub fn is_active(&self) -> bool {
        self.status == AuctionStatus::Active.as_str()
    }

    /// 종료 시각이 지났는지 여부 (종료 시각 당일은 이미 만료로 본다)
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.end_time <= now
    }
}

// 입찰 기록 모델
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuctionBid {
    pub id: i64,
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// 판매 가격 허용 범위
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PriceLimits {
    pub min_price: i64,
    pub max_price: i64,
}

impl PriceLimits {
    pub fn new(min_price: i64, max_price: i64) -> Result<Self, MarketError> {
        if min_price < 0 || min_price > max_price {
            return Err(MarketError::InvalidPriceLimits {
                min: min_price,
                max: max_price,
            });
        }
        Ok(Self {
            min_price,
            max_price,
        })
    }

    pub fn check(&self, price: i64) -> Result<(), MarketError> {
        if price < self.min_price || price > self.max_price {
            return Err(MarketError::PriceOutOfRange {
                price,
                min: self.min_price,
                max: self.max_price,
            });
        }
        Ok(())
    }
}

/// 판매 목록 삭제 요청자
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requester {
    User(i64),
    Admin,
}

/// 즉시 구매 결과
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseReceipt {
    pub listing: MarketListing,
    pub product_id: i64,
    pub buyer: User,
    pub seller: User,
}

/// 입찰 결과
#[derive(Debug, Clone, Serialize)]
pub struct BidReceipt {
    pub auction: Auction,
    pub product_id: i64,
    pub bidder: User,
    pub seller: User,
    /// 환불받은 이전 최고 입찰자와 환불 금액
    pub outbid: Option<(User, i64)>,
}

/// 경매 정산 결과
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    Sold {
        auction: Auction,
        product_id: i64,
        seller: User,
        winner: User,
    },
    Unsold {
        auction: Auction,
        product_id: i64,
        seller: User,
    },
}

impl SettlementOutcome {
    pub fn auction(&self) -> &Auction {
        match self {
            Self::Sold { auction, .. } | Self::Unsold { auction, .. } => auction,
        }
    }
}

/// 선물 직접 전송 결과
#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub gift: Gift,
    pub sender: User,
    pub recipient: User,
}

/// 상점 구매 결과
#[derive(Debug, Clone, Serialize)]
pub struct ShopReceipt {
    pub gift: Gift,
    pub balance: i64,
    /// 구매 한도가 있는 상품의 남은 수량
    pub remaining: Option<i64>,
}

// endregion: --- Tests
