/// 입찰/경매 생성 규칙
/// 원장 트랜잭션 안에서 잠긴 행을 기준으로 호출된다.
use crate::error::MarketError;
use crate::ledger::model::Auction;
use chrono::{DateTime, Duration, Utc};

/// 입찰 검증
/// 1. 진행 중이 아니거나 종료 시각이 지난 경매 -> AuctionNotFound
/// 2. 현재 가격 이하 -> InvalidBid
/// 3. 판매자 본인 -> SelfBidForbidden
pub fn validate_bid(
    auction: &Auction,
    bidder_id: i64,
    amount: i64,
    now: DateTime<Utc>,
) -> Result<(), MarketError> {
    if !auction.is_active() || auction.is_expired_at(now) {
        return Err(MarketError::AuctionNotFound);
    }
    if amount <= auction.current_price {
        return Err(MarketError::InvalidBid {
            amount,
            current_price: auction.current_price,
        });
    }
    if bidder_id == auction.seller_id {
        return Err(MarketError::SelfBidForbidden);
    }
    Ok(())
}

pub fn validate_duration(hours: i64, max_hours: i64) -> Result<(), MarketError> {
    if hours < 1 || hours > max_hours {
        return Err(MarketError::InvalidDuration { hours, max_hours });
    }
    Ok(())
}

pub fn end_time(now: DateTime<Utc>, duration_hours: i64) -> DateTime<Utc> {
    now + Duration::hours(duration_hours)
}

/// 경매 진행률 (0~100)
pub fn progress_percentage(auction: &Auction, now: DateTime<Utc>) -> i64 {
    let total = (auction.end_time - auction.created_at).num_seconds();
    if total <= 0 {
        return 100;
    }
    let elapsed = (now - auction.created_at).num_seconds();
    (elapsed * 100 / total).clamp(0, 100)
}

// endregion: --- Tests
