/// 원장 저장소
/// 모든 변경은 하나의 트랜잭션 안에서 행 잠금 후 전제 조건을 다시 검증한다.
/// 잠금 순서: 판매 목록/경매 행 -> 선물 행 -> 사용자 행(id 오름차순)
// region:    --- Imports
use super::model::{
    Auction, BidReceipt, Gift, MarketListing, PriceLimits, PurchaseReceipt, Requester,
    SettlementOutcome, ShopReceipt, TransferReceipt, User,
};
use super::queries;
use crate::auction::rules;
use crate::database::DatabaseManager;
use crate::error::{is_unique_violation, MarketError, Result};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use std::sync::Arc;
use tracing::{debug, error, info};
// endregion: --- Imports

// region:    --- Ledger Store
/// 경매 생성 요청
#[derive(Debug, Clone, Copy)]
pub struct NewAuction {
    pub gift_id: i64,
    pub seller_id: i64,
    pub start_price: i64,
    pub duration_hours: i64,
}

pub struct LedgerStore {
    db: Arc<DatabaseManager>,
    starting_balance: i64,
    step_price: i64,
    max_auction_hours: i64,
}

impl LedgerStore {
    pub fn new(
        db: Arc<DatabaseManager>,
        starting_balance: i64,
        step_price: i64,
        max_auction_hours: i64,
    ) -> Self {
        Self {
            db,
            starting_balance,
            step_price,
            max_auction_hours,
        }
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.db
    }

    /// 최초 접촉 시 사용자 생성 (이미 있으면 이름만 갱신)
    pub async fn ensure_user(&self, external_id: i64, username: &str) -> Result<User> {
        let username = username.to_string();
        let starting_balance = self.starting_balance;
        self.db
            .transaction(move |tx| {
                let username = username.clone();
                Box::pin(async move {
                    let user = sqlx::query_as::<_, User>(queries::UPSERT_USER)
                        .bind(external_id)
                        .bind(username)
                        .bind(starting_balance)
                        .fetch_one(&mut **tx)
                        .await?;
                    Ok(user)
                })
            })
            .await
    }

    pub async fn get_user(&self, user_id: i64) -> Result<User> {
        self.db
            .transaction(move |tx| Box::pin(get_user(&mut **tx, user_id)))
            .await
    }

    pub async fn find_user_by_external_id(&self, external_id: i64) -> Result<User> {
        self.db
            .transaction(move |tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, User>(queries::GET_USER_BY_EXTERNAL_ID)
                        .bind(external_id)
                        .fetch_optional(&mut **tx)
                        .await?
                        .ok_or(MarketError::UserNotFound)
                })
            })
            .await
    }

    pub async fn get_gift(&self, gift_id: i64) -> Result<Option<Gift>> {
        self.db
            .transaction(move |tx| {
                Box::pin(async move {
                    let gift = sqlx::query_as::<_, Gift>(queries::GET_GIFT)
                        .bind(gift_id)
                        .fetch_optional(&mut **tx)
                        .await?;
                    Ok(gift)
                })
            })
            .await
    }

    /// 선물이 판매 목록 또는 진행 중인 경매에 묶여 있는지 여부
    pub async fn gift_is_committed(&self, gift_id: i64) -> Result<bool> {
        self.db
            .transaction(move |tx| Box::pin(gift_is_committed(&mut **tx, gift_id)))
            .await
    }

    pub async fn price_limits(&self) -> Result<PriceLimits> {
        self.db
            .transaction(|tx| Box::pin(price_limits(&mut **tx)))
            .await
    }

    /// 선물 소유권 이전
    pub async fn transfer_gift(&self, gift_id: i64, from: i64, to: i64) -> Result<TransferReceipt> {
        let receipt = self
            .db
            .transaction(move |tx| Box::pin(transfer_gift_tx(&mut **tx, gift_id, from, to)))
            .await?;
        info!(
            "{:<12} --> 선물 이전: gift={} {} -> {}",
            "Ledger", gift_id, from, to
        );
        Ok(receipt)
    }

    /// 잔액 조정 (음수 delta 는 차감)
    pub async fn adjust_balance(&self, user_id: i64, delta: i64) -> Result<User> {
        let user = self
            .db
            .transaction(move |tx| Box::pin(adjust_balance_tx(&mut **tx, user_id, delta)))
            .await?;
        info!(
            "{:<12} --> 잔액 조정: user={} delta={} balance={}",
            "Ledger", user_id, delta, user.balance
        );
        Ok(user)
    }

    /// 판매 목록 생성
    pub async fn create_listing(
        &self,
        gift_id: i64,
        seller_id: i64,
        price: i64,
    ) -> Result<MarketListing> {
        let listing = self
            .db
            .transaction(move |tx| {
                Box::pin(create_listing_tx(&mut **tx, gift_id, seller_id, price))
            })
            .await?;
        info!(
            "{:<12} --> 판매 등록: listing={} gift={} price={}",
            "Ledger", listing.id, gift_id, price
        );
        Ok(listing)
    }

    /// 판매 목록 삭제
    pub async fn remove_listing(
        &self,
        listing_id: i64,
        requester: Requester,
    ) -> Result<MarketListing> {
        let listing = self
            .db
            .transaction(move |tx| Box::pin(remove_listing_tx(&mut **tx, listing_id, requester)))
            .await?;
        info!(
            "{:<12} --> 판매 취소: listing={} requester={:?}",
            "Ledger", listing_id, requester
        );
        Ok(listing)
    }

    /// 판매 목록 구매: 구매자 차감, 판매자 입금, 소유권 이전, 목록 삭제
    pub async fn purchase_listing(&self, listing_id: i64, buyer_id: i64) -> Result<PurchaseReceipt> {
        let receipt = self
            .db
            .transaction(move |tx| Box::pin(purchase_listing_tx(&mut **tx, listing_id, buyer_id)))
            .await?;
        info!(
            "{:<12} --> 구매 완료: listing={} buyer={} price={}",
            "Ledger", listing_id, buyer_id, receipt.listing.price
        );
        Ok(receipt)
    }

    /// 경매 생성
    pub async fn create_auction(&self, new: NewAuction, now: DateTime<Utc>) -> Result<Auction> {
        rules::validate_duration(new.duration_hours, self.max_auction_hours)?;
        let step_price = self.step_price;
        let auction = self
            .db
            .transaction(move |tx| Box::pin(create_auction_tx(&mut **tx, new, step_price, now)))
            .await?;
        info!(
            "{:<12} --> 경매 생성: auction={} gift={} start={} end={}",
            "Ledger", auction.id, auction.gift_id, auction.start_price, auction.end_time
        );
        Ok(auction)
    }

    /// 입찰: 이전 최고 입찰자 환불과 새 입찰자 차감을 한 트랜잭션에서 처리
    /// 만료 여부와 입찰 시각은 경매 행 잠금을 얻은 뒤의 시계로 판단한다.
    pub async fn place_bid(&self, auction_id: i64, bidder_id: i64, amount: i64) -> Result<BidReceipt> {
        let receipt = self
            .db
            .transaction(move |tx| Box::pin(place_bid_tx(&mut **tx, auction_id, bidder_id, amount)))
            .await?;
        info!(
            "{:<12} --> 입찰 성공: auction={} bidder={} amount={}",
            "Ledger", auction_id, bidder_id, amount
        );
        Ok(receipt)
    }

    /// 단일 경매 정산. 이미 완료되었거나 아직 만료되지 않았으면 None
    pub async fn settle_auction(
        &self,
        auction_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<SettlementOutcome>> {
        self.db
            .transaction(move |tx| Box::pin(settle_auction_tx(&mut **tx, auction_id, now)))
            .await
    }

    /// 만료된 모든 진행 중 경매 정산
    /// 경매마다 별도 트랜잭션으로 처리하며, 한 경매의 실패는 나머지 정산을 막지 않는다.
    pub async fn settle_expired_auctions(&self, now: DateTime<Utc>) -> Result<Vec<SettlementOutcome>> {
        let ids = self
            .db
            .transaction(move |tx| {
                Box::pin(async move {
                    let ids = sqlx::query_scalar::<_, i64>(queries::GET_EXPIRED_AUCTION_IDS)
                        .bind(now)
                        .fetch_all(&mut **tx)
                        .await?;
                    Ok(ids)
                })
            })
            .await?;

        let mut outcomes = Vec::with_capacity(ids.len());
        for auction_id in ids {
            match self.settle_auction(auction_id, now).await {
                Ok(Some(outcome)) => {
                    info!("{:<12} --> 경매 정산 완료: auction={}", "Ledger", auction_id);
                    outcomes.push(outcome);
                }
                Ok(None) => debug!(
                    "{:<12} --> 이미 정산된 경매: auction={}",
                    "Ledger", auction_id
                ),
                Err(e) => error!(
                    "{:<12} --> 경매 정산 실패: auction={} error={}",
                    "Ledger", auction_id, e
                ),
            }
        }
        Ok(outcomes)
    }

    /// 상점 구매: 잔액 차감, 구매 한도 반영, 선물 생성
    pub async fn buy_product(
        &self,
        user_id: i64,
        product_id: i64,
        price: i64,
        limit: Option<i64>,
    ) -> Result<ShopReceipt> {
        let receipt = self
            .db
            .transaction(move |tx| {
                Box::pin(buy_product_tx(&mut **tx, user_id, product_id, price, limit))
            })
            .await?;
        info!(
            "{:<12} --> 상점 구매: user={} product={} gift={}",
            "Ledger", user_id, product_id, receipt.gift.id
        );
        Ok(receipt)
    }

    /// 선물 개선: 비용 차감, 이미지 지정, 상품별 컬렉션 번호 발급
    pub async fn improve_gift(
        &self,
        gift_id: i64,
        owner_id: i64,
        image: &str,
        cost: i64,
    ) -> Result<(Gift, i64)> {
        let image = image.to_string();
        let (gift, balance) = self
            .db
            .transaction(move |tx| {
                let image = image.clone();
                Box::pin(improve_gift_tx(&mut **tx, gift_id, owner_id, image, cost))
            })
            .await?;
        info!(
            "{:<12} --> 선물 개선: gift={} collection_number={:?}",
            "Ledger", gift.id, gift.collection_number
        );
        Ok((gift, balance))
    }

    /// 관리자 지급: 잔액 조정과 선물 생성을 한 트랜잭션으로 처리
    pub async fn grant(
        &self,
        user_id: i64,
        delta: i64,
        product_id: Option<i64>,
    ) -> Result<(User, Option<Gift>)> {
        let (user, gift) = self
            .db
            .transaction(move |tx| Box::pin(grant_tx(&mut **tx, user_id, delta, product_id)))
            .await?;
        info!(
            "{:<12} --> 관리자 지급: user={} delta={} gift={:?}",
            "Ledger",
            user_id,
            delta,
            gift.as_ref().map(|g| g.id)
        );
        Ok((user, gift))
    }

    /// 사용자 차단 상태 변경
    pub async fn set_blocked(&self, external_id: i64, blocked: bool) -> Result<User> {
        self.db
            .transaction(move |tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, User>(queries::SET_USER_BLOCKED)
                        .bind(external_id)
                        .bind(blocked)
                        .fetch_optional(&mut **tx)
                        .await?
                        .ok_or(MarketError::UserNotFound)
                })
            })
            .await
    }

    /// 가격 범위 변경
    pub async fn update_price_limits(&self, min_price: i64, max_price: i64) -> Result<PriceLimits> {
        let limits = PriceLimits::new(min_price, max_price)?;
        self.db
            .transaction(move |tx| {
                Box::pin(async move {
                    sqlx::query(queries::UPDATE_PRICE_LIMITS)
                        .bind(limits.min_price)
                        .bind(limits.max_price)
                        .execute(&mut **tx)
                        .await?;
                    Ok(())
                })
            })
            .await?;
        info!(
            "{:<12} --> 가격 범위 변경: {} ~ {}",
            "Ledger", limits.min_price, limits.max_price
        );
        Ok(limits)
    }
}
// endregion: --- Ledger Store

// region:    --- Transaction Bodies
async fn transfer_gift_tx(
    conn: &mut PgConnection,
    gift_id: i64,
    from: i64,
    to: i64,
) -> Result<TransferReceipt> {
    if from == to {
        return Err(MarketError::SelfTransferForbidden);
    }
    let gift = lock_owned_gift(conn, gift_id, from).await?;
    if gift_is_committed(conn, gift.id).await? {
        return Err(MarketError::AlreadyListed);
    }
    let sender = get_user(conn, from).await?;
    sender.ensure_active()?;
    let recipient = get_user(conn, to).await?;

    let gift = move_gift(conn, gift.id, from, to).await?;
    Ok(TransferReceipt {
        gift,
        sender,
        recipient,
    })
}

async fn adjust_balance_tx(conn: &mut PgConnection, user_id: i64, delta: i64) -> Result<User> {
    let user = lock_user(conn, user_id).await?;
    let balance = if delta >= 0 {
        credit(conn, user_id, delta).await?
    } else {
        // i64::MIN 은 부호를 뒤집을 수 없고, 어떤 잔액으로도 감당할 수 없다.
        let amount = delta.checked_neg().ok_or(MarketError::InsufficientFunds {
            needed: i64::MAX,
            available: user.balance,
        })?;
        user.ensure_funds(amount)?;
        debit(conn, user_id, amount).await?
    };
    Ok(User { balance, ..user })
}

async fn grant_tx(
    conn: &mut PgConnection,
    user_id: i64,
    delta: i64,
    product_id: Option<i64>,
) -> Result<(User, Option<Gift>)> {
    let user = lock_user(conn, user_id).await?;
    let gift = match product_id {
        Some(product_id) => Some(
            sqlx::query_as::<_, Gift>(queries::INSERT_GIFT)
                .bind(user.id)
                .bind(product_id)
                .fetch_one(&mut *conn)
                .await?,
        ),
        None => None,
    };
    let user = if delta != 0 {
        adjust_balance_tx(conn, user.id, delta).await?
    } else {
        user
    };
    Ok((user, gift))
}

async fn create_listing_tx(
    conn: &mut PgConnection,
    gift_id: i64,
    seller_id: i64,
    price: i64,
) -> Result<MarketListing> {
    price_limits(conn).await?.check(price)?;
    let gift = lock_owned_gift(conn, gift_id, seller_id).await?;
    get_user(conn, seller_id).await?.ensure_active()?;
    if gift_is_committed(conn, gift.id).await? {
        return Err(MarketError::AlreadyListed);
    }

    sqlx::query_as::<_, MarketListing>(queries::INSERT_LISTING)
        .bind(gift.id)
        .bind(seller_id)
        .bind(price)
        .fetch_one(&mut *conn)
        .await
        .map_err(already_listed_on_conflict)
}

async fn remove_listing_tx(
    conn: &mut PgConnection,
    listing_id: i64,
    requester: Requester,
) -> Result<MarketListing> {
    let listing = lock_listing(conn, listing_id).await?;
    if let Requester::User(user_id) = requester {
        if user_id != listing.seller_id {
            return Err(MarketError::NotOwner);
        }
    }
    sqlx::query(queries::DELETE_LISTING)
        .bind(listing.id)
        .execute(&mut *conn)
        .await?;
    Ok(listing)
}

async fn purchase_listing_tx(
    conn: &mut PgConnection,
    listing_id: i64,
    buyer_id: i64,
) -> Result<PurchaseReceipt> {
    // 동시 구매 시 뒤늦은 트랜잭션은 삭제된 행을 보지 못하고 InvalidListing 으로 끝난다.
    let listing = lock_listing(conn, listing_id).await?;
    if listing.seller_id == buyer_id {
        return Err(MarketError::SelfPurchaseForbidden);
    }
    let gift = lock_gift(conn, listing.gift_id)
        .await?
        .ok_or(MarketError::InvalidListing)?;
    if gift.owner_id != listing.seller_id {
        return Err(MarketError::NotOwner);
    }

    let (buyer, seller) = lock_user_pair(conn, buyer_id, listing.seller_id).await?;
    buyer.ensure_active()?;
    buyer.ensure_funds(listing.price)?;

    let buyer_balance = debit(conn, buyer.id, listing.price).await?;
    let seller_balance = credit(conn, seller.id, listing.price).await?;
    move_gift(conn, gift.id, seller.id, buyer.id).await?;
    sqlx::query(queries::DELETE_LISTING)
        .bind(listing.id)
        .execute(&mut *conn)
        .await?;

    Ok(PurchaseReceipt {
        listing,
        product_id: gift.product_id,
        buyer: User {
            balance: buyer_balance,
            ..buyer
        },
        seller: User {
            balance: seller_balance,
            ..seller
        },
    })
}

async fn create_auction_tx(
    conn: &mut PgConnection,
    new: NewAuction,
    step_price: i64,
    now: DateTime<Utc>,
) -> Result<Auction> {
    price_limits(conn).await?.check(new.start_price)?;
    let gift = lock_owned_gift(conn, new.gift_id, new.seller_id).await?;
    get_user(conn, new.seller_id).await?.ensure_active()?;
    if gift_is_committed(conn, gift.id).await? {
        return Err(MarketError::AlreadyListed);
    }

    sqlx::query_as::<_, Auction>(queries::INSERT_AUCTION)
        .bind(gift.id)
        .bind(new.seller_id)
        .bind(new.start_price)
        .bind(step_price)
        .bind(rules::end_time(now, new.duration_hours))
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(already_listed_on_conflict)
}

async fn place_bid_tx(
    conn: &mut PgConnection,
    auction_id: i64,
    bidder_id: i64,
    amount: i64,
) -> Result<BidReceipt> {
    // 잠금 대기나 재시도 동안 시간이 흐르므로 잠금 이후에 시계를 읽는다.
    let auction = sqlx::query_as::<_, Auction>(queries::LOCK_AUCTION)
        .bind(auction_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(MarketError::AuctionNotFound)?;
    let now = Utc::now();
    rules::validate_bid(&auction, bidder_id, amount, now)?;

    let previous = auction.current_bidder_id;
    let (bidder, outbid_user) = match previous {
        Some(prev_id) if prev_id != bidder_id => {
            let (bidder, prev) = lock_user_pair(conn, bidder_id, prev_id).await?;
            (bidder, Some(prev))
        }
        Some(_) => {
            let bidder = lock_user(conn, bidder_id).await?;
            (bidder.clone(), Some(bidder))
        }
        None => (lock_user(conn, bidder_id).await?, None),
    };
    bidder.ensure_active()?;
    bidder.ensure_funds(amount)?;

    let mut outbid = None;
    if let Some(prev) = outbid_user {
        let refunded_balance = credit(conn, prev.id, auction.current_price).await?;
        outbid = Some((
            User {
                balance: refunded_balance,
                ..prev
            },
            auction.current_price,
        ));
    }
    let bidder_balance = debit(conn, bidder.id, amount).await?;

    let updated = sqlx::query_as::<_, Auction>(queries::UPDATE_AUCTION_BID)
        .bind(auction.id)
        .bind(amount)
        .bind(bidder.id)
        .fetch_one(&mut *conn)
        .await?;
    sqlx::query(queries::INSERT_BID)
        .bind(auction.id)
        .bind(bidder.id)
        .bind(amount)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    let seller = get_user(conn, auction.seller_id).await?;
    let product_id = get_product_id(conn, auction.gift_id).await?;
    // 자기 자신을 다시 넘어선 경우 환불 후 차감된 잔액이 최종 잔액이다.
    if let Some((prev, _)) = outbid.as_mut() {
        if prev.id == bidder.id {
            prev.balance = bidder_balance;
        }
    }

    Ok(BidReceipt {
        auction: updated,
        product_id,
        bidder: User {
            balance: bidder_balance,
            ..bidder
        },
        seller,
        outbid,
    })
}

async fn settle_auction_tx(
    conn: &mut PgConnection,
    auction_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<SettlementOutcome>> {
    let Some(auction) = sqlx::query_as::<_, Auction>(queries::LOCK_EXPIRED_AUCTION)
        .bind(auction_id)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    let gift = lock_gift(conn, auction.gift_id)
        .await?
        .ok_or(MarketError::NotOwner)?;

    let outcome = match auction.current_bidder_id {
        Some(winner_id) => {
            let (seller, winner) = lock_user_pair(conn, auction.seller_id, winner_id).await?;
            move_gift(conn, gift.id, seller.id, winner.id).await?;
            let seller_balance = credit(conn, seller.id, auction.current_price).await?;
            let completed = complete_auction(conn, auction.id).await?;
            SettlementOutcome::Sold {
                auction: completed,
                product_id: gift.product_id,
                seller: User {
                    balance: seller_balance,
                    ..seller
                },
                winner,
            }
        }
        None => {
            let seller = get_user(conn, auction.seller_id).await?;
            let completed = complete_auction(conn, auction.id).await?;
            SettlementOutcome::Unsold {
                auction: completed,
                product_id: gift.product_id,
                seller,
            }
        }
    };
    Ok(Some(outcome))
}

async fn buy_product_tx(
    conn: &mut PgConnection,
    user_id: i64,
    product_id: i64,
    price: i64,
    limit: Option<i64>,
) -> Result<ShopReceipt> {
    let user = lock_user(conn, user_id).await?;
    user.ensure_active()?;
    user.ensure_funds(price)?;

    let remaining = match limit {
        Some(limit) => {
            sqlx::query(queries::INIT_PRODUCT_STATS)
                .bind(product_id)
                .execute(&mut *conn)
                .await?;
            let bought = sqlx::query_scalar::<_, i64>(queries::INCREMENT_PRODUCT_BOUGHT)
                .bind(product_id)
                .bind(limit)
                .fetch_optional(&mut *conn)
                .await?
                .ok_or(MarketError::ProductSoldOut)?;
            Some(limit - bought)
        }
        None => None,
    };

    let balance = debit(conn, user.id, price).await?;
    let gift = sqlx::query_as::<_, Gift>(queries::INSERT_GIFT)
        .bind(user.id)
        .bind(product_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(ShopReceipt {
        gift,
        balance,
        remaining,
    })
}

async fn improve_gift_tx(
    conn: &mut PgConnection,
    gift_id: i64,
    owner_id: i64,
    image: String,
    cost: i64,
) -> Result<(Gift, i64)> {
    let gift = lock_owned_gift(conn, gift_id, owner_id).await?;
    if gift.improved {
        return Err(MarketError::AlreadyImproved);
    }
    sqlx::query(queries::LOCK_COLLECTION_SEQUENCE)
        .bind(gift.product_id)
        .execute(&mut *conn)
        .await?;

    let owner = lock_user(conn, owner_id).await?;
    owner.ensure_active()?;
    owner.ensure_funds(cost)?;

    let next_number = sqlx::query_scalar::<_, i32>(queries::NEXT_COLLECTION_NUMBER)
        .bind(gift.product_id)
        .fetch_one(&mut *conn)
        .await?;
    let balance = debit(conn, owner.id, cost).await?;
    let gift = sqlx::query_as::<_, Gift>(queries::IMPROVE_GIFT)
        .bind(gift.id)
        .bind(image)
        .bind(next_number)
        .fetch_one(&mut *conn)
        .await?;
    Ok((gift, balance))
}
// endregion: --- Transaction Bodies

// region:    --- Row Helpers
async fn get_user(conn: &mut PgConnection, user_id: i64) -> Result<User> {
    sqlx::query_as::<_, User>(queries::GET_USER)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(MarketError::UserNotFound)
}

async fn lock_user(conn: &mut PgConnection, user_id: i64) -> Result<User> {
    sqlx::query_as::<_, User>(queries::LOCK_USER)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(MarketError::UserNotFound)
}

/// 두 사용자를 id 오름차순으로 잠근다. 반환 순서는 인자 순서를 따른다.
async fn lock_user_pair(conn: &mut PgConnection, first: i64, second: i64) -> Result<(User, User)> {
    if first <= second {
        let a = lock_user(conn, first).await?;
        let b = lock_user(conn, second).await?;
        Ok((a, b))
    } else {
        let b = lock_user(conn, second).await?;
        let a = lock_user(conn, first).await?;
        Ok((a, b))
    }
}

async fn debit(conn: &mut PgConnection, user_id: i64, amount: i64) -> Result<i64> {
    let balance = sqlx::query_scalar::<_, i64>(queries::DEBIT_USER)
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&mut *conn)
        .await?;
    match balance {
        Some(balance) => Ok(balance),
        None => {
            let available = get_user(conn, user_id).await?.balance;
            Err(MarketError::InsufficientFunds {
                needed: amount,
                available,
            })
        }
    }
}

async fn credit(conn: &mut PgConnection, user_id: i64, amount: i64) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(queries::CREDIT_USER)
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(MarketError::UserNotFound)
}

async fn lock_gift(conn: &mut PgConnection, gift_id: i64) -> Result<Option<Gift>> {
    let gift = sqlx::query_as::<_, Gift>(queries::LOCK_GIFT)
        .bind(gift_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(gift)
}

/// 선물을 잠그고 소유자를 확인한다. 없는 선물도 NotOwner 로 취급한다.
async fn lock_owned_gift(conn: &mut PgConnection, gift_id: i64, owner_id: i64) -> Result<Gift> {
    lock_gift(conn, gift_id)
        .await?
        .filter(|gift| gift.owner_id == owner_id)
        .ok_or(MarketError::NotOwner)
}

async fn move_gift(conn: &mut PgConnection, gift_id: i64, from: i64, to: i64) -> Result<Gift> {
    sqlx::query_as::<_, Gift>(queries::MOVE_GIFT)
        .bind(gift_id)
        .bind(from)
        .bind(to)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(MarketError::NotOwner)
}

async fn get_product_id(conn: &mut PgConnection, gift_id: i64) -> Result<i64> {
    let gift = sqlx::query_as::<_, Gift>(queries::GET_GIFT)
        .bind(gift_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(gift.product_id)
}

async fn gift_is_committed(conn: &mut PgConnection, gift_id: i64) -> Result<bool> {
    let committed = sqlx::query_scalar::<_, bool>(queries::GIFT_IS_COMMITTED)
        .bind(gift_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(committed)
}

async fn lock_listing(conn: &mut PgConnection, listing_id: i64) -> Result<MarketListing> {
    sqlx::query_as::<_, MarketListing>(queries::LOCK_LISTING)
        .bind(listing_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(MarketError::InvalidListing)
}

async fn complete_auction(conn: &mut PgConnection, auction_id: i64) -> Result<Auction> {
    let auction = sqlx::query_as::<_, Auction>(queries::COMPLETE_AUCTION)
        .bind(auction_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(auction)
}

async fn price_limits(conn: &mut PgConnection) -> Result<PriceLimits> {
    let limits = sqlx::query_as::<_, PriceLimits>(queries::GET_PRICE_LIMITS)
        .fetch_one(&mut *conn)
        .await?;
    Ok(limits)
}

fn already_listed_on_conflict(err: sqlx::Error) -> MarketError {
    if is_unique_violation(&err) {
        MarketError::AlreadyListed
    } else {
        MarketError::Database(err)
    }
}
// endregion: --- Row Helpers
