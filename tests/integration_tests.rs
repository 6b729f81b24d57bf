//! PostgreSQL 대상 통합 테스트
//! DATABASE_URL 이 없으면 각 테스트는 로그만 남기고 건너뛴다.
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Duration, Utc};
use gift_market::admin::{BlockCommand, GrantCommand, PriceLimitsCommand};
use gift_market::auction::{CreateAuctionCommand, PlaceBidCommand};
use gift_market::catalog::{Catalog, JsonCatalog, Product};
use gift_market::config::{DatabaseConfig, MarketConfig};
use gift_market::database::DatabaseManager;
use gift_market::error::MarketError;
use gift_market::handlers::{self, AppState};
use gift_market::ledger::model::{Gift, SettlementOutcome, User};
use gift_market::ledger::LedgerStore;
use gift_market::message_broker::{handle_transfer_callback, CallbackAction, TransferCallback};
use gift_market::notify::{NotificationGateway, Notifier, NotifyError};
use gift_market::query;
use gift_market::scheduler::SettlementSweep;
use gift_market::trade::pending::TransferKey;
use gift_market::trade::{
    BuyProductCommand, DelistCommand, ImproveCommand, ListCommand, PurchaseCommand,
    TransferCommand,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tower::ServiceExt;
use tracing::info;

// region:    --- Harness
const TEDDY: i64 = 1;
const ROCKET: i64 = 2;
const STARTING_BALANCE: i64 = 10_000_000;
const ADMIN_TOKEN: &str = "test-admin-token";

static SCHEMA: OnceCell<()> = OnceCell::const_new();
static NEXT_ID: AtomicI64 = AtomicI64::new(0);

/// 트레이싱 초기화
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .without_time()
        .with_target(false)
        .with_test_writer()
        .try_init();
}

/// 테스트 실행마다 겹치지 않는 외부 식별자
fn unique_external_id() -> i64 {
    let base = Utc::now().timestamp_micros() * 1000;
    base + NEXT_ID.fetch_add(1, Ordering::SeqCst)
}

/// 알림을 기록만 하는 게이트웨이
#[derive(Default)]
struct RecordingGateway {
    messages: Mutex<Vec<(i64, String)>>,
    confirmations: Mutex<Vec<(i64, TransferKey, String)>>,
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn notify(&self, recipient: i64, message: &str) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .unwrap()
            .push((recipient, message.to_string()));
        Ok(())
    }

    async fn request_confirmation(
        &self,
        recipient: i64,
        key: &TransferKey,
        prompt: &str,
    ) -> Result<(), NotifyError> {
        self.confirmations
            .lock()
            .unwrap()
            .push((recipient, *key, prompt.to_string()));
        Ok(())
    }
}

impl RecordingGateway {
    /// 비동기로 전달되는 알림을 잠시 기다린다
    async fn messages_for(&self, recipient: i64) -> Vec<String> {
        for _ in 0..50 {
            let found: Vec<String> = self
                .messages
                .lock()
                .unwrap()
                .iter()
                .filter(|(to, _)| *to == recipient)
                .map(|(_, text)| text.clone())
                .collect();
            if !found.is_empty() {
                return found;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        Vec::new()
    }

    async fn confirmation_for(&self, recipient: i64) -> Option<TransferKey> {
        for _ in 0..50 {
            let found = self
                .confirmations
                .lock()
                .unwrap()
                .iter()
                .find(|(to, _, _)| *to == recipient)
                .map(|(_, key, _)| *key);
            if found.is_some() {
                return found;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        None
    }

    /// 확인 요청 문구가 count 개 이상 쌓일 때까지 기다린다
    async fn prompts_for(&self, recipient: i64, count: usize) -> Vec<String> {
        let collect = || -> Vec<String> {
            self.confirmations
                .lock()
                .unwrap()
                .iter()
                .filter(|(to, _, _)| *to == recipient)
                .map(|(_, _, prompt)| prompt.clone())
                .collect()
        };
        for _ in 0..50 {
            let found = collect();
            if found.len() >= count {
                return found;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        collect()
    }
}

struct Harness {
    db: Arc<DatabaseManager>,
    ledger: Arc<LedgerStore>,
    catalog: Arc<dyn Catalog>,
    notifier: Notifier,
    gateway: Arc<RecordingGateway>,
    state: AppState,
}

fn base_products() -> Vec<Product> {
    vec![
        Product {
            id: TEDDY,
            name: "Teddy".to_string(),
            price: 100,
            limit: None,
            image: None,
            improvements: vec!["teddy/gold.png".to_string(), "teddy/silver.png".to_string()],
        },
        Product {
            id: ROCKET,
            name: "Rocket".to_string(),
            price: 250,
            limit: None,
            image: None,
            improvements: Vec::new(),
        },
    ]
}

/// 데이터베이스 매니저 설정
async fn setup() -> Option<Harness> {
    setup_with(Vec::new()).await
}

async fn setup_with(extra_products: Vec<Product>) -> Option<Harness> {
    init_tracing();
    let Ok(url) = std::env::var("DATABASE_URL") else {
        info!("{:<12} --> DATABASE_URL 미설정, 테스트 건너뜀", "Test");
        return None;
    };

    let mut config = DatabaseConfig::with_url(url);
    config.max_connections = 10;
    let db = Arc::new(
        DatabaseManager::new(&config)
            .await
            .expect("데이터베이스 연결 실패"),
    );
    let market = MarketConfig::default();
    SCHEMA
        .get_or_init(|| async {
            db.initialize_database(false, &market)
                .await
                .expect("스키마 생성 실패");
        })
        .await;

    let mut products = base_products();
    products.extend(extra_products);
    let catalog: Arc<dyn Catalog> = Arc::new(JsonCatalog::from_products(products));
    let gateway = Arc::new(RecordingGateway::default());
    let notifier = Notifier::new(gateway.clone());
    let ledger = Arc::new(LedgerStore::new(
        Arc::clone(&db),
        market.starting_balance,
        market.auction_step_price,
        market.max_auction_hours,
    ));
    let state = AppState::new(
        Arc::clone(&ledger),
        Arc::clone(&catalog),
        notifier.clone(),
        &market,
        Some(ADMIN_TOKEN.to_string()),
    );

    Some(Harness {
        db,
        ledger,
        catalog,
        notifier,
        gateway,
        state,
    })
}

impl Harness {
    async fn create_user(&self, name: &str) -> User {
        self.ledger
            .ensure_user(unique_external_id(), name)
            .await
            .unwrap()
    }

    /// 잔액을 지정한 값으로 맞춘다
    async fn set_balance(&self, user: &User, balance: i64) -> User {
        self.ledger
            .adjust_balance(user.id, balance - user.balance)
            .await
            .unwrap()
    }

    async fn create_test_gift(&self, owner: &User) -> Gift {
        let (_, gift) = self.ledger.grant(owner.id, 0, Some(TEDDY)).await.unwrap();
        gift.unwrap()
    }

    /// 경매 종료 시각을 직접 옮긴다
    async fn set_end_time(&self, auction_id: i64, end_time: DateTime<Utc>) {
        sqlx::query("UPDATE auctions SET end_time = $2 WHERE id = $1")
            .bind(auction_id)
            .bind(end_time)
            .execute(self.db.pool())
            .await
            .unwrap();
    }

    async fn owner_of(&self, gift_id: i64) -> i64 {
        self.ledger.get_gift(gift_id).await.unwrap().unwrap().owner_id
    }

    async fn balance_of(&self, user: &User) -> i64 {
        self.ledger.get_user(user.id).await.unwrap().balance
    }
}
// endregion: --- Harness

// region:    --- Market Tests
/// 판매 목록 구매: 구매자 150 -> 50, 판매자 +100, 소유권 이전
#[tokio::test]
async fn test_purchase_moves_funds_and_ownership() {
    let Some(h) = setup().await else { return };
    let seller = h.create_user("seller").await;
    let buyer = h.create_user("buyer").await;
    let buyer = h.set_balance(&buyer, 150).await;
    let gift = h.create_test_gift(&seller).await;

    let listing = h
        .state
        .trade
        .list(ListCommand {
            gift_id: gift.id,
            seller_id: seller.id,
            price: 100,
        })
        .await
        .unwrap();

    let receipt = h
        .state
        .trade
        .purchase(PurchaseCommand {
            listing_id: listing.id,
            buyer_id: buyer.id,
        })
        .await
        .unwrap();

    assert_eq!(receipt.buyer.balance, 50);
    assert_eq!(h.balance_of(&buyer).await, 50);
    assert_eq!(h.balance_of(&seller).await, STARTING_BALANCE + 100);
    assert_eq!(h.owner_of(gift.id).await, buyer.id);

    // 목록은 사라지고 같은 목록의 재구매는 실패한다
    let again = h
        .state
        .trade
        .purchase(PurchaseCommand {
            listing_id: listing.id,
            buyer_id: buyer.id,
        })
        .await;
    assert!(matches!(again, Err(MarketError::InvalidListing)));

    let messages = h.gateway.messages_for(seller.external_id).await;
    assert!(messages.iter().any(|m| m.contains("Teddy") && m.contains("buyer")));
}

/// 잔액 부족 시 아무것도 변하지 않는다
#[tokio::test]
async fn test_purchase_with_insufficient_funds_changes_nothing() {
    let Some(h) = setup().await else { return };
    let seller = h.create_user("seller").await;
    let buyer = h.create_user("buyer").await;
    let buyer = h.set_balance(&buyer, 99).await;
    let gift = h.create_test_gift(&seller).await;

    let listing = h
        .state
        .trade
        .list(ListCommand {
            gift_id: gift.id,
            seller_id: seller.id,
            price: 100,
        })
        .await
        .unwrap();

    let result = h
        .state
        .trade
        .purchase(PurchaseCommand {
            listing_id: listing.id,
            buyer_id: buyer.id,
        })
        .await;
    assert!(matches!(
        result,
        Err(MarketError::InsufficientFunds { needed: 100, available: 99 })
    ));
    assert_eq!(h.balance_of(&buyer).await, 99);
    assert_eq!(h.balance_of(&seller).await, STARTING_BALANCE);
    assert_eq!(h.owner_of(gift.id).await, seller.id);

    // 판매자 본인은 구매할 수 없다
    let own = h
        .state
        .trade
        .purchase(PurchaseCommand {
            listing_id: listing.id,
            buyer_id: seller.id,
        })
        .await;
    assert!(matches!(own, Err(MarketError::SelfPurchaseForbidden)));
}

/// 동시 구매: 정확히 한 명만 성공하고 총액은 보존된다
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_purchase_has_single_winner() {
    let Some(h) = setup().await else { return };
    let seller = h.create_user("seller").await;
    let gift = h.create_test_gift(&seller).await;
    let listing = h
        .state
        .trade
        .list(ListCommand {
            gift_id: gift.id,
            seller_id: seller.id,
            price: 1_000,
        })
        .await
        .unwrap();

    let mut buyers = Vec::new();
    for i in 0..5 {
        buyers.push(h.create_user(&format!("racer-{i}")).await);
    }

    let tasks: Vec<_> = buyers
        .iter()
        .map(|buyer| {
            let trade = Arc::clone(&h.state.trade);
            let cmd = PurchaseCommand {
                listing_id: listing.id,
                buyer_id: buyer.id,
            };
            tokio::spawn(async move { trade.purchase(cmd).await })
        })
        .collect();

    let mut winners = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(receipt) => winners.push(receipt.buyer.id),
            Err(e) => assert!(matches!(e, MarketError::InvalidListing), "unexpected: {e:?}"),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(h.owner_of(gift.id).await, winners[0]);

    let mut total = h.balance_of(&seller).await;
    for buyer in &buyers {
        total += h.balance_of(buyer).await;
    }
    assert_eq!(total, STARTING_BALANCE * 6);
}

/// 판매 취소와 가격 범위
#[tokio::test]
async fn test_delist_and_price_range() {
    let Some(h) = setup().await else { return };
    let seller = h.create_user("seller").await;
    let other = h.create_user("other").await;
    let gift = h.create_test_gift(&seller).await;

    let out_of_range = h
        .state
        .trade
        .list(ListCommand {
            gift_id: gift.id,
            seller_id: seller.id,
            price: -1,
        })
        .await;
    assert!(matches!(out_of_range, Err(MarketError::PriceOutOfRange { .. })));

    let not_owner = h
        .state
        .trade
        .list(ListCommand {
            gift_id: gift.id,
            seller_id: other.id,
            price: 100,
        })
        .await;
    assert!(matches!(not_owner, Err(MarketError::NotOwner)));

    let listing = h
        .state
        .trade
        .list(ListCommand {
            gift_id: gift.id,
            seller_id: seller.id,
            price: 100,
        })
        .await
        .unwrap();

    let foreign = h
        .state
        .trade
        .delist(DelistCommand {
            listing_id: listing.id,
            requester_id: other.id,
        })
        .await;
    assert!(matches!(foreign, Err(MarketError::NotOwner)));

    h.state
        .trade
        .delist(DelistCommand {
            listing_id: listing.id,
            requester_id: seller.id,
        })
        .await
        .unwrap();
    assert!(!h.ledger.gift_is_committed(gift.id).await.unwrap());
}
// endregion: --- Market Tests

// region:    --- Auction Tests
/// 경매 시나리오: 시작가 100, 입찰 150 -> 200, 종료 후 낙찰자 2번
#[tokio::test]
async fn test_auction_lifecycle() {
    let Some(h) = setup().await else { return };
    let seller = h.create_user("seller").await;
    let bidder1 = h.create_user("bidder1").await;
    let bidder2 = h.create_user("bidder2").await;
    let gift = h.create_test_gift(&seller).await;

    let auction = h
        .state
        .auctions
        .create_auction(CreateAuctionCommand {
            gift_id: gift.id,
            seller_id: seller.id,
            start_price: 100,
            duration_hours: None,
        })
        .await
        .unwrap();
    assert_eq!(auction.current_price, 100);
    assert!(auction.end_time > Utc::now() + Duration::hours(23));

    let first = h
        .state
        .auctions
        .place_bid(PlaceBidCommand {
            auction_id: auction.id,
            bidder_id: bidder1.id,
            amount: 150,
        })
        .await
        .unwrap();
    assert_eq!(first.bidder.balance, STARTING_BALANCE - 150);
    assert!(first.outbid.is_none());

    let second = h
        .state
        .auctions
        .place_bid(PlaceBidCommand {
            auction_id: auction.id,
            bidder_id: bidder2.id,
            amount: 200,
        })
        .await
        .unwrap();
    let (refunded, amount) = second.outbid.clone().unwrap();
    assert_eq!(refunded.id, bidder1.id);
    assert_eq!(amount, 150);
    assert_eq!(h.balance_of(&bidder1).await, STARTING_BALANCE);
    assert_eq!(h.balance_of(&bidder2).await, STARTING_BALANCE - 200);

    let outbid_messages = h.gateway.messages_for(bidder1.external_id).await;
    assert!(outbid_messages.iter().any(|m| m.contains("200")));

    let bids = query::handlers::get_bid_history(&h.db, auction.id).await.unwrap();
    assert_eq!(bids.iter().map(|b| b.amount).collect::<Vec<_>>(), vec![200, 150]);

    // 아직 진행 중이면 정산되지 않는다
    assert!(h.state.auctions.settle(auction.id, Utc::now()).await.unwrap().is_none());

    let outcome = h
        .state
        .auctions
        .settle(auction.id, Utc::now() + Duration::hours(25))
        .await
        .unwrap()
        .unwrap();
    match outcome {
        SettlementOutcome::Sold { winner, seller: s, .. } => {
            assert_eq!(winner.id, bidder2.id);
            assert_eq!(s.balance, STARTING_BALANCE + 200);
        }
        other => panic!("낙찰되어야 합니다: {other:?}"),
    }
    assert_eq!(h.owner_of(gift.id).await, bidder2.id);
    assert_eq!(h.balance_of(&bidder2).await, STARTING_BALANCE - 200);

    let won = h.gateway.messages_for(bidder2.external_id).await;
    assert!(won.iter().any(|m| m.contains("Teddy")));
}

/// 현재 가격과 같은 입찰, 판매자 본인 입찰, 잔액 부족 입찰은 거절된다
#[tokio::test]
async fn test_invalid_bids_are_rejected() {
    let Some(h) = setup().await else { return };
    let seller = h.create_user("seller").await;
    let bidder = h.create_user("bidder").await;
    let poor = h.create_user("poor").await;
    let poor = h.set_balance(&poor, 120).await;
    let gift = h.create_test_gift(&seller).await;

    let auction = h
        .state
        .auctions
        .create_auction(CreateAuctionCommand {
            gift_id: gift.id,
            seller_id: seller.id,
            start_price: 100,
            duration_hours: Some(1),
        })
        .await
        .unwrap();

    let equal = h
        .state
        .auctions
        .place_bid(PlaceBidCommand {
            auction_id: auction.id,
            bidder_id: bidder.id,
            amount: 100,
        })
        .await;
    assert!(matches!(
        equal,
        Err(MarketError::InvalidBid { amount: 100, current_price: 100 })
    ));

    let own = h
        .state
        .auctions
        .place_bid(PlaceBidCommand {
            auction_id: auction.id,
            bidder_id: seller.id,
            amount: 500,
        })
        .await;
    assert!(matches!(own, Err(MarketError::SelfBidForbidden)));

    let broke = h
        .state
        .auctions
        .place_bid(PlaceBidCommand {
            auction_id: auction.id,
            bidder_id: poor.id,
            amount: 150,
        })
        .await;
    assert!(matches!(broke, Err(MarketError::InsufficientFunds { .. })));
    assert_eq!(h.balance_of(&poor).await, 120);

    h.set_end_time(auction.id, Utc::now() - Duration::seconds(1)).await;
    let late = h
        .state
        .auctions
        .place_bid(PlaceBidCommand {
            auction_id: auction.id,
            bidder_id: bidder.id,
            amount: 150,
        })
        .await;
    assert!(matches!(late, Err(MarketError::AuctionNotFound)));
    assert_eq!(h.balance_of(&bidder).await, STARTING_BALANCE);

    let too_long = h
        .state
        .auctions
        .create_auction(CreateAuctionCommand {
            gift_id: gift.id,
            seller_id: seller.id,
            start_price: 100,
            duration_hours: Some(1000),
        })
        .await;
    assert!(matches!(too_long, Err(MarketError::InvalidDuration { .. })));
}

/// 최고 입찰자가 다시 입찰하면 이전 금액을 돌려받고 새 금액만 묶인다
#[tokio::test]
async fn test_leader_rebid_keeps_single_escrow() {
    let Some(h) = setup().await else { return };
    let seller = h.create_user("seller").await;
    let bidder = h.create_user("bidder").await;
    let gift = h.create_test_gift(&seller).await;

    let auction = h
        .state
        .auctions
        .create_auction(CreateAuctionCommand {
            gift_id: gift.id,
            seller_id: seller.id,
            start_price: 100,
            duration_hours: Some(2),
        })
        .await
        .unwrap();

    for amount in [150, 300] {
        h.state
            .auctions
            .place_bid(PlaceBidCommand {
                auction_id: auction.id,
                bidder_id: bidder.id,
                amount,
            })
            .await
            .unwrap();
    }
    assert_eq!(h.balance_of(&bidder).await, STARTING_BALANCE - 300);
}

/// 경매 행 잠금을 기다리는 동안 종료 시각이 지나면 입찰은 거절된다
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bid_waiting_past_end_time_is_refused() {
    let Some(h) = setup().await else { return };
    let seller = h.create_user("seller").await;
    let bidder = h.create_user("bidder").await;
    let gift = h.create_test_gift(&seller).await;

    let auction = h
        .state
        .auctions
        .create_auction(CreateAuctionCommand {
            gift_id: gift.id,
            seller_id: seller.id,
            start_price: 100,
            duration_hours: Some(1),
        })
        .await
        .unwrap();
    h.set_end_time(auction.id, Utc::now() + Duration::milliseconds(1500))
        .await;

    // 다른 트랜잭션이 종료 시각 이후까지 경매 행을 잡고 있는다
    let mut holder = h.db.pool().begin().await.unwrap();
    sqlx::query("SELECT id FROM auctions WHERE id = $1 FOR UPDATE")
        .bind(auction.id)
        .execute(&mut *holder)
        .await
        .unwrap();

    let auctions = Arc::clone(&h.state.auctions);
    let cmd = PlaceBidCommand {
        auction_id: auction.id,
        bidder_id: bidder.id,
        amount: 500,
    };
    let bid = tokio::spawn(async move { auctions.place_bid(cmd).await });

    tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
    holder.rollback().await.unwrap();

    let result = bid.await.unwrap();
    assert!(matches!(result, Err(MarketError::AuctionNotFound)));
    assert_eq!(h.balance_of(&bidder).await, STARTING_BALANCE);
    let bids = query::handlers::get_bid_history(&h.db, auction.id).await.unwrap();
    assert!(bids.is_empty());
}

/// 동시에 들어온 입찰: 묶인 금액과 잔액의 합은 보존되고 입찰 기록은 순증가한다
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bids_conserve_escrow() {
    let Some(h) = setup().await else { return };
    let seller = h.create_user("seller").await;
    let gift = h.create_test_gift(&seller).await;
    let auction = h
        .state
        .auctions
        .create_auction(CreateAuctionCommand {
            gift_id: gift.id,
            seller_id: seller.id,
            start_price: 100,
            duration_hours: Some(2),
        })
        .await
        .unwrap();

    let mut bidders = Vec::new();
    for i in 0..5 {
        bidders.push(h.create_user(&format!("bidder{i}")).await);
    }

    let mut handles = Vec::new();
    for (i, bidder) in bidders.iter().enumerate() {
        let auctions = Arc::clone(&h.state.auctions);
        let cmd = PlaceBidCommand {
            auction_id: auction.id,
            bidder_id: bidder.id,
            amount: 200 + 100 * i as i64,
        };
        handles.push(tokio::spawn(async move { auctions.place_bid(cmd).await }));
    }
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) | Err(MarketError::InvalidBid { .. }) => {}
            Err(e) => panic!("예상하지 못한 입찰 오류: {e:?}"),
        }
    }

    let (current_price, leader) = sqlx::query_as::<_, (i64, Option<i64>)>(
        "SELECT current_price, current_bidder_id FROM auctions WHERE id = $1",
    )
    .bind(auction.id)
    .fetch_one(h.db.pool())
    .await
    .unwrap();
    // 최고 금액 입찰은 순서와 관계없이 항상 받아들여진다
    assert_eq!(current_price, 600);
    assert_eq!(leader, Some(bidders[4].id));

    let mut total = current_price;
    for bidder in &bidders {
        total += h.balance_of(bidder).await;
    }
    assert_eq!(total, 5 * STARTING_BALANCE);
    assert_eq!(h.balance_of(&bidders[4]).await, STARTING_BALANCE - 600);

    let mut bids = query::handlers::get_bid_history(&h.db, auction.id).await.unwrap();
    bids.sort_by_key(|bid| bid.id);
    assert!(!bids.is_empty());
    assert!(bids.windows(2).all(|pair| pair[0].amount < pair[1].amount));
    assert_eq!(bids.last().map(|bid| bid.amount), Some(600));
}

/// 종료 시각에 입찰과 정산 스위프가 겹쳐도 결과는 하나다
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bid_racing_settlement_has_one_outcome() {
    let Some(h) = setup().await else { return };
    let seller = h.create_user("seller").await;
    let bidder = h.create_user("bidder").await;
    let gift = h.create_test_gift(&seller).await;
    let auction = h
        .state
        .auctions
        .create_auction(CreateAuctionCommand {
            gift_id: gift.id,
            seller_id: seller.id,
            start_price: 100,
            duration_hours: Some(1),
        })
        .await
        .unwrap();
    h.set_end_time(auction.id, Utc::now() + Duration::milliseconds(300))
        .await;

    let sweep = SettlementSweep::new(
        Arc::clone(&h.ledger),
        Arc::clone(&h.catalog),
        h.notifier.clone(),
        std::time::Duration::from_secs(60),
    );
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let auctions = Arc::clone(&h.state.auctions);
    let cmd = PlaceBidCommand {
        auction_id: auction.id,
        bidder_id: bidder.id,
        amount: 150,
    };
    let bid = tokio::spawn(async move { auctions.place_bid(cmd).await });
    let swept = sweep.run_once(Utc::now()).await.unwrap();
    let bid = bid.await.unwrap();

    let later = sweep.run_once(Utc::now() + Duration::seconds(1)).await.unwrap();
    assert!(later.iter().all(|outcome| outcome.auction().id != auction.id));
    assert!(h
        .state
        .auctions
        .settle(auction.id, Utc::now() + Duration::seconds(1))
        .await
        .unwrap()
        .is_none());

    let status = sqlx::query_scalar::<_, String>("SELECT status FROM auctions WHERE id = $1")
        .bind(auction.id)
        .fetch_one(h.db.pool())
        .await
        .unwrap();
    assert_eq!(status, "COMPLETED");

    // 동시에 도는 다른 테스트의 스위프가 먼저 정산했을 수도 있다
    let ours = swept.iter().find(|outcome| outcome.auction().id == auction.id);
    match bid {
        Ok(_) => {
            assert_eq!(h.owner_of(gift.id).await, bidder.id);
            assert_eq!(h.balance_of(&bidder).await, STARTING_BALANCE - 150);
            assert_eq!(h.balance_of(&seller).await, STARTING_BALANCE + 150);
            assert!(ours.map_or(true, |o| matches!(o, SettlementOutcome::Sold { .. })));
        }
        Err(MarketError::AuctionNotFound) => {
            assert_eq!(h.owner_of(gift.id).await, seller.id);
            assert_eq!(h.balance_of(&bidder).await, STARTING_BALANCE);
            assert_eq!(h.balance_of(&seller).await, STARTING_BALANCE);
            assert!(ours.map_or(true, |o| matches!(o, SettlementOutcome::Unsold { .. })));
        }
        Err(e) => panic!("예상하지 못한 입찰 오류: {e:?}"),
    }
}

/// 같은 경매는 한 번만 정산된다. 입찰 없는 경매는 판매자에게 남는다.
#[tokio::test]
async fn test_settlement_is_exactly_once() {
    let Some(h) = setup().await else { return };
    let seller = h.create_user("seller").await;
    let gift = h.create_test_gift(&seller).await;

    let auction = h
        .state
        .auctions
        .create_auction(CreateAuctionCommand {
            gift_id: gift.id,
            seller_id: seller.id,
            start_price: 100,
            duration_hours: Some(1),
        })
        .await
        .unwrap();

    // 종료 시각을 과거로 옮겨 정산 스위프 대상이 되게 한다
    h.set_end_time(auction.id, Utc::now() - Duration::hours(1)).await;

    let sweep = SettlementSweep::new(
        Arc::clone(&h.ledger),
        Arc::clone(&h.catalog),
        h.notifier.clone(),
        std::time::Duration::from_secs(60),
    );
    let first = sweep.run_once(Utc::now()).await.unwrap();
    let ours = first
        .iter()
        .find(|outcome| outcome.auction().id == auction.id)
        .expect("만료된 경매가 정산되어야 합니다");
    assert!(matches!(ours, SettlementOutcome::Unsold { .. }));
    assert_eq!(ours.auction().status, "COMPLETED");

    let second = sweep.run_once(Utc::now()).await.unwrap();
    assert!(second.iter().all(|outcome| outcome.auction().id != auction.id));
    assert!(h.state.auctions.settle(auction.id, Utc::now()).await.unwrap().is_none());

    assert_eq!(h.owner_of(gift.id).await, seller.id);
    assert_eq!(h.balance_of(&seller).await, STARTING_BALANCE);
    let unsold = h.gateway.messages_for(seller.external_id).await;
    assert!(unsold.iter().any(|m| m.contains("Teddy")));

    // 정산 후에는 다시 경매에 올릴 수 있다
    h.state
        .auctions
        .create_auction(CreateAuctionCommand {
            gift_id: gift.id,
            seller_id: seller.id,
            start_price: 100,
            duration_hours: Some(1),
        })
        .await
        .unwrap();
}

/// 판매 목록과 경매는 같은 선물에 동시에 존재할 수 없다
#[tokio::test]
async fn test_listing_and_auction_are_exclusive() {
    let Some(h) = setup().await else { return };
    let seller = h.create_user("seller").await;
    let listed = h.create_test_gift(&seller).await;
    let auctioned = h.create_test_gift(&seller).await;

    h.state
        .trade
        .list(ListCommand {
            gift_id: listed.id,
            seller_id: seller.id,
            price: 100,
        })
        .await
        .unwrap();
    let as_auction = h
        .state
        .auctions
        .create_auction(CreateAuctionCommand {
            gift_id: listed.id,
            seller_id: seller.id,
            start_price: 100,
            duration_hours: Some(1),
        })
        .await;
    assert!(matches!(as_auction, Err(MarketError::AlreadyListed)));

    let relisted = h
        .state
        .trade
        .list(ListCommand {
            gift_id: listed.id,
            seller_id: seller.id,
            price: 200,
        })
        .await;
    assert!(matches!(relisted, Err(MarketError::AlreadyListed)));

    h.state
        .auctions
        .create_auction(CreateAuctionCommand {
            gift_id: auctioned.id,
            seller_id: seller.id,
            start_price: 100,
            duration_hours: Some(1),
        })
        .await
        .unwrap();
    let as_listing = h
        .state
        .trade
        .list(ListCommand {
            gift_id: auctioned.id,
            seller_id: seller.id,
            price: 100,
        })
        .await;
    assert!(matches!(as_listing, Err(MarketError::AlreadyListed)));
}
// endregion: --- Auction Tests

// region:    --- Transfer Tests
/// 전송 확인: 확인 요청 -> 확인 -> 소유권 이전, 두 번째 확인은 실패
#[tokio::test]
async fn test_direct_transfer_confirm() {
    let Some(h) = setup().await else { return };
    let sender = h.create_user("sender").await;
    let recipient = h.create_user("recipient").await;
    let gift = h.create_test_gift(&sender).await;

    let key = h
        .state
        .trade
        .initiate_direct_transfer(TransferCommand {
            gift_id: gift.id,
            sender_id: sender.id,
            recipient_external_id: recipient.external_id,
        })
        .await
        .unwrap();
    assert_eq!(key, TransferKey::new(sender.id, gift.id));
    assert_eq!(h.gateway.confirmation_for(sender.external_id).await, Some(key));

    // 전송 대기 중에는 판매 등록할 수 없다
    let listing = h
        .state
        .trade
        .list(ListCommand {
            gift_id: gift.id,
            seller_id: sender.id,
            price: 100,
        })
        .await;
    assert!(matches!(listing, Err(MarketError::AlreadyListed)));

    let receipt = h.state.trade.confirm_transfer(&key).await.unwrap();
    assert_eq!(receipt.gift.owner_id, recipient.id);
    assert_eq!(h.owner_of(gift.id).await, recipient.id);
    assert!(matches!(
        h.state.trade.confirm_transfer(&key).await,
        Err(MarketError::TransferNotFound)
    ));

    let received = h.gateway.messages_for(recipient.external_id).await;
    assert!(received.iter().any(|m| m.contains("sender")));
}

/// 저장소 오류로 확인이 실패하면 요청은 남고 발신자에게 다시 확인을 요청한다
#[tokio::test]
async fn test_confirm_storage_failure_asks_sender_again() {
    let Some(h) = setup().await else { return };
    let sender = h.create_user("sender").await;
    let recipient = h.create_user("recipient").await;
    let gift = h.create_test_gift(&sender).await;

    let key = h
        .state
        .trade
        .initiate_direct_transfer(TransferCommand {
            gift_id: gift.id,
            sender_id: sender.id,
            recipient_external_id: recipient.external_id,
        })
        .await
        .unwrap();
    assert_eq!(h.gateway.prompts_for(sender.external_id, 1).await.len(), 1);

    // 이 테스트 전용 연결 풀을 닫아 저장소 오류를 만든다
    h.db.pool().close().await;
    let callback = TransferCallback {
        action: CallbackAction::Confirm,
        key: key.to_string(),
    };
    let result = handle_transfer_callback(&h.state.trade, callback).await;
    assert!(matches!(result, Err(MarketError::Database(_))));
    assert!(h.state.trade.pending().get(&key).is_some());

    let prompts = h.gateway.prompts_for(sender.external_id, 2).await;
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("다시 확인"));
    assert!(prompts[1].contains("recipient"));
}

/// 전송 취소와 콜백 처리
#[tokio::test]
async fn test_direct_transfer_cancel_and_callback() {
    let Some(h) = setup().await else { return };
    let sender = h.create_user("sender").await;
    let recipient = h.create_user("recipient").await;
    let gift = h.create_test_gift(&sender).await;

    let self_transfer = h
        .state
        .trade
        .initiate_direct_transfer(TransferCommand {
            gift_id: gift.id,
            sender_id: sender.id,
            recipient_external_id: sender.external_id,
        })
        .await;
    assert!(matches!(self_transfer, Err(MarketError::SelfTransferForbidden)));

    let transfer = TransferCommand {
        gift_id: gift.id,
        sender_id: sender.id,
        recipient_external_id: recipient.external_id,
    };
    let key = h
        .state
        .trade
        .initiate_direct_transfer(transfer.clone())
        .await
        .unwrap();
    h.state.trade.cancel_transfer(&key).unwrap();
    assert!(h.state.trade.pending().get(&key).is_none());
    assert_eq!(h.owner_of(gift.id).await, sender.id);

    // 콜백으로 들어온 확인
    let key = h
        .state
        .trade
        .initiate_direct_transfer(transfer)
        .await
        .unwrap();
    handle_transfer_callback(
        &h.state.trade,
        TransferCallback {
            action: CallbackAction::Confirm,
            key: key.to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(h.owner_of(gift.id).await, recipient.id);

    // 해석할 수 없는 키는 무시된다
    handle_transfer_callback(
        &h.state.trade,
        TransferCallback {
            action: CallbackAction::Cancel,
            key: "garbage".to_string(),
        },
    )
    .await
    .unwrap();
}
// endregion: --- Transfer Tests

// region:    --- Shop Tests
/// 상점 구매 후 개선
#[tokio::test]
async fn test_shop_purchase_and_improve() {
    let Some(h) = setup().await else { return };
    let user = h.create_user("shopper").await;

    let receipt = h
        .state
        .trade
        .buy_product(BuyProductCommand {
            user_id: user.id,
            product_id: TEDDY,
        })
        .await
        .unwrap();
    assert_eq!(receipt.balance, STARTING_BALANCE - 100);
    assert_eq!(receipt.gift.owner_id, user.id);
    assert_eq!(receipt.remaining, None);

    let (improved, balance) = h
        .state
        .trade
        .improve_gift(ImproveCommand {
            gift_id: receipt.gift.id,
            owner_id: user.id,
        })
        .await
        .unwrap();
    assert!(improved.improved);
    assert!(improved.collection_number.is_some());
    assert!(improved
        .improved_image
        .as_deref()
        .is_some_and(|image| image.starts_with("teddy/")));
    assert_eq!(balance, STARTING_BALANCE - 100 - 500);

    let twice = h
        .state
        .trade
        .improve_gift(ImproveCommand {
            gift_id: receipt.gift.id,
            owner_id: user.id,
        })
        .await;
    assert!(matches!(twice, Err(MarketError::AlreadyImproved)));

    // 개선 이미지가 없는 상품
    let (_, rocket) = h.ledger.grant(user.id, 0, Some(ROCKET)).await.unwrap();
    let rocket = rocket.unwrap();
    let plain = h
        .state
        .trade
        .improve_gift(ImproveCommand {
            gift_id: rocket.id,
            owner_id: user.id,
        })
        .await;
    assert!(matches!(plain, Err(MarketError::NotImprovable)));

    let unknown = h
        .state
        .trade
        .buy_product(BuyProductCommand {
            user_id: user.id,
            product_id: -1,
        })
        .await;
    assert!(matches!(unknown, Err(MarketError::ProductNotFound(-1))));
}

/// 구매 한도가 있는 상품
#[tokio::test]
async fn test_shop_limit_is_enforced() {
    let limited_id = unique_external_id();
    let Some(h) = setup_with(vec![Product {
        id: limited_id,
        name: "Limited".to_string(),
        price: 10,
        limit: Some(1),
        image: None,
        improvements: Vec::new(),
    }])
    .await
    else {
        return;
    };
    let first = h.create_user("first").await;
    let second = h.create_user("second").await;

    let receipt = h
        .state
        .trade
        .buy_product(BuyProductCommand {
            user_id: first.id,
            product_id: limited_id,
        })
        .await
        .unwrap();
    assert_eq!(receipt.remaining, Some(0));

    let sold_out = h
        .state
        .trade
        .buy_product(BuyProductCommand {
            user_id: second.id,
            product_id: limited_id,
        })
        .await;
    assert!(matches!(sold_out, Err(MarketError::ProductSoldOut)));
    assert_eq!(h.balance_of(&second).await, STARTING_BALANCE);
    assert_eq!(
        query::handlers::get_product_bought(&h.db, limited_id).await.unwrap(),
        1
    );
}
// endregion: --- Shop Tests

// region:    --- Admin Tests
/// 관리자 지급, 차단, 강제 삭제
#[tokio::test]
async fn test_admin_operations() {
    let Some(h) = setup().await else { return };
    let user = h.create_user("target").await;

    let granted = h
        .state
        .admin
        .grant(GrantCommand {
            external_id: user.external_id,
            balance: Some(500),
            product_id: Some(TEDDY),
        })
        .await
        .unwrap();
    assert_eq!(granted.user.balance, STARTING_BALANCE + 500);
    let gift = granted.gift.unwrap();
    assert_eq!(gift.owner_id, user.id);

    let listing = h
        .state
        .trade
        .list(ListCommand {
            gift_id: gift.id,
            seller_id: user.id,
            price: 100,
        })
        .await
        .unwrap();
    h.state.admin.remove_listing(listing.id).await.unwrap();
    assert!(!h.ledger.gift_is_committed(gift.id).await.unwrap());

    let blocked = h
        .state
        .admin
        .block(BlockCommand {
            external_id: user.external_id,
            blocked: true,
        })
        .await
        .unwrap();
    assert!(blocked.is_blocked);
    let listing = h
        .state
        .trade
        .list(ListCommand {
            gift_id: gift.id,
            seller_id: user.id,
            price: 100,
        })
        .await;
    assert!(matches!(listing, Err(MarketError::UserBlocked)));

    let inverted = h
        .state
        .admin
        .set_price_limits(PriceLimitsCommand {
            min_price: 500,
            max_price: 100,
        })
        .await;
    assert!(matches!(inverted, Err(MarketError::InvalidPriceLimits { .. })));
}
/// 지급 중 하나라도 실패하면 잔액과 선물 모두 바뀌지 않는다
#[tokio::test]
async fn test_admin_grant_is_atomic() {
    let Some(h) = setup().await else { return };
    let user = h.create_user("target").await;

    let overdrawn = h
        .state
        .admin
        .grant(GrantCommand {
            external_id: user.external_id,
            balance: Some(-(STARTING_BALANCE + 1)),
            product_id: Some(TEDDY),
        })
        .await;
    assert!(matches!(overdrawn, Err(MarketError::InsufficientFunds { .. })));
    assert_eq!(h.balance_of(&user).await, STARTING_BALANCE);
    let gifts = query::handlers::get_user_gifts(&h.db, user.id).await.unwrap();
    assert!(gifts.is_empty());

    let unknown = h
        .state
        .admin
        .grant(GrantCommand {
            external_id: user.external_id,
            balance: Some(500),
            product_id: Some(999),
        })
        .await;
    assert!(matches!(unknown, Err(MarketError::ProductNotFound(999))));
    assert_eq!(h.balance_of(&user).await, STARTING_BALANCE);

    let debited = h
        .state
        .admin
        .grant(GrantCommand {
            external_id: user.external_id,
            balance: Some(-500),
            product_id: None,
        })
        .await
        .unwrap();
    assert_eq!(debited.user.balance, STARTING_BALANCE - 500);
    assert!(debited.gift.is_none());
}

/// 부호를 뒤집을 수 없는 차감액은 잔액 부족으로 거절된다
#[tokio::test]
async fn test_adjust_balance_rejects_min_delta() {
    let Some(h) = setup().await else { return };
    let user = h.create_user("target").await;

    let result = h.ledger.adjust_balance(user.id, i64::MIN).await;
    assert!(matches!(
        result,
        Err(MarketError::InsufficientFunds { needed: i64::MAX, .. })
    ));
    assert_eq!(h.balance_of(&user).await, STARTING_BALANCE);

    let granted = h
        .state
        .admin
        .grant(GrantCommand {
            external_id: user.external_id,
            balance: Some(i64::MIN),
            product_id: Some(TEDDY),
        })
        .await;
    assert!(matches!(granted, Err(MarketError::InsufficientFunds { .. })));
    assert!(query::handlers::get_user_gifts(&h.db, user.id)
        .await
        .unwrap()
        .is_empty());
}
// endregion: --- Admin Tests

// region:    --- HTTP Tests
async fn send(h: &Harness, request: Request<Body>) -> (StatusCode, Value) {
    let response = handlers::router(h.state.clone())
        .oneshot(request)
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// HTTP 경계: 사용자 등록/조회, 오류 코드, 관리자 인증
#[tokio::test]
async fn test_http_routes() {
    let Some(h) = setup().await else { return };
    let external_id = unique_external_id();

    let (status, body) = send(
        &h,
        post_json("/users", json!({ "external_id": external_id, "username": "http" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let user_id = body["user"]["id"].as_i64().unwrap();
    assert_eq!(body["user"]["balance"], STARTING_BALANCE);

    let (status, body) = send(
        &h,
        Request::builder()
            .uri(format!("/users/{user_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["external_id"], external_id);

    let (status, body) = send(
        &h,
        post_json(
            "/market/purchase",
            json!({ "listing_id": -1, "buyer_id": user_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "INVALID_LISTING");

    let (status, body) = send(
        &h,
        post_json(
            "/admin/block",
            json!({ "external_id": external_id, "blocked": true }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let mut request = post_json(
        "/admin/block",
        json!({ "external_id": external_id, "blocked": true }),
    );
    request
        .headers_mut()
        .insert("x-admin-token", ADMIN_TOKEN.parse().unwrap());
    let (status, body) = send(&h, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["is_blocked"], true);

    let (status, body) = send(
        &h,
        post_json("/transfers/not-a-key/confirm", json!({ "sender_id": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TRANSFER_NOT_FOUND");
}

/// HTTP 전송 확인/취소는 발신자 본인만 할 수 있다
#[tokio::test]
async fn test_http_transfer_requires_sender() {
    let Some(h) = setup().await else { return };
    let sender = h.create_user("sender").await;
    let recipient = h.create_user("recipient").await;
    let gift = h.create_test_gift(&sender).await;

    let key = h
        .state
        .trade
        .initiate_direct_transfer(TransferCommand {
            gift_id: gift.id,
            sender_id: sender.id,
            recipient_external_id: recipient.external_id,
        })
        .await
        .unwrap();
    let confirm_uri = format!("/transfers/{key}/confirm");
    let cancel_uri = format!("/transfers/{key}/cancel");

    let (status, body) = send(
        &h,
        post_json(&confirm_uri, json!({ "sender_id": recipient.id })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "NOT_OWNER");

    let (status, body) = send(
        &h,
        post_json(&cancel_uri, json!({ "sender_id": recipient.id })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "NOT_OWNER");

    // 거절된 요청은 대기 중인 전송을 건드리지 않는다
    assert_eq!(h.owner_of(gift.id).await, sender.id);
    assert!(h.state.trade.pending().get(&key).is_some());

    // 식별 정보 없는 요청은 본문 검증에서 거절된다
    let (status, _) = send(&h, post_json(&confirm_uri, json!({}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(h.owner_of(gift.id).await, sender.id);

    let (status, body) = send(
        &h,
        post_json(&confirm_uri, json!({ "sender_id": sender.id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["gift"]["owner_id"], recipient.id);
    assert_eq!(h.owner_of(gift.id).await, recipient.id);
}
// endregion: --- HTTP Tests
