// region:    --- Imports
use gift_market::catalog::{Catalog, JsonCatalog};
use gift_market::config::AppConfig;
use gift_market::database::DatabaseManager;
use gift_market::handlers::{self, AppState};
use gift_market::ledger::LedgerStore;
use gift_market::message_broker::{
    handle_transfer_callback, KafkaManager, KafkaNotificationGateway, TransferCallback,
};
use gift_market::notify::Notifier;
use gift_market::scheduler::SettlementSweep;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;

    // DatabaseManager 생성
    let db_manager = Arc::new(DatabaseManager::new(&config.database).await?);

    // 데이터베이스 초기화
    if let Err(e) = db_manager
        .initialize_database(config.database.reset, &config.market)
        .await
    {
        error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> 데이터베이스 초기화 성공", "Main");

    // 상품 카탈로그 로드
    let catalog: Arc<dyn Catalog> = Arc::new(JsonCatalog::load(&config.catalog_path)?);

    // Kafka 매니저 생성 및 토픽 생성
    let kafka_manager = Arc::new(KafkaManager::new(config.kafka.clone())?);
    for topic in [&config.kafka.notify_topic, &config.kafka.callback_topic] {
        if let Err(e) = kafka_manager.create_topic(topic, 3, 1).await {
            error!("{:<12} --> Kafka 토픽 준비 실패: {}", "Main", e);
        }
    }

    let gateway = KafkaNotificationGateway::new(
        kafka_manager.get_producer(),
        config.kafka.notify_topic.clone(),
    );
    let notifier = Notifier::new(Arc::new(gateway));

    let ledger = Arc::new(LedgerStore::new(
        Arc::clone(&db_manager),
        config.market.starting_balance,
        config.market.auction_step_price,
        config.market.max_auction_hours,
    ));
    let state = AppState::new(
        Arc::clone(&ledger),
        Arc::clone(&catalog),
        notifier.clone(),
        &config.market,
        config.admin_token.clone(),
    );

    // 전송 확인 콜백 소비
    let consumer = kafka_manager.get_consumer();
    let trade = Arc::clone(&state.trade);
    let callback_topic = config.kafka.callback_topic.clone();
    tokio::spawn(async move {
        let result = consumer
            .consume(&callback_topic, |callback: TransferCallback| {
                let trade = Arc::clone(&trade);
                async move { handle_transfer_callback(&trade, callback).await }
            })
            .await;
        if let Err(e) = result {
            error!("{:<12} --> 콜백 소비 중단: {:?}", "Main", e);
        }
    });

    // 경매 정산 스케줄러
    let sweep = SettlementSweep::new(ledger, catalog, notifier, config.sweep_interval);
    sweep.start();

    // 라우터 설정
    let routes_all = handlers::router(state);

    // 리스너 생성
    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}
// endregion: --- Main
