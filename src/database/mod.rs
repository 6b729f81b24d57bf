// region:    --- Imports
use crate::config::{DatabaseConfig, MarketConfig};
use crate::error::MarketError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{info, warn};
// endregion: --- Imports

/// 트랜잭션 본문 타입
pub type TxFuture<'c, R> = Pin<Box<dyn Future<Output = Result<R, MarketError>> + Send + 'c>>;

pub struct DatabaseManager {
    pub pool: Arc<PgPool>,
    timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl DatabaseManager {
    /// 데이터베이스 매니저 생성
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.timeout)
            .connect(&config.url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
            timeout: config.timeout,
            max_retries: config.max_retries.max(1),
            retry_backoff: config.retry_backoff,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 트랜잭션 실행
    /// 직렬화 실패/교착 상태는 제한된 횟수만큼 재시도하고,
    /// 각 시도는 설정된 제한 시간을 넘기면 Timeout 으로 끝난다.
    pub async fn transaction<F, R>(&self, f: F) -> Result<R, MarketError>
    where
        F: for<'c> Fn(&'c mut Transaction<'static, Postgres>) -> TxFuture<'c, R> + Send + Sync,
        R: Send,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match time::timeout(self.timeout, self.run_once(&f)).await {
                Ok(result) => result,
                Err(_) => Err(MarketError::Timeout),
            };

            match result {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    warn!(
                        "{:<12} --> 트랜잭션 충돌, 재시도 {}/{}: {}",
                        "Database", attempt, self.max_retries, e
                    );
                    time::sleep(self.retry_backoff * attempt).await;
                }
                other => return other,
            }
        }
    }

    async fn run_once<F, R>(&self, f: &F) -> Result<R, MarketError>
    where
        F: for<'c> Fn(&'c mut Transaction<'static, Postgres>) -> TxFuture<'c, R> + Send + Sync,
        R: Send,
    {
        let mut tx = self.pool.begin().await?;
        match f(&mut tx).await {
            Ok(r) => {
                tx.commit().await?;
                Ok(r)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("{:<12} --> 롤백 실패: {:?}", "Database", rollback_err);
                }
                Err(e)
            }
        }
    }

    /// 데이터베이스 초기화
    /// reset 이 켜져 있으면 기존 테이블을 삭제한 뒤 스키마를 다시 만든다.
    pub async fn initialize_database(
        &self,
        reset: bool,
        market: &MarketConfig,
    ) -> Result<(), sqlx::Error> {
        if reset {
            let recreate_db_sql = include_str!("../sql/00-recreate-db.sql");
            self.execute_multi_query(recreate_db_sql).await?;
            info!("{:<12} --> 기존 스키마 삭제 완료", "Database");
        }

        let create_schema_sql = include_str!("../sql/01-create-schema.sql");
        self.execute_multi_query(create_schema_sql).await?;

        // 가격 범위 초기값
        sqlx::query(
            "INSERT INTO price_settings (id, min_price, max_price) VALUES (1, $1, $2)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(market.min_price)
        .bind(market.max_price)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// 여러 쿼리 실행
    async fn execute_multi_query(&self, sql: &str) -> Result<(), sqlx::Error> {
        for query in sql.split(';') {
            let query = query.trim();
            if !query.is_empty() {
                sqlx::query(query).execute(&*self.pool).await?;
            }
        }
        Ok(())
    }
}
