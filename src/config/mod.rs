/// 환경 변수 기반 서비스 설정
/// DATABASE_URL 외의 모든 값은 기본값을 가진다.
// region:    --- Imports
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
// endregion: --- Imports

// region:    --- Config Error
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("환경 변수 {0}가 설정되지 않았습니다.")]
    Missing(&'static str),

    #[error("환경 변수 {key}의 값이 올바르지 않습니다: {value}")]
    Invalid { key: &'static str, value: String },
}
// endregion: --- Config Error

// region:    --- App Config
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub kafka: KafkaConfig,
    pub market: MarketConfig,
    /// 정산 스위프 실행 주기
    pub sweep_interval: Duration,
    pub listen_addr: String,
    pub catalog_path: String,
    /// 관리자 API 토큰 (없으면 관리자 API 비활성화)
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// 커넥션 획득 및 트랜잭션 전체에 적용되는 제한 시간
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    /// 시작 시 스키마를 삭제 후 재생성
    pub reset: bool,
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub group_id: String,
    pub notify_topic: String,
    pub callback_topic: String,
}

#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub starting_balance: i64,
    pub improve_cost: i64,
    pub default_auction_hours: i64,
    pub max_auction_hours: i64,
    pub auction_step_price: i64,
    /// price_settings 테이블 최초 생성 시 사용되는 가격 범위
    pub min_price: i64,
    pub max_price: i64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            starting_balance: 10_000_000,
            improve_cost: 500,
            default_auction_hours: 24,
            max_auction_hours: 168,
            auction_step_price: 100,
            min_price: 0,
            max_price: 1_000_000_000,
        }
    }
}

impl AppConfig {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let defaults = MarketConfig::default();

        Ok(Self {
            database: DatabaseConfig {
                url,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5)?,
                timeout: Duration::from_secs(env_or("DATABASE_TIMEOUT_SECS", 5)?),
                max_retries: env_or("TX_MAX_RETRIES", 3)?,
                retry_backoff: Duration::from_millis(env_or("TX_RETRY_BACKOFF_MS", 50)?),
                reset: env_or("RESET_DATABASE", false)?,
            },
            kafka: KafkaConfig {
                brokers: env_or("KAFKA_BROKERS", "localhost:9092".to_string())?,
                group_id: env_or("KAFKA_GROUP_ID", "gift-market".to_string())?,
                notify_topic: env_or("NOTIFY_TOPIC", "notifications".to_string())?,
                callback_topic: env_or("CALLBACK_TOPIC", "transfer-callbacks".to_string())?,
            },
            market: MarketConfig {
                starting_balance: env_or("STARTING_BALANCE", defaults.starting_balance)?,
                improve_cost: env_or("IMPROVE_COST", defaults.improve_cost)?,
                default_auction_hours: env_or("DEFAULT_AUCTION_HOURS", defaults.default_auction_hours)?,
                max_auction_hours: env_or("MAX_AUCTION_HOURS", defaults.max_auction_hours)?,
                auction_step_price: env_or("AUCTION_STEP_PRICE", defaults.auction_step_price)?,
                min_price: env_or("MIN_PRICE", defaults.min_price)?,
                max_price: env_or("MAX_PRICE", defaults.max_price)?,
            },
            sweep_interval: Duration::from_secs(env_or("SWEEP_INTERVAL_SECS", 60)?),
            listen_addr: env_or("LISTEN_ADDR", "0.0.0.0:3000".to_string())?,
            catalog_path: env_or("CATALOG_PATH", "products.json".to_string())?,
            admin_token: std::env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
        })
    }
}

impl DatabaseConfig {
    /// 기본값으로 채운 데이터베이스 설정 (테스트, 도구용)
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 5,
            timeout: Duration::from_secs(5),
            max_retries: 3,
            retry_backoff: Duration::from_millis(50),
            reset: false,
        }
    }
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    parse_or(key, std::env::var(key).ok(), default)
}

fn parse_or<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) if value.trim().is_empty() => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
// endregion: --- App Config

// endregion: --- Tests
