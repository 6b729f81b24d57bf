/// Kafka 연동
/// 알림은 notify 토픽으로 발행하고, 전송 확인 응답은 callback 토픽에서 소비한다.
// region:    --- Imports
use crate::config::KafkaConfig;
use crate::error::MarketError;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
// endregion: --- Imports

pub mod notifications;

pub use notifications::{
    handle_transfer_callback, CallbackAction, KafkaNotificationGateway, OutboundMessage,
    TransferCallback,
};

// region:    --- Kafka Producer
#[derive(Clone)]
pub struct KafkaProducer {
    producer: Arc<FutureProducer>,
}

/// KafkaProducer 구현
impl KafkaProducer {
    pub fn new(brokers: &str) -> Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(KafkaProducer {
            producer: Arc::new(producer),
        })
    }

    /// 메시지 전송
    pub async fn send_message(&self, topic: &str, key: &str, value: &str) -> Result<(), String> {
        debug!(
            "{:<12} --> Kafka 메시지 전송: topic={}, key={}",
            "Producer", topic, key
        );
        let record = FutureRecord::to(topic).key(key).payload(value);

        self.producer
            .send(record, Duration::from_secs(0))
            .await
            .map_err(|(e, _)| format!("Error sending message: {:?}", e))?;

        Ok(())
    }
}
// endregion: --- Kafka Producer

// region:    --- Kafka Consumer
pub struct KafkaConsumer {
    consumer: Arc<StreamConsumer>,
}

/// KafkaConsumer 구현
impl KafkaConsumer {
    pub fn new(brokers: &str, group_id: &str) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("allow.auto.create.topics", "true")
            .create()?;

        Ok(KafkaConsumer {
            consumer: Arc::new(consumer),
        })
    }

    /// 토픽의 JSON 메시지를 역직렬화해 handler 에 전달
    /// 역직렬화 실패나 처리 실패는 기록만 하고 다음 메시지로 넘어간다.
    pub async fn consume<T, F, Fut>(&self, topic: &str, handler: F) -> Result<(), KafkaError>
    where
        T: DeserializeOwned + Debug,
        F: Fn(T) -> Fut + Send,
        Fut: Future<Output = Result<(), MarketError>> + Send,
    {
        info!("{:<12} --> Kafka 소비 시작: topic={}", "Consumer", topic);
        self.consumer.subscribe(&[topic])?;

        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    debug!(
                        "{:<12} --> 메시지 수신: topic={}, partition={}, offset={}",
                        "Consumer",
                        message.topic(),
                        message.partition(),
                        message.offset()
                    );

                    let Some(payload) = message.payload() else {
                        warn!("{:<12} --> 빈 페이로드 수신", "Consumer");
                        continue;
                    };
                    match serde_json::from_slice::<T>(payload) {
                        Ok(value) => {
                            debug!("{:<12} --> deserialize 성공: {:?}", "Consumer", value);
                            if let Err(e) = handler(value).await {
                                error!("{:<12} --> 메시지 처리 오류: {:?}", "Consumer", e);
                            }
                        }
                        Err(e) => error!("{:<12} --> deserialize 오류: {:?}", "Consumer", e),
                    }
                }
                Err(e) => error!("{:<12} --> 메시지 수신 오류: {:?}", "Consumer", e),
            }
        }
    }
}
// endregion: --- Kafka Consumer

// region:    --- Kafka Manager
pub struct KafkaManager {
    producer: Arc<KafkaProducer>,
    consumer: Arc<KafkaConsumer>,
    config: KafkaConfig,
}

/// KafkaManager 구현
impl KafkaManager {
    pub fn new(config: KafkaConfig) -> Result<Self, KafkaError> {
        let producer = Arc::new(KafkaProducer::new(&config.brokers)?);
        let consumer = Arc::new(KafkaConsumer::new(&config.brokers, &config.group_id)?);

        Ok(KafkaManager {
            producer,
            consumer,
            config,
        })
    }

    /// 프로듀서 반환
    pub fn get_producer(&self) -> Arc<KafkaProducer> {
        Arc::clone(&self.producer)
    }

    /// 컨슈머 반환
    pub fn get_consumer(&self) -> Arc<KafkaConsumer> {
        Arc::clone(&self.consumer)
    }

    /// 토픽 생성 (이미 있으면 브로커가 오류를 돌려주며, 기록만 한다)
    pub async fn create_topic(
        &self,
        topic_name: &str,
        num_partitions: i32,
        replication_factor: i32,
    ) -> Result<(), String> {
        info!("{:<12} --> Kafka 토픽 생성 시작: {}", "Manager", topic_name);

        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .create()
            .map_err(|e| format!("AdminClient 생성 실패: {:?}", e))?;

        let new_topic = NewTopic::new(
            topic_name,
            num_partitions,
            TopicReplication::Fixed(replication_factor),
        );

        let results = admin_client
            .create_topics(&[new_topic], &AdminOptions::new())
            .await
            .map_err(|e| {
                error!("{:<12} --> Kafka 토픽 생성 실패: {:?}", "Manager", e);
                format!("토픽 생성 실패: {:?}", e)
            })?;

        for result in results {
            match result {
                Ok(topic) => info!("{:<12} --> Kafka 토픽 생성 성공: {}", "Manager", topic),
                Err((topic, code)) => warn!(
                    "{:<12} --> Kafka 토픽 생성 건너뜀: {} ({:?})",
                    "Manager", topic, code
                ),
            }
        }
        Ok(())
    }
}
// endregion: --- Kafka Manager
