/// Kafka 기반 알림 게이트웨이와 전송 확인 콜백 처리
// region:    --- Imports
use super::KafkaProducer;
use crate::error::MarketError;
use crate::notify::{NotificationGateway, NotifyError};
use crate::trade::pending::TransferKey;
use crate::trade::TradeEngine;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
// endregion: --- Imports

// region:    --- Outbound Messages
/// notify 토픽에 발행되는 메시지
/// 메시징 어댑터가 이 메시지를 받아 실제 채팅 메시지로 전달한다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundMessage {
    Text {
        recipient: i64,
        text: String,
    },
    /// 예/아니오 버튼이 붙은 확인 요청. 응답은 같은 key 로 callback 토픽에 들어온다.
    Confirmation {
        recipient: i64,
        key: String,
        text: String,
    },
}

impl OutboundMessage {
    fn recipient(&self) -> i64 {
        match self {
            Self::Text { recipient, .. } | Self::Confirmation { recipient, .. } => *recipient,
        }
    }
}

pub struct KafkaNotificationGateway {
    producer: Arc<KafkaProducer>,
    topic: String,
}

impl KafkaNotificationGateway {
    pub fn new(producer: Arc<KafkaProducer>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }

    async fn publish(&self, message: OutboundMessage) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(&message)?;
        self.producer
            .send_message(&self.topic, &message.recipient().to_string(), &payload)
            .await
            .map_err(NotifyError::Publish)
    }
}

#[async_trait]
impl NotificationGateway for KafkaNotificationGateway {
    async fn notify(&self, recipient: i64, message: &str) -> Result<(), NotifyError> {
        self.publish(OutboundMessage::Text {
            recipient,
            text: message.to_string(),
        })
        .await
    }

    async fn request_confirmation(
        &self,
        recipient: i64,
        key: &TransferKey,
        prompt: &str,
    ) -> Result<(), NotifyError> {
        self.publish(OutboundMessage::Confirmation {
            recipient,
            key: key.to_string(),
            text: prompt.to_string(),
        })
        .await
    }
}
// endregion: --- Outbound Messages

// region:    --- Transfer Callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackAction {
    Confirm,
    Cancel,
}

/// callback 토픽으로 들어오는 확인 응답
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCallback {
    pub action: CallbackAction,
    pub key: String,
}

/// 확인 응답 처리
/// 해석할 수 없는 키나 이미 해결된 요청은 기록 후 무시하고, 저장소 오류만 돌려준다.
pub async fn handle_transfer_callback(
    trade: &TradeEngine,
    callback: TransferCallback,
) -> Result<(), MarketError> {
    let key = match callback.key.parse::<TransferKey>() {
        Ok(key) => key,
        Err(e) => {
            warn!("{:<12} --> 잘못된 콜백 키: {}", "Callback", e);
            return Ok(());
        }
    };

    let result = match callback.action {
        CallbackAction::Confirm => trade.confirm_transfer(&key).await.map(|_| ()),
        CallbackAction::Cancel => trade.cancel_transfer(&key).map(|_| ()),
    };

    match result {
        Ok(()) => {
            info!(
                "{:<12} --> 콜백 처리 완료: action={:?} key={}",
                "Callback", callback.action, key
            );
            Ok(())
        }
        Err(e) if e.is_server_error() => Err(e),
        Err(e) => {
            warn!(
                "{:<12} --> 콜백 처리 거절: action={:?} key={} error={}",
                "Callback", callback.action, key, e
            );
            Ok(())
        }
    }
}
// endregion: --- Transfer Callback

// endregion: --- Tests
