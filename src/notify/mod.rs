/// 사용자 알림 게이트웨이
/// 알림은 항상 커밋 이후에 비동기로 보내며, 실패해도 거래 결과에 영향을 주지 않는다.
// region:    --- Imports
use crate::trade::pending::TransferKey;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
// endregion: --- Imports

pub mod events;

pub use events::Notice;

// region:    --- Gateway
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("알림 발행 실패: {0}")]
    Publish(String),

    #[error("알림 직렬화 실패: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// 사용자에게 메시지 전달
    async fn notify(&self, recipient: i64, message: &str) -> Result<(), NotifyError>;

    /// 예/아니오 확인 요청. 응답은 같은 키로 콜백된다.
    async fn request_confirmation(
        &self,
        recipient: i64,
        key: &TransferKey,
        prompt: &str,
    ) -> Result<(), NotifyError>;
}
// endregion: --- Gateway

// region:    --- Notifier
/// 게이트웨이 호출을 별도 태스크로 분리하는 전송기
#[derive(Clone)]
pub struct Notifier {
    gateway: Arc<dyn NotificationGateway>,
}

impl Notifier {
    pub fn new(gateway: Arc<dyn NotificationGateway>) -> Self {
        Self { gateway }
    }

    /// 알림 전송 (fire-and-forget)
    pub fn send(&self, recipient: i64, notice: Notice) {
        let gateway = Arc::clone(&self.gateway);
        let message = notice.render();
        tokio::spawn(async move {
            match gateway.notify(recipient, &message).await {
                Ok(()) => debug!("{:<12} --> 알림 전송: recipient={}", "Notify", recipient),
                Err(e) => warn!(
                    "{:<12} --> 알림 전송 실패 (무시): recipient={} error={}",
                    "Notify", recipient, e
                ),
            }
        });
    }

    /// 확인 요청 전송 (fire-and-forget)
    pub fn ask(&self, recipient: i64, key: TransferKey, notice: Notice) {
        let gateway = Arc::clone(&self.gateway);
        let prompt = notice.render();
        tokio::spawn(async move {
            if let Err(e) = gateway.request_confirmation(recipient, &key, &prompt).await {
                warn!(
                    "{:<12} --> 확인 요청 실패 (무시): recipient={} key={} error={}",
                    "Notify", recipient, key, e
                );
            }
        });
    }
}
// endregion: --- Notifier
