/// 경매 정산 스케줄러
/// 주기적으로 만료된 경매를 찾아 정산하고 결과를 알린다.
/// 같은 경매를 두 번 정산해도 두 번째는 아무 일도 하지 않는다.
// region:    --- Imports
use crate::auction::engine::announce_settlement;
use crate::catalog::Catalog;
use crate::error::Result;
use crate::ledger::model::SettlementOutcome;
use crate::ledger::LedgerStore;
use crate::notify::Notifier;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};
// endregion: --- Imports

// region:    --- Settlement Sweep
#[derive(Clone)]
pub struct SettlementSweep {
    ledger: Arc<LedgerStore>,
    catalog: Arc<dyn Catalog>,
    notifier: Notifier,
    period: Duration,
}

impl SettlementSweep {
    pub fn new(
        ledger: Arc<LedgerStore>,
        catalog: Arc<dyn Catalog>,
        notifier: Notifier,
        period: Duration,
    ) -> Self {
        Self {
            ledger,
            catalog,
            notifier,
            period,
        }
    }

    /// 정산 루프 시작
    pub fn start(&self) -> JoinHandle<()> {
        let sweep = self.clone();
        info!(
            "{:<12} --> 정산 스케줄러 시작: {}초 주기",
            "Scheduler",
            sweep.period.as_secs()
        );
        tokio::spawn(async move {
            let mut ticker = interval(sweep.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = sweep.run_once(Utc::now()).await {
                    error!(
                        "{:<12} --> 경매 정산 중 오류 발생: {:?}",
                        "Scheduler", e
                    );
                }
            }
        })
    }

    /// 한 번의 정산 주기
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<Vec<SettlementOutcome>> {
        let outcomes = self.ledger.settle_expired_auctions(now).await?;
        for outcome in &outcomes {
            announce_settlement(&self.notifier, self.catalog.as_ref(), outcome);
        }
        debug!(
            "{:<12} --> 정산 주기 완료: {}건",
            "Scheduler",
            outcomes.len()
        );
        Ok(outcomes)
    }
}
// endregion: --- Settlement Sweep
