/// 관리자 기능
/// 잔액/선물 지급, 사용자 차단, 판매 목록 강제 삭제, 가격 범위 변경
// region:    --- Imports
use crate::catalog::Catalog;
use crate::error::{MarketError, Result};
use crate::ledger::model::{Gift, MarketListing, PriceLimits, Requester, User};
use crate::ledger::LedgerStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
// endregion: --- Imports

// region:    --- Commands
/// 지급 명령 (대상은 외부 식별자로 지정)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantCommand {
    pub external_id: i64,
    /// 잔액 증감 (음수면 차감)
    #[serde(default)]
    pub balance: Option<i64>,
    #[serde(default)]
    pub product_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrantResult {
    pub user: User,
    pub gift: Option<Gift>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockCommand {
    pub external_id: i64,
    pub blocked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLimitsCommand {
    pub min_price: i64,
    pub max_price: i64,
}
// endregion: --- Commands

// region:    --- Admin Service
pub struct AdminService {
    ledger: Arc<LedgerStore>,
    catalog: Arc<dyn Catalog>,
}

impl AdminService {
    pub fn new(ledger: Arc<LedgerStore>, catalog: Arc<dyn Catalog>) -> Self {
        Self { ledger, catalog }
    }

    /// 잔액 및 선물 지급
    pub async fn grant(&self, cmd: GrantCommand) -> Result<GrantResult> {
        info!("{:<12} --> 지급 요청: {:?}", "Admin", cmd);
        let user = self.ledger.find_user_by_external_id(cmd.external_id).await?;

        // 존재하지 않는 상품이면 잔액도 건드리지 않는다
        if let Some(product_id) = cmd.product_id {
            if self.catalog.product_by_id(product_id).is_none() {
                return Err(MarketError::ProductNotFound(product_id));
            }
        }

        let delta = cmd.balance.unwrap_or(0);
        let (user, gift) = self.ledger.grant(user.id, delta, cmd.product_id).await?;
        Ok(GrantResult { user, gift })
    }

    /// 사용자 차단/해제
    pub async fn block(&self, cmd: BlockCommand) -> Result<User> {
        info!("{:<12} --> 차단 상태 변경: {:?}", "Admin", cmd);
        self.ledger.set_blocked(cmd.external_id, cmd.blocked).await
    }

    /// 판매 목록 강제 삭제
    pub async fn remove_listing(&self, listing_id: i64) -> Result<MarketListing> {
        info!("{:<12} --> 판매 목록 강제 삭제: listing={}", "Admin", listing_id);
        self.ledger.remove_listing(listing_id, Requester::Admin).await
    }

    /// 가격 범위 변경
    pub async fn set_price_limits(&self, cmd: PriceLimitsCommand) -> Result<PriceLimits> {
        self.ledger
            .update_price_limits(cmd.min_price, cmd.max_price)
            .await
    }
}
// endregion: --- Admin Service
