/// 고정가 거래 엔진
/// 1. 판매 등록 / 취소 / 구매
/// 2. 선물 직접 전송 (확인 절차)
/// 3. 상점 구매 / 선물 개선
// region:    --- Imports
use crate::catalog::{Catalog, Product};
use crate::error::{MarketError, Result};
use crate::ledger::model::{
    Gift, MarketListing, PurchaseReceipt, Requester, ShopReceipt, TransferReceipt,
};
use crate::ledger::LedgerStore;
use crate::notify::{Notice, Notifier};
use pending::{PendingTransfer, PendingTransfers, TransferKey};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
// endregion: --- Imports

pub mod pending;

// region:    --- Commands
/// 판매 등록 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ListCommand {
    pub gift_id: i64,
    pub seller_id: i64,
    pub price: i64,
}

/// 판매 취소 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DelistCommand {
    pub listing_id: i64,
    pub requester_id: i64,
}

/// 구매 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PurchaseCommand {
    pub listing_id: i64,
    pub buyer_id: i64,
}

/// 선물 직접 전송 명령 (수신자는 외부 식별자로 지정)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransferCommand {
    pub gift_id: i64,
    pub sender_id: i64,
    pub recipient_external_id: i64,
}

/// 상점 구매 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BuyProductCommand {
    pub user_id: i64,
    pub product_id: i64,
}

/// 선물 개선 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImproveCommand {
    pub gift_id: i64,
    pub owner_id: i64,
}
// endregion: --- Commands

// region:    --- Trade Engine
pub struct TradeEngine {
    ledger: Arc<LedgerStore>,
    catalog: Arc<dyn Catalog>,
    notifier: Notifier,
    pending: Arc<PendingTransfers>,
    improve_cost: i64,
}

impl TradeEngine {
    pub fn new(
        ledger: Arc<LedgerStore>,
        catalog: Arc<dyn Catalog>,
        notifier: Notifier,
        pending: Arc<PendingTransfers>,
        improve_cost: i64,
    ) -> Self {
        Self {
            ledger,
            catalog,
            notifier,
            pending,
            improve_cost,
        }
    }

    pub fn pending(&self) -> &PendingTransfers {
        &self.pending
    }

    /// 1. 판매 등록
    pub async fn list(&self, cmd: ListCommand) -> Result<MarketListing> {
        info!("{:<12} --> 판매 등록 요청: {:?}", "Trade", cmd);
        self.ensure_tradeable(cmd.gift_id).await?;
        self.ledger
            .create_listing(cmd.gift_id, cmd.seller_id, cmd.price)
            .await
    }

    /// 판매 취소
    pub async fn delist(&self, cmd: DelistCommand) -> Result<MarketListing> {
        info!("{:<12} --> 판매 취소 요청: {:?}", "Trade", cmd);
        self.ledger
            .remove_listing(cmd.listing_id, Requester::User(cmd.requester_id))
            .await
    }

    /// 구매
    pub async fn purchase(&self, cmd: PurchaseCommand) -> Result<PurchaseReceipt> {
        info!("{:<12} --> 구매 요청: {:?}", "Trade", cmd);
        let receipt = self
            .ledger
            .purchase_listing(cmd.listing_id, cmd.buyer_id)
            .await?;

        self.notifier.send(
            receipt.seller.external_id,
            Notice::ListingSold {
                product_name: self.catalog.product_name(receipt.product_id),
                buyer_name: receipt.buyer.username.clone(),
                price: receipt.listing.price,
            },
        );
        Ok(receipt)
    }

    /// 2. 선물 직접 전송 시작
    /// 발신자에게 확인을 요청하고, 응답은 confirm_transfer / cancel_transfer 로 들어온다.
    pub async fn initiate_direct_transfer(&self, cmd: TransferCommand) -> Result<TransferKey> {
        info!("{:<12} --> 선물 전송 요청: {:?}", "Trade", cmd);
        let gift = self
            .ledger
            .get_gift(cmd.gift_id)
            .await?
            .filter(|gift| gift.owner_id == cmd.sender_id)
            .ok_or(MarketError::NotOwner)?;
        if self.ledger.gift_is_committed(gift.id).await? {
            return Err(MarketError::AlreadyListed);
        }

        let sender = self.ledger.get_user(cmd.sender_id).await?;
        sender.ensure_active()?;
        let recipient = self
            .ledger
            .find_user_by_external_id(cmd.recipient_external_id)
            .await?;
        if recipient.id == sender.id {
            return Err(MarketError::SelfTransferForbidden);
        }

        let transfer = PendingTransfer {
            gift_id: gift.id,
            product_id: gift.product_id,
            product_name: self.catalog.product_name(gift.product_id),
            sender_id: sender.id,
            sender_external_id: sender.external_id,
            sender_name: sender.username,
            recipient_id: recipient.id,
            recipient_external_id: recipient.external_id,
            recipient_name: recipient.username,
        };
        let key = transfer.key();
        let prompt = Notice::TransferPrompt {
            product_name: transfer.product_name.clone(),
            recipient_name: transfer.recipient_name.clone(),
        };
        let sender_external_id = transfer.sender_external_id;
        if self.pending.insert(transfer).is_some() {
            info!("{:<12} --> 기존 전송 요청 덮어씀: key={}", "Trade", key);
        }

        self.notifier.ask(sender_external_id, key, prompt);
        Ok(key)
    }

    /// 선물 전송 확인
    pub async fn confirm_transfer(&self, key: &TransferKey) -> Result<TransferReceipt> {
        let transfer = self.pending.take(key).ok_or_else(|| {
            info!("{:<12} --> 확인할 전송 요청 없음: key={}", "Trade", key);
            MarketError::TransferNotFound
        })?;

        let receipt = match self
            .ledger
            .transfer_gift(transfer.gift_id, transfer.sender_id, transfer.recipient_id)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) if e.is_server_error() => {
                warn!(
                    "{:<12} --> 전송 처리 실패, 요청 유지: key={} error={}",
                    "Trade", key, e
                );
                // 콜백 메시지는 이미 소비되었으므로 발신자에게 다시 확인을 받는다
                let retry = Notice::TransferRetry {
                    product_name: transfer.product_name.clone(),
                    recipient_name: transfer.recipient_name.clone(),
                };
                let sender_external_id = transfer.sender_external_id;
                self.pending.restore(transfer);
                self.notifier.ask(sender_external_id, *key, retry);
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "{:<12} --> 전송 불가, 요청 폐기: key={} error={}",
                    "Trade", key, e
                );
                return Err(e);
            }
        };

        self.notifier.send(
            receipt.recipient.external_id,
            Notice::GiftReceived {
                product_name: transfer.product_name.clone(),
                sender_name: receipt.sender.username.clone(),
            },
        );
        self.notifier.send(
            receipt.sender.external_id,
            Notice::TransferCompleted {
                product_name: transfer.product_name,
                recipient_name: receipt.recipient.username.clone(),
            },
        );
        Ok(receipt)
    }

    /// 요청자 확인 후 전송 확인 (발신자 본인만 가능)
    pub async fn confirm_transfer_by(
        &self,
        key: &TransferKey,
        requester_id: i64,
    ) -> Result<TransferReceipt> {
        ensure_sender(key, requester_id)?;
        self.confirm_transfer(key).await
    }

    /// 요청자 확인 후 전송 취소 (발신자 본인만 가능)
    pub fn cancel_transfer_by(&self, key: &TransferKey, requester_id: i64) -> Result<PendingTransfer> {
        ensure_sender(key, requester_id)?;
        self.cancel_transfer(key)
    }

    /// 선물 전송 취소
    pub fn cancel_transfer(&self, key: &TransferKey) -> Result<PendingTransfer> {
        let transfer = self.pending.take(key).ok_or(MarketError::TransferNotFound)?;
        info!("{:<12} --> 선물 전송 취소: key={}", "Trade", key);
        self.notifier
            .send(transfer.sender_external_id, Notice::TransferCancelled);
        Ok(transfer)
    }

    /// 3. 상점 구매
    pub async fn buy_product(&self, cmd: BuyProductCommand) -> Result<ShopReceipt> {
        info!("{:<12} --> 상점 구매 요청: {:?}", "Trade", cmd);
        let product = self.product(cmd.product_id)?;
        self.ledger
            .buy_product(cmd.user_id, product.id, product.price, product.limit)
            .await
    }

    /// 선물 개선
    pub async fn improve_gift(&self, cmd: ImproveCommand) -> Result<(Gift, i64)> {
        info!("{:<12} --> 선물 개선 요청: {:?}", "Trade", cmd);
        let gift = self
            .ledger
            .get_gift(cmd.gift_id)
            .await?
            .filter(|gift| gift.owner_id == cmd.owner_id)
            .ok_or(MarketError::NotOwner)?;
        if gift.improved {
            return Err(MarketError::AlreadyImproved);
        }

        let product = self.product(gift.product_id)?;
        let image = product
            .improvements
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or(MarketError::NotImprovable)?;

        self.ledger
            .improve_gift(gift.id, cmd.owner_id, &image, self.improve_cost)
            .await
    }

    fn product(&self, product_id: i64) -> Result<Product> {
        self.catalog
            .product_by_id(product_id)
            .ok_or(MarketError::ProductNotFound(product_id))
    }

    async fn ensure_tradeable(&self, gift_id: i64) -> Result<()> {
        ensure_tradeable(&self.ledger, self.catalog.as_ref(), &self.pending, gift_id).await
    }
}

/// 판매/경매 등록 가능 여부: 카탈로그에 존재하고 전송 대기 중이 아니어야 한다.
/// 전송 요청을 확인하거나 취소할 수 있는 사람은 발신자뿐이다
fn ensure_sender(key: &TransferKey, requester_id: i64) -> Result<()> {
    if key.sender_id != requester_id {
        warn!(
            "{:<12} --> 발신자가 아닌 요청 거절: key={} requester={}",
            "Trade", key, requester_id
        );
        return Err(MarketError::NotOwner);
    }
    Ok(())
}

pub(crate) async fn ensure_tradeable(
    ledger: &LedgerStore,
    catalog: &dyn Catalog,
    pending: &PendingTransfers,
    gift_id: i64,
) -> Result<()> {
    let gift = ledger
        .get_gift(gift_id)
        .await?
        .ok_or(MarketError::NotOwner)?;
    catalog
        .product_by_id(gift.product_id)
        .ok_or(MarketError::ProductNotFound(gift.product_id))?;
    if pending.contains_gift(gift_id) {
        return Err(MarketError::AlreadyListed);
    }
    Ok(())
}
// endregion: --- Trade Engine
