/// 경매 엔진
/// 1. 경매 생성
/// 2. 입찰
/// 3. 단일 경매 정산
// region:    --- Imports
use crate::catalog::Catalog;
use crate::error::Result;
use crate::ledger::model::{Auction, BidReceipt, SettlementOutcome};
use crate::ledger::{LedgerStore, NewAuction};
use crate::notify::{Notice, Notifier};
use crate::trade::ensure_tradeable;
use crate::trade::pending::PendingTransfers;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
// endregion: --- Imports

// region:    --- Commands
/// 경매 생성 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateAuctionCommand {
    pub gift_id: i64,
    pub seller_id: i64,
    pub start_price: i64,
    /// 없으면 기본 경매 시간 사용
    #[serde(default)]
    pub duration_hours: Option<i64>,
}

/// 입찰 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlaceBidCommand {
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
}
// endregion: --- Commands

// region:    --- Auction Engine
pub struct AuctionEngine {
    ledger: Arc<LedgerStore>,
    catalog: Arc<dyn Catalog>,
    notifier: Notifier,
    pending: Arc<PendingTransfers>,
    default_hours: i64,
}

impl AuctionEngine {
    pub fn new(
        ledger: Arc<LedgerStore>,
        catalog: Arc<dyn Catalog>,
        notifier: Notifier,
        pending: Arc<PendingTransfers>,
        default_hours: i64,
    ) -> Self {
        Self {
            ledger,
            catalog,
            notifier,
            pending,
            default_hours,
        }
    }

    /// 1. 경매 생성
    pub async fn create_auction(&self, cmd: CreateAuctionCommand) -> Result<Auction> {
        info!("{:<12} --> 경매 생성 요청: {:?}", "Auction", cmd);
        ensure_tradeable(&self.ledger, self.catalog.as_ref(), &self.pending, cmd.gift_id).await?;

        let new = NewAuction {
            gift_id: cmd.gift_id,
            seller_id: cmd.seller_id,
            start_price: cmd.start_price,
            duration_hours: cmd.duration_hours.unwrap_or(self.default_hours),
        };
        self.ledger.create_auction(new, Utc::now()).await
    }

    /// 2. 입찰
    pub async fn place_bid(&self, cmd: PlaceBidCommand) -> Result<BidReceipt> {
        info!("{:<12} --> 입찰 요청: {:?}", "Auction", cmd);
        let receipt = self
            .ledger
            .place_bid(cmd.auction_id, cmd.bidder_id, cmd.amount)
            .await?;

        let product_name = self.catalog.product_name(receipt.product_id);
        self.notifier.send(
            receipt.seller.external_id,
            Notice::NewBid {
                product_name: product_name.clone(),
                amount: cmd.amount,
            },
        );
        // 본인이 다시 올린 입찰은 밀린 것이 아니다
        if let Some((previous, _)) = receipt
            .outbid
            .as_ref()
            .filter(|(previous, _)| previous.id != receipt.bidder.id)
        {
            self.notifier.send(
                previous.external_id,
                Notice::Outbid {
                    product_name,
                    current_price: receipt.auction.current_price,
                },
            );
        }
        Ok(receipt)
    }

    /// 3. 단일 경매 정산 (이미 정산되었거나 아직 진행 중이면 None)
    pub async fn settle(&self, auction_id: i64, now: DateTime<Utc>) -> Result<Option<SettlementOutcome>> {
        let outcome = self.ledger.settle_auction(auction_id, now).await?;
        if let Some(outcome) = &outcome {
            announce_settlement(&self.notifier, self.catalog.as_ref(), outcome);
        }
        Ok(outcome)
    }
}

/// 정산 결과 알림: 낙찰자와 판매자, 또는 유찰 시 판매자
pub fn announce_settlement(notifier: &Notifier, catalog: &dyn Catalog, outcome: &SettlementOutcome) {
    match outcome {
        SettlementOutcome::Sold {
            auction,
            product_id,
            seller,
            winner,
        } => {
            let product_name = catalog.product_name(*product_id);
            notifier.send(
                winner.external_id,
                Notice::AuctionWon {
                    product_name: product_name.clone(),
                    price: auction.current_price,
                },
            );
            notifier.send(
                seller.external_id,
                Notice::AuctionSold {
                    product_name,
                    winner_name: winner.username.clone(),
                    price: auction.current_price,
                },
            );
        }
        SettlementOutcome::Unsold {
            product_id, seller, ..
        } => notifier.send(
            seller.external_id,
            Notice::AuctionUnsold {
                product_name: catalog.product_name(*product_id),
            },
        ),
    }
}
// endregion: --- Auction Engine
