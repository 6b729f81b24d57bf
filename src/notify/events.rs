use serde::{Deserialize, Serialize};

/// 사용자에게 전달되는 알림
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Notice {
    // 판매 목록 상품 판매됨 (판매자)
    ListingSold {
        product_name: String,
        buyer_name: String,
        price: i64,
    },
    // 새 입찰 (판매자)
    NewBid {
        product_name: String,
        amount: i64,
    },
    // 최고 입찰 밀림 (이전 입찰자)
    Outbid {
        product_name: String,
        current_price: i64,
    },
    // 낙찰 (낙찰자)
    AuctionWon {
        product_name: String,
        price: i64,
    },
    // 경매 판매 완료 (판매자)
    AuctionSold {
        product_name: String,
        winner_name: String,
        price: i64,
    },
    // 입찰 없이 종료 (판매자)
    AuctionUnsold {
        product_name: String,
    },
    // 선물 수신 (수신자)
    GiftReceived {
        product_name: String,
        sender_name: String,
    },
    // 선물 전송 완료 (발신자)
    TransferCompleted {
        product_name: String,
        recipient_name: String,
    },
    // 선물 전송 취소 (발신자)
    TransferCancelled,
    // 선물 전송 확인 요청 (발신자)
    TransferPrompt {
        product_name: String,
        recipient_name: String,
    },
    // 일시 오류로 전송 실패, 다시 확인 요청 (발신자)
    TransferRetry {
        product_name: String,
        recipient_name: String,
    },
}

impl Notice {
    pub fn render(&self) -> String {
        match self {
            Self::ListingSold {
                product_name,
                buyer_name,
                price,
            } => format!(
                "🎉 상품 <b>{product_name}</b>이(가) <b>{buyer_name}</b>님에게 <b>{price}</b>에 판매되었습니다!"
            ),
            Self::NewBid {
                product_name,
                amount,
            } => format!("🎯 경매 상품 <b>{product_name}</b>에 새 입찰이 들어왔습니다: <b>{amount}</b>"),
            Self::Outbid {
                product_name,
                current_price,
            } => format!(
                "😔 <b>{product_name}</b>에 대한 입찰이 밀렸습니다. 현재 가격: <b>{current_price}</b>"
            ),
            Self::AuctionWon {
                product_name,
                price,
            } => format!("🎉 축하합니다! <b>{product_name}</b> 경매를 <b>{price}</b>에 낙찰받았습니다!"),
            Self::AuctionSold {
                product_name,
                winner_name,
                price,
            } => format!(
                "✅ <b>{product_name}</b> 경매가 종료되었습니다. 낙찰자: <b>{winner_name}</b>, 가격: <b>{price}</b>"
            ),
            Self::AuctionUnsold { product_name } => {
                format!("ℹ️ <b>{product_name}</b> 경매가 입찰 없이 종료되었습니다.")
            }
            Self::GiftReceived {
                product_name,
                sender_name,
            } => format!("🎁 <b>{sender_name}</b>님에게서 선물 <b>{product_name}</b>을(를) 받았습니다!"),
            Self::TransferCompleted {
                product_name,
                recipient_name,
            } => format!(
                "✅ 선물 <b>{product_name}</b>을(를) <b>{recipient_name}</b>님에게 보냈습니다!"
            ),
            Self::TransferCancelled => "❌ 선물 전송이 취소되었습니다.".to_string(),
            Self::TransferPrompt {
                product_name,
                recipient_name,
            } => format!(
                "❓ 선물 <b>{product_name}</b>을(를) <b>{recipient_name}</b>님에게 보내시겠습니까?"
            ),
            Self::TransferRetry {
                product_name,
                recipient_name,
            } => format!(
                "⚠️ 일시적인 오류로 선물 <b>{product_name}</b>을(를) 보내지 못했습니다. <b>{recipient_name}</b>님에게 보내려면 다시 확인을 눌러 주세요."
            ),
        }
    }
}
