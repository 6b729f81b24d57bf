/// 확인 대기 중인 선물 직접 전송
/// 프로세스 메모리에만 존재하며 재시작 시 사라진다. 만료 시간은 없다.
// region:    --- Imports
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
// endregion: --- Imports

// region:    --- Transfer Key
/// (발신자, 선물) 복합 키. 문자열 표현은 "{sender_id}_{gift_id}"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferKey {
    pub sender_id: i64,
    pub gift_id: i64,
}

impl TransferKey {
    pub fn new(sender_id: i64, gift_id: i64) -> Self {
        Self { sender_id, gift_id }
    }
}

impl fmt::Display for TransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.sender_id, self.gift_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransferKey(pub String);

impl fmt::Display for InvalidTransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid transfer key: {}", self.0)
    }
}

impl std::error::Error for InvalidTransferKey {}

impl FromStr for TransferKey {
    type Err = InvalidTransferKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sender, gift) = s
            .split_once('_')
            .ok_or_else(|| InvalidTransferKey(s.to_string()))?;
        let sender_id = sender.parse().map_err(|_| InvalidTransferKey(s.to_string()))?;
        let gift_id = gift.parse().map_err(|_| InvalidTransferKey(s.to_string()))?;
        Ok(Self { sender_id, gift_id })
    }
}
// endregion: --- Transfer Key

// region:    --- Pending Transfers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingTransfer {
    pub gift_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub sender_id: i64,
    pub sender_external_id: i64,
    pub sender_name: String,
    pub recipient_id: i64,
    pub recipient_external_id: i64,
    pub recipient_name: String,
}

impl PendingTransfer {
    pub fn key(&self) -> TransferKey {
        TransferKey::new(self.sender_id, self.gift_id)
    }
}

#[derive(Debug, Default)]
pub struct PendingTransfers {
    entries: DashMap<TransferKey, PendingTransfer>,
}

impl PendingTransfers {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장. 같은 키의 미해결 요청은 덮어쓴다.
    pub fn insert(&self, transfer: PendingTransfer) -> Option<PendingTransfer> {
        self.entries.insert(transfer.key(), transfer)
    }

    /// 해결을 위해 꺼낸다. 동시에 두 번 해결되지 않는다.
    pub fn take(&self, key: &TransferKey) -> Option<PendingTransfer> {
        self.entries.remove(key).map(|(_, transfer)| transfer)
    }

    /// 일시적 실패 후 되돌린다. 그 사이 새 요청이 들어왔다면 새 요청을 유지한다.
    pub fn restore(&self, transfer: PendingTransfer) {
        self.entries.entry(transfer.key()).or_insert(transfer);
    }

    pub fn get(&self, key: &TransferKey) -> Option<PendingTransfer> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// 선물에 대한 미해결 전송이 있는지 여부
    pub fn contains_gift(&self, gift_id: i64) -> bool {
        self.entries.iter().any(|entry| entry.key().gift_id == gift_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
// endregion: --- Pending Transfers

// endregion: --- Tests
