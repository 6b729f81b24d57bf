/// 사용자 생성 또는 이름 갱신 (최초 접촉)
pub const UPSERT_USER: &str = r#"
    INSERT INTO users (external_id, username, balance)
    VALUES ($1, $2, $3)
    ON CONFLICT (external_id) DO UPDATE SET username = EXCLUDED.username
    RETURNING id, external_id, username, balance, is_blocked, created_at
"#;

/// 사용자 조회
pub const GET_USER: &str =
    "SELECT id, external_id, username, balance, is_blocked, created_at FROM users WHERE id = $1";

/// 외부 식별자로 사용자 조회
pub const GET_USER_BY_EXTERNAL_ID: &str =
    "SELECT id, external_id, username, balance, is_blocked, created_at FROM users WHERE external_id = $1";

/// 사용자 행 잠금 조회
pub const LOCK_USER: &str =
    "SELECT id, external_id, username, balance, is_blocked, created_at FROM users WHERE id = $1 FOR UPDATE";

/// 잔액 차감 (음수 잔액 방지)
pub const DEBIT_USER: &str =
    "UPDATE users SET balance = balance - $2 WHERE id = $1 AND balance >= $2 RETURNING balance";

/// 잔액 증가
pub const CREDIT_USER: &str =
    "UPDATE users SET balance = balance + $2 WHERE id = $1 RETURNING balance";

/// 차단 상태 변경
pub const SET_USER_BLOCKED: &str = r#"
    UPDATE users SET is_blocked = $2 WHERE external_id = $1
    RETURNING id, external_id, username, balance, is_blocked, created_at
"#;

/// 선물 조회
pub const GET_GIFT: &str = "SELECT id, owner_id, product_id, improved, improved_image, collection_number, created_at FROM gifts WHERE id = $1";

/// 선물 행 잠금 조회
pub const LOCK_GIFT: &str = "SELECT id, owner_id, product_id, improved, improved_image, collection_number, created_at FROM gifts WHERE id = $1 FOR UPDATE";

/// 선물 생성
pub const INSERT_GIFT: &str = r#"
    INSERT INTO gifts (owner_id, product_id)
    VALUES ($1, $2)
    RETURNING id, owner_id, product_id, improved, improved_image, collection_number, created_at
"#;

/// 소유자 조건부 선물 이전
pub const MOVE_GIFT: &str = r#"
    UPDATE gifts SET owner_id = $3 WHERE id = $1 AND owner_id = $2
    RETURNING id, owner_id, product_id, improved, improved_image, collection_number, created_at
"#;

/// 선물이 판매 목록 또는 진행 중인 경매에 묶여 있는지 확인
pub const GIFT_IS_COMMITTED: &str = r#"
    SELECT EXISTS (SELECT 1 FROM market_listings WHERE gift_id = $1)
        OR EXISTS (SELECT 1 FROM auctions WHERE gift_id = $1 AND status = 'ACTIVE')
"#;

/// 상품별 컬렉션 번호 발급 잠금
pub const LOCK_COLLECTION_SEQUENCE: &str = "SELECT pg_advisory_xact_lock($1)";

/// 다음 컬렉션 번호
pub const NEXT_COLLECTION_NUMBER: &str = "SELECT COALESCE(MAX(collection_number), 0) + 1 FROM gifts WHERE product_id = $1 AND improved";

/// 선물 개선 처리
pub const IMPROVE_GIFT: &str = r#"
    UPDATE gifts SET improved = TRUE, improved_image = $2, collection_number = $3
    WHERE id = $1
    RETURNING id, owner_id, product_id, improved, improved_image, collection_number, created_at
"#;

/// 가격 범위 조회
pub const GET_PRICE_LIMITS: &str = "SELECT min_price, max_price FROM price_settings WHERE id = 1";

/// 가격 범위 변경
pub const UPDATE_PRICE_LIMITS: &str = r#"
    INSERT INTO price_settings (id, min_price, max_price) VALUES (1, $1, $2)
    ON CONFLICT (id) DO UPDATE SET min_price = EXCLUDED.min_price, max_price = EXCLUDED.max_price
"#;

/// 판매 목록 생성
pub const INSERT_LISTING: &str = r#"
    INSERT INTO market_listings (gift_id, seller_id, price)
    VALUES ($1, $2, $3)
    RETURNING id, gift_id, seller_id, price, created_at
"#;

/// 판매 목록 행 잠금 조회
pub const LOCK_LISTING: &str =
    "SELECT id, gift_id, seller_id, price, created_at FROM market_listings WHERE id = $1 FOR UPDATE";

/// 판매 목록 삭제
pub const DELETE_LISTING: &str = "DELETE FROM market_listings WHERE id = $1";

/// 경매 생성
pub const INSERT_AUCTION: &str = r#"
    INSERT INTO auctions (gift_id, seller_id, start_price, current_price, step_price, end_time, created_at)
    VALUES ($1, $2, $3, $3, $4, $5, $6)
    RETURNING id, gift_id, seller_id, start_price, current_price, current_bidder_id, step_price, end_time, status, created_at
"#;

/// 경매 행 잠금 조회
pub const LOCK_AUCTION: &str = r#"
    SELECT id, gift_id, seller_id, start_price, current_price, current_bidder_id, step_price, end_time, status, created_at
    FROM auctions WHERE id = $1 FOR UPDATE
"#;

/// 입찰 반영
pub const UPDATE_AUCTION_BID: &str = r#"
    UPDATE auctions SET current_price = $2, current_bidder_id = $3 WHERE id = $1
    RETURNING id, gift_id, seller_id, start_price, current_price, current_bidder_id, step_price, end_time, status, created_at
"#;

/// 입찰 기록 추가
pub const INSERT_BID: &str =
    "INSERT INTO auction_bids (auction_id, bidder_id, amount, created_at) VALUES ($1, $2, $3, $4)";

/// 만료된 진행 중 경매 목록
pub const GET_EXPIRED_AUCTION_IDS: &str =
    "SELECT id FROM auctions WHERE status = 'ACTIVE' AND end_time <= $1 ORDER BY end_time";

/// 정산 대상 경매 잠금 조회 (진행 중이고 만료된 경우에만)
pub const LOCK_EXPIRED_AUCTION: &str = r#"
    SELECT id, gift_id, seller_id, start_price, current_price, current_bidder_id, step_price, end_time, status, created_at
    FROM auctions WHERE id = $1 AND status = 'ACTIVE' AND end_time <= $2 FOR UPDATE
"#;

/// 경매 완료 처리
pub const COMPLETE_AUCTION: &str = r#"
    UPDATE auctions SET status = 'COMPLETED' WHERE id = $1
    RETURNING id, gift_id, seller_id, start_price, current_price, current_bidder_id, step_price, end_time, status, created_at
"#;

/// 상품 구매 통계 초기화
pub const INIT_PRODUCT_STATS: &str =
    "INSERT INTO product_stats (product_id, bought) VALUES ($1, 0) ON CONFLICT (product_id) DO NOTHING";

/// 구매 한도 내에서 구매 수 증가
pub const INCREMENT_PRODUCT_BOUGHT: &str =
    "UPDATE product_stats SET bought = bought + 1 WHERE product_id = $1 AND bought < $2 RETURNING bought";
