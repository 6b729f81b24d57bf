/// 사용자 선물 조회 (판매/경매 상태 포함)
pub const GET_USER_GIFTS: &str = r#"
    SELECT g.id, g.owner_id, g.product_id, g.improved, g.improved_image, g.collection_number,
           l.id AS listing_id, l.price AS listing_price, a.id AS auction_id
    FROM gifts g
    LEFT JOIN market_listings l ON l.gift_id = g.id
    LEFT JOIN auctions a ON a.gift_id = g.id AND a.status = 'ACTIVE'
    WHERE g.owner_id = $1
    ORDER BY g.id
"#;

/// 판매 목록 조회
pub const GET_MARKET_LISTINGS: &str = r#"
    SELECT l.id, l.gift_id, l.seller_id, u.username AS seller_name, l.price,
           g.product_id, g.improved, g.collection_number, l.created_at
    FROM market_listings l
    JOIN gifts g ON g.id = l.gift_id
    JOIN users u ON u.id = l.seller_id
    ORDER BY l.created_at DESC, l.id DESC
    LIMIT $1 OFFSET $2
"#;

/// 진행 중인 경매 조회 (종료 임박 순)
pub const GET_ACTIVE_AUCTIONS: &str = r#"
    SELECT a.id, a.gift_id, a.seller_id, a.start_price, a.current_price, a.current_bidder_id,
           a.step_price, a.end_time, a.status, a.created_at, g.product_id
    FROM auctions a
    JOIN gifts g ON g.id = a.gift_id
    WHERE a.status = 'ACTIVE' AND a.end_time > $1
    ORDER BY a.end_time ASC
    LIMIT $2 OFFSET $3
"#;

/// 입찰 이력 조회
pub const GET_BID_HISTORY: &str = r#"
    SELECT id, auction_id, bidder_id, amount, created_at
    FROM auction_bids
    WHERE auction_id = $1
    ORDER BY amount DESC, id DESC
"#;

/// 경매 존재 여부
pub const AUCTION_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM auctions WHERE id = $1)";

/// 상품별 구매 수량
pub const GET_PRODUCT_BOUGHT: &str =
    "SELECT COALESCE((SELECT bought FROM product_stats WHERE product_id = $1), 0)";
