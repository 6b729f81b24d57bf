/// 상품 카탈로그 (읽기 전용)
/// 상품 정의 관리는 별도 서비스가 담당하고, 여기서는 조회만 한다.
// region:    --- Imports
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;
// endregion: --- Imports

// region:    --- Product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: i64,
    /// 전체 구매 가능 수량 (없으면 무제한)
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub image: Option<String>,
    /// 개선 시 무작위로 선택되는 이미지 목록
    #[serde(default)]
    pub improvements: Vec<String>,
}
// endregion: --- Product

// region:    --- Catalog
pub trait Catalog: Send + Sync {
    fn product_by_id(&self, id: i64) -> Option<Product>;

    /// 알림 메시지에 쓰이는 상품 이름
    fn product_name(&self, id: i64) -> String {
        self.product_by_id(id)
            .map(|p| p.name)
            .unwrap_or_else(|| "알 수 없는 상품".to_string())
    }
}

/// JSON 파일 기반 카탈로그
pub struct JsonCatalog {
    products: HashMap<i64, Product>,
}

impl JsonCatalog {
    pub fn from_products(products: Vec<Product>) -> Self {
        Self {
            products: products.into_iter().map(|p| (p.id, p)).collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let products: Vec<Product> = serde_json::from_str(json)?;
        Ok(Self::from_products(products))
    }

    /// 카탈로그 파일 로드
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let catalog = Self::from_json(&raw)?;
        info!(
            "{:<12} --> 카탈로그 로드: {} ({}개 상품)",
            "Catalog",
            path.as_ref().display(),
            catalog.products.len()
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl Catalog for JsonCatalog {
    fn product_by_id(&self, id: i64) -> Option<Product> {
        self.products.get(&id).cloned()
    }
}
// endregion: --- Catalog

// endregion: --- Tests
