//! Inventory service client: item code to catalog entry.

use std::time::Duration;

use async_trait::async_trait;
use kassa_core::{Catalog, CatalogItem, CoreError, CoreResult};
use tonic::transport::Channel;
use tracing::warn;

use super::grpc::{self, SearchRequest, SearchResponse};

const SERVICE: &str = "inventory";

/// `inventory.InventoryService` client.
pub struct InventoryClient {
    channel: Channel,
    timeout: Duration,
}

impl InventoryClient {
    pub fn new(channel: Channel, timeout: Duration) -> Self {
        InventoryClient { channel, timeout }
    }
}

fn query_for(item_code: &str) -> String {
    serde_json::json!({ "item_code": item_code }).to_string()
}

fn parse_product(item_code: &str, raw: &str) -> CoreResult<CatalogItem> {
    if raw.trim().is_empty() || raw.trim() == "null" {
        return Err(CoreError::not_found("Product", item_code));
    }
    serde_json::from_str(raw)
        .map_err(|e| CoreError::upstream(SERVICE, format!("undecodable product document: {}", e)))
}

#[async_trait]
impl Catalog for InventoryClient {
    async fn lookup(&self, item_code: &str) -> CoreResult<CatalogItem> {
        let request = SearchRequest {
            query_string: query_for(item_code),
        };
        let response: SearchResponse =
            grpc::unary(self.channel.clone(), grpc::SEARCH_PRODUCT, request, self.timeout)
                .await
                .map_err(|status| {
                    if status.code() == tonic::Code::NotFound {
                        return CoreError::not_found("Product", item_code);
                    }
                    warn!(item_code, code = ?status.code(), "SearchProduct failed");
                    CoreError::upstream(SERVICE, status.message())
                })?;

        parse_product(item_code, &response.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kassa_core::Money;

    #[test]
    fn test_query_escapes_the_code() {
        assert_eq!(query_for(r#"SK"U"#), r#"{"item_code":"SK\"U"}"#);
    }

    #[test]
    fn test_parse_product() {
        let raw = r#"{
            "item_code": "SKU1",
            "item_name": "Maize flour 2kg",
            "item_cost": 18000,
            "till_price": 21000,
            "vat_alpha": "A",
            "vat_percent": 16.0
        }"#;
        let item = parse_product("SKU1", raw).unwrap();
        assert_eq!(item.till_price, Money::from_cents(21000));
        assert!(!item.on_offer);
    }

    #[test]
    fn test_empty_result_is_not_found() {
        let err = parse_product("SKU9", "").unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }
}
