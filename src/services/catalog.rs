//! Client side of the product catalog's `validate_products` operation.
//!
//! The catalog is the system of record for product existence, names and
//! prices. The order service only consumes its request/response contract:
//! a list of product ids goes out, `{id, name, price}` records come back.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::errors::{ServiceError, Upstream};

/// Authoritative product record returned by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedProduct {
    pub id: String,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

impl ValidatedProduct {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: Decimal) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
        }
    }
}

/// Sends product ids to the catalog and returns the products it knows about.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductValidator: Send + Sync {
    /// `product_ids` may contain duplicates. No retry is attempted; any
    /// transport failure surfaces as `UpstreamUnavailable`.
    async fn validate(&self, product_ids: &[String]) -> Result<Vec<ValidatedProduct>, ServiceError>;
}

/// Catalog reply indexed by product id.
///
/// Every lookup against the reply goes through [`CatalogSnapshot::lookup`],
/// which turns an absent id into `ServiceError::LookupMiss`.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    products: HashMap<String, ValidatedProduct>,
}

impl CatalogSnapshot {
    pub fn new(products: Vec<ValidatedProduct>) -> Self {
        let products = products
            .into_iter()
            .map(|product| (product.id.clone(), product))
            .collect();
        Self { products }
    }

    pub fn lookup(&self, product_id: &str) -> Result<&ValidatedProduct, ServiceError> {
        self.products.get(product_id).ok_or_else(|| {
            warn!(product_id = %product_id, "product missing from catalog reply");
            metrics::counter!("order_service.catalog.lookup_miss", 1);
            ServiceError::LookupMiss(product_id.to_string())
        })
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// HTTP binding of [`ProductValidator`]: `POST {base_url}/products/validate`.
#[derive(Clone)]
pub struct HttpProductValidator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProductValidator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("catalog client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/products/validate", self.base_url)
    }
}

#[async_trait]
impl ProductValidator for HttpProductValidator {
    #[instrument(skip(self), fields(requested = product_ids.len()))]
    async fn validate(&self, product_ids: &[String]) -> Result<Vec<ValidatedProduct>, ServiceError> {
        let response = self
            .client
            .post(self.endpoint())
            .json(product_ids)
            .send()
            .await
            .map_err(|e| ServiceError::upstream(Upstream::Catalog, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "catalog rejected validate_products");
            return Err(ServiceError::upstream(
                Upstream::Catalog,
                format!("validate_products returned {}", status),
            ));
        }

        let products: Vec<ValidatedProduct> = response
            .json()
            .await
            .map_err(|e| ServiceError::upstream(Upstream::Catalog, format!("invalid reply: {}", e)))?;

        debug!(returned = products.len(), "catalog validated products");
        Ok(products)
    }
}
