//! HTTP implementation of the catalog capability. The catalog service is the
//! rest of the platform; this core only asks it for price and duration.

use {
    crate::domain::{
        catalog::{Catalog, CatalogItem},
        error::PaymentError,
        item::ItemRef,
    },
    serde::Deserialize,
    std::{future::Future, pin::Pin},
};

pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CatalogItemResponse {
    price: i64,
    access_days: Option<i32>,
}

impl HttpCatalog {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn lookup_inner(&self, item: ItemRef) -> Result<CatalogItem, PaymentError> {
        let resp = self
            .client
            .get(format!(
                "{}/items/{}/{}",
                self.base_url,
                item.kind.as_str(),
                item.item_id
            ))
            .send()
            .await
            .map_err(|e| PaymentError::GatewayUnreachable(format!("catalog: {e}")))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PaymentError::NotFound(format!("catalog item {item}")));
        }
        if !resp.status().is_success() {
            return Err(PaymentError::GatewayUnreachable(format!(
                "catalog returned {}",
                resp.status()
            )));
        }

        let body: CatalogItemResponse = resp
            .json()
            .await
            .map_err(|e| PaymentError::GatewayUnreachable(format!("catalog body: {e}")))?;

        if body.price < 0 {
            return Err(PaymentError::Validation(format!(
                "catalog returned negative price for {item}"
            )));
        }

        Ok(CatalogItem {
            item,
            price: body.price,
            access_days: body.access_days,
        })
    }
}

impl Catalog for HttpCatalog {
    fn lookup(
        &self,
        item: ItemRef,
    ) -> Pin<Box<dyn Future<Output = Result<CatalogItem, PaymentError>> + Send + '_>> {
        Box::pin(self.lookup_inner(item))
    }
}
