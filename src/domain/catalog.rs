use {
    super::error::PaymentError,
    super::item::ItemRef,
    std::{future::Future, pin::Pin},
};

/// What the platform catalog knows about a purchasable item. The price is in
/// minor currency units; `access_days` of `None` means perpetual access.
#[derive(Debug, Clone)]
pub struct CatalogItem {
    pub item: ItemRef,
    pub price: i64,
    pub access_days: Option<i32>,
}

/// Catalog lookup capability. The catalog itself is external to this core;
/// purchases snapshot price and duration policy at creation time.
pub trait Catalog: Send + Sync {
    fn lookup(
        &self,
        item: ItemRef,
    ) -> Pin<Box<dyn Future<Output = Result<CatalogItem, PaymentError>> + Send + '_>>;
}
