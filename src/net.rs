//! Connectivity state and the lookup workflow that depends on it.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::lookup::{FoodFactsClient, ProductResult};
use crate::model::Ingredient;
use crate::store::Store;

/// Shared online/offline flag. The embedding shell reports transitions via
/// [`OnlineStatus::set_online`]; lookup-dependent actions consult it and are
/// re-enabled the moment connectivity returns.
#[derive(Clone)]
pub struct OnlineStatus {
    tx: Arc<watch::Sender<bool>>,
}

impl OnlineStatus {
    pub fn new(initial: bool) -> Self {
        let (tx, _) = watch::channel(initial);
        OnlineStatus { tx: Arc::new(tx) }
    }

    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(target = "mealtrack", event = "connectivity_changed", online);
        }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Outcome of resolving a scanned barcode.
#[derive(Debug, Clone, PartialEq)]
pub enum BarcodeHit {
    /// An ingredient with this barcode already exists locally.
    Local(Ingredient),
    /// The remote database knows the product; the caller decides whether to
    /// persist it as an ingredient.
    Remote(ProductResult),
    /// Neither the local store nor the remote database knows the barcode.
    Unknown,
}

/// Couples the lookup client to connectivity state. Remote calls fail fast
/// with `NET/OFFLINE` while offline; local resolution still works.
pub struct LookupService {
    client: FoodFactsClient,
    online: OnlineStatus,
}

impl LookupService {
    pub fn new(client: FoodFactsClient, online: OnlineStatus) -> Self {
        LookupService { client, online }
    }

    pub fn online(&self) -> &OnlineStatus {
        &self.online
    }

    pub async fn lookup(&self, barcode: &str) -> AppResult<ProductResult> {
        if !self.online.is_online() {
            return Err(AppError::new("NET/OFFLINE", "Barcode lookup requires connectivity")
                .with_context("barcode", barcode.to_string()));
        }
        self.client.lookup(barcode).await
    }

    /// Resolve a scanned barcode: the local store wins, the remote database
    /// is only consulted on a local miss.
    pub async fn resolve(&self, store: &Store, barcode: &str) -> AppResult<BarcodeHit> {
        if let Some(ingredient) = store.ingredient_by_barcode(barcode).await? {
            return Ok(BarcodeHit::Local(ingredient));
        }
        let product = self.lookup(barcode).await?;
        if product.found {
            Ok(BarcodeHit::Remote(product))
        } else {
            Ok(BarcodeHit::Unknown)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_status_transitions_are_observable() {
        let status = OnlineStatus::new(true);
        let rx = status.subscribe();
        assert!(status.is_online());

        status.set_online(false);
        assert!(!status.is_online());
        assert!(!*rx.borrow());

        // Setting the same value twice is a no-op.
        status.set_online(false);
        assert!(!status.is_online());
    }
}
