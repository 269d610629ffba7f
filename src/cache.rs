use std::sync::Arc;

use tracing::debug;

use crate::metrics::Metrics;

#[derive(Debug)]
pub struct CachedCollection<T> {
    name: &'static str,
    items: Option<Vec<T>>,
    metrics: Arc<Metrics>,
}

impl<T> CachedCollection<T> {
    pub fn new(name: &'static str, metrics: Arc<Metrics>) -> Self {
        Self {
            name,
            items: None,
            metrics,
        }
    }

    pub fn get_or_load<F, E>(&mut self, fetch: F) -> Result<&[T], E>
    where
        F: FnOnce() -> Result<Vec<T>, E>,
    {
        let items = match self.items.take() {
            Some(items) => {
                self.metrics.inc_cache_hit();
                items
            }
            None => {
                self.metrics.inc_cache_miss();
                let fresh = fetch()?;
                debug!(collection = self.name, count = fresh.len(), "collection loaded");
                fresh
            }
        };
        Ok(self.items.insert(items).as_slice())
    }

    pub fn get(&self) -> Option<&[T]> {
        self.items.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.items.is_some()
    }

    pub fn replace(&mut self, items: Vec<T>) {
        self.items = Some(items);
    }

    pub fn reset(&mut self) {
        self.items = None;
    }
}
