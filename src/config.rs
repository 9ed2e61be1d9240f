//! Engine tuning knobs.

use std::{collections::HashSet, time::Duration};

use crate::domain::Category;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a mutation waits for a contended balance or item row.
    pub lock_timeout: Duration,
    /// Categories a user may buy from only once per item.
    pub one_time_categories: HashSet<Category>,
    /// Largest accepted purchase quantity.
    pub max_quantity: i64,
    pub max_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            one_time_categories: HashSet::from([Category::Badge]),
            max_quantity: 10_000,
            max_page_size: 100,
        }
    }
}

impl EngineConfig {
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_one_time_categories(mut self, categories: impl IntoIterator<Item = Category>) -> Self {
        self.one_time_categories = categories.into_iter().collect();
        self
    }

    pub fn with_max_quantity(mut self, max_quantity: i64) -> Self {
        self.max_quantity = max_quantity;
        self
    }

    pub fn with_max_page_size(mut self, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size.max(1);
        self
    }

    pub fn is_one_time(&self, category: Category) -> bool {
        self.one_time_categories.contains(&category)
    }
}
