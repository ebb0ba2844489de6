//! Listing filters and pagination.

use serde::{Deserialize, Serialize};
use slipway_core::{Deployment, DeploymentState, ProviderKind};

/// Filters for listing deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeploymentFilter {
    /// Only deployments in this state.
    pub state: Option<DeploymentState>,
    /// Only deployments whose chosen provider matches.
    pub provider: Option<ProviderKind>,
}

impl DeploymentFilter {
    /// Returns `true` if `deployment` passes every filter.
    #[must_use]
    pub fn matches(&self, deployment: &Deployment) -> bool {
        if let Some(state) = self.state {
            if deployment.state != state {
                return false;
            }
        }
        if let Some(provider) = self.provider {
            if deployment.chosen_provider != Some(provider) {
                return false;
            }
        }
        true
    }
}

/// A 1-based page request.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    /// Page number, starting at 1.
    pub page: usize,
    /// Items per page.
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

impl PageRequest {
    /// Index of the first item on this page.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// One page of results plus the total match count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Total matches across all pages.
    pub total: usize,
    /// The requested page number.
    pub page: usize,
    /// The requested page size.
    pub limit: usize,
}

impl<T> Page<T> {
    /// Slice `all` (already filtered and ordered) down to one page.
    #[must_use]
    pub fn of(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len();
        let items = all
            .into_iter()
            .skip(request.offset())
            .take(request.limit)
            .collect();
        Self {
            items,
            total,
            page: request.page,
            limit: request.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_is_zero_for_first_page() {
        let request = PageRequest { page: 1, limit: 10 };
        assert_eq!(request.offset(), 0);
    }

    #[test]
    fn offset_advances_per_page() {
        let request = PageRequest { page: 3, limit: 10 };
        assert_eq!(request.offset(), 20);
    }

    #[test]
    fn page_zero_is_treated_as_first() {
        let request = PageRequest { page: 0, limit: 10 };
        assert_eq!(request.offset(), 0);
    }

    #[test]
    fn of_slices_and_counts() {
        let page = Page::of((0..25).collect(), PageRequest { page: 2, limit: 10 });
        assert_eq!(page.total, 25);
        assert_eq!(page.items, (10..20).collect::<Vec<_>>());
        assert_eq!(page.page, 2);
    }

    #[test]
    fn of_past_the_end_is_empty() {
        let page = Page::of((0..5).collect::<Vec<i32>>(), PageRequest { page: 4, limit: 10 });
        assert_eq!(page.total, 5);
        assert!(page.items.is_empty());
    }
}
