//! Normalized listing queries and their cache keys.
//!
//! Every listing request is reduced to a descriptor with clamped
//! pagination, an allow-listed sort field, and a fixed-field-order cache
//! key, so logically identical requests always collapse to one cache
//! entry and any variation (including sort order alone) gets its own.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::{ItemStatus, MovementType};

pub const ITEM_LIST_NAMESPACE: &str = "items:list:";
pub const MOVEMENT_LIST_NAMESPACE: &str = "movements:list:";

pub fn item_key(id: Uuid) -> String {
    format!("items:{id}")
}

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    pub fn from_params(page: Option<i64>, page_size: Option<i64>) -> Self {
        let page = page.unwrap_or(1).clamp(1, u32::MAX as i64) as u32;
        let page_size = page_size
            .unwrap_or(DEFAULT_PAGE_SIZE as i64)
            .clamp(1, MAX_PAGE_SIZE as i64) as u32;
        Self { page, page_size }
    }

    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.page_size as i64
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, page_size: DEFAULT_PAGE_SIZE }
    }
}

/// Sortable item columns. Client strings map onto this allow-list and
/// nothing else reaches the ORDER BY clause; unknown values fall back to
/// the creation timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemSortField {
    Name,
    Sku,
    CurrentStock,
    #[default]
    CreatedAt,
}

impl ItemSortField {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("name") => Self::Name,
            Some("sku") => Self::Sku,
            Some("currentStock") => Self::CurrentStock,
            _ => Self::CreatedAt,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Sku => "sku",
            Self::CurrentStock => "current_stock",
            Self::CreatedAt => "created_at",
        }
    }

    fn as_param(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Sku => "sku",
            Self::CurrentStock => "currentStock",
            Self::CreatedAt => "createdAt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("asc") => Self::Asc,
            _ => Self::Desc,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    fn as_param(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    pub search: Option<String>,
    pub category: Option<Uuid>,
    pub supplier: Option<Uuid>,
    pub status: Option<ItemStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemListQuery {
    pub filter: ItemFilter,
    pub page: Pagination,
    pub sort_by: ItemSortField,
    pub order: SortOrder,
}

impl ItemListQuery {
    pub fn cache_key(&self) -> String {
        format!(
            "{}search={}&category={}&supplier={}&status={}&page={}&pageSize={}&sortBy={}&sortOrder={}",
            ITEM_LIST_NAMESPACE,
            self.filter.search.as_deref().unwrap_or(""),
            self.filter.category.map(|id| id.to_string()).unwrap_or_default(),
            self.filter.supplier.map(|id| id.to_string()).unwrap_or_default(),
            self.filter.status.map(|s| s.as_str()).unwrap_or(""),
            self.page.page,
            self.page.page_size,
            self.sort_by.as_param(),
            self.order.as_param(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovementListQuery {
    pub item: Option<Uuid>,
    pub movement_type: Option<MovementType>,
    pub page: Pagination,
}

impl MovementListQuery {
    pub fn cache_key(&self) -> String {
        format!(
            "{}item={}&type={}&page={}&pageSize={}",
            MOVEMENT_LIST_NAMESPACE,
            self.item.map(|id| id.to_string()).unwrap_or_default(),
            self.movement_type.map(|t| t.as_str()).unwrap_or(""),
            self.page.page,
            self.page.page_size,
        )
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PageMeta {
    pub total: i64,
    pub page: u32,
    #[serde(rename = "pageSize")]
    pub page_size: u32,
    #[serde(rename = "totalPages")]
    pub total_pages: u32,
}

/// Stable listing response shape other components depend on.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: i64, page: &Pagination) -> Self {
        let total = total.max(0);
        let total_pages =
            ((total as u64 + page.page_size as u64 - 1) / page.page_size as u64) as u32;
        Self {
            data,
            meta: PageMeta {
                total,
                page: page.page,
                page_size: page.page_size,
                total_pages,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_clamps_to_bounds() {
        let p = Pagination::from_params(Some(0), Some(0));
        assert_eq!(p, Pagination { page: 1, page_size: 1 });
        let p = Pagination::from_params(Some(-3), Some(1000));
        assert_eq!(p, Pagination { page: 1, page_size: MAX_PAGE_SIZE });
        let p = Pagination::from_params(None, None);
        assert_eq!(p, Pagination { page: 1, page_size: DEFAULT_PAGE_SIZE });
    }

    #[test]
    fn pagination_offset() {
        let p = Pagination::from_params(Some(3), Some(25));
        assert_eq!(p.offset(), 50);
        assert_eq!(p.limit(), 25);
    }

    #[test]
    fn sort_field_allow_list_falls_back() {
        assert_eq!(ItemSortField::parse(Some("name")), ItemSortField::Name);
        assert_eq!(ItemSortField::parse(Some("currentStock")), ItemSortField::CurrentStock);
        // Arbitrary and sensitive fields never reach the ORDER BY clause.
        assert_eq!(ItemSortField::parse(Some("cost_price")), ItemSortField::CreatedAt);
        assert_eq!(ItemSortField::parse(Some("id; DROP TABLE items")), ItemSortField::CreatedAt);
        assert_eq!(ItemSortField::parse(None), ItemSortField::CreatedAt);
    }

    #[test]
    fn sort_order_defaults_desc() {
        assert_eq!(SortOrder::parse(Some("asc")), SortOrder::Asc);
        assert_eq!(SortOrder::parse(Some("descending")), SortOrder::Desc);
        assert_eq!(SortOrder::parse(None), SortOrder::Desc);
    }

    #[test]
    fn cache_key_is_deterministic() {
        let a = ItemListQuery {
            filter: ItemFilter { search: Some("bolt".into()), ..Default::default() },
            ..Default::default()
        };
        let b = ItemListQuery {
            filter: ItemFilter { search: Some("bolt".into()), ..Default::default() },
            ..Default::default()
        };
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn cache_key_varies_with_sort_order() {
        let base = ItemListQuery::default();
        let asc = ItemListQuery { order: SortOrder::Asc, ..Default::default() };
        assert_ne!(base.cache_key(), asc.cache_key());
    }

    #[test]
    fn cache_key_lives_in_listing_namespace() {
        assert!(ItemListQuery::default().cache_key().starts_with(ITEM_LIST_NAMESPACE));
        assert!(MovementListQuery::default().cache_key().starts_with(MOVEMENT_LIST_NAMESPACE));
    }

    #[test]
    fn paginated_meta_rounds_pages_up() {
        let page = Pagination { page: 1, page_size: 10 };
        let resp = Paginated::new(vec![1, 2, 3], 21, &page);
        assert_eq!(resp.meta.total_pages, 3);
        let empty: Paginated<i32> = Paginated::new(vec![], 0, &page);
        assert_eq!(empty.meta.total_pages, 0);
    }
}
