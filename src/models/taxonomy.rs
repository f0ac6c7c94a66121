use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::empty_as_none;

/// Category
///
/// A row of `categories` with the number of posts filed under it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub parent_id: Option<Uuid>,
    pub post_count: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Tag
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub post_count: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// TaxonomyKind
///
/// Selects between the two flat taxonomies, which share the same repository surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxonomyKind {
    Category,
    Tag,
}

impl TaxonomyKind {
    pub fn label(self) -> &'static str {
        match self {
            TaxonomyKind::Category => "Category",
            TaxonomyKind::Tag => "Tag",
        }
    }
}

// --- Request Payloads ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateCategoryRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(length(max = 100))]
    pub slug: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub color: Option<String>,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateCategoryRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(length(max = 100))]
    pub slug: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub color: Option<String>,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct CreateTagRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 50, message = "Name must be 1-50 characters"))]
    pub name: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(length(max = 50))]
    pub slug: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct UpdateTagRequest {
    #[validate(length(min = 1, max = 50, message = "Name must be 1-50 characters"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(length(max = 50))]
    pub slug: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

/// TaxonomyListQuery
///
/// Query parameters for `GET /api/categories` and `GET /api/tags`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomyListQuery {
    pub search: Option<String>,
    /// `name` (default), `created_at` or `post_count`.
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaxonomySort {
    #[default]
    Name,
    CreatedAt,
    PostCount,
}

impl TaxonomySort {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("created_at") | Some("createdAt") => TaxonomySort::CreatedAt,
            Some("post_count") | Some("postCount") => TaxonomySort::PostCount,
            _ => TaxonomySort::Name,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            TaxonomySort::Name => "name",
            TaxonomySort::CreatedAt => "created_at",
            TaxonomySort::PostCount => "post_count",
        }
    }
}

/// TaxonomyFilter
///
/// Repository-level listing filter shared by categories and tags.
#[derive(Debug, Clone, Default)]
pub struct TaxonomyFilter {
    pub search: Option<String>,
    pub sort_by: TaxonomySort,
    pub sort_order: super::SortOrder,
    pub limit: Option<i64>,
}

impl From<TaxonomyListQuery> for TaxonomyFilter {
    fn from(query: TaxonomyListQuery) -> Self {
        let sort_by = TaxonomySort::parse(query.sort_by.as_deref());
        // Names read naturally A→Z; counts and dates newest/largest first.
        let sort_order = match (sort_by, query.sort_order.as_deref()) {
            (TaxonomySort::Name, None) => super::SortOrder::Asc,
            (_, order) => super::SortOrder::parse(order),
        };
        Self {
            search: query.search.filter(|s| !s.trim().is_empty()),
            sort_by,
            sort_order,
            limit: query.limit.map(|l| l.clamp(1, 500)),
        }
    }
}

// --- Response Envelopes ---

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct CategoriesResponse {
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct CategoryResponse {
    pub category: Category,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct TagsResponse {
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct TagResponse {
    pub tag: Tag,
}
