//! HTTP handlers, one module per service.
//!
//! Handlers stay thin: extract and validate input, apply the role and ownership
//! checks, call the repository, and wrap the result in its response envelope.

pub mod auth;
pub mod comments;
pub mod health;
pub mod media;
pub mod posts;
pub mod settings;
pub mod taxonomy;
pub mod users;

use uuid::Uuid;

use crate::error::AppResult;
use crate::lifecycle::{slug_candidate, slugify};
use crate::repository::RepositoryState;

/// Upper bound on numbered slug candidates before falling back to a random suffix.
const MAX_SLUG_ATTEMPTS: u32 = 50;

/// unique_post_slug
///
/// Resolves a free post slug: the requested slug (or one derived from the title),
/// then `-2`, `-3`, … . `exclude` lets a post keep its own slug on update.
pub(crate) async fn unique_post_slug(
    repo: &RepositoryState,
    requested: Option<&str>,
    title: &str,
    exclude: Option<Uuid>,
) -> AppResult<String> {
    let base = slugify(requested.unwrap_or(title));
    for attempt in 1..=MAX_SLUG_ATTEMPTS {
        let candidate = slug_candidate(&base, attempt);
        if !repo.slug_exists(&candidate, exclude).await? {
            return Ok(candidate);
        }
    }
    let suffix = Uuid::new_v4().simple().to_string();
    Ok(format!("{base}-{}", &suffix[..8]))
}
