//! Post publication state machine and slug generation.
//!
//! Everything here is pure: handlers and repositories feed in the current state and
//! a clock reading and persist the returned `PostStatusChange`.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{PostStatus, PostStatusChange};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Scheduled time must be in the future")]
    ScheduleInPast,
    #[error("scheduledAt is required for scheduled posts")]
    MissingSchedule,
}

/// Transition
///
/// An explicit status change requested through the post endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Publish,
    Unpublish,
    Archive,
    Schedule(DateTime<Utc>),
}

/// validate_schedule
///
/// A schedule must lie strictly after `now`.
pub fn validate_schedule(at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), LifecycleError> {
    if at <= now {
        return Err(LifecycleError::ScheduleInPast);
    }
    Ok(())
}

/// apply
///
/// Computes the columns a transition rewrites. `published_at` is stamped on the first
/// publish only and survives every later transition; `scheduled_at` is cleared by
/// everything except `Schedule`.
pub fn apply(
    published_at: Option<DateTime<Utc>>,
    transition: Transition,
    now: DateTime<Utc>,
) -> Result<PostStatusChange, LifecycleError> {
    let change = match transition {
        Transition::Publish => PostStatusChange {
            status: PostStatus::Published,
            scheduled_at: None,
            published_at: Some(published_at.unwrap_or(now)),
        },
        Transition::Unpublish => PostStatusChange {
            status: PostStatus::Draft,
            scheduled_at: None,
            published_at,
        },
        Transition::Archive => PostStatusChange {
            status: PostStatus::Archived,
            scheduled_at: None,
            published_at,
        },
        Transition::Schedule(at) => {
            validate_schedule(at, now)?;
            PostStatusChange {
                status: PostStatus::Scheduled,
                scheduled_at: Some(at),
                published_at,
            }
        }
    };
    Ok(change)
}

/// transition_to
///
/// The transition that moves a post into `status`. Scheduling needs a time.
pub fn transition_to(
    status: PostStatus,
    scheduled_at: Option<DateTime<Utc>>,
) -> Result<Transition, LifecycleError> {
    Ok(match status {
        PostStatus::Draft => Transition::Unpublish,
        PostStatus::Published => Transition::Publish,
        PostStatus::Archived => Transition::Archive,
        PostStatus::Scheduled => Transition::Schedule(scheduled_at.ok_or(LifecycleError::MissingSchedule)?),
    })
}

/// initial_state
///
/// Resolves the status columns of a newly created post from the requested status.
pub fn initial_state(
    requested: Option<PostStatus>,
    scheduled_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<PostStatusChange, LifecycleError> {
    match requested.unwrap_or_default() {
        PostStatus::Draft => Ok(PostStatusChange {
            status: PostStatus::Draft,
            scheduled_at: None,
            published_at: None,
        }),
        status => apply(None, transition_to(status, scheduled_at)?, now),
    }
}

/// slugify
///
/// Lowercases ASCII alphanumerics and collapses every other run of characters into a
/// single `-`, trimming dashes at both ends. Falls back to `untitled` when nothing
/// survives.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// The `attempt`-th slug to try for `base`: `base`, `base-2`, `base-3`, …
pub fn slug_candidate(base: &str, attempt: u32) -> String {
    if attempt <= 1 {
        base.to_string()
    } else {
        format!("{base}-{attempt}")
    }
}
