/// Router Module Index
///
/// Splits the API into three routers by access level. `create_router` merges them
/// under `/api`, wrapping the authenticated router in the authentication layer and
/// the admin router in the editor gate.

/// Routes open to anonymous callers.
pub mod public;

/// Routes protected by the `AuthUser` extractor middleware.
pub mod authenticated;

/// Routes restricted to editors and admins.
pub mod admin;
