use thiserror::Error;

/// Errors surfaced by the reddit session layer.
///
/// The credential and community failure classes stay distinguishable so the
/// program can turn them into their respective pre-run checks instead of
/// aborting a run that never started.
#[derive(Debug, Error)]
pub(crate) enum ScraperError {
    /// Reddit rejected the provided credentials, either at the token grant
    /// or on an authenticated request.
    #[error("reddit rejected the provided credentials")]
    Unauthorized,
    /// The subreddit does not exist (not-found class response while listing).
    #[error("subreddit \"{0}\" does not exist")]
    CommunityNotFound(String),
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response body did not look like the listing payload we expected.
    #[error("unexpected payload from reddit: {0}")]
    UnexpectedPayload(String),
}
