use crate::reddit::classifier::{classify, ClassifiedUrl, ImageExt};
use crate::reddit::error::ScraperError;
use crate::reddit::source::{PostSource, SortKey};

/// A download-ready URL together with the format implied by its suffix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ResolvedImage {
    pub(crate) url: String,
    pub(crate) ext: ImageExt,
}

/// Turns a raw post stream into a bounded list of download-ready URLs.
///
/// Lists up to `fetch_limit` posts, classifies each in order, skips the
/// rejects and stops consuming the source as soon as `desired_count` entries
/// have been accepted. An unknown fraction of posts in any subreddit are
/// non-image (self-text, video, link posts), so callers over-fetch by a
/// fixed multiplier; the early exit keeps cost proportional to acceptances.
///
/// Under-fill is a normal outcome signaled only by the returned length,
/// never by an error.
pub(crate) fn resolve(
    source: &impl PostSource,
    community: &str,
    sort: SortKey,
    desired_count: usize,
    fetch_limit: usize,
) -> Result<Vec<ResolvedImage>, ScraperError> {
    let mut posts = source.list_posts(community, sort, fetch_limit)?;
    let mut images: Vec<ResolvedImage> = Vec::with_capacity(desired_count);

    while images.len() < desired_count {
        let Some(post) = posts.next() else {
            break;
        };
        match classify(&post.url) {
            ClassifiedUrl::DirectImage { url, ext } => images.push(ResolvedImage { url, ext }),
            // The rewrite appended ".jpg", so the implied format is fixed.
            ClassifiedUrl::RewritableHost { url } => images.push(ResolvedImage {
                url,
                ext: ImageExt::Jpg,
            }),
            ClassifiedUrl::Rejected => {}
        }
    }

    trace!(
        "Resolved {}/{} image urls from /r/{} within a budget of {} posts",
        images.len(),
        desired_count,
        community,
        fetch_limit
    );
    Ok(images)
}
