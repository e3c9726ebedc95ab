use std::sync::{Arc, RwLock};

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::reddit::downloader::MediaFetcher;
use crate::reddit::error::ScraperError;
use crate::reddit::io::Login;
use crate::reddit::source::{PostSource, RawPost, SortKey};

/// Token grant endpoint for script-type apps (password grant).
const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Base URL for authenticated API calls.
const OAUTH_BASE: &str = "https://oauth.reddit.com";

/// The control community probed to decide whether credentials are usable.
const CONTROL_COMMUNITY: &str = "news";

const USER_AGENT: &str = concat!("rust:reddit_scraper:", env!("CARGO_PKG_VERSION"));

/// Reddit serves at most this many posts per listing request, so deeper
/// limits have to page through the listing with its `after` cursor.
const MAX_PAGE_SIZE: usize = 100;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    children: Vec<ListingChild>,
    after: Option<String>,
}

#[derive(Deserialize)]
struct ListingChild {
    data: RawPost,
}

#[derive(Deserialize)]
struct SearchNames {
    names: Vec<String>,
}

/// The authenticated reddit session. Handles the token grant, subreddit
/// listings, the existence/credential probes, and raw image fetches.
///
/// Clones share one HTTP client and one token slot, so the session is safe
/// to reuse across sequential runs.
#[derive(Clone)]
pub(crate) struct RequestSender {
    client: Client,
    login: Login,
    token: Arc<RwLock<Option<String>>>,
}

impl RequestSender {
    pub(crate) fn new(login: Login) -> Result<Self, ScraperError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(RequestSender {
            client,
            login,
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Performs the password grant and stores the bearer token.
    ///
    /// A grant response without a token means reddit refused the
    /// credentials, surfaced as [`ScraperError::Unauthorized`].
    pub(crate) fn authenticate(&self) -> Result<(), ScraperError> {
        trace!("Requesting access token for {}...", self.login.username());
        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(self.login.client_id(), Some(self.login.client_secret()))
            .form(&[
                ("grant_type", "password"),
                ("username", self.login.username()),
                ("password", self.login.password()),
            ])
            .send()?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ScraperError::Unauthorized);
        }
        let token = token_from_response(&response.text()?)?;

        let mut slot = self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(token);
        trace!("Access token stored");
        Ok(())
    }

    /// Tests whether the stored credentials actually work, by reading one
    /// post of the control community. Only credential-class failures flip
    /// this to `false`; transport errors propagate.
    pub(crate) fn credentials_valid(&self) -> Result<bool, ScraperError> {
        match self.list_posts(CONTROL_COMMUNITY, SortKey::Hot, 1) {
            Ok(_) => Ok(true),
            Err(ScraperError::Unauthorized) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Tests whether a subreddit with exactly this name exists.
    pub(crate) fn community_exists(&self, name: &str) -> Result<bool, ScraperError> {
        let response = self
            .client
            .get(format!("{OAUTH_BASE}/api/search_reddit_names"))
            .query(&[("query", name), ("exact", "true")])
            .bearer_auth(self.bearer_token())
            .send()?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ScraperError::Unauthorized),
            _ => {
                let body = response.error_for_status()?.text()?;
                let found: SearchNames = serde_json::from_str(&body)
                    .map_err(|e| ScraperError::UnexpectedPayload(e.to_string()))?;
                Ok(!found.names.is_empty())
            }
        }
    }

    fn bearer_token(&self) -> String {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .unwrap_or_default()
    }

    fn check_listing_status(
        &self,
        response: Response,
        community: &str,
    ) -> Result<Response, ScraperError> {
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ScraperError::Unauthorized),
            StatusCode::NOT_FOUND => Err(ScraperError::CommunityNotFound(community.to_string())),
            _ => Ok(response.error_for_status()?),
        }
    }
}

impl PostSource for RequestSender {
    fn list_posts(
        &self,
        community: &str,
        sort: SortKey,
        limit: usize,
    ) -> Result<Box<dyn Iterator<Item = RawPost> + '_>, ScraperError> {
        trace!(
            "Listing up to {} posts of /r/{} sorted by {}...",
            limit,
            community,
            sort.label()
        );
        let posts = paginate(limit, |page_size, after| {
            let mut request = self
                .client
                .get(format!("{OAUTH_BASE}/r/{}/{}", community, sort.api_path()))
                .query(&[("limit", page_size.to_string())])
                .query(&[("raw_json", "1")])
                .bearer_auth(self.bearer_token());
            if let Some(filter) = sort.time_filter() {
                request = request.query(&[("t", filter)]);
            }
            if let Some(after) = after {
                request = request.query(&[("after", after)]);
            }

            let response = self.check_listing_status(request.send()?, community)?;
            page_from_listing(&response.text()?)
        })?;
        Ok(Box::new(posts.into_iter()))
    }
}

/// Collects up to `limit` posts by requesting capped pages and threading the
/// listing's `after` cursor through, stopping early once the listing runs
/// dry (an empty page or a missing cursor).
fn paginate<P>(limit: usize, mut fetch_page: P) -> Result<Vec<RawPost>, ScraperError>
where
    P: FnMut(usize, Option<&str>) -> Result<(Vec<RawPost>, Option<String>), ScraperError>,
{
    let mut posts: Vec<RawPost> = Vec::new();
    let mut after: Option<String> = None;

    while posts.len() < limit {
        let page_size = (limit - posts.len()).min(MAX_PAGE_SIZE);
        let (mut page, cursor) = fetch_page(page_size, after.as_deref())?;
        if page.is_empty() {
            break;
        }
        posts.append(&mut page);
        match cursor {
            Some(cursor) => after = Some(cursor),
            None => break,
        }
    }

    posts.truncate(limit);
    Ok(posts)
}

impl MediaFetcher for RequestSender {
    /// One unauthenticated GET against the image host; the body is returned
    /// verbatim. No retries, no custom headers beyond the user agent.
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ScraperError> {
        let response = self.client.get(url).send()?.error_for_status()?;
        Ok(response.bytes()?.to_vec())
    }
}

fn token_from_response(body: &str) -> Result<String, ScraperError> {
    let parsed: TokenResponse = serde_json::from_str(body)
        .map_err(|e| ScraperError::UnexpectedPayload(e.to_string()))?;
    parsed.access_token.ok_or(ScraperError::Unauthorized)
}

fn page_from_listing(body: &str) -> Result<(Vec<RawPost>, Option<String>), ScraperError> {
    let listing: Listing =
        serde_json::from_str(body).map_err(|e| ScraperError::UnexpectedPayload(e.to_string()))?;
    let after = listing.data.after;
    let posts = listing
        .data
        .children
        .into_iter()
        .map(|child| child.data)
        .collect();
    Ok((posts, after))
}
