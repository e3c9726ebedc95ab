use serde::Deserialize;

use crate::reddit::error::ScraperError;

/// The six listing orders reddit exposes for a subreddit.
///
/// A closed set, chosen once per run and dispatched through
/// [`SortKey::api_path`] and [`SortKey::time_filter`] rather than
/// open-ended dynamic dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SortKey {
    Hot,
    TopAllTime,
    TopThisMonth,
    TopPastYear,
    New,
    Controversial,
}

impl SortKey {
    pub(crate) const ALL: [SortKey; 6] = [
        SortKey::Hot,
        SortKey::TopAllTime,
        SortKey::TopThisMonth,
        SortKey::TopPastYear,
        SortKey::New,
        SortKey::Controversial,
    ];

    /// Human-readable label, used in file stems and progress lines.
    pub(crate) fn label(self) -> &'static str {
        match self {
            SortKey::Hot => "Hot",
            SortKey::TopAllTime => "Top all time",
            SortKey::TopThisMonth => "Top this month",
            SortKey::TopPastYear => "Top past year",
            SortKey::New => "New",
            SortKey::Controversial => "Controversial",
        }
    }

    /// The listing endpoint segment this sort maps onto.
    pub(crate) fn api_path(self) -> &'static str {
        match self {
            SortKey::Hot => "hot",
            SortKey::TopAllTime | SortKey::TopThisMonth | SortKey::TopPastYear => "top",
            SortKey::New => "new",
            SortKey::Controversial => "controversial",
        }
    }

    /// The `t=` discriminator for the "Top ..." family; the other sorts
    /// take none.
    pub(crate) fn time_filter(self) -> Option<&'static str> {
        match self {
            SortKey::TopAllTime => Some("all"),
            SortKey::TopThisMonth => Some("month"),
            SortKey::TopPastYear => Some("year"),
            _ => None,
        }
    }
}

/// One listed post. Only the linked URL matters to the pipeline; everything
/// else the platform returns is dropped at deserialization.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct RawPost {
    #[serde(default)]
    pub(crate) url: String,
}

/// The listing capability of the external session.
///
/// Each call issues a fresh request; the returned sequence is finite, not
/// restartable, and ordered however the platform's sort defines it. It is a
/// pass-through: no filtering or validation happens at this seam.
pub(crate) trait PostSource {
    fn list_posts(
        &self,
        community: &str,
        sort: SortKey,
        limit: usize,
    ) -> Result<Box<dyn Iterator<Item = RawPost> + '_>, ScraperError>;
}
