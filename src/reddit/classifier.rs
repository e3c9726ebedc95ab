/// The image formats the scraper knows how to save.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ImageExt {
    Jpg,
    Png,
    Gif,
}

impl ImageExt {
    /// The file suffix for this format, dot included.
    pub(crate) fn suffix(self) -> &'static str {
        match self {
            ImageExt::Jpg => ".jpg",
            ImageExt::Png => ".png",
            ImageExt::Gif => ".gif",
        }
    }

    /// Matches the last four characters of `url` against the known suffixes.
    /// Case-sensitive and exact; URLs shorter than four characters never match.
    pub(crate) fn from_url(url: &str) -> Option<Self> {
        if url.ends_with(".jpg") {
            Some(ImageExt::Jpg)
        } else if url.ends_with(".png") {
            Some(ImageExt::Png)
        } else if url.ends_with(".gif") {
            Some(ImageExt::Gif)
        } else {
            None
        }
    }
}

/// The verdict for one post URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ClassifiedUrl {
    /// The URL points straight at an image of a known format.
    DirectImage { url: String, ext: ImageExt },
    /// An imgur page link rewritten to a direct `i.imgur.com` URL.
    /// The appended `.jpg` is a guess; pages hosting png/gif galleries will
    /// 404 at download time. Documented miss-rate, kept as-is.
    RewritableHost { url: String },
    Rejected,
}

/// Decides whether a post URL is directly usable, rewritable, or irrelevant.
///
/// Pure function of the input string. Direct image suffixes win before the
/// imgur check, so the rewrite only ever fires for bare gallery/page links.
pub(crate) fn classify(url: &str) -> ClassifiedUrl {
    if let Some(ext) = ImageExt::from_url(url) {
        return ClassifiedUrl::DirectImage {
            url: url.to_string(),
            ext,
        };
    }

    if url.split('/').any(|segment| segment == "imgur.com") {
        let mut rewritten = url
            .split('/')
            .map(|segment| {
                if segment == "imgur.com" {
                    "i.imgur.com"
                } else {
                    segment
                }
            })
            .collect::<Vec<_>>()
            .join("/");
        rewritten.push_str(".jpg");
        return ClassifiedUrl::RewritableHost { url: rewritten };
    }

    ClassifiedUrl::Rejected
}
