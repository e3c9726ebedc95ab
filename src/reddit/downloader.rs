use std::fs::{create_dir_all, write};
use std::path::Path;

use crate::reddit::classifier::ImageExt;
use crate::reddit::error::ScraperError;

/// Fetches the raw bytes behind a resolved image URL.
pub(crate) trait MediaFetcher {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ScraperError>;
}

/// Persists resolved image URLs to disk, one item at a time.
pub(crate) struct Downloader<F: MediaFetcher> {
    fetcher: F,
}

impl<F: MediaFetcher> Downloader<F> {
    pub(crate) fn new(fetcher: F) -> Self {
        Downloader { fetcher }
    }

    /// Fetches `url` and writes the body to `folder/stem<ext>`, overwriting
    /// any existing file of that name.
    ///
    /// Best-effort: every failure is logged with the triggering URL and the
    /// error detail, then reported as `false` so the run continues with the
    /// next item. The destination folder is created recursively on demand.
    pub(crate) fn download(&self, url: &str, stem: &str, folder: &Path) -> bool {
        if let Err(err) = create_dir_all(folder) {
            error!(
                "Could not create download folder {}: {}",
                folder.display(),
                err
            );
            return false;
        }

        // Re-check the suffix before touching the network. A rewritten imgur
        // URL always passes since the classifier appended ".jpg".
        let Some(ext) = ImageExt::from_url(url) else {
            warn!("Skipping {}: not a supported image url", url);
            return false;
        };

        let bytes = match self.fetcher.fetch_bytes(url) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("Failed to download {}", url);
                error!("Exception: {}", err);
                return false;
            }
        };

        let path = folder.join(format!("{}{}", stem, ext.suffix()));
        match write(&path, &bytes) {
            Ok(()) => {
                trace!("Saved {}...", path.display());
                true
            }
            Err(err) => {
                error!("Failed to write {}: {}", path.display(), err);
                false
            }
        }
    }
}
