use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Local;

use crate::reddit::downloader::{Downloader, MediaFetcher};
use crate::reddit::resolver;
use crate::reddit::source::{PostSource, SortKey};

/// Raw posts requested per desired image, to absorb non-image posts.
pub(crate) const LOOKUP_LIMIT_MULTIPLIER: usize = 3;

/// Pause between items, throttling the image hosts and pacing the feed.
const INTER_ITEM_DELAY: Duration = Duration::from_millis(500);

/// Everything one run needs, owned by the worker for the run's duration.
#[derive(Clone, Debug)]
pub(crate) struct RunRequest {
    pub(crate) community: String,
    pub(crate) sort: SortKey,
    pub(crate) desired_count: usize,
    pub(crate) fetch_limit: usize,
    pub(crate) base_folder: PathBuf,
}

impl RunRequest {
    /// Builds a request, applying the fixed over-fetch multiplier so that
    /// `fetch_limit >= desired_count` always holds.
    pub(crate) fn new(
        community: &str,
        sort: SortKey,
        desired_count: usize,
        base_folder: &Path,
    ) -> Self {
        RunRequest {
            community: community.to_string(),
            sort,
            desired_count,
            fetch_limit: desired_count.saturating_mul(LOOKUP_LIMIT_MULTIPLIER),
            base_folder: base_folder.to_path_buf(),
        }
    }

    /// Downloads land in a subfolder named after the subreddit.
    fn destination(&self) -> PathBuf {
        self.base_folder.join(&self.community)
    }
}

/// Found-vs-requested arithmetic selecting the closing summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    Complete,
    Short { found: usize },
    Empty,
}

impl RunOutcome {
    pub(crate) fn from_counts(found: usize, desired: usize) -> Self {
        if found == 0 {
            RunOutcome::Empty
        } else if found < desired {
            RunOutcome::Short { found }
        } else {
            RunOutcome::Complete
        }
    }

    /// The summary line for this outcome; a full run has none beyond the
    /// final marker.
    fn summary(self, fetch_limit: usize) -> Option<String> {
        match self {
            RunOutcome::Empty => Some(format!(
                "Searched {} posts, but could not find any images.\nPerhaps try a different subreddit?\n",
                fetch_limit
            )),
            RunOutcome::Short { found } => Some(format!(
                "Searched {} posts, but could only find {} images...\n",
                fetch_limit, found
            )),
            RunOutcome::Complete => None,
        }
    }
}

/// Handle to one live background run.
///
/// Progress arrives as an ordered sequence of human-readable lines; the
/// channel disconnects when the worker exits. How the observer displays the
/// lines (the original prepended newest-first) is its own concern.
pub(crate) struct RunHandle {
    progress: flume::Receiver<String>,
    cancel: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

impl RunHandle {
    /// Requests cancellation. The worker honors it at the checkpoint between
    /// items: the in-flight item completes, remaining items are never
    /// attempted, and no summary or final marker is emitted. Any "Aborted"
    /// marker line is the supervisor's to append.
    pub(crate) fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Drains the run's progress lines into `on_line` until the worker
    /// exits, cancelling the run when `interrupted` flips. The flag is
    /// consumed, so a stale press never bleeds into a later run.
    ///
    /// An aborted run gets the `" Aborted!"` marker appended here, on the
    /// supervisor side; the worker itself has no special-cased abort output.
    /// Returns whether the run was aborted.
    pub(crate) fn supervise(
        self,
        interrupted: &AtomicBool,
        mut on_line: impl FnMut(String),
    ) -> bool {
        let mut aborted = false;
        loop {
            if interrupted.swap(false, Ordering::SeqCst) && !aborted {
                self.cancel();
                aborted = true;
            }
            match self.progress.recv_timeout(Duration::from_millis(50)) {
                Ok(line) => on_line(line),
                Err(flume::RecvTimeoutError::Timeout) => {}
                Err(flume::RecvTimeoutError::Disconnected) => break,
            }
        }
        let _ = self.worker.join();

        if aborted {
            on_line(" Aborted!\n".to_string());
        }
        aborted
    }
}

/// Starts and owns at most one background worker per run.
pub(crate) struct Runner {
    delay: Duration,
}

impl Runner {
    pub(crate) fn new() -> Self {
        Runner {
            delay: INTER_ITEM_DELAY,
        }
    }

    #[cfg(test)]
    fn with_delay(delay: Duration) -> Self {
        Runner { delay }
    }

    /// Spawns the worker thread for one run and hands back its handle.
    /// Serializing runs (one live worker at a time) is the caller's job.
    pub(crate) fn start<S, F>(&self, request: RunRequest, source: S, fetcher: F) -> RunHandle
    where
        S: PostSource + Send + 'static,
        F: MediaFetcher + Send + 'static,
    {
        let (tx, rx) = flume::unbounded();
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let delay = self.delay;

        let worker = thread::spawn(move || run(request, source, fetcher, tx, flag, delay));

        RunHandle {
            progress: rx,
            cancel,
            worker,
        }
    }
}

/// The run itself: Resolving, then Downloading item by item, then the
/// summary. Lives entirely on the worker thread; the send results are
/// ignored because a departed observer must not stop the run.
fn run<S: PostSource, F: MediaFetcher>(
    request: RunRequest,
    source: S,
    fetcher: F,
    tx: flume::Sender<String>,
    cancel: Arc<AtomicBool>,
    delay: Duration,
) {
    let _ = tx.send("Downloading ...\n ------------------------------------------ \n".to_string());

    let images = match resolver::resolve(
        &source,
        &request.community,
        request.sort,
        request.desired_count,
        request.fetch_limit,
    ) {
        Ok(images) => images,
        Err(err) => {
            error!("Failed to list posts from /r/{}: {}", request.community, err);
            let _ = tx.send(format!(
                "Could not fetch posts from /r/{}: {}\n",
                request.community, err
            ));
            let _ = tx.send("Finished! \n".to_string());
            return;
        }
    };

    let date = Local::now().date_naive().to_string();
    let folder = request.destination();
    let _ = tx.send(format!(
        "\n{} images from /r/{}, sorted by {}\n",
        images.len(),
        request.community,
        request.sort.label()
    ));

    let downloader = Downloader::new(fetcher);
    for (i, image) in images.iter().enumerate() {
        // Cancellation checkpoint between items.
        if cancel.load(Ordering::SeqCst) {
            trace!("Run against /r/{} aborted after {} items", request.community, i);
            return;
        }

        let stem = format!("{} {} {}", date, request.sort.label(), i + 1);
        downloader.download(&image.url, &stem, &folder);
        let _ = tx.send(format!("{} ", i + 1));
        thread::sleep(delay);
    }

    if cancel.load(Ordering::SeqCst) {
        return;
    }

    let outcome = RunOutcome::from_counts(images.len(), request.desired_count);
    if let Some(summary) = outcome.summary(request.fetch_limit) {
        let _ = tx.send(summary);
    }
    let _ = tx.send("Finished! \n".to_string());
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tempfile::tempdir;

    use super::*;
    use crate::reddit::error::ScraperError;
    use crate::reddit::source::RawPost;

    struct VecSource {
        urls: Vec<String>,
    }

    impl VecSource {
        fn new(urls: &[&str]) -> Self {
            VecSource {
                urls: urls.iter().map(|u| u.to_string()).collect(),
            }
        }
    }

    impl PostSource for VecSource {
        fn list_posts(
            &self,
            _community: &str,
            _sort: SortKey,
            limit: usize,
        ) -> Result<Box<dyn Iterator<Item = RawPost> + '_>, ScraperError> {
            Ok(Box::new(
                self.urls
                    .iter()
                    .take(limit)
                    .map(|url| RawPost { url: url.clone() }),
            ))
        }
    }

    struct BytesFetcher;

    impl MediaFetcher for BytesFetcher {
        fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>, ScraperError> {
            Ok(b"imagebytes".to_vec())
        }
    }

    /// Blocks each fetch until the test grants permission, so cancellation
    /// can be driven deterministically.
    struct GatedFetcher {
        started: flume::Sender<usize>,
        resume: flume::Receiver<()>,
        count: AtomicUsize,
    }

    impl MediaFetcher for GatedFetcher {
        fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>, ScraperError> {
            let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
            self.started.send(n).unwrap();
            self.resume.recv().unwrap();
            Ok(b"img".to_vec())
        }
    }

    fn drain(handle: RunHandle) -> Vec<String> {
        let mut lines = Vec::new();
        handle.supervise(&AtomicBool::new(false), |line| lines.push(line));
        lines
    }

    fn today() -> String {
        Local::now().date_naive().to_string()
    }

    #[test]
    fn test_run_request_applies_the_overfetch_multiplier() {
        let request = RunRequest::new("pics", SortKey::Hot, 10, Path::new("downloads"));
        assert_eq!(request.fetch_limit, 30);
        assert_eq!(request.destination(), Path::new("downloads").join("pics"));
    }

    #[test]
    fn test_overfetch_multiplier_saturates_on_absurd_counts() {
        let request = RunRequest::new("pics", SortKey::Hot, usize::MAX, Path::new("downloads"));
        assert_eq!(request.fetch_limit, usize::MAX);
    }

    #[test]
    fn test_outcome_selection() {
        assert_eq!(RunOutcome::from_counts(5, 5), RunOutcome::Complete);
        assert_eq!(RunOutcome::from_counts(4, 10), RunOutcome::Short { found: 4 });
        assert_eq!(RunOutcome::from_counts(0, 10), RunOutcome::Empty);
    }

    #[test]
    fn test_full_run_downloads_in_post_order() {
        // Scenario: ten hot posts, seven of them image links, five wanted.
        let source = VecSource::new(&[
            "https://i.redd.it/p1.jpg",
            "https://v.redd.it/clip.mp4",
            "https://i.redd.it/p2.png",
            "https://i.redd.it/p3.jpg",
            "https://www.reddit.com/r/pics/comments/x/",
            "https://i.redd.it/p4.png",
            "https://i.redd.it/p5.jpg",
            "https://i.redd.it/p6.jpg",
            "https://example.com/page.html",
            "https://i.redd.it/p7.jpg",
        ]);
        let dir = tempdir().unwrap();
        let mut request = RunRequest::new("pics", SortKey::Hot, 5, dir.path());
        request.fetch_limit = 15;

        let handle = Runner::with_delay(Duration::ZERO).start(request, source, BytesFetcher);
        let lines = drain(handle);

        assert!(lines[0].starts_with("Downloading ..."));
        assert!(lines[1].contains("5 images from /r/pics, sorted by Hot"));
        assert_eq!(lines.last().unwrap(), "Finished! \n");
        assert!(!lines.iter().any(|l| l.contains("Searched")));

        let folder = dir.path().join("pics");
        let date = today();
        for (i, ext) in [(1, "jpg"), (2, "png"), (3, "jpg"), (4, "png"), (5, "jpg")] {
            assert!(
                folder.join(format!("{} Hot {}.{}", date, i, ext)).is_file(),
                "missing item {}",
                i
            );
        }
        assert_eq!(std::fs::read_dir(&folder).unwrap().count(), 5);
    }

    #[test]
    fn test_empty_run_emits_the_try_elsewhere_summary() {
        let source = VecSource::new(&[
            "https://example.com/video.mp4",
            "https://www.reddit.com/r/askreddit/comments/x/",
        ]);
        let dir = tempdir().unwrap();
        let request = RunRequest::new("askreddit", SortKey::Hot, 10, dir.path());

        let handle = Runner::with_delay(Duration::ZERO).start(request, source, BytesFetcher);
        let lines = drain(handle);

        let summary = lines
            .iter()
            .find(|l| l.contains("Searched"))
            .expect("summary line missing");
        assert!(summary.contains("Searched 30 posts, but could not find any images."));
        assert!(summary.contains("Perhaps try a different subreddit?"));
        assert_eq!(lines.last().unwrap(), "Finished! \n");
        assert!(!dir.path().join("askreddit").exists());
    }

    #[test]
    fn test_short_run_reports_found_versus_limit() {
        let source = VecSource::new(&[
            "https://i.redd.it/p1.jpg",
            "https://example.com/video.mp4",
            "https://i.redd.it/p2.jpg",
            "https://i.redd.it/p3.gif",
            "https://example.com/page.html",
            "https://i.redd.it/p4.jpg",
        ]);
        let dir = tempdir().unwrap();
        let request = RunRequest::new("pics", SortKey::New, 10, dir.path());

        let handle = Runner::with_delay(Duration::ZERO).start(request, source, BytesFetcher);
        let lines = drain(handle);

        assert!(lines
            .iter()
            .any(|l| l.contains("Searched 30 posts, but could only find 4 images...")));
        assert_eq!(lines.last().unwrap(), "Finished! \n");
        assert_eq!(
            std::fs::read_dir(dir.path().join("pics")).unwrap().count(),
            4
        );
    }

    #[test]
    fn test_listing_failure_does_not_kill_the_worker() {
        struct FailingSource;
        impl PostSource for FailingSource {
            fn list_posts(
                &self,
                _community: &str,
                _sort: SortKey,
                _limit: usize,
            ) -> Result<Box<dyn Iterator<Item = RawPost> + '_>, ScraperError> {
                Err(ScraperError::UnexpectedPayload("bad json".to_string()))
            }
        }

        let dir = tempdir().unwrap();
        let request = RunRequest::new("pics", SortKey::Hot, 5, dir.path());
        let handle = Runner::with_delay(Duration::ZERO).start(request, FailingSource, BytesFetcher);
        let lines = drain(handle);

        assert!(lines.iter().any(|l| l.contains("Could not fetch posts from /r/pics")));
        assert_eq!(lines.last().unwrap(), "Finished! \n");
    }

    #[test]
    fn test_supervise_without_interrupt_runs_to_completion() {
        let source = VecSource::new(&["https://i.redd.it/p1.jpg"]);
        let dir = tempdir().unwrap();
        let request = RunRequest::new("pics", SortKey::Hot, 1, dir.path());

        let handle = Runner::with_delay(Duration::ZERO).start(request, source, BytesFetcher);
        let interrupted = AtomicBool::new(false);
        let mut lines: Vec<String> = Vec::new();
        let aborted = handle.supervise(&interrupted, |line| lines.push(line));

        assert!(!aborted);
        assert_eq!(lines.last().unwrap(), "Finished! \n");
        assert!(!lines.iter().any(|l| l.contains("Aborted")));
    }

    #[test]
    fn test_interrupt_during_supervision_aborts_and_appends_marker() {
        let source = VecSource::new(&[
            "https://i.redd.it/p1.jpg",
            "https://i.redd.it/p2.jpg",
            "https://i.redd.it/p3.jpg",
        ]);
        let dir = tempdir().unwrap();
        let mut request = RunRequest::new("pics", SortKey::Hot, 3, dir.path());
        request.fetch_limit = 9;

        let (started_tx, started_rx) = flume::unbounded();
        let (resume_tx, resume_rx) = flume::unbounded();
        let fetcher = GatedFetcher {
            started: started_tx,
            resume: resume_rx,
            count: AtomicUsize::new(0),
        };

        let handle = Runner::with_delay(Duration::ZERO).start(request, source, fetcher);
        // Wait until item 1 is in flight before raising the interrupt, so
        // the abort point is pinned to the checkpoint between items 1 and 2.
        assert_eq!(started_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);

        let interrupted = AtomicBool::new(true);
        let mut lines: Vec<String> = Vec::new();
        let mut granted = false;
        let aborted = handle.supervise(&interrupted, |line| {
            lines.push(line);
            // The first delivered line arrives after the supervisor has
            // already cancelled, so releasing item 1 here guarantees the
            // worker sees the flag before item 2.
            if !granted {
                granted = true;
                resume_tx.send(()).unwrap();
            }
        });

        assert!(aborted);
        assert!(!interrupted.load(Ordering::SeqCst));
        assert_eq!(lines.last().unwrap(), " Aborted!\n");
        assert!(!lines.iter().any(|l| l.contains("Finished!")));
        assert!(!lines.iter().any(|l| l.contains("Searched")));
        assert!(started_rx.try_recv().is_err());

        let folder = dir.path().join("pics");
        let date = today();
        assert!(folder.join(format!("{} Hot 1.jpg", date)).is_file());
        assert!(!folder.join(format!("{} Hot 2.jpg", date)).exists());
    }

    #[test]
    fn test_cancellation_skips_remaining_items_and_the_summary() {
        let source = VecSource::new(&[
            "https://i.redd.it/p1.jpg",
            "https://i.redd.it/p2.jpg",
            "https://i.redd.it/p3.jpg",
            "https://i.redd.it/p4.jpg",
            "https://i.redd.it/p5.jpg",
        ]);
        let dir = tempdir().unwrap();
        let mut request = RunRequest::new("pics", SortKey::Hot, 5, dir.path());
        request.fetch_limit = 15;

        let (started_tx, started_rx) = flume::unbounded();
        let (resume_tx, resume_rx) = flume::unbounded();
        let fetcher = GatedFetcher {
            started: started_tx,
            resume: resume_rx,
            count: AtomicUsize::new(0),
        };

        let handle = Runner::with_delay(Duration::ZERO).start(request, source, fetcher);
        let timeout = Duration::from_secs(5);
        for i in 1..=3 {
            assert_eq!(started_rx.recv_timeout(timeout).unwrap(), i);
            if i == 3 {
                // Set the flag before letting item 3 finish, so the
                // checkpoint before item 4 is guaranteed to see it.
                handle.cancel();
            }
            resume_tx.send(()).unwrap();
        }

        // Items 4 and 5 are never attempted.
        assert!(started_rx.recv_timeout(Duration::from_millis(500)).is_err());

        let lines = drain(handle);
        assert!(lines.iter().any(|l| l.trim() == "3"));
        assert!(!lines.iter().any(|l| l.trim() == "4"));
        assert!(!lines.iter().any(|l| l.contains("Finished!")));
        assert!(!lines.iter().any(|l| l.contains("Searched")));

        let folder = dir.path().join("pics");
        let date = today();
        assert!(folder.join(format!("{} Hot 3.jpg", date)).is_file());
        assert!(!folder.join(format!("{} Hot 4.jpg", date)).exists());
    }
}
