use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Error;
use console::Term;
use dialoguer::{Confirm, Input, Select};
use indicatif::ProgressBar;

use crate::reddit::error::ScraperError;
use crate::reddit::io::{Config, Login};
use crate::reddit::runner::{RunHandle, RunRequest, Runner};
use crate::reddit::sender::RequestSender;
use crate::reddit::source::SortKey;

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A program class that handles the flow of the scraper user experience and steps of execution.
pub(crate) struct Program;

impl Program {
    /// Creates a new instance of the program.
    pub(crate) fn new() -> Self {
        Self
    }

    /// Runs the scraper program.
    pub(crate) fn run(&self) -> Result<(), Error> {
        Term::stdout().set_title("reddit image scraper");
        trace!("Starting reddit image scraper...");
        trace!("Program Name: {}", NAME);
        trace!("Program Version: {}", VERSION);

        // Check the config file and ensure that it is created.
        trace!("Checking if config file exists...");
        if !Config::config_exists() {
            trace!("Config file doesn't exist...");
            info!("Creating config file...");
            Config::create_config()?;
        }

        let login = Login::get();
        trace!("Login information loaded...");
        trace!("Login Username: {}", login.username());
        trace!("Login Password: {}", "*".repeat(login.password().len()));
        if login.is_empty() {
            info!("login.json is missing credentials.");
            info!(
                "Fill in your username, password, client id and client secret, then start the program again."
            );
            return Ok(());
        }

        let sender = RequestSender::new(login.clone())?;
        match sender.authenticate() {
            Ok(()) => {}
            Err(ScraperError::Unauthorized) => {
                error!("Reddit rejected the provided login. Check login.json and try again.");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }
        if !sender.credentials_valid()? {
            error!("The provided login does not grant API access. Check login.json and try again.");
            return Ok(());
        }
        info!(
            "Logged in as {}",
            console::style(login.username()).color256(39).italic()
        );

        let interrupted = Arc::new(AtomicBool::new(false));
        {
            let interrupted = Arc::clone(&interrupted);
            ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))?;
        }

        loop {
            let community: String = Input::new().with_prompt("Subreddit").interact_text()?;
            let community = community.trim().to_string();
            match sender.community_exists(&community) {
                Ok(true) => {}
                Ok(false) => {
                    info!("That subreddit does not exist, please try again");
                    continue;
                }
                Err(err) => {
                    error!("Could not verify /r/{}: {}", community, err);
                    continue;
                }
            }

            let count: usize = Input::new()
                .with_prompt("Number of images")
                .default(Config::get().image_count())
                .interact_text()?;
            let labels: Vec<&str> = SortKey::ALL.iter().map(|s| s.label()).collect();
            let picked = Select::new()
                .with_prompt("Sort by")
                .items(&labels)
                .default(0)
                .interact()?;
            let sort = SortKey::ALL[picked];
            let base_folder: String = Input::new()
                .with_prompt("Download folder")
                .default(Config::get().download_directory().to_string())
                .interact_text()?;

            let request = RunRequest::new(&community, sort, count, Path::new(&base_folder));
            // Drop any interrupt raised while sitting at a prompt so it
            // cannot abort the run that is about to start.
            interrupted.store(false, Ordering::SeqCst);
            let handle = Runner::new().start(request, sender.clone(), sender.clone());
            self.supervise(handle, &interrupted);

            let again = Confirm::new()
                .with_prompt("Download from another subreddit?")
                .default(true)
                .interact()?;
            if !again {
                break;
            }
        }

        info!("Exiting at user request...");
        Ok(())
    }

    /// Drains the progress feed of one run into the terminal until the
    /// worker disconnects, cancelling the run if Ctrl-C raised the
    /// interrupt flag. Bare item tokens update the spinner; full lines
    /// are printed above it.
    fn supervise(&self, handle: RunHandle, interrupted: &AtomicBool) {
        let spinner = ProgressBar::new_spinner();
        spinner.enable_steady_tick(Duration::from_millis(200));

        handle.supervise(interrupted, |line| {
            let trimmed = line.trim();
            if trimmed.parse::<usize>().is_ok() {
                spinner.set_message(format!("downloaded {}", trimmed));
            } else {
                for piece in line.lines().filter(|l| !l.trim().is_empty()) {
                    spinner.println(piece.to_string());
                }
            }
        });

        spinner.finish_and_clear();
    }
}
