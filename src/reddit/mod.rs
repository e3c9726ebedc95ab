pub(crate) mod classifier;
pub(crate) mod downloader;
pub(crate) mod error;
pub(crate) mod io;
pub(crate) mod resolver;
pub(crate) mod runner;
pub(crate) mod sender;
pub(crate) mod source;
