use std::path::PathBuf;

use clap::{ArgGroup, Parser};

/// Download every photo and video of a profile, skipping what is already on disk.
#[derive(Debug, Parser)]
#[command(name = "vsco_downloader", version, about)]
#[command(group(ArgGroup::new("target").required(true).args(["username", "list", "site_id"])))]
pub(crate) struct Args {
    /// Profile to download
    pub(crate) username: Option<String>,

    /// Text file containing a list of usernames for batch scraping (one per line)
    #[arg(short = 'l', long = "list")]
    pub(crate) list: Option<PathBuf>,

    /// Number of concurrent workers to download media
    #[arg(short = 'w', long = "workers")]
    pub(crate) workers: Option<usize>,

    /// Only save profile pictures
    #[arg(short = 'p', long = "profile-picture")]
    pub(crate) profile_picture: bool,

    /// Destination root; each profile gets its own directory below it
    #[arg(short = 'o', long = "output")]
    pub(crate) output: Option<PathBuf>,

    /// Print the username currently owning a site id
    #[arg(long = "site-id")]
    pub(crate) site_id: Option<u64>,

    /// Config file
    #[arg(short = 'c', long = "config", default_value = vsco_downloader::config::CONFIG_FILE)]
    pub(crate) config: PathBuf,
}
