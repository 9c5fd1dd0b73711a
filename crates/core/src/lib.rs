//! Ruvsarpur Core Library
//!
//! Syncs the RÚV television catalog into a local cache, searches it, and
//! archives episodes by handing their HLS manifests to ffmpeg. A ledger of
//! finished episode ids keeps re-runs from downloading anything twice.

pub mod cache;
pub mod client;
pub mod download;
pub mod error;
pub mod format;
pub mod hls;
pub mod ledger;
pub mod search;
pub mod types;

// Re-export commonly used items at crate root
pub use cache::{get_ledger_path, get_programs_cache_path, get_root_dir, load_catalog};
pub use client::{CatalogSource, ClientConfig, RuvClient, fetch_catalog, merge_programs};
pub use download::{
    DownloadEvent, DownloadOptions, DownloadOrchestrator, DownloadPlan, DownloadReport, EpisodeJob,
    EpisodeOutcome, FfmpegDownloader, MediaDownloader,
};
pub use error::{Result, SarpurError};
pub use format::{format_program_details, format_program_table};
pub use hls::{
    ManifestSource, Resolution, build_download_invocation, resolve_resolutions, select_rendition,
};
pub use ledger::Ledger;
pub use search::{ProgramMatches, search, search_all};
pub use types::{Catalog, Episode, Program};
