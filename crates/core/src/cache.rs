use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use crate::{
    client::{CatalogSource, fetch_catalog},
    error::{Result, SarpurError},
    types::Catalog,
};

/// Default working directory holding the catalog cache and the ledger
pub fn get_root_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ruvsarpur")
}

pub fn get_programs_cache_path(work_dir: &Path) -> PathBuf {
    work_dir.join("programs.json")
}

pub fn get_ledger_path(work_dir: &Path) -> PathBuf {
    work_dir.join("downloaded.log")
}

/// Read a previously saved catalog. Any failure is reported as `CacheRead`.
pub async fn read_catalog_cache(path: &Path) -> Result<Catalog> {
    let cache_read = |reason: String| SarpurError::CacheRead {
        path: path.to_path_buf(),
        reason,
    };
    let json_content = fs::read_to_string(path)
        .await
        .map_err(|e| cache_read(e.to_string()))?;
    serde_json::from_str(&json_content).map_err(|e| cache_read(e.to_string()))
}

/// Overwrite the cache file with `catalog`
pub async fn save_catalog(catalog: &Catalog, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let pretty_json = serde_json::to_string_pretty(catalog)?;
    fs::write(path, &pretty_json).await?;
    Ok(())
}

/// Load the catalog from `cache_path`, or fetch it from `source` when
/// `force_reload` is set or the cache is missing or unreadable.
///
/// A freshly fetched catalog is written back to `cache_path`. When the fetch
/// fails nothing is written and the transport error is returned.
pub async fn load_catalog<S: CatalogSource + ?Sized>(
    force_reload: bool,
    cache_path: &Path,
    source: &S,
) -> Result<Catalog> {
    if !force_reload {
        match read_catalog_cache(cache_path).await {
            Ok(catalog) => {
                debug!(path = %cache_path.display(), programs = catalog.len(), "catalog loaded from cache");
                return Ok(catalog);
            }
            Err(e) => debug!(error = %e, "catalog cache unusable, fetching"),
        }
    }

    let catalog = fetch_catalog(source).await?;
    match save_catalog(&catalog, cache_path).await {
        Ok(()) => info!(path = %cache_path.display(), "catalog cache written"),
        Err(e) => warn!(path = %cache_path.display(), error = %e, "could not write catalog cache"),
    }
    Ok(catalog)
}
