use std::{ffi::OsString, fmt, path::Path};

use async_trait::async_trait;
use m3u8_rs::Playlist;
use tracing::debug;

use crate::error::{Result, SarpurError};

/// Frame size of one rendition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Resolution {
    pub width: u64,
    pub height: u64,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Fetches manifest text for a playlist URL
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch_manifest(&self, url: &str) -> Result<Vec<u8>>;
}

#[async_trait]
impl ManifestSource for reqwest::Client {
    async fn fetch_manifest(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

fn manifest_error(url: &str, reason: impl Into<String>) -> SarpurError {
    SarpurError::Manifest {
        url: url.to_string(),
        reason: reason.into(),
    }
}

/// Resolutions offered by a variant manifest, lowest first.
///
/// Rejects single-rendition manifests and variants without a resolution.
/// The order is taken as-is: a manifest that doesn't list renditions in
/// ascending order is an error, since a quality index into it would point at
/// the wrong stream.
pub fn parse_resolutions(url: &str, manifest: &[u8]) -> Result<Vec<Resolution>> {
    let master = match m3u8_rs::parse_playlist_res(manifest) {
        Ok(Playlist::MasterPlaylist(master)) => master,
        Ok(Playlist::MediaPlaylist(_)) => {
            return Err(manifest_error(
                url,
                "single rendition playlist, expected a variant playlist",
            ));
        }
        Err(_) => return Err(manifest_error(url, "not an HLS playlist")),
    };

    let resolutions = master
        .variants
        .iter()
        .filter(|variant| !variant.is_i_frame)
        .map(|variant| {
            variant
                .resolution
                .as_ref()
                .map(|r| Resolution {
                    width: r.width,
                    height: r.height,
                })
                .ok_or_else(|| {
                    manifest_error(url, format!("variant {} has no resolution", variant.uri))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    if resolutions.is_empty() {
        return Err(manifest_error(url, "variant playlist lists no streams"));
    }
    if !resolutions.is_sorted() {
        let listed: Vec<_> = resolutions.iter().map(ToString::to_string).collect();
        return Err(manifest_error(
            url,
            format!("resolutions are not sorted ascending: {}", listed.join(", ")),
        ));
    }

    Ok(resolutions)
}

/// Fetch the manifest at `url` and list its resolutions
pub async fn resolve_resolutions<M: ManifestSource + ?Sized>(
    source: &M,
    url: &str,
) -> Result<Vec<Resolution>> {
    if url.trim().is_empty() {
        return Err(manifest_error(url, "episode has no manifest url"));
    }
    let manifest = source.fetch_manifest(url).await?;
    let resolutions = parse_resolutions(url, &manifest)?;
    debug!(url, renditions = resolutions.len(), "manifest resolved");
    Ok(resolutions)
}

/// Rendition index for a requested quality; the highest one when unset
pub fn select_rendition(resolutions: &[Resolution], quality: Option<usize>) -> Result<usize> {
    let available = resolutions.len();
    match quality {
        Some(index) if index < available => Ok(index),
        Some(index) => Err(SarpurError::RenditionOutOfRange { index, available }),
        None if available > 0 => Ok(available - 1),
        None => Err(SarpurError::RenditionOutOfRange {
            index: 0,
            available,
        }),
    }
}

/// Arguments for ffmpeg to copy rendition `rendition` of `url` into `output`.
///
/// Audio is mapped with the same index as video. That holds for the RÚV
/// manifests, where every rendition carries its own audio track, but not for
/// HLS in general. Subtitles are converted to SubRip.
pub fn build_download_invocation(url: &str, rendition: usize, output: &Path) -> Vec<OsString> {
    vec![
        "-i".into(),
        url.into(),
        "-map".into(),
        format!("0:v:{rendition}").into(),
        "-map".into(),
        format!("0:a:{rendition}").into(),
        "-codec".into(),
        "copy".into(),
        "-codec:s".into(),
        "srt".into(),
        output.into(),
    ]
}
