use std::{
    collections::HashSet,
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use chrono::Local;
use tokio::{fs, process::Command};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::{Result, SarpurError},
    hls::{ManifestSource, Resolution, build_download_invocation, resolve_resolutions, select_rendition},
    ledger::Ledger,
    types::{Catalog, Episode, Program},
};

/// Runs the external tool that performs the actual HLS transfer
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Run the tool with `args`; `output` is where it is expected to write
    async fn download(&self, args: &[OsString], output: &Path) -> Result<()>;
}

pub struct FfmpegDownloader {
    program: PathBuf,
}

impl FfmpegDownloader {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegDownloader {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<_> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[async_trait]
impl MediaDownloader for FfmpegDownloader {
    async fn download(&self, args: &[OsString], output: &Path) -> Result<()> {
        // -y: the orchestrator decides beforehand whether an existing file may be replaced
        let result = Command::new(&self.program)
            .args(["-hide_banner", "-nostdin", "-y", "-loglevel", "error"])
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await;

        let out = result.map_err(|e| SarpurError::DownloadFailed {
            output: output.to_path_buf(),
            reason: format!("could not run {}: {e}", self.program.display()),
        })?;

        if !out.status.success() {
            return Err(SarpurError::DownloadFailed {
                output: output.to_path_buf(),
                reason: format!(
                    "{} exited with {}. {}",
                    self.program.display(),
                    out.status,
                    tail(&String::from_utf8_lossy(&out.stderr), 10)
                ),
            });
        }

        Ok(())
    }
}

/// Replace characters that are not allowed in file names on common filesystems
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    cleaned.trim().trim_end_matches('.').to_string()
}

/// `<program> - <episode> [<episode id>].mp4`
///
/// The episode title is left out when it is empty or repeats the program
/// title. With `original_title` the foreign title follows the program title.
pub fn episode_file_name(program: &Program, episode: &Episode, original_title: bool) -> String {
    let mut name = program.title.trim().to_string();
    if original_title {
        if let Some(foreign) = program
            .foreign_title
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty() && *f != name)
        {
            name = format!("{name} ({foreign})");
        }
    }

    let episode_title = episode.title.trim();
    if !episode_title.is_empty() && episode_title != program.title.trim() {
        name = if name.is_empty() {
            episode_title.to_string()
        } else {
            format!("{name} - {episode_title}")
        };
    }

    let name = if name.is_empty() {
        format!("[{}]", episode.id)
    } else {
        format!("{name} [{}]", episode.id)
    };
    format!("{}.mp4", sanitize_file_name(&name))
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Rendition index, highest available when unset
    pub quality: Option<usize>,
    /// Ignore the ledger and overwrite existing output files in place
    pub force: bool,
    /// Record existing output files in the ledger instead of downloading
    pub check_local: bool,
    /// Leave partially written output behind after a failure
    pub keep_partial: bool,
    /// Put the program's foreign title in file names
    pub original_title: bool,
    pub output_dir: PathBuf,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            quality: None,
            force: false,
            check_local: false,
            keep_partial: false,
            original_title: false,
            output_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EpisodeJob<'a> {
    pub program: &'a Program,
    pub episode: &'a Episode,
    pub output: PathBuf,
}

/// Episodes still to download for a set of requested programs
#[derive(Debug, Default)]
pub struct DownloadPlan<'a> {
    pub jobs: Vec<EpisodeJob<'a>>,
    /// Episode ids skipped because the ledger already has them
    pub already_recorded: Vec<String>,
    pub missing_programs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeOutcome {
    Downloaded { resolution: Resolution, output: PathBuf },
    /// The output file was already there and got recorded
    FoundLocally(PathBuf),
}

#[derive(Debug, Default)]
pub struct DownloadReport {
    pub downloaded: Vec<String>,
    pub found_locally: Vec<String>,
    pub already_recorded: Vec<String>,
    pub failed: Vec<(String, SarpurError)>,
    pub missing_programs: Vec<String>,
}

/// Progress of [`DownloadOrchestrator::run_with`]
#[derive(Debug)]
pub enum DownloadEvent<'a> {
    Planned(&'a DownloadPlan<'a>),
    Started {
        index: usize,
        total: usize,
        job: &'a EpisodeJob<'a>,
    },
    Finished {
        job: &'a EpisodeJob<'a>,
        result: &'a Result<EpisodeOutcome>,
    },
}

impl DownloadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.missing_programs.is_empty()
    }
}

/// Downloads the episodes of requested programs one at a time, skipping
/// whatever the ledger already holds and recording each success in it.
pub struct DownloadOrchestrator<'a> {
    manifests: &'a dyn ManifestSource,
    downloader: &'a dyn MediaDownloader,
    ledger: Ledger,
    options: DownloadOptions,
}

impl<'a> DownloadOrchestrator<'a> {
    pub fn new(
        manifests: &'a dyn ManifestSource,
        downloader: &'a dyn MediaDownloader,
        ledger: Ledger,
        options: DownloadOptions,
    ) -> Self {
        Self {
            manifests,
            downloader,
            ledger,
            options,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Expand `program_ids` to their episodes and drop the ones already recorded
    pub fn plan<'c, P: AsRef<str>>(&self, catalog: &'c Catalog, program_ids: &[P]) -> DownloadPlan<'c> {
        let mut plan = DownloadPlan::default();
        let mut seen = HashSet::new();

        for program_id in program_ids {
            let program_id = program_id.as_ref().trim();
            let Some(program) = catalog.get(program_id) else {
                let err = SarpurError::ProgramNotFound {
                    program_id: program_id.to_string(),
                };
                warn!(error = %err, "skipping program");
                plan.missing_programs.push(program_id.to_string());
                continue;
            };

            for episode in &program.episodes {
                if !seen.insert(episode.id.as_str()) {
                    continue;
                }
                if !self.options.force && self.ledger.contains(&episode.id) {
                    debug!(episode = %episode.id, "already recorded");
                    plan.already_recorded.push(episode.id.clone());
                    continue;
                }
                let file_name = episode_file_name(program, episode, self.options.original_title);
                plan.jobs.push(EpisodeJob {
                    program,
                    episode,
                    output: self.options.output_dir.join(file_name),
                });
            }
        }

        plan
    }

    /// Resolve, download and record a single episode.
    ///
    /// An output file that is already there is never overwritten without
    /// `force`; the episode goes to a unique name beside it instead.
    #[instrument(skip_all, fields(episode = %job.episode.id))]
    pub async fn download_episode(&mut self, job: &EpisodeJob<'_>) -> Result<EpisodeOutcome> {
        let mut output = job.output.clone();

        if !self.options.force && fs::try_exists(&output).await? {
            if self.options.check_local {
                self.ledger.record(&job.episode.id).await?;
                info!(output = %output.display(), "found locally, recorded");
                return Ok(EpisodeOutcome::FoundLocally(output));
            }
            output = unique_output_path(&output).await?;
            info!(output = %output.display(), "output name taken, using a new one");
        }

        let resolutions = resolve_resolutions(self.manifests, &job.episode.file).await?;
        let rendition = select_rendition(&resolutions, self.options.quality)?;
        let resolution = resolutions[rendition];

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }

        let args = build_download_invocation(&job.episode.file, rendition, &output);
        info!(%resolution, output = %output.display(), "downloading");

        let result = match self.downloader.download(&args, &output).await {
            Ok(()) if fs::try_exists(&output).await.unwrap_or(false) => Ok(()),
            Ok(()) => Err(SarpurError::DownloadFailed {
                output: output.clone(),
                reason: "the download finished without producing the output file".to_string(),
            }),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            if !self.options.keep_partial {
                remove_partial(&output).await;
            }
            return Err(e);
        }

        self.ledger.record(&job.episode.id).await?;
        info!(output = %output.display(), "downloaded");
        Ok(EpisodeOutcome::Downloaded { resolution, output })
    }

    /// Plan and download everything for `program_ids`. Failures are collected
    /// in the report; every planned episode is attempted once.
    pub async fn run<P: AsRef<str>>(&mut self, catalog: &Catalog, program_ids: &[P]) -> DownloadReport {
        self.run_with(catalog, program_ids, |_| {}).await
    }

    /// Like [`run`](Self::run), reporting each step to `on_event`
    pub async fn run_with<P, F>(
        &mut self,
        catalog: &Catalog,
        program_ids: &[P],
        mut on_event: F,
    ) -> DownloadReport
    where
        P: AsRef<str>,
        F: FnMut(DownloadEvent<'_>),
    {
        let plan = self.plan(catalog, program_ids);
        on_event(DownloadEvent::Planned(&plan));

        let mut report = DownloadReport::default();
        let total = plan.jobs.len();

        for (index, job) in plan.jobs.iter().enumerate() {
            on_event(DownloadEvent::Started { index, total, job });
            let result = self.download_episode(job).await;
            on_event(DownloadEvent::Finished { job, result: &result });

            match result {
                Ok(EpisodeOutcome::Downloaded { .. }) => report.downloaded.push(job.episode.id.clone()),
                Ok(EpisodeOutcome::FoundLocally(_)) => {
                    report.found_locally.push(job.episode.id.clone())
                }
                Err(e) => {
                    warn!(episode = %job.episode.id, error = %e, "episode failed, continuing");
                    report.failed.push((job.episode.id.clone(), e));
                }
            }
        }

        report.already_recorded = plan.already_recorded;
        report.missing_programs = plan.missing_programs;
        report
    }
}

/// `<stem>_<YYYY-MM-DD>.<ext>`, then the same with a random uuid appended
fn alternative_output_paths(taken: &Path, date: &str) -> [PathBuf; 2] {
    let stem = taken
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = taken
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mp4".to_string());
    let dated = format!("{stem}_{date}");

    [
        taken.with_file_name(format!("{dated}.{extension}")),
        taken.with_file_name(format!("{dated}_{}.{extension}", Uuid::new_v4())),
    ]
}

/// First free alternative to `taken`, or `OutputExists` when every candidate is in use
async fn unique_output_path(taken: &Path) -> Result<PathBuf> {
    let date = Local::now().format("%Y-%m-%d").to_string();
    for candidate in alternative_output_paths(taken, &date) {
        if !fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
    }
    Err(SarpurError::OutputExists(taken.to_path_buf()))
}

async fn remove_partial(output: &Path) {
    match fs::remove_file(output).await {
        Ok(()) => debug!(output = %output.display(), "removed partial download"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(output = %output.display(), error = %e, "could not remove partial download"),
    }
}
