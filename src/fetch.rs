// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Artifact download, verification, and installation.
//!
//! Some components are not available through a native package manager, or
//! only in stale versions. Those are fetched directly from their release
//! pages. Every download is retried with an increasing backoff, and then
//! verified before anything else gets to look at it.
//!
//! # Verification
//!
//! Checks run in order, and the first failing check discards the download:
//!
//! 1. File exists and is not empty.
//! 2. If a sha256 digest is known, the recomputed digest must match it.
//! 3. Otherwise the file must start with the magic bytes of the expected
//!    artifact type, and its size must fall into a plausible range. This is
//!    a guard against truncated downloads or HTML error pages, not a
//!    security control.
//!
//! # Cleanup
//!
//! Downloads are placed into a fresh temporary directory owned by the
//! returned [`Artifact`]. Dropping the artifact, or failing to produce one,
//! removes that directory along with everything extracted into it.

use crate::config::NetworkSettings;

use flate2::read::GzDecoder;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};
use tempfile::TempDir;
use tokio::{io::AsyncWriteExt, runtime::Runtime};
use tracing::{debug, info, instrument, warn};

const MIB: u64 = 1024 * 1024;

/// Artifact types recognizable by their leading magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Gzip,
    Zip,
    Elf,
    MachO,
}

impl ArtifactKind {
    /// Check if header starts with magic bytes of this artifact type.
    pub fn matches(&self, header: &[u8]) -> bool {
        match self {
            Self::Gzip => header.starts_with(&[0x1f, 0x8b]),
            Self::Zip => header.starts_with(b"PK\x03\x04"),
            Self::Elf => header.starts_with(b"\x7fELF"),
            Self::MachO => [
                [0xfe, 0xed, 0xfa, 0xce],
                [0xfe, 0xed, 0xfa, 0xcf],
                [0xce, 0xfa, 0xed, 0xfe],
                [0xcf, 0xfa, 0xed, 0xfe],
                [0xca, 0xfe, 0xba, 0xbe],
            ]
            .iter()
            .any(|magic| header.starts_with(magic)),
        }
    }

    /// Plausible size range for this artifact type.
    pub fn default_bounds(&self) -> SizeBounds {
        match self {
            Self::Elf | Self::MachO => SizeBounds::new(MIB, 50 * MIB),
            Self::Gzip | Self::Zip => SizeBounds::new(100 * 1024, 200 * MIB),
        }
    }
}

impl Display for ArtifactKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Gzip => "gzip",
            Self::Zip => "zip",
            Self::Elf => "elf",
            Self::MachO => "mach-o",
        };
        fmt.write_str(name)
    }
}

/// Inclusive size range in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBounds {
    pub min: u64,
    pub max: u64,
}

impl SizeBounds {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, size: u64) -> bool {
        (self.min..=self.max).contains(&size)
    }
}

/// Description of one artifact download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub file_name: String,
    pub checksum: Option<String>,
    pub kind: Option<ArtifactKind>,
    pub bounds: Option<SizeBounds>,
}

impl FetchRequest {
    /// Construct new request, naming the download after the last URL segment.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let file_name = url
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("download")
            .to_string();

        Self {
            url,
            file_name,
            checksum: None,
            kind: None,
            bounds: None,
        }
    }

    /// Expect given sha256 hex digest.
    pub fn checksum(mut self, checksum: Option<impl Into<String>>) -> Self {
        self.checksum = checksum.map(Into::into);
        self
    }

    /// Expect given artifact type when no checksum is known.
    pub fn kind(mut self, kind: ArtifactKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Override plausible size range of artifact type.
    pub fn bounds(mut self, bounds: SizeBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }
}

/// Verified download.
///
/// Owns the temporary directory the download lives in. Dropping it removes
/// the download and anything unpacked next to it.
#[derive(Debug)]
pub struct Artifact {
    dir: TempDir,
    path: PathBuf,
}

impl Artifact {
    /// Wrap a file that already sits inside a temporary directory.
    pub fn new(dir: TempDir, path: impl Into<PathBuf>) -> Self {
        Self {
            dir,
            path: path.into(),
        }
    }

    /// Path to downloaded file.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Unpack archive next to the download.
    ///
    /// Returns directory holding the unpacked content.
    ///
    /// # Errors
    ///
    /// - Return [`FetchError::UnsupportedArchive`] for unknown archive types.
    /// - Return [`FetchError::Extract`] or [`FetchError::Zip`] if unpacking
    ///   fails.
    pub fn unpack(&self) -> Result<PathBuf> {
        let dest = self.dir.path().join("unpacked");
        let name = self.path.to_string_lossy();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            extract_tar_gz(&self.path, &dest)?;
        } else if name.ends_with(".zip") {
            extract_zip(&self.path, &dest)?;
        } else {
            return Err(FetchError::UnsupportedArchive(self.path.clone()));
        }

        Ok(dest)
    }
}

/// Layer of indirection for network access.
pub trait Fetch: Send + Sync {
    /// Download artifact and verify it.
    fn fetch_and_verify(&self, request: &FetchRequest) -> Result<Artifact>;

    /// Download small text document, e.g., release metadata or checksums.
    fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Fetcher over HTTP(S).
///
/// Owns a single threaded runtime. Downloads happen one at a time.
#[derive(Debug)]
pub struct HttpFetcher {
    runtime: Runtime,
    client: Client,
    attempts: u32,
    backoff: Duration,
    temp_root: Option<PathBuf>,
    progress: bool,
}

impl HttpFetcher {
    /// Construct new fetcher from network settings.
    ///
    /// # Errors
    ///
    /// - Return [`FetchError::Runtime`] if async runtime cannot be built.
    /// - Return [`FetchError::Transport`] if HTTP client cannot be built.
    pub fn new(settings: &NetworkSettings) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(FetchError::Runtime)?;
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout())
            .timeout(settings.timeout())
            .user_agent(format!("nvstrap/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            runtime,
            client,
            attempts: settings.attempts.max(1),
            backoff: settings.backoff(),
            temp_root: None,
            progress: true,
        })
    }

    /// Place temporary download directories under given root.
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// Toggle progress bars.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn temp_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("nvstrap-");
        let dir = match &self.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };

        dir.map_err(|err| FetchError::Io {
            source: err,
            path: self.temp_root.clone().unwrap_or_else(std::env::temp_dir),
        })
    }

    fn progress_bar(&self, url: &str) -> Result<ProgressBar> {
        if !self.progress {
            return Ok(ProgressBar::hidden());
        }

        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}] {bytes}/{total_bytes}",
        )?
        .progress_chars("-Cco.");
        let bar = ProgressBar::new(0).with_style(style);
        bar.set_message(url.rsplit('/').next().unwrap_or(url).to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        Ok(bar)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        self.retry(url, || self.download_once(url, dest)).await
    }

    async fn download_once(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bar = self.progress_bar(url)?;
        bar.set_length(response.content_length().unwrap_or(0));

        let to_io_error = |err: std::io::Error| FetchError::Io {
            source: err,
            path: dest.to_path_buf(),
        };

        // INVARIANT: Each attempt starts from an empty file.
        let mut file = tokio::fs::File::create(dest).await.map_err(to_io_error)?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(to_io_error)?;
            bar.inc(chunk.len() as u64);
        }
        file.flush().await.map_err(to_io_error)?;
        bar.finish_and_clear();

        Ok(())
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        self.retry(url, || async move {
            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            Ok(response.text().await?)
        })
        .await
    }

    async fn retry<T, F, Fut>(&self, url: &str, mut attempt_once: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match attempt_once().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.attempts => {
                    let delay = self.backoff * attempt;
                    warn!(
                        "download of {url} failed ({attempt}/{}), retrying in {delay:?}: {err}",
                        self.attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    return Err(FetchError::Exhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        source: Box::new(err),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Fetch for HttpFetcher {
    #[instrument(skip(self, request), fields(url = %request.url), level = "debug")]
    fn fetch_and_verify(&self, request: &FetchRequest) -> Result<Artifact> {
        let dir = self.temp_dir()?;
        let path = dir.path().join(&request.file_name);

        info!("download {}", request.url);
        self.runtime.block_on(self.download(&request.url, &path))?;
        verify(&path, request)?;

        Ok(Artifact::new(dir, path))
    }

    fn fetch_text(&self, url: &str) -> Result<String> {
        debug!("fetch {url}");
        self.runtime.block_on(self.get_text(url))
    }
}

/// Verify downloaded file against request expectations.
///
/// # Errors
///
/// - Return [`FetchError::Empty`] if file is missing or empty.
/// - Return [`FetchError::ChecksumMismatch`] if digest does not match.
/// - Return [`FetchError::TypeMismatch`] if magic bytes do not match.
/// - Return [`FetchError::SizeOutOfBounds`] if size is implausible.
pub fn verify(path: &Path, request: &FetchRequest) -> Result<()> {
    let size = fs::metadata(path).map(|meta| meta.len()).unwrap_or(0);
    if size == 0 {
        return Err(FetchError::Empty(path.to_path_buf()));
    }

    if let Some(expected) = &request.checksum {
        let actual = sha256_file(path)?;
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(FetchError::ChecksumMismatch {
                expected: expected.trim().to_string(),
                actual,
            });
        }

        debug!("checksum of {} verified", path.display());
        return Ok(());
    }

    let Some(kind) = request.kind else {
        warn!("no integrity check available for {}", path.display());
        return Ok(());
    };

    let mut header = [0u8; 8];
    let read = File::open(path)
        .and_then(|mut file| file.read(&mut header))
        .map_err(|err| FetchError::Io {
            source: err,
            path: path.to_path_buf(),
        })?;
    if !kind.matches(&header[..read]) {
        return Err(FetchError::TypeMismatch {
            expected: kind,
            path: path.to_path_buf(),
        });
    }

    let bounds = request.bounds.unwrap_or_else(|| kind.default_bounds());
    if !bounds.contains(size) {
        return Err(FetchError::SizeOutOfBounds {
            size,
            min: bounds.min,
            max: bounds.max,
        });
    }

    Ok(())
}

/// Compute lowercase sha256 hex digest of file.
///
/// # Errors
///
/// - Return [`FetchError::Io`] if file cannot be read.
pub fn sha256_file(path: &Path) -> Result<String> {
    let to_io_error = |err: std::io::Error| FetchError::Io {
        source: err,
        path: path.to_path_buf(),
    };

    let mut file = File::open(path).map_err(to_io_error)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf).map_err(to_io_error)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Find digest for file in a `sha256sum` style listing.
pub fn checksum_from_listing(listing: &str, file_name: &str) -> Option<String> {
    listing.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let digest = fields.next()?;
        let name = fields.next()?.trim_start_matches('*');
        (name == file_name).then(|| digest.to_ascii_lowercase())
    })
}

/// Lookup latest release tag of a GitHub repository.
///
/// # Errors
///
/// - Return [`FetchError::Metadata`] if response is not valid JSON.
/// - Return [`FetchError::MissingTag`] if response carries no tag name.
pub fn latest_release_tag(fetcher: &dyn Fetch, repo: &str) -> Result<String> {
    let url = format!("https://api.github.com/repos/{repo}/releases/latest");
    let body = fetcher.fetch_text(&url)?;
    let release: serde_json::Value = serde_json::from_str(&body).map_err(FetchError::Metadata)?;

    release
        .get("tag_name")
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| FetchError::MissingTag(repo.to_string()))
}

/// Unpack gzipped tarball into destination directory.
///
/// # Errors
///
/// - Return [`FetchError::Extract`] if archive cannot be unpacked.
pub fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    let to_extract_error = |err: std::io::Error| FetchError::Extract {
        source: err,
        path: archive.to_path_buf(),
    };

    let file = File::open(archive).map_err(to_extract_error)?;
    fs::create_dir_all(dest).map_err(to_extract_error)?;
    tar::Archive::new(GzDecoder::new(file))
        .unpack(dest)
        .map_err(to_extract_error)?;

    Ok(())
}

/// Unpack zip archive into destination directory.
///
/// Entries escaping the destination are skipped.
///
/// # Errors
///
/// - Return [`FetchError::Zip`] if archive cannot be read.
/// - Return [`FetchError::Extract`] if entries cannot be written.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let to_extract_error = |err: std::io::Error| FetchError::Extract {
        source: err,
        path: archive.to_path_buf(),
    };

    let file = File::open(archive).map_err(to_extract_error)?;
    let mut zip = zip::ZipArchive::new(file)?;
    for idx in 0..zip.len() {
        let mut entry = zip.by_index(idx)?;
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let outpath = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath).map_err(to_extract_error)?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent).map_err(to_extract_error)?;
        }
        let mut outfile = File::create(&outpath).map_err(to_extract_error)?;
        std::io::copy(&mut entry, &mut outfile).map_err(to_extract_error)?;
    }

    Ok(())
}

/// Copy executable into system binary directory, or user binary directory.
///
/// The copy lands under a temporary name first and is then renamed into
/// place, so a half-copied binary never shows up on the search path. If the
/// system directory cannot be written to and a user directory is given, the
/// binary is installed there instead.
///
/// # Errors
///
/// - Return [`FetchError::Install`] if neither location can be written.
#[instrument(skip(src, system_bin, user_bin), level = "debug")]
pub fn install_binary(
    src: &Path,
    name: &str,
    system_bin: &Path,
    user_bin: Option<&Path>,
) -> Result<PathBuf> {
    match copy_executable(src, &system_bin.join(name)) {
        Ok(path) => Ok(path),
        Err(err) => {
            let Some(user_bin) = user_bin else {
                return Err(FetchError::Install {
                    source: err,
                    path: system_bin.join(name),
                });
            };

            warn!(
                "cannot install {name} into {}: {err}, falling back to {}",
                system_bin.display(),
                user_bin.display()
            );
            copy_executable(src, &user_bin.join(name)).map_err(|err| FetchError::Install {
                source: err,
                path: user_bin.join(name),
            })
        }
    }
}

fn copy_executable(src: &Path, dest: &Path) -> std::io::Result<PathBuf> {
    let dir = dest
        .parent()
        .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "destination has no parent"))?;
    mkdirp::mkdirp(dir)?;

    let staged = dir.join(format!(
        ".{}.nvstrap-tmp",
        dest.file_name().unwrap_or_default().to_string_lossy()
    ));
    fs::copy(src, &staged)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&staged, fs::Permissions::from_mode(0o755))?;
    }

    if let Err(err) = fs::rename(&staged, dest) {
        let _ = fs::remove_file(&staged);
        return Err(err);
    }

    info!("installed {}", dest.display());
    Ok(dest.to_path_buf())
}

/// Make sure shell profile exports directory on `PATH`.
///
/// Appends the export line only if the profile does not mention it yet.
/// Returns whether the profile was changed.
///
/// # Errors
///
/// - Return [`FetchError::Io`] if profile cannot be read or written.
pub fn ensure_on_path(profile: &Path, dir: &Path) -> Result<bool> {
    let to_io_error = |err: std::io::Error| FetchError::Io {
        source: err,
        path: profile.to_path_buf(),
    };

    let line = format!("export PATH=\"{}:$PATH\"", dir.display());
    let content = match fs::read_to_string(profile) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
        Err(err) => return Err(to_io_error(err)),
    };

    if content.contains(&line) {
        debug!("{} already exports {}", profile.display(), dir.display());
        return Ok(false);
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(profile)
        .map_err(to_io_error)?;
    let prefix = if content.is_empty() || content.ends_with('\n') { "" } else { "\n" };
    write!(file, "{prefix}\n# added by nvstrap\n{line}\n").map_err(to_io_error)?;
    info!("added {} to PATH in {}", dir.display(), profile.display());

    Ok(true)
}

/// Artifact fetching error types.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Async runtime cannot be built.
    #[error("failed to start download runtime")]
    Runtime(#[source] std::io::Error),

    /// HTTP transport failed, e.g., timeout, refused connection.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// Server answered with non-success status.
    #[error("GET {url} answered with status {status}")]
    Status { url: String, status: u16 },

    /// Retries exhausted.
    #[error("giving up on {url} after {attempts} attempts")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },

    /// Local file operation failed.
    #[error("failed to access {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Download is missing or empty.
    #[error("download at {:?} is empty", .0.display())]
    Empty(PathBuf),

    /// Digest does not match.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Magic bytes do not match.
    #[error("download at {:?} is not a {expected} file", path.display())]
    TypeMismatch { expected: ArtifactKind, path: PathBuf },

    /// Size is outside of plausible range.
    #[error("download size {size} outside of plausible range {min}..={max}")]
    SizeOutOfBounds { size: u64, min: u64, max: u64 },

    /// Archive type not understood.
    #[error("unsupported archive {:?}", .0.display())]
    UnsupportedArchive(PathBuf),

    /// Archive cannot be unpacked.
    #[error("failed to extract {:?}", path.display())]
    Extract {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Zip archive cannot be read.
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    /// Binary cannot be installed anywhere.
    #[error("failed to install binary to {:?}", path.display())]
    Install {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Release metadata is not valid JSON.
    #[error("invalid release metadata")]
    Metadata(#[source] serde_json::Error),

    /// Release metadata lacks a tag.
    #[error("no release tag found for {0}")]
    MissingTag(String),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),
}

impl FetchError {
    /// Whether retrying the same request might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => {
                let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY);
                status.is_server_error()
                    || status == StatusCode::REQUEST_TIMEOUT
                    || status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = FetchError> = std::result::Result<T, E>;
