//! Resilient fetch layer: short-lived subprocesses instead of a long-lived
//! HTTP client.
//!
//! Long-lived in-process HTTP clients retain buffers after large downloads,
//! and this process re-downloads a multi-megabyte feed on every refresh
//! interval for its whole lifetime. Delegating the transfer to a short-lived
//! `curl` or `wget` child returns that memory to the OS when the child exits.
//! When neither tool is installed, a minimal in-process fallback constructs a
//! fresh blocking `reqwest` client per call, which is discarded with the call.
//!
//! Two retrieval modes:
//! - buffered: the child writes the payload to stdout and we collect it
//! - disk-backed: the child writes to a private temp file that is read back
//!   and deleted on every exit path, including spawn failure

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("{tool} failed fetching url (exit code {code:?})")]
    ProcessFailed {
        tool: &'static str,
        code: Option<i32>,
    },
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No fetch strategy available on this host")]
    NoStrategyAvailable,
    #[error("Requested fetch strategy '{0}' is not available on this host")]
    StrategyUnavailable(String),
    #[error("Unknown fetch strategy '{0}' (expected curl, wget or http)")]
    UnknownStrategy(String),
}

/// One concrete mechanism for retrieving a URL's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Curl,
    Wget,
    /// In-process fallback: blocking reqwest, one client per call.
    Http,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Curl => "curl",
            Strategy::Wget => "wget",
            Strategy::Http => "http",
        }
    }

    fn from_name(name: &str) -> Result<Self, FetchError> {
        match name {
            "curl" => Ok(Strategy::Curl),
            "wget" => Ok(Strategy::Wget),
            "http" => Ok(Strategy::Http),
            other => Err(FetchError::UnknownStrategy(other.to_string())),
        }
    }

    /// Argument template for buffered mode. `{url}` is substituted per request.
    fn buffered_template(&self) -> &'static [&'static str] {
        match self {
            Strategy::Curl => &["-sSfL", "--", "{url}"],
            Strategy::Wget => &["-qO-", "{url}"],
            Strategy::Http => &[],
        }
    }

    /// Argument template for disk-backed mode. `{url}` and `{file}` are
    /// substituted per request.
    fn disk_template(&self) -> &'static [&'static str] {
        match self {
            Strategy::Curl => &["-sSfL", "-o", "{file}", "--", "{url}"],
            Strategy::Wget => &["-qO", "{file}", "{url}"],
            Strategy::Http => &[],
        }
    }
}

/// Probe the host for usable fetch tools, in priority order.
///
/// Result is memoized for the process lifetime; tools installed or removed
/// after startup are not noticed.
pub fn available_strategies() -> &'static [Strategy] {
    static AVAILABLE: OnceLock<Vec<Strategy>> = OnceLock::new();
    AVAILABLE.get_or_init(|| {
        let mut found = Vec::new();
        for strategy in [Strategy::Curl, Strategy::Wget] {
            if Command::new(strategy.name())
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok()
            {
                found.push(strategy);
            }
        }
        // The in-process fallback needs nothing from the host
        found.push(Strategy::Http);
        tracing::debug!(?found, "Probed fetch strategies");
        found
    })
}

/// Pick a strategy.
///
/// With no preference, the first available strategy in priority order wins.
/// A named preference that is unknown or not installed is an explicit error,
/// never a silent substitute: callers that depend on a specific mechanism
/// must be told when it is missing.
pub fn resolve(preferred: Option<&str>) -> Result<Strategy, FetchError> {
    let available = available_strategies();
    match preferred {
        Some(name) => {
            let wanted = Strategy::from_name(name)?;
            if available.contains(&wanted) {
                Ok(wanted)
            } else {
                Err(FetchError::StrategyUnavailable(name.to_string()))
            }
        }
        None => available
            .first()
            .copied()
            .ok_or(FetchError::NoStrategyAvailable),
    }
}

/// Counter folded into temp file names so concurrent fetches of the same URL
/// never collide on disk.
static FETCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Removes the temp file when dropped, on success and failure paths alike.
struct TempFileGuard {
    path: PathBuf,
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove fetch temp file");
            }
        }
    }
}

fn temp_path_for(url: &str) -> PathBuf {
    let digest = blake3::hash(url.as_bytes()).to_hex();
    let index = FETCH_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("namedex-{}-{}", &digest.as_str()[..16], index))
}

fn substitute(template: &[&str], url: &str, file: Option<&Path>) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            let arg = arg.replace("{url}", url);
            match file {
                Some(f) => arg.replace("{file}", &f.to_string_lossy()),
                None => arg,
            }
        })
        .collect()
}

/// Run a child, collecting stdout as the payload. Nonzero exit is an error
/// carrying the exit code, never silently-empty content.
fn run_buffered(tool: &'static str, args: &[String]) -> Result<Vec<u8>, FetchError> {
    let output = Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| {
            tracing::warn!(tool, error = %e, "Failed to spawn fetch process");
            FetchError::ProcessFailed { tool, code: None }
        })?;

    if !output.status.success() {
        return Err(FetchError::ProcessFailed {
            tool,
            code: output.status.code(),
        });
    }
    Ok(output.stdout)
}

/// Run a child that writes to `file`, then read the payload back. The guard
/// deletes the file unconditionally, whether the child succeeded, exited
/// nonzero, or never spawned.
fn run_disk(tool: &'static str, args: &[String], file: PathBuf) -> Result<Vec<u8>, FetchError> {
    let guard = TempFileGuard { path: file };

    let status = Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| {
            tracing::warn!(tool, error = %e, "Failed to spawn fetch process");
            FetchError::ProcessFailed { tool, code: None }
        })?;

    if !status.success() {
        return Err(FetchError::ProcessFailed {
            tool,
            code: status.code(),
        });
    }
    let bytes = std::fs::read(&guard.path)?;
    Ok(bytes)
}

/// Fetch the body with a fresh blocking client, dropped with this call.
fn run_in_process(url: &str) -> Result<Vec<u8>, FetchError> {
    let response = reqwest::blocking::get(url)?.error_for_status()?;
    Ok(response.bytes()?.to_vec())
}

/// Uniform fetch operation over the resolved strategy.
///
/// Construction resolves the strategy eagerly so a missing preferred tool is
/// caught at startup, not on the first refresh cycle hours later.
pub struct Fetcher {
    strategy: Strategy,
}

impl Fetcher {
    pub fn new(preferred: Option<&str>) -> Result<Self, FetchError> {
        let strategy = resolve(preferred)?;
        tracing::info!(strategy = strategy.name(), "Fetch strategy selected");
        Ok(Self { strategy })
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Fetch `url`, buffering the payload in memory.
    pub fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        tracing::debug!(url, strategy = self.strategy.name(), "Fetching (buffered)");
        match self.strategy {
            Strategy::Http => run_in_process(url),
            tool => {
                let args = substitute(tool.buffered_template(), url, None);
                run_buffered(tool.name(), &args)
            }
        }
    }

    /// Fetch `url` through a private temp file.
    ///
    /// For large payloads this keeps the transfer out of the child's pipe
    /// buffers; the file is named from a hash of the URL plus a monotonic
    /// counter and deleted before this returns, on every path. The in-process
    /// strategy has no child to redirect and buffers directly.
    pub fn fetch_via_disk(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        tracing::debug!(url, strategy = self.strategy.name(), "Fetching (disk)");
        match self.strategy {
            Strategy::Http => run_in_process(url),
            tool => {
                let file = temp_path_for(url);
                let args = substitute(tool.disk_template(), url, Some(&file));
                run_disk(tool.name(), &args, file)
            }
        }
    }
}
