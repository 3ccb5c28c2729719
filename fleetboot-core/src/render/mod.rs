//! Output collaborators
//!
//! Turns a bootstrap report into the files the process supervisor and the
//! reverse proxy read, then optionally runs the supervisor export command.
//! Nothing here is written when the information it needs is absent: an
//! unresolved master produces neither an address file nor a proxy rewrite.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::coordinator::topology::{DEFAULT_FOLLOWER_PROCESS, DEFAULT_MASTER_PROCESS};
use crate::coordinator::{BootstrapReport, MasterResolution, TopologyPlan};
use crate::error::{FleetError, Result};

static UPSTREAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"http://[^\s:/;]+:(\d+)").expect("upstream pattern is valid"));

/// Configuration for output files
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Directory receiving the address and concurrency files
    pub output_dir: PathBuf,
    /// File holding the address followers connect to
    pub master_address_file: String,
    /// File holding the process concurrency declaration
    pub concurrency_file: String,
    /// Reverse-proxy config whose upstreams point at the master
    pub proxy_config: Option<PathBuf>,
    /// Process name for the master role
    pub master_process: String,
    /// Process name for the follower role
    pub follower_process: String,
    /// Shell command regenerating supervisor config after the files change
    pub export_command: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            master_address_file: ".masterIP".into(),
            concurrency_file: ".foreman".into(),
            proxy_config: None,
            master_process: DEFAULT_MASTER_PROCESS.into(),
            follower_process: DEFAULT_FOLLOWER_PROCESS.into(),
            export_command: None,
        }
    }
}

/// What `apply` wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub master_address_file: Option<PathBuf>,
    pub concurrency_file: Option<PathBuf>,
    pub proxy_upstreams_rewritten: usize,
    pub exported: bool,
}

/// Write every output the report supports
pub async fn apply(config: &RenderConfig, report: &BootstrapReport) -> Result<RenderSummary> {
    let mut summary = RenderSummary {
        master_address_file: write_master_address(config, &report.master).await?,
        concurrency_file: Some(write_concurrency(config, &report.plan).await?),
        ..Default::default()
    };

    if let (MasterResolution::Remote(master), Some(proxy)) = (&report.master, &config.proxy_config) {
        summary.proxy_upstreams_rewritten = rewrite_proxy_config(proxy, master).await?;
    }

    if let Some(command) = &config.export_command {
        run_export(command).await?;
        summary.exported = true;
    }

    Ok(summary)
}

/// Write the follower target address; skipped when unresolved
pub async fn write_master_address(
    config: &RenderConfig,
    master: &MasterResolution,
) -> Result<Option<PathBuf>> {
    let Some(target) = master.follower_target() else {
        warn!("master unresolved, not writing {}", config.master_address_file);
        return Ok(None);
    };

    let path = config.output_dir.join(&config.master_address_file);
    write_atomic(&path, target).await?;
    debug!(path = %path.display(), %target, "master address written");
    Ok(Some(path))
}

/// Write the process concurrency declaration
pub async fn write_concurrency(config: &RenderConfig, plan: &TopologyPlan) -> Result<PathBuf> {
    let path = config.output_dir.join(&config.concurrency_file);
    let line = plan.concurrency_line(&config.master_process, &config.follower_process);
    write_atomic(&path, &line).await?;
    debug!(path = %path.display(), %line, "concurrency written");
    Ok(path)
}

/// Point every `http://host:port` upstream at `master`, keeping the port
///
/// Returns the rewritten text and the number of upstreams replaced.
pub fn rewrite_upstreams(contents: &str, master: &str) -> (String, usize) {
    let count = UPSTREAM.find_iter(contents).count();
    let rewritten = UPSTREAM.replace_all(contents, |caps: &regex::Captures<'_>| {
        format!("http://{}:{}", master, &caps[1])
    });
    (rewritten.into_owned(), count)
}

/// Rewrite the proxy config at `path` in place
pub async fn rewrite_proxy_config(path: &Path, master: &str) -> Result<usize> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| render_error(path, e))?;
    let (rewritten, count) = rewrite_upstreams(&contents, master);

    if count == 0 {
        warn!(path = %path.display(), "no upstreams found in proxy config");
        return Ok(0);
    }

    write_atomic(path, &rewritten).await?;
    info!(path = %path.display(), %master, upstreams = count, "proxy upstreams rewritten");
    Ok(count)
}

/// Run the supervisor export command through the shell
pub async fn run_export(command: &str) -> Result<()> {
    info!(%command, "running supervisor export");
    let output = Command::new("sh").arg("-c").arg(command).output().await?;

    for line in String::from_utf8_lossy(&output.stdout)
        .lines()
        .chain(String::from_utf8_lossy(&output.stderr).lines())
    {
        if !line.trim().is_empty() {
            info!("export: {}", line);
        }
    }

    if !output.status.success() {
        return Err(FleetError::ExportFailed {
            status: output.status.to_string(),
        });
    }
    Ok(())
}

async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staging = path.with_file_name(format!("{}.tmp", file_name));

    tokio::fs::write(&staging, contents).await.map_err(|e| render_error(&staging, e))?;
    tokio::fs::rename(&staging, path).await.map_err(|e| render_error(path, e))?;
    Ok(())
}

fn render_error(path: &Path, e: std::io::Error) -> FleetError {
    FleetError::Render {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}
