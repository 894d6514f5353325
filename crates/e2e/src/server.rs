//! Dev server management - probing and launching the local SPFx server

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use parking_lot::Mutex;
use picanvas_common::config::ServeConfig;
use picanvas_common::{PollOutcome, Poller, WaitOutcome};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};

/// Readiness probe against a fixed local URL
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    /// The dev server uses a self-signed certificate, so verification is off
    pub fn new(url: impl Into<String>, timeout: Duration) -> E2eResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &ServeConfig) -> E2eResult<Self> {
        Self::new(config.probe_url.clone(), config.probe_timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// HTTP 200 is ready; any other status or transport error is not
    pub async fn check(&self) -> PollOutcome {
        match self.client.get(&self.url).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => PollOutcome::Ready,
            Ok(resp) => {
                debug!(url = %self.url, status = %resp.status(), "probe not ready");
                PollOutcome::NotYetReady
            }
            Err(e) => {
                // Connection refused is expected while the server starts
                if !e.is_connect() {
                    debug!(url = %self.url, "probe error: {}", e);
                }
                PollOutcome::NotYetReady
            }
        }
    }
}

/// Handle to a running serve command
#[derive(Debug)]
pub struct ServeProcess {
    child: Child,
    command_line: String,
}

impl ServeProcess {
    /// Spawn the serve command in its working directory
    pub fn start(config: &ServeConfig) -> E2eResult<Self> {
        let command_line = config.command_line();
        info!(
            "Starting `{}` in {}",
            command_line,
            config.working_dir.display()
        );

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .current_dir(&config.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::ServerStartup(format!("failed to spawn `{}`: {}", command_line, e)))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr));
        }

        Ok(Self {
            child,
            command_line,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    /// Exit status if the process has already exited
    pub fn exit_status(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!("failed to poll serve process: {}", e);
                None
            }
        }
    }

    pub fn has_exited(&mut self) -> bool {
        self.exit_status().is_some()
    }

    /// Wait for the process to exit on its own
    pub async fn wait(&mut self) -> E2eResult<ExitStatus> {
        Ok(self.child.wait().await?)
    }

    /// Ask the process to stop, killing it once `grace` has passed
    pub async fn terminate(&mut self, grace: Duration) -> E2eResult<()> {
        if self.has_exited() {
            return Ok(());
        }

        info!("Stopping serve process (pid: {:?})", self.child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    debug!("SIGTERM failed: {}", e);
                }
            }
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                debug!(?status, "serve process exited");
            }
            Err(_) => {
                warn!("serve process ignored SIGTERM, killing");
                self.child.kill().await?;
            }
        }
        Ok(())
    }
}

async fn forward_output<R>(stream: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "serve", "{}", line);
    }
}

fn unavailable(config: &ServeConfig) -> E2eError {
    E2eError::DevServerUnavailable {
        probe_url: config.probe_url.clone(),
        command: config.command_line(),
        working_dir: config.working_dir.clone(),
    }
}

/// Make sure the dev server answers its probe.
///
/// Returns the launched process when one had to be started; `None` means an
/// already-running server was found. The caller owns the process and should
/// terminate it when done.
pub async fn ensure_dev_server(config: &ServeConfig, interval: Duration) -> E2eResult<Option<ServeProcess>> {
    let probe = HttpProbe::from_config(config)?;

    if probe.check().await == PollOutcome::Ready {
        info!("Dev server already running at {}", probe.url());
        return Ok(None);
    }

    if !config.auto_start {
        return Err(unavailable(config));
    }

    let process = Mutex::new(ServeProcess::start(config)?);
    let poller = Poller::new("dev server", config.startup_timeout(), interval);
    let outcome = poller
        .wait(|| {
            let exited = process.lock().exit_status();
            let probe = &probe;
            async move {
                match exited {
                    Some(status) => PollOutcome::unrecoverable(format!("serve command exited ({})", status)),
                    None => probe.check().await,
                }
            }
        })
        .await;

    let mut process = process.into_inner();
    match outcome {
        WaitOutcome::Ready { elapsed, .. } => {
            info!("Dev server ready after {:.1}s", elapsed.as_secs_f64());
            Ok(Some(process))
        }
        WaitOutcome::TimedOut { elapsed, .. } => {
            warn!("Dev server not ready after {}s", elapsed.as_secs());
            process.terminate(config.shutdown_grace()).await?;
            Err(unavailable(config))
        }
        WaitOutcome::Unrecoverable { reason, .. } => {
            warn!("Dev server failed: {}", reason);
            Err(unavailable(config))
        }
    }
}
