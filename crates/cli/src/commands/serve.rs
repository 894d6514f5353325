//! Local SPFx dev server

use std::path::PathBuf;

use clap::Args;
use picanvas_common::config::SERVE_COMMAND_ENV;
use picanvas_common::{HarnessConfig, PollOutcome};
use picanvas_e2e::{ensure_dev_server, HttpProbe};

use crate::output::{print_error, print_info, print_success, print_warning};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Project directory to run the serve command in
    #[arg(long, value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// Command line that starts the dev server (default: npm run serve)
    #[arg(long, value_name = "CMD", env = SERVE_COMMAND_ENV)]
    pub serve_command: Option<String>,

    /// Only report whether the dev server is reachable
    #[arg(long)]
    pub check: bool,
}

pub async fn execute(args: ServeArgs, config: &HarnessConfig) -> anyhow::Result<()> {
    let mut serve = config.serve.clone();
    if let Some(dir) = args.working_dir {
        serve.working_dir = dir;
    }
    if let Some(line) = &args.serve_command {
        serve.set_command_line(line)?;
    }

    if args.check {
        let probe = HttpProbe::from_config(&serve)?;
        if probe.check().await == PollOutcome::Ready {
            print_success(&format!("Dev server is running at {}", probe.url()));
            return Ok(());
        }
        print_error(&format!("Dev server is not responding at {}", probe.url()));
        std::process::exit(1);
    }

    serve.auto_start = true;
    let Some(mut process) = ensure_dev_server(&serve, config.workbench.poll_interval()).await? else {
        print_info(&format!("Dev server already running at {}", serve.probe_url));
        return Ok(());
    };

    print_success(&format!(
        "Dev server ready at {} (`{}`). Press Ctrl+C to stop.",
        serve.probe_url,
        process.command_line()
    ));

    let exited = tokio::select! {
        status = process.wait() => Some(status?),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            None
        }
    };

    match exited {
        Some(status) => print_warning(&format!("Dev server exited ({})", status)),
        None => {
            process.terminate(serve.shutdown_grace()).await?;
            print_info("Dev server stopped");
        }
    }
    Ok(())
}
