use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tasklens_core::{
    ClusterApiClient, ClusterApiConfig, Error, ProgressReport, Settings, TaskApi,
    TaskStatusSnapshot, Upid, fetch_task_log, init_logging, load_settings, reconstruct_progress,
    to_toml,
};

#[derive(Parser)]
#[command(name = "tasklens")]
#[command(about = "Task progress console for virtualization clusters", long_about = None)]
struct Cli {
    #[arg(long)]
    json: bool,

    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Cluster id from config.toml; defaults to the first one.
    #[arg(long)]
    cluster: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    Status {
        upid: String,
    },
    Watch {
        upid: String,
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    Get,
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> tasklens_core::Result<()> {
    let config_dir = cli.config_dir.clone().unwrap_or_else(default_config_dir);
    let settings = load_settings(&config_dir)?;

    match cli.cmd {
        Command::Status { ref upid } => {
            let client = client_for(&settings, cli.cluster.as_deref(), upid)?;
            let (_, report) = report_once(&client, upid).await?;
            print_report(&report, cli.json);
            Ok(())
        }
        Command::Watch {
            ref upid,
            interval_secs,
        } => {
            let client = client_for(&settings, cli.cluster.as_deref(), upid)?;
            let interval =
                Duration::from_secs(interval_secs.unwrap_or(settings.poll.interval_secs).max(1));

            loop {
                let (status, report) = report_once(&client, upid).await?;
                print_report(&report, cli.json);
                if status.is_stopped() {
                    return Ok(());
                }
                tokio::time::sleep(interval).await;
            }
        }
        Command::Config { cmd: ConfigCmd::Get } => {
            print!("{}", to_toml(&settings)?);
            Ok(())
        }
    }
}

fn default_config_dir() -> PathBuf {
    if let Ok(v) = std::env::var("TASKLENS_CONFIG_DIR") {
        return PathBuf::from(v);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config").join("tasklens")
}

fn client_for(
    settings: &Settings,
    cluster: Option<&str>,
    upid: &str,
) -> tasklens_core::Result<ClusterApiClient> {
    let endpoint = match cluster {
        Some(id) => settings.clusters.iter().find(|c| c.id == id),
        None => settings.clusters.first(),
    }
    .ok_or_else(|| Error::InvalidConfig {
        message: match cluster {
            Some(id) => format!("no cluster with id {id:?} in config"),
            None => "no clusters configured".to_string(),
        },
    })?;

    // The request path is routed to the node that owns the task.
    let upid: Upid = upid.parse()?;

    Ok(ClusterApiClient::new(ClusterApiConfig {
        base_url: endpoint.base_url.clone(),
        node: upid.node,
        token_id: endpoint.token_id.clone(),
        token_secret: endpoint.token_secret.clone(),
    }))
}

async fn report_once(
    client: &ClusterApiClient,
    upid: &str,
) -> tasklens_core::Result<(TaskStatusSnapshot, ProgressReport)> {
    let status = client.fetch_status(upid).await?;

    // A failed log fetch degrades to an empty log: the report falls
    // back to its starting state instead of erroring the whole poll.
    let lines = match fetch_task_log(client, upid).await {
        Ok(lines) => lines,
        Err(err) => {
            tracing::warn!(
                event = "tasklog.fetch_failed",
                upid = %upid,
                error = %err,
                "tasklog.fetch_failed"
            );
            Vec::new()
        }
    };

    let report = reconstruct_progress(&status, &lines);
    Ok((status, report))
}

fn print_report(report: &ProgressReport, json: bool) {
    if json {
        match serde_json::to_string(report) {
            Ok(text) => println!("{text}"),
            Err(err) => eprintln!("error: {err}"),
        }
        return;
    }

    let mut line = format!("[{:>5.1}%] {}", report.percent, report.message);
    if !report.speed.is_empty() {
        line.push_str(&format!(" @ {}", report.speed));
    }
    if !report.eta.is_empty() {
        line.push_str(&format!(" (eta {})", report.eta));
    }
    println!("{line}");
}
