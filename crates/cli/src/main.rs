// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `oj`: a command-line client for the control socket `ojd` exposes.
//! Every subcommand sends one [`oj_wire::ControlRequest`] and renders the
//! response; no business logic lives here.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod color;
mod exit_error;
mod output;

use clap::{Parser, Subcommand};
use client::DaemonClient;
use exit_error::ExitError;
use oj_engine::config::DaemonConfig;
use oj_wire::{ControlRequest, ControlResponse};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "oj", version, about = "Odd Jobs control-plane client", styles = color::styles())]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Command {
    /// Show daemon status and fleet summary
    Status,
    #[command(subcommand)]
    Runtime(RuntimeCommand),
    #[command(subcommand)]
    Run(RunCommand),
    /// List recent health incidents
    Incidents {
        /// Restrict to one task runtime id
        #[arg(long)]
        runtime: Option<String>,
    },
}

#[derive(Subcommand)]
enum RuntimeCommand {
    /// List task runtimes
    List,
    /// Show one task runtime
    Get { id: String },
    /// Restart a task runtime's container, preserving its workspace
    Restart { id: String },
    /// Recycle a task runtime's container and workspace
    Recycle { id: String },
    /// Mark a task runtime draining (or undo draining with --undo)
    Drain {
        id: String,
        #[arg(long)]
        undo: bool,
    },
}

#[derive(Subcommand)]
enum RunCommand {
    /// List runs, optionally filtered by task or state
    List {
        #[arg(long)]
        task: Option<String>,
        /// queued | pending_approval | running | succeeded | failed | obsolete
        #[arg(long)]
        state: Option<String>,
    },
    /// Show one run
    Get { id: String },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(exit_error) = e.downcast_ref::<ExitError>() {
            eprintln!("error: {}", exit_error.message);
            std::process::exit(exit_error.code);
        }
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = DaemonConfig::load(None)?;
    let client = DaemonClient::connect(config.socket_path.clone());

    match cli.command {
        Command::Status => {
            let response = client.send(&ControlRequest::DaemonStatus).await?;
            let ControlResponse::Status { status } = response else { return Err(ExitError::new(1, "unexpected response").into()) };
            output::emit(cli.format, &status, |s| {
                println!("{} — uptime {}s", s.version, s.uptime_secs);
                println!("tasks configured: {}", s.tasks_configured);
                println!("runtimes online:  {}", s.runtimes_online);
                println!("runs in flight:   {}", s.runs_in_flight);
            })?;
        }
        Command::Runtime(cmd) => run_runtime_command(cmd, &client, cli.format).await?,
        Command::Run(cmd) => run_run_command(cmd, &client, cli.format).await?,
        Command::Incidents { runtime } => {
            let response = client.send(&ControlRequest::ListIncidents { runtime_id: runtime }).await?;
            let ControlResponse::Incidents { incidents } = response else { return Err(ExitError::new(1, "unexpected response").into()) };
            output::emit(cli.format, &incidents, |incidents| {
                if incidents.is_empty() {
                    println!("no incidents recorded");
                }
                for incident in incidents {
                    println!("{}  runtime={}  {}", output::format_time_ago(incident.occurred_at_ms), incident.runtime_id, incident.detail);
                }
            })?;
        }
    }
    Ok(())
}

async fn run_runtime_command(cmd: RuntimeCommand, client: &DaemonClient, format: OutputFormat) -> anyhow::Result<()> {
    let response = match cmd {
        RuntimeCommand::List => client.send(&ControlRequest::ListTaskRuntimes).await?,
        RuntimeCommand::Get { id } => client.send(&ControlRequest::GetTaskRuntime { id }).await?,
        RuntimeCommand::Restart { id } => client.send(&ControlRequest::RestartTaskRuntime { id }).await?,
        RuntimeCommand::Recycle { id } => client.send(&ControlRequest::RecycleTaskRuntime { id }).await?,
        RuntimeCommand::Drain { id, undo } => client.send(&ControlRequest::SetTaskRuntimeDraining { id, draining: !undo }).await?,
    };
    match response {
        ControlResponse::TaskRuntimes { runtimes } => output::emit(format, &runtimes, |runtimes| {
            for runtime in runtimes {
                println!("{}  {}  {}/{} runs  {}", runtime.id, runtime.state, runtime.active_runs, runtime.max_parallel_runs, runtime.endpoint);
            }
        })?,
        ControlResponse::TaskRuntime { runtime } => output::emit(format, &runtime, |runtime| {
            println!("{}", runtime.id);
            println!("state:      {}", runtime.state);
            println!("endpoint:   {}", runtime.endpoint);
            println!("active:     {}/{}", runtime.active_runs, runtime.max_parallel_runs);
            println!("last error: {}", runtime.last_error.as_deref().unwrap_or("-"));
        })?,
        ControlResponse::NotFound { id } => return Err(ExitError::new(1, format!("no task runtime with id {id}")).into()),
        other => return Err(ExitError::new(1, format!("unexpected response: {other:?}")).into()),
    }
    Ok(())
}

fn parse_run_state(s: &str) -> anyhow::Result<oj_core::RunState> {
    use oj_core::RunState::*;
    Ok(match s {
        "queued" => Queued,
        "pending_approval" => PendingApproval,
        "running" => Running,
        "succeeded" => Succeeded,
        "failed" => Failed,
        "obsolete" => Obsolete,
        other => return Err(ExitError::new(1, format!("unknown run state '{other}'")).into()),
    })
}

async fn run_run_command(cmd: RunCommand, client: &DaemonClient, format: OutputFormat) -> anyhow::Result<()> {
    let response = match cmd {
        RunCommand::List { task, state } => {
            let state = state.map(|s| parse_run_state(&s)).transpose()?;
            client.send(&ControlRequest::ListRuns { task_id: task, state }).await?
        }
        RunCommand::Get { id } => client.send(&ControlRequest::GetRun { id }).await?,
    };
    match response {
        ControlResponse::Runs { runs } => output::emit(format, &runs, |runs| {
            for run in runs {
                println!("{}  task={}  {}  attempt={}", run.id, run.task_id, run.state, run.attempt);
            }
        })?,
        ControlResponse::Run { run } => output::emit(format, &run, |run| {
            println!("{}", run.id);
            println!("task:    {}", run.task_id);
            println!("state:   {}", run.state);
            println!("attempt: {}", run.attempt);
            if let Some(summary) = &run.summary {
                println!("summary: {summary}");
            }
        })?,
        ControlResponse::NotFound { id } => return Err(ExitError::new(1, format!("no run with id {id}")).into()),
        other => return Err(ExitError::new(1, format!("unexpected response: {other:?}")).into()),
    }
    Ok(())
}
