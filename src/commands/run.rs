use std::time::Duration;

use clap::Args;
use serde::Serialize;

use provost::application::ApplicationStore;
use provost::engine::{RunReport, RunState, TaskRun};
use provost::sink::StatusSink;
use provost::ssh::SshClient;
use provost::utils::args::{expand_path, parse_key_value_pairs};
use provost::{target, ExecutionRecord, TaskType};

#[derive(Serialize)]
pub struct RunOutput {
    command: String,
    application_id: String,
    task: TaskType,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<RunReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview: Option<Vec<ExecutionRecord>>,
}

#[derive(Args)]
pub struct RunArgs {
    /// Application ID
    application_id: String,
    /// Task type (installation, backup, restore, uninstall, update, upgrade)
    task: String,
    /// Parameter value as name=value (repeatable)
    #[arg(long = "param", value_name = "NAME=VALUE")]
    params: Vec<String>,
    /// Render the pipeline (with secure values redacted) without executing
    #[arg(long)]
    dry_run: bool,
    /// Per-command timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    /// Application root directory (repeatable; earlier roots win)
    #[arg(long = "root", value_name = "DIR")]
    roots: Vec<String>,
}

pub fn run(args: RunArgs, _global: &crate::commands::GlobalArgs) -> crate::commands::CmdResult<RunOutput> {
    let task = TaskType::parse(&args.task)?;
    let supplied = parse_key_value_pairs(&args.params)?;
    let store = ApplicationStore::from_roots(args.roots.iter().map(|r| expand_path(r)).collect())?;

    let template = store.load(&args.application_id, task)?;
    let target = target::load()?;
    let task_run = TaskRun::new(template, supplied, target.clone());

    if args.dry_run {
        let preview = task_run.preview()?;
        return Ok((
            RunOutput {
                command: "run".to_string(),
                application_id: args.application_id,
                task,
                report: None,
                preview: Some(preview),
            },
            0,
        ));
    }

    let client = match args.timeout {
        Some(secs) => SshClient::with_timeout(target, Duration::from_secs(secs)),
        None => SshClient::new(target),
    };
    let report = task_run.run(&client, &StatusSink)?;

    let exit_code = match report.state {
        RunState::Completed => 0,
        _ => 20,
    };
    Ok((
        RunOutput {
            command: "run".to_string(),
            application_id: args.application_id,
            task,
            report: Some(report),
            preview: None,
        },
        exit_code,
    ))
}
