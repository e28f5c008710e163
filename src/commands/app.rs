use clap::{Args, Subcommand};
use serde::Serialize;

use provost::application::{ApplicationStore, ApplicationSummary};
use provost::utils::args::expand_path;
use provost::{ParameterSpec, TaskType};

#[derive(Default, Serialize)]
pub struct AppOutput {
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    applications: Option<Vec<ApplicationSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    application_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task: Option<TaskType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Vec<ParameterSpec>>,
}

#[derive(Args)]
pub struct AppArgs {
    #[command(subcommand)]
    command: AppCommand,
}

#[derive(Subcommand)]
enum AppCommand {
    /// List all discoverable applications
    List {
        /// Application root directory (repeatable; earlier roots win)
        #[arg(long = "root", value_name = "DIR")]
        roots: Vec<String>,
    },
    /// Show the parameters a task expects values for
    Params {
        /// Application ID
        application_id: String,
        /// Task type (installation, backup, restore, uninstall, update, upgrade)
        task: String,
        /// Application root directory (repeatable; earlier roots win)
        #[arg(long = "root", value_name = "DIR")]
        roots: Vec<String>,
    },
}

fn store_for(roots: &[String]) -> provost::Result<ApplicationStore> {
    ApplicationStore::from_roots(roots.iter().map(|r| expand_path(r)).collect())
}

pub fn run(args: AppArgs, _global: &crate::commands::GlobalArgs) -> crate::commands::CmdResult<AppOutput> {
    match args.command {
        AppCommand::List { roots } => {
            let store = store_for(&roots)?;
            let applications = store.list();
            Ok((
                AppOutput {
                    command: "list".to_string(),
                    applications: Some(applications),
                    ..Default::default()
                },
                0,
            ))
        }
        AppCommand::Params {
            application_id,
            task,
            roots,
        } => {
            let task = TaskType::parse(&task)?;
            let store = store_for(&roots)?;
            let parameters = store.parameters(&application_id, task)?;
            Ok((
                AppOutput {
                    command: "params".to_string(),
                    application_id: Some(application_id),
                    task: Some(task),
                    parameters: Some(parameters),
                    ..Default::default()
                },
                0,
            ))
        }
    }
}
