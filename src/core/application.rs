//! Application store: turns on-disk application and template documents
//! into a flat, validated command pipeline.
//!
//! Layout per root directory:
//!
//! ```text
//! <root>/applications/<id>/application.json
//! <root>/applications/<id>/templates/*.json
//! <root>/applications/<id>/scripts/*
//! <root>/shared/templates/*.json
//! <root>/shared/scripts/*
//! ```
//!
//! Roots are searched in order and earlier roots win; `shared/` resources
//! are visible to every application. Authoring errors (missing templates,
//! undefined placeholders, recursion) are collected per load and reported
//! together instead of one at a time.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::render;
use crate::template::{
    CommandSpec, CommandType, ExecuteOn, FailurePolicy, ParameterSpec, TaskType, Template,
};

/// On-disk `application.json`: display metadata plus one ordered template
/// list per task type the application supports.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationDoc {
    pub name: String,
    #[serde(default)]
    pub description: String,
    installation: Option<Vec<String>>,
    backup: Option<Vec<String>>,
    restore: Option<Vec<String>>,
    uninstall: Option<Vec<String>>,
    update: Option<Vec<String>>,
    upgrade: Option<Vec<String>>,
}

impl ApplicationDoc {
    pub fn templates_for(&self, task: TaskType) -> Option<&[String]> {
        let list = match task {
            TaskType::Installation => &self.installation,
            TaskType::Backup => &self.backup,
            TaskType::Restore => &self.restore,
            TaskType::Uninstall => &self.uninstall,
            TaskType::Update => &self.update,
            TaskType::Upgrade => &self.upgrade,
        };
        list.as_deref()
    }

    pub fn tasks(&self) -> Vec<TaskType> {
        TaskType::ALL
            .into_iter()
            .filter(|task| self.templates_for(*task).is_some())
            .collect()
    }
}

/// One entry in `app list`: listing never fails on a broken application,
/// it reports the application with its errors attached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSummary {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub tasks: Vec<TaskType>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

pub struct ApplicationStore {
    roots: Vec<PathBuf>,
}

impl ApplicationStore {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// Store over the given roots, falling back to the config-dir default
    /// (`~/.config/provost/json`) when none are supplied.
    pub fn from_roots(roots: Vec<PathBuf>) -> Result<Self> {
        if roots.is_empty() {
            Ok(Self::new(vec![crate::paths::provost()?.join("json")]))
        } else {
            Ok(Self::new(roots))
        }
    }

    /// Map of application id to its directory. Earlier roots shadow later
    /// ones; only directories carrying an `application.json` count.
    pub fn discover(&self) -> BTreeMap<String, PathBuf> {
        let mut apps = BTreeMap::new();
        for root in &self.roots {
            let apps_dir = root.join("applications");
            let Ok(entries) = std::fs::read_dir(&apps_dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let dir = entry.path();
                if !dir.is_dir() || !dir.join("application.json").is_file() {
                    continue;
                }
                let id = entry.file_name().to_string_lossy().to_string();
                apps.entry(id).or_insert(dir);
            }
        }
        apps
    }

    pub fn read_doc(&self, app_dir: &Path) -> Result<ApplicationDoc> {
        let path = app_dir.join("application.json");
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| Error::validation_invalid_json(e, Some(format!("parse {}", path.display()))))
    }

    /// List every discoverable application, validating each one's
    /// installation pipeline and attaching authoring errors in place.
    pub fn list(&self) -> Vec<ApplicationSummary> {
        let mut summaries = Vec::new();
        for (id, dir) in self.discover() {
            let doc = match self.read_doc(&dir) {
                Ok(doc) => doc,
                Err(err) => {
                    summaries.push(ApplicationSummary {
                        id: id.clone(),
                        name: id,
                        description: String::new(),
                        tasks: Vec::new(),
                        errors: vec![err.message],
                    });
                    continue;
                }
            };
            let errors = match self.assemble(&id, &dir, &doc, TaskType::Installation) {
                Ok((_, errors)) => errors,
                Err(err) => vec![err.message],
            };
            summaries.push(ApplicationSummary {
                id,
                name: doc.name.clone(),
                description: doc.description.clone(),
                tasks: doc.tasks(),
                errors,
            });
        }
        summaries
    }

    /// Load an application's pipeline for one task: the flat, validated
    /// command list with all parameter declarations and declared outputs.
    pub fn load(&self, id: &str, task: TaskType) -> Result<Template> {
        let dir = self
            .discover()
            .remove(id)
            .ok_or_else(|| Error::application_not_found(id))?;
        let doc = self.read_doc(&dir)?;

        log_status!("store", "Loading '{}' task '{}'", id, task);

        let (template, errors) = self.assemble(id, &dir, &doc, task)?;
        if !errors.is_empty() {
            return Err(Error::application_invalid(id, errors));
        }
        Ok(template)
    }

    /// Parameter declarations a caller may supply values for: everything
    /// declared by the pipeline's templates minus names produced as command
    /// outputs and minus derived declarations, which compute themselves.
    pub fn parameters(&self, id: &str, task: TaskType) -> Result<Vec<ParameterSpec>> {
        let template = self.load(id, task)?;
        let outputs: HashSet<&String> = template.outputs.iter().collect();
        Ok(template
            .parameters
            .into_iter()
            .filter(|p| !outputs.contains(&p.name) && p.template.is_none())
            .collect())
    }

    fn assemble(
        &self,
        id: &str,
        app_dir: &Path,
        doc: &ApplicationDoc,
        task: TaskType,
    ) -> Result<(Template, Vec<String>)> {
        let Some(files) = doc.templates_for(task) else {
            return Ok((
                empty_pipeline(id, task, doc),
                vec![format!(
                    "Task '{}' is not declared in application.json",
                    task
                )],
            ));
        };

        let mut assembler = Assembler {
            store: self,
            app_dir,
            requested_in: task.as_str().to_string(),
            parameters: Vec::new(),
            commands: Vec::new(),
            outputs: Vec::new(),
            errors: Vec::new(),
            policy: FailurePolicy::Continue,
            declared_policy: false,
        };
        for file in files {
            let mut visited = HashSet::new();
            assembler.process_template(file, &mut visited, None);
        }

        let template = Template {
            name: format!("{}:{}", id, task),
            description: (!doc.description.is_empty()).then(|| doc.description.clone()),
            execute_on: ExecuteOn::Proxmox,
            parameters: assembler.parameters,
            outputs: assembler.outputs,
            commands: assembler.commands,
            on_failure: if assembler.declared_policy {
                assembler.policy
            } else {
                FailurePolicy::Abort
            },
        };
        Ok((template, assembler.errors))
    }

    /// Resolve and parse one template file. The application's own
    /// `templates/` directory shadows shared templates of the same name.
    pub fn read_template(&self, app_dir: &Path, name: &str, requested_in: &str) -> Result<Template> {
        let app_local = app_dir.join("templates").join(name);
        let path = if app_local.is_file() {
            app_local
        } else {
            self.find_shared("templates", name)
                .ok_or_else(|| Error::template_not_found(name, requested_in))?
        };
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::template_invalid(name, e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| Error::template_invalid(name, e.to_string()))
    }

    fn find_shared(&self, kind: &str, name: &str) -> Option<PathBuf> {
        self.roots
            .iter()
            .map(|root| root.join("shared").join(kind).join(name))
            .find(|path| path.is_file())
    }
}

fn empty_pipeline(id: &str, task: TaskType, doc: &ApplicationDoc) -> Template {
    Template {
        name: format!("{}:{}", id, task),
        description: (!doc.description.is_empty()).then(|| doc.description.clone()),
        execute_on: ExecuteOn::Proxmox,
        parameters: Vec::new(),
        outputs: Vec::new(),
        commands: Vec::new(),
        on_failure: FailurePolicy::Abort,
    }
}

/// Walks one task's template list, flattening nested templates and
/// inlining scripts, while collecting authoring errors.
struct Assembler<'a> {
    store: &'a ApplicationStore,
    app_dir: &'a Path,
    requested_in: String,
    parameters: Vec<ParameterSpec>,
    commands: Vec<CommandSpec>,
    outputs: Vec<String>,
    errors: Vec<String>,
    /// Abort wins: one template declaring abort makes the whole pipeline
    /// abort on failure.
    policy: FailurePolicy,
    declared_policy: bool,
}

impl Assembler<'_> {
    fn process_template(
        &mut self,
        file: &str,
        visited: &mut HashSet<String>,
        parent: Option<&str>,
    ) {
        if !visited.insert(file.to_string()) {
            self.errors
                .push(format!("Endless recursion detected for template: {}", file));
            return;
        }

        let template = match self
            .store
            .read_template(self.app_dir, file, &self.requested_in)
        {
            Ok(template) => template,
            Err(err) => {
                self.errors
                    .push(format!("{}{}", err.message, self.context(parent)));
                return;
            }
        };

        // Outputs become resolvable before this template's commands are
        // validated, so a command may reference what a predecessor emits.
        for output in &template.outputs {
            if !self.outputs.contains(output) {
                self.outputs.push(output.clone());
            }
        }

        // First declaration of a parameter name wins across templates.
        for param in template.parameters {
            if self.parameters.iter().any(|p| p.name == param.name) {
                continue;
            }
            self.parameters.push(param);
        }

        if template.on_failure == FailurePolicy::Abort || !self.declared_policy {
            self.policy = template.on_failure;
        }
        self.declared_policy = true;

        for command in template.commands {
            match command.command_type {
                CommandType::Template => {
                    self.process_template(&command.execute, visited, Some(&template.name));
                }
                CommandType::Script => {
                    self.inline_script(command, template.execute_on, &template.name);
                }
                CommandType::Command => {
                    self.validate_placeholders(&command.name, &command.execute, &template.name);
                    self.commands.push(CommandSpec {
                        execute_on: Some(command.execute_on.unwrap_or(template.execute_on)),
                        ..command
                    });
                }
            }
        }
    }

    /// Resolve a script file (application scripts first, then shared) and
    /// inline its content as the command text.
    fn inline_script(&mut self, command: CommandSpec, execute_on: ExecuteOn, parent: &str) {
        let app_local = self.app_dir.join("scripts").join(&command.execute);
        let path = if app_local.is_file() {
            Some(app_local)
        } else {
            self.store.find_shared("scripts", &command.execute)
        };
        let Some(path) = path else {
            self.errors.push(format!(
                "Script file not found: {} (searched application and shared scripts){}",
                command.execute,
                self.context(Some(parent))
            ));
            return;
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                self.errors.push(format!(
                    "Failed to read script {}: {}{}",
                    command.execute,
                    e,
                    self.context(Some(parent))
                ));
                return;
            }
        };

        self.validate_placeholders(&command.name, &content, parent);
        self.commands.push(CommandSpec {
            execute: content,
            execute_on: Some(command.execute_on.unwrap_or(execute_on)),
            ..command
        });
    }

    fn validate_placeholders(&mut self, command: &str, text: &str, parent: &str) {
        for token in render::placeholder_tokens(text) {
            let known = self.parameters.iter().any(|p| p.name == token)
                || self.outputs.iter().any(|o| *o == token);
            if !known {
                self.errors.push(format!(
                    "Command '{}' uses variable '{{{{ {} }}}}' but no such parameter is defined{}",
                    command,
                    token,
                    self.context(Some(parent))
                ));
            }
        }
    }

    fn context(&self, parent: Option<&str>) -> String {
        match parent {
            Some(parent) => format!(
                " (requested in: {}, parent template: {})",
                self.requested_in, parent
            ),
            None => format!(" (requested in: {})", self.requested_in),
        }
    }
}
