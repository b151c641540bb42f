//! Phase graph definition and loading.
//!
//! This module provides:
//! - `PhaseGraph`, the validated, ordered list of phases a run walks
//! - `Phase` and `Step`, immutable once loaded
//! - Loading from JSON, YAML or TOML with eager validation
//!
//! The on-disk shape is parsed into `Raw*` serde structs first and then
//! validated into the strongly typed graph, so malformed configs fail at
//! startup instead of deep inside the scheduler.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

/// Keys a command or log template may reference.
pub const TEMPLATE_KEYS: &[&str] = &["prompt", "phase", "step", "run_id", "log"];

/// Named agent command template, shared by many steps.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunnerDef {
    /// Shell command template, e.g. `codex exec < {prompt}`
    #[serde(default)]
    pub command: String,
}

/// Policy knobs for choosing a target phase when none is given.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DefaultTarget {
    /// Target for an empty destination
    #[serde(default)]
    pub empty: Option<String>,
    /// Target for a destination that already holds a project
    #[serde(default)]
    pub legacy: Option<String>,
    /// Glob patterns for entries that do not count as project content
    #[serde(default)]
    pub ignore: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    project_root: Option<PathBuf>,
    #[serde(default)]
    logs_dir: Option<PathBuf>,
    #[serde(default)]
    state_file: Option<PathBuf>,
    #[serde(default)]
    summary_file: Option<PathBuf>,
    #[serde(default)]
    pause_marker: Option<PathBuf>,
    #[serde(default)]
    runners: BTreeMap<String, RunnerDef>,
    #[serde(default)]
    default_target: DefaultTarget,
    #[serde(default)]
    phases: Option<Vec<RawPhase>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPhase {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    runner: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    prompt: Option<PathBuf>,
    #[serde(default)]
    pausable: bool,
    #[serde(default)]
    workdir: Option<PathBuf>,
    #[serde(default)]
    log: Option<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

/// What a step runs.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationTarget {
    /// A named runner from the `runners` table
    Runner { name: String, command: String },
    /// A command given directly on the step
    Inline(String),
}

impl InvocationTarget {
    /// The command template to render for this step.
    pub fn command_template(&self) -> &str {
        match self {
            InvocationTarget::Runner { command, .. } => command,
            InvocationTarget::Inline(command) => command,
        }
    }
}

/// A single invocation of the external agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub name: String,
    pub target: InvocationTarget,
    /// Absolute prompt path, checked to exist at load time
    pub prompt: Option<PathBuf>,
    /// Interactive step that honours the pause marker
    pub pausable: bool,
    /// Working directory (absolute); defaults to the project root
    pub workdir: Option<PathBuf>,
    /// Log path template overriding the derived per-step log
    pub log: Option<String>,
    pub env: BTreeMap<String, String>,
}

impl Step {
    /// Build a step that runs an inline command. Mostly useful in tests.
    pub fn inline(name: &str, command: &str) -> Self {
        Self {
            name: name.to_string(),
            target: InvocationTarget::Inline(command.to_string()),
            prompt: None,
            pausable: false,
            workdir: None,
            log: None,
            env: BTreeMap::new(),
        }
    }

    /// Mark the step as the interactive/pausable kind.
    pub fn pausable(mut self) -> Self {
        self.pausable = true;
        self
    }
}

/// A named, ordered group of steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    pub name: String,
    pub steps: Vec<Step>,
}

impl Phase {
    pub fn new(name: &str, steps: Vec<Step>) -> Self {
        Self {
            name: name.to_string(),
            steps,
        }
    }

    pub fn has_pausable_step(&self) -> bool {
        self.steps.iter().any(|s| s.pausable)
    }
}

/// The validated phase graph plus the layout hints carried in the same file.
#[derive(Debug, Clone)]
pub struct PhaseGraph {
    /// Path the graph was loaded from
    pub source: PathBuf,
    pub project_root: PathBuf,
    pub logs_dir: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
    pub summary_file: Option<PathBuf>,
    pub pause_marker: Option<PathBuf>,
    pub default_target: DefaultTarget,
    phases: Vec<Phase>,
}

impl PhaseGraph {
    /// Load and validate a phase graph from a JSON, YAML or TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw = parse_raw(path, &content)?;
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_raw(path, &base, raw)
    }

    /// Build a graph directly from phases, bypassing the file loader.
    pub fn from_phases(project_root: &Path, phases: Vec<Phase>) -> Result<Self, ConfigError> {
        validate_phases(&phases)?;
        Ok(Self {
            source: project_root.to_path_buf(),
            project_root: project_root.to_path_buf(),
            logs_dir: None,
            state_file: None,
            summary_file: None,
            pause_marker: None,
            default_target: DefaultTarget::default(),
            phases,
        })
    }

    fn from_raw(source: &Path, base: &Path, raw: RawConfig) -> Result<Self, ConfigError> {
        let project_root = resolve(base, raw.project_root.as_deref().unwrap_or(Path::new(".")));
        if !project_root.is_dir() {
            return Err(ConfigError::ProjectRootMissing { path: project_root });
        }

        for (name, runner) in &raw.runners {
            if runner.command.trim().is_empty() {
                return Err(ConfigError::EmptyCommand { name: name.clone() });
            }
            check_template(&runner.command)?;
        }

        let raw_phases = raw.phases.ok_or_else(|| ConfigError::MissingField {
            context: "config".to_string(),
            field: "phases".to_string(),
        })?;

        let mut phases = Vec::with_capacity(raw_phases.len());
        for (idx, raw_phase) in raw_phases.into_iter().enumerate() {
            let phase_name = non_empty(raw_phase.name).ok_or_else(|| ConfigError::MissingField {
                context: format!("phase #{}", idx + 1),
                field: "name".to_string(),
            })?;

            let mut steps = Vec::with_capacity(raw_phase.steps.len());
            for (step_idx, raw_step) in raw_phase.steps.into_iter().enumerate() {
                steps.push(build_step(
                    &phase_name,
                    step_idx,
                    raw_step,
                    &raw.runners,
                    &project_root,
                )?);
            }
            phases.push(Phase {
                name: phase_name,
                steps,
            });
        }
        validate_phases(&phases)?;

        for target in [&raw.default_target.empty, &raw.default_target.legacy]
            .into_iter()
            .flatten()
        {
            if !phases.iter().any(|p| &p.name == target) {
                return Err(unknown_phase(target, &phases));
            }
        }

        Ok(Self {
            source: source.to_path_buf(),
            logs_dir: raw.logs_dir.map(|p| resolve(&project_root, &p)),
            state_file: raw.state_file.map(|p| resolve(&project_root, &p)),
            summary_file: raw.summary_file.map(|p| resolve(&project_root, &p)),
            pause_marker: raw.pause_marker.map(|p| resolve(&project_root, &p)),
            default_target: raw.default_target,
            project_root,
            phases,
        })
    }

    /// All phases in declared order.
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Look up a phase by name.
    pub fn phase(&self, name: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.name == name)
    }

    /// Phases up to and including `target`, in declared order.
    pub fn phases_through(&self, target: &str) -> Result<&[Phase], ConfigError> {
        let idx = self
            .phases
            .iter()
            .position(|p| p.name == target)
            .ok_or_else(|| unknown_phase(target, &self.phases))?;
        Ok(&self.phases[..=idx])
    }

    pub fn phase_names(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.name.as_str()).collect()
    }
}

fn parse_raw(path: &Path, content: &str) -> Result<RawConfig, ConfigError> {
    let parse_err = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match ext.as_deref() {
        Some("json") => serde_json::from_str(content).map_err(|e| parse_err(e.to_string())),
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string()))
        }
        Some("toml") => toml::from_str(content).map_err(|e| parse_err(e.to_string())),
        _ => serde_json::from_str(content)
            .or_else(|_| serde_yaml::from_str(content))
            .map_err(|_| ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
    }
}

fn build_step(
    phase: &str,
    idx: usize,
    raw: RawStep,
    runners: &BTreeMap<String, RunnerDef>,
    project_root: &Path,
) -> Result<Step, ConfigError> {
    let name = non_empty(raw.name).ok_or_else(|| ConfigError::MissingField {
        context: format!("step #{} of phase '{}'", idx + 1, phase),
        field: "name".to_string(),
    })?;

    let target = match (raw.runner, raw.command) {
        (Some(runner), None) => {
            let def = runners
                .get(&runner)
                .ok_or_else(|| ConfigError::UnknownRunner {
                    phase: phase.to_string(),
                    step: name.clone(),
                    runner: runner.clone(),
                })?;
            InvocationTarget::Runner {
                name: runner,
                command: def.command.clone(),
            }
        }
        (None, Some(command)) => {
            if command.trim().is_empty() {
                return Err(ConfigError::EmptyCommand {
                    name: format!("{}/{}", phase, name),
                });
            }
            check_template(&command)?;
            InvocationTarget::Inline(command)
        }
        _ => {
            return Err(ConfigError::AmbiguousTarget {
                phase: phase.to_string(),
                step: name,
            });
        }
    };

    let prompt = match raw.prompt {
        Some(p) => {
            let path = resolve(project_root, &p);
            if !path.is_file() {
                return Err(ConfigError::PromptNotFound {
                    phase: phase.to_string(),
                    step: name,
                    path,
                });
            }
            Some(path)
        }
        None => None,
    };

    if let Some(log) = &raw.log {
        check_template(log)?;
    }

    Ok(Step {
        name,
        target,
        prompt,
        pausable: raw.pausable,
        workdir: raw.workdir.map(|p| resolve(project_root, &p)),
        log: raw.log,
        env: raw.env,
    })
}

fn validate_phases(phases: &[Phase]) -> Result<(), ConfigError> {
    if phases.is_empty() {
        return Err(ConfigError::NoPhases);
    }
    let mut seen = HashSet::new();
    for phase in phases {
        if !seen.insert(phase.name.as_str()) {
            return Err(ConfigError::DuplicatePhase {
                name: phase.name.clone(),
            });
        }
        if phase.steps.is_empty() {
            return Err(ConfigError::EmptyPhase {
                name: phase.name.clone(),
            });
        }
        let mut steps = HashSet::new();
        for step in &phase.steps {
            if !steps.insert(step.name.as_str()) {
                return Err(ConfigError::DuplicateStep {
                    phase: phase.name.clone(),
                    step: step.name.clone(),
                });
            }
        }
    }

    // Derived log files must stay distinct or a later step truncates an
    // earlier one's log.
    let mut log_names: HashMap<String, String> = HashMap::new();
    for phase in phases {
        for step in phase.steps.iter().filter(|s| s.log.is_none()) {
            let file = default_log_name(&phase.name, &step.name);
            let owner = format!("{}/{}", phase.name, step.name);
            if let Some(first) = log_names.insert(file.clone(), owner.clone()) {
                return Err(ConfigError::LogNameCollision {
                    first,
                    second: owner,
                    file,
                });
            }
        }
    }
    Ok(())
}

/// Derived per-step log file name: `<phase>-<step>.log`, sanitized.
pub fn default_log_name(phase: &str, step: &str) -> String {
    format!(
        "{}-{}.log",
        sanitize_file_component(phase),
        sanitize_file_component(step)
    )
}

/// Replace anything outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_file_component(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn unknown_phase(name: &str, phases: &[Phase]) -> ConfigError {
    ConfigError::UnknownPhase {
        name: name.to_string(),
        known: phases
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn check_template(template: &str) -> Result<(), ConfigError> {
    let probe: Vec<(&str, &str)> = TEMPLATE_KEYS.iter().map(|k| (*k, "")).collect();
    render_template(template, &probe).map(|_| ())
}

/// Substitute `{key}` placeholders. `{{` and `}}` produce literal braces.
///
/// Any placeholder not present in `values` is an error.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    key.push(next);
                }
                let value = values
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| *v)
                    .filter(|_| closed)
                    .ok_or_else(|| ConfigError::UnknownTemplateKey {
                        key: key.clone(),
                        template: template.to_string(),
                    })?;
                out.push_str(value);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const YAML: &str = r#"
runners:
  codex:
    command: "codex exec < {prompt}"
phases:
  - name: discovery
    steps:
      - name: interview
        runner: codex
        prompt: prompts/discovery.md
        pausable: true
  - name: main
    steps:
      - name: build
        command: "echo build {phase}/{step}"
      - name: test
        command: "echo test"
"#;

    fn write_prompt(dir: &Path) {
        fs::create_dir_all(dir.join("prompts")).unwrap();
        fs::write(dir.join("prompts/discovery.md"), "# Discovery").unwrap();
    }

    #[test]
    fn test_load_yaml_graph() {
        let dir = tempdir().unwrap();
        write_prompt(dir.path());
        let path = dir.path().join("orchestrator.yaml");
        fs::write(&path, YAML).unwrap();

        let graph = PhaseGraph::load(&path).unwrap();
        assert_eq!(graph.phase_names(), vec!["discovery", "main"]);

        let discovery = graph.phase("discovery").unwrap();
        assert!(discovery.has_pausable_step());
        let interview = &discovery.steps[0];
        assert_eq!(
            interview.target,
            InvocationTarget::Runner {
                name: "codex".into(),
                command: "codex exec < {prompt}".into()
            }
        );
        assert_eq!(
            interview.prompt.as_deref(),
            Some(dir.path().join("prompts/discovery.md").as_path())
        );

        let main = graph.phase("main").unwrap();
        assert_eq!(main.steps.len(), 2);
        assert!(!main.has_pausable_step());
    }

    #[test]
    fn test_load_json_graph() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orchestrator.json");
        fs::write(
            &path,
            r#"{"phases": [{"name": "main", "steps": [{"name": "build", "command": "true"}]}]}"#,
        )
        .unwrap();
        let graph = PhaseGraph::load(&path).unwrap();
        assert_eq!(graph.phases().len(), 1);
        assert_eq!(graph.project_root, dir.path().join("."));
    }

    #[test]
    fn test_load_toml_graph() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orchestrator.toml");
        fs::write(
            &path,
            r#"
[[phases]]
name = "main"

[[phases.steps]]
name = "build"
command = "true"
"#,
        )
        .unwrap();
        let graph = PhaseGraph::load(&path).unwrap();
        assert_eq!(graph.phase_names(), vec!["main"]);
    }

    #[test]
    fn test_unknown_extension_falls_back_to_yaml() {
        let dir = tempdir().unwrap();
        write_prompt(dir.path());
        let path = dir.path().join("orchestrator.conf");
        fs::write(&path, YAML).unwrap();
        assert!(PhaseGraph::load(&path).is_ok());
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempdir().unwrap();
        let err = PhaseGraph::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        let err = PhaseGraph::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        fs::write(
            &path,
            r#"{"phases": [{"name": "main", "steps": [{"name": "b", "command": "true", "retries": 3}]}]}"#,
        )
        .unwrap();
        let err = PhaseGraph::load(&path).unwrap_err();
        assert!(err.to_string().contains("retries"));
    }

    #[test]
    fn test_missing_phases_field() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        fs::write(&path, r#"{"runners": {}}"#).unwrap();
        let err = PhaseGraph::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "phases"));
    }

    #[test]
    fn test_duplicate_phase_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        fs::write(
            &path,
            r#"{"phases": [
                {"name": "main", "steps": [{"name": "a", "command": "true"}]},
                {"name": "main", "steps": [{"name": "b", "command": "true"}]}
            ]}"#,
        )
        .unwrap();
        let err = PhaseGraph::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePhase { ref name } if name == "main"));
    }

    #[test]
    fn test_colliding_log_names_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        fs::write(
            &path,
            r#"{"phases": [
                {"name": "a", "steps": [{"name": "b-c", "command": "true"}]},
                {"name": "a-b", "steps": [{"name": "c", "command": "true"}]}
            ]}"#,
        )
        .unwrap();
        let err = PhaseGraph::load(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::LogNameCollision { ref first, ref second, ref file }
                if first == "a/b-c" && second == "a-b/c" && file == "a-b-c.log"
        ));

        let phases = vec![Phase::new(
            "main",
            vec![Step::inline("x y", "true"), Step::inline("x_y", "true")],
        )];
        let err = PhaseGraph::from_phases(dir.path(), phases).unwrap_err();
        assert!(matches!(err, ConfigError::LogNameCollision { ref file, .. } if file == "main-x_y.log"));
    }

    #[test]
    fn test_explicit_log_template_skips_collision_check() {
        let dir = tempdir().unwrap();
        let mut own_log = Step::inline("x_y", "true");
        own_log.log = Some("custom-{step}.log".to_string());
        let phases = vec![Phase::new("main", vec![Step::inline("x y", "true"), own_log])];
        assert!(PhaseGraph::from_phases(dir.path(), phases).is_ok());
    }

    #[test]
    fn test_sanitize_file_component() {
        assert_eq!(sanitize_file_component("a-b_c.d"), "a-b_c.d");
        assert_eq!(sanitize_file_component("a b/c"), "a_b_c");
        assert_eq!(default_log_name("main", "build web"), "main-build_web.log");
    }

    #[test]
    fn test_empty_phase_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        fs::write(&path, r#"{"phases": [{"name": "main", "steps": []}]}"#).unwrap();
        let err = PhaseGraph::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyPhase { .. }));
    }

    #[test]
    fn test_unknown_runner_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        fs::write(
            &path,
            r#"{"phases": [{"name": "main", "steps": [{"name": "a", "runner": "claude"}]}]}"#,
        )
        .unwrap();
        let err = PhaseGraph::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRunner { ref runner, .. } if runner == "claude"));
    }

    #[test]
    fn test_runner_and_command_together_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        fs::write(
            &path,
            r#"{"runners": {"r": {"command": "true"}},
                "phases": [{"name": "main", "steps": [{"name": "a", "runner": "r", "command": "true"}]}]}"#,
        )
        .unwrap();
        let err = PhaseGraph::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousTarget { .. }));
    }

    #[test]
    fn test_missing_prompt_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.yaml");
        fs::write(&path, YAML).unwrap();
        let err = PhaseGraph::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::PromptNotFound { .. }));
    }

    #[test]
    fn test_unknown_template_key_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        fs::write(
            &path,
            r#"{"phases": [{"name": "main", "steps": [{"name": "a", "command": "echo {branch}"}]}]}"#,
        )
        .unwrap();
        let err = PhaseGraph::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTemplateKey { ref key, .. } if key == "branch"));
    }

    #[test]
    fn test_default_target_must_name_a_phase() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        fs::write(
            &path,
            r#"{"default_target": {"legacy": "audit"},
                "phases": [{"name": "main", "steps": [{"name": "a", "command": "true"}]}]}"#,
        )
        .unwrap();
        let err = PhaseGraph::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPhase { ref name, .. } if name == "audit"));
    }

    #[test]
    fn test_phases_through_target() {
        let dir = tempdir().unwrap();
        let graph = PhaseGraph::from_phases(
            dir.path(),
            vec![
                Phase::new("discovery", vec![Step::inline("a", "true")]),
                Phase::new("main", vec![Step::inline("b", "true")]),
                Phase::new("post", vec![Step::inline("c", "true")]),
            ],
        )
        .unwrap();

        let through: Vec<_> = graph
            .phases_through("main")
            .unwrap()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(through, vec!["discovery", "main"]);
        assert!(matches!(
            graph.phases_through("legacy"),
            Err(ConfigError::UnknownPhase { .. })
        ));
    }

    #[test]
    fn test_render_template() {
        let out = render_template(
            "codex < {prompt} # {{literal}}",
            &[("prompt", "/tmp/p.md")],
        )
        .unwrap();
        assert_eq!(out, "codex < /tmp/p.md # {literal}");

        assert!(render_template("echo {missing}", &[("prompt", "x")]).is_err());
        assert!(render_template("echo {unclosed", &[("unclosed", "x")]).is_err());
    }
}
