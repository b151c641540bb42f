//! Default target-phase selection when `--phase` is not given.
//!
//! A destination whose entries are all framework scaffolding is treated as a
//! fresh project and starts at the empty target; anything else is an existing
//! codebase and runs through the legacy target.

use anyhow::{Context, Result};
use glob::Pattern;
use std::path::{Component, Path};

use crate::errors::ConfigError;
use crate::phase::PhaseGraph;

/// Entries that never make a destination count as a pre-existing project.
pub const DEFAULT_IGNORE: &[&str] = &[
    "framework",
    "framework.zip",
    "install-framework.sh",
    "AGENTS.md",
    "AGENTS.override.md",
    ".git",
    ".gitignore",
    ".DS_Store",
];

const EMPTY_FALLBACK: &str = "discovery";
const LEGACY_FALLBACK: &str = "legacy";

#[derive(Debug, Clone)]
pub struct TargetPolicy {
    empty_target: String,
    legacy_target: String,
    ignore: Vec<Pattern>,
}

impl TargetPolicy {
    /// Build the policy from the graph's `default_target` section.
    ///
    /// `logs_dir` is ignored as well when it lives inside the project root.
    pub fn from_graph(graph: &PhaseGraph, logs_dir: &Path) -> Result<Self, ConfigError> {
        let names = graph.phase_names();
        let pick = |configured: &Option<String>, preferred: &str, fallback: Option<&&str>| {
            configured
                .clone()
                .or_else(|| names.contains(&preferred).then(|| preferred.to_string()))
                .or_else(|| fallback.map(|s| s.to_string()))
                .unwrap_or_default()
        };
        let defaults = &graph.default_target;
        let empty_target = pick(&defaults.empty, EMPTY_FALLBACK, names.first());
        let legacy_target = pick(&defaults.legacy, LEGACY_FALLBACK, names.last());

        let mut ignore = match &defaults.ignore {
            Some(patterns) => patterns
                .iter()
                .map(|p| compile(p))
                .collect::<Result<Vec<_>, _>>()?,
            None => DEFAULT_IGNORE
                .iter()
                .map(|p| compile(&Pattern::escape(p)))
                .collect::<Result<Vec<_>, _>>()?,
        };
        if let Ok(rel) = logs_dir.strip_prefix(&graph.project_root)
            && let Some(Component::Normal(first)) = rel.components().next()
        {
            ignore.push(compile(&Pattern::escape(&first.to_string_lossy()))?);
        }

        Ok(Self {
            empty_target,
            legacy_target,
            ignore,
        })
    }

    pub fn empty_target(&self) -> &str {
        &self.empty_target
    }

    pub fn legacy_target(&self) -> &str {
        &self.legacy_target
    }

    /// True when every entry directly under `root` matches an ignore pattern.
    /// A missing root counts as empty.
    pub fn is_empty_destination(&self, root: &Path) -> Result<bool> {
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list {}", root.display()));
            }
        };
        for entry in entries {
            let entry = entry.with_context(|| format!("Failed to list {}", root.display()))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !self.ignore.iter().any(|p| p.matches(&name)) {
                tracing::debug!(entry = %name, "Destination has project content");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Pick the target phase for `root`.
    pub fn resolve(&self, root: &Path) -> Result<&str> {
        if self.is_empty_destination(root)? {
            Ok(&self.empty_target)
        } else {
            Ok(&self.legacy_target)
        }
    }
}

fn compile(pattern: &str) -> Result<Pattern, ConfigError> {
    Pattern::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}
