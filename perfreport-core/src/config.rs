//! Configuration file support for perfreport
//!
//! Loads project-specific configuration from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.perfreportrc.json` in project root
//! 3. `perfreport.config.json` in project root
//!
//! All fields are optional. CLI flags take precedence over config file values.

use crate::engine::Format;
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Template files picked up when no include patterns are given
const DEFAULT_INCLUDES: &[&str] = &["**/*.html", "**/*.htm", "**/*.txt", "**/*.hbs"];

const DEFAULT_MAIN_TEMPLATE: &str = "report";

const CONFIG_FILE_NAMES: &[&str] = &[".perfreportrc.json", "perfreport.config.json"];

/// perfreport configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    /// Directory holding template files, relative to the project root
    #[serde(default)]
    pub templates_dir: Option<String>,

    /// Glob patterns for template files to load (default: html, htm, txt and hbs files)
    #[serde(default)]
    pub include: Vec<String>,

    /// Glob patterns for template files to skip
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Partial rendered as the report body (default: "report")
    #[serde(default)]
    pub main_template: Option<String>,

    /// Output format (default: html)
    #[serde(default)]
    pub format: Option<Format>,

    /// Column to wrap text output at
    #[serde(default)]
    pub wrap: Option<usize>,

    /// Collapse runs of whitespace when converting HTML to text (default: true)
    #[serde(default)]
    pub collapse_whitespace: Option<bool>,

    /// Do not log hook failures
    #[serde(default)]
    pub quiet: Option<bool>,

    /// Document title used when no title template is registered
    #[serde(default)]
    pub title: Option<String>,
}

/// Resolved configuration with compiled glob patterns
#[derive(Debug)]
pub struct ResolvedConfig {
    /// Absolute or project-relative template directory
    pub templates_dir: Option<PathBuf>,
    /// Compiled include patterns
    pub include: GlobSet,
    /// Compiled exclude patterns
    pub exclude: GlobSet,
    pub main_template: String,
    pub format: Format,
    pub wrap: Option<usize>,
    pub collapse_whitespace: bool,
    pub quiet: bool,
    pub title: Option<String>,
    /// Path the config was loaded from (None if defaults)
    pub config_path: Option<PathBuf>,
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

impl ReportConfig {
    /// Validate the configuration for logical errors
    pub fn validate(&self) -> Result<()> {
        if let Some(wrap) = self.wrap {
            if wrap == 0 {
                anyhow::bail!("wrap must be positive (got {})", wrap);
            }
        }

        if let Some(ref name) = self.main_template {
            if name.trim().is_empty() {
                anyhow::bail!("main_template must not be empty");
            }
        }

        if let Some(ref dir) = self.templates_dir {
            if dir.trim().is_empty() {
                anyhow::bail!("templates_dir must not be empty");
            }
        }

        // Validate glob patterns compile
        for pattern in &self.include {
            Glob::new(pattern).with_context(|| format!("invalid include pattern: {}", pattern))?;
        }
        for pattern in &self.exclude {
            Glob::new(pattern).with_context(|| format!("invalid exclude pattern: {}", pattern))?;
        }

        Ok(())
    }

    /// Resolve config into compiled form ready for use
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;

        let include = if self.include.is_empty() {
            let defaults: Vec<String> = DEFAULT_INCLUDES.iter().map(|p| p.to_string()).collect();
            build_globset(&defaults)?
        } else {
            build_globset(&self.include)?
        };

        Ok(ResolvedConfig {
            templates_dir: self.templates_dir.as_ref().map(PathBuf::from),
            include,
            exclude: build_globset(&self.exclude)?,
            main_template: self
                .main_template
                .clone()
                .unwrap_or_else(|| DEFAULT_MAIN_TEMPLATE.to_string()),
            format: self.format.unwrap_or(Format::Html),
            wrap: self.wrap,
            collapse_whitespace: self.collapse_whitespace.unwrap_or(true),
            quiet: self.quiet.unwrap_or(false),
            title: self.title.clone(),
            config_path: None,
        })
    }
}

impl ResolvedConfig {
    /// Check if a template path (relative to the template directory) should be loaded
    pub fn should_include(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();

        // Check exclude first
        if self.exclude.is_match(path_str.as_ref()) {
            return false;
        }

        self.include.is_match(path_str.as_ref())
    }

    /// Build a ResolvedConfig with all defaults (no config file)
    pub fn defaults() -> Result<Self> {
        ReportConfig::default().resolve()
    }
}

/// Discover and load a config file from the project root
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(project_root: &Path) -> Result<Option<(ReportConfig, PathBuf)>> {
    for name in CONFIG_FILE_NAMES {
        let path = project_root.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }
    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<ReportConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: ReportConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load and resolve config for a project
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config from the project root.
/// Returns default config if nothing is found. A relative `templates_dir`
/// is joined to the project root.
pub fn load_and_resolve(project_root: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        let config = load_config_file(path)?;
        (config, Some(path.to_path_buf()))
    } else {
        match discover_config(project_root)? {
            Some((config, path)) => (config, Some(path)),
            None => (ReportConfig::default(), None),
        }
    };

    let mut resolved = config.resolve()?;
    resolved.templates_dir = resolved.templates_dir.map(|dir| {
        if dir.is_absolute() {
            dir
        } else {
            project_root.join(dir)
        }
    });
    resolved.config_path = source_path;
    Ok(resolved)
}
