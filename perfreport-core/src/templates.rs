//! Template files on disk
//!
//! Every file under a template directory becomes one template script
//! block: the file stem is the partial name and the extension picks the
//! format (`.html`/`.htm` html, `.txt` text, `.hbs` both).

use crate::config::ResolvedConfig;
use crate::engine::{Format, TEMPLATE_MIME_TYPE};
use crate::host::TemplateScript;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Script type for a template file extension
pub fn mime_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => Some(Format::Html.mime_type()),
        "txt" => Some(Format::Text.mime_type()),
        "hbs" => Some(TEMPLATE_MIME_TYPE),
        _ => None,
    }
}

/// Returns true for directory names that should not be traversed
fn is_skipped_dir(name: &str) -> bool {
    name.starts_with('.') || name == "node_modules" || name == "target"
}

fn collect_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry_result in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        let entry = entry_result?;
        let path = entry.path();
        let metadata = std::fs::symlink_metadata(&path)
            .with_context(|| format!("Failed to read metadata: {}", path.display()))?;

        if metadata.is_symlink() {
            continue;
        }
        if metadata.is_dir() {
            let skipped = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_skipped_dir);
            if !skipped {
                collect_recursive(&path, files)?;
            }
        } else if metadata.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

/// Load every template file under `dir` accepted by the config
///
/// Files are visited in sorted path order, so when two files share a stem
/// the later one wins once registered.
pub fn collect_templates(dir: &Path, config: &ResolvedConfig) -> Result<Vec<TemplateScript>> {
    let mut files = Vec::new();
    collect_recursive(dir, &mut files)?;
    files.sort();

    let mut scripts = Vec::new();
    for path in files {
        let relative = path.strip_prefix(dir).unwrap_or(&path);
        if !config.should_include(relative) {
            continue;
        }
        let Some(mime_type) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(mime_type_for_extension)
        else {
            continue;
        };
        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read template: {}", path.display()))?;
        scripts.push(TemplateScript::new(id, mime_type, &content));
    }
    Ok(scripts)
}
