//! Template rendering collaborator.
//!
//! One-shot minijinja rendering of template files, with relative paths
//! resolved against the configured template root. Rendering semantics belong
//! to minijinja; this module only resolves paths and converts failures.

use minijinja::Environment;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Failure modes surfaced to the response layer: a missing template becomes
/// a 404, a render failure a 500.
#[derive(Debug)]
pub enum RenderError {
    NotFound(PathBuf),
    Render(String),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "template not found: {}", path.display()),
            Self::Render(detail) => write!(f, "template render failed: {detail}"),
        }
    }
}

impl std::error::Error for RenderError {}

/// Resolve a template path: as given if it exists, otherwise joined to the
/// template root.
#[must_use]
pub fn resolve(filepath: &Path, template_root: Option<&Path>) -> PathBuf {
    if filepath.exists() {
        return filepath.to_path_buf();
    }
    match template_root {
        Some(root) => root.join(filepath),
        None => filepath.to_path_buf(),
    }
}

/// Render a template file with the given variables.
///
/// # Errors
///
/// `NotFound` when the resolved file does not exist, `Render` for any
/// template or I/O failure after that.
pub fn render_file(
    filepath: &Path,
    vars: &Value,
    template_root: Option<&Path>,
) -> Result<String, RenderError> {
    let path = resolve(filepath, template_root);
    if !path.is_file() {
        return Err(RenderError::NotFound(path));
    }
    let source =
        std::fs::read_to_string(&path).map_err(|e| RenderError::Render(e.to_string()))?;
    let mut env = Environment::new();
    env.add_template("tpl", &source)
        .map_err(|e| RenderError::Render(e.to_string()))?;
    let tmpl = env
        .get_template("tpl")
        .map_err(|e| RenderError::Render(e.to_string()))?;
    tmpl.render(vars).map_err(|e| RenderError::Render(e.to_string()))
}
