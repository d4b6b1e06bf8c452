//! Handler spec parsing and path resolution

use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

use crate::loader::LoadError;

/// Separator between the file path and the export name
pub const SPEC_DELIMITER: char = ':';

const EXPECTED_FORMAT: &str = "Expected format: /abs/path/file.js:exportName";

/// A parsed `path:exportName` handler spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSpec {
    raw: String,
    file_path: String,
    export_name: String,
}

impl HandlerSpec {
    /// Parse a handler spec
    ///
    /// Splits on the last `:` so Windows drive letters (`C:\h.js:main`) keep
    /// working. Both halves must be non-empty.
    pub fn parse(spec: &str) -> Result<Self, LoadError> {
        let Some(idx) = spec.rfind(SPEC_DELIMITER) else {
            return Err(LoadError::InvalidSpec(format!(
                "Invalid handlerPath '{spec}': no '{SPEC_DELIMITER}' delimiter found. {EXPECTED_FORMAT}"
            )));
        };

        let (file_path, export_name) = (&spec[..idx], &spec[idx + 1..]);
        if file_path.is_empty() || export_name.is_empty() {
            return Err(LoadError::InvalidSpec(format!(
                "Invalid handlerPath '{spec}': path and export name must both be non-empty. {EXPECTED_FORMAT}"
            )));
        }

        Ok(Self {
            raw: spec.to_string(),
            file_path: file_path.to_string(),
            export_name: export_name.to_string(),
        })
    }

    /// The handler string exactly as the caller wrote it
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn export_name(&self) -> &str {
        &self.export_name
    }

    /// Absolute, normalized path of the handler file
    pub fn resolve_path(&self) -> Result<PathBuf, LoadError> {
        let normalized = normalize_separators(&self.file_path);
        let path = Path::new(&normalized);
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            let cwd = std::env::current_dir().map_err(|source| LoadError::FileRead {
                path: path.to_path_buf(),
                source,
            })?;
            cwd.join(path)
        };
        Ok(clean_path(&absolute))
    }
}

impl std::fmt::Display for HandlerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Collapse runs of `/` and `\` into a single platform separator
fn normalize_separators(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut in_separator = false;
    for c in path.chars() {
        if c == '/' || c == '\\' {
            if !in_separator {
                out.push(MAIN_SEPARATOR);
            }
            in_separator = true;
        } else {
            out.push(c);
            in_separator = false;
        }
    }
    out
}

/// Lexically resolve `.` and `..` without touching the filesystem
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
