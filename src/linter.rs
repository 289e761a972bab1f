//! Declaration linting - static analysis of inclusion schema declarations.
//!
//! Checks declaration files for:
//! - JSON syntax errors
//! - Shape errors against the declaration schema
//! - Relationships pointing at undeclared resource types
//! - Illegal member names
//! - Suspicious flag combinations

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::LoadError;
use crate::loader::load_document;
use crate::schema::Declaration;
use crate::types::is_member_name;
use crate::validator::validate_declaration;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic message from linting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    /// JSON pointer to the issue (e.g., "/resources/actors/relationships/movies")
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn error(code: &str, path: String, message: String) -> Self {
        Self {
            severity: Severity::Error,
            code: code.to_string(),
            path,
            message,
        }
    }

    fn warning(code: &str, path: String, message: String) -> Self {
        Self {
            severity: Severity::Warning,
            code: code.to_string(),
            path,
            message,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.code, self.path, self.message)
    }
}

/// Result of linting a single file.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub file: PathBuf,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Status of a linted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Ok,
    Error,
    Warning,
}

/// Result of linting a directory or set of files.
#[derive(Debug, Clone, Serialize)]
pub struct LintResult {
    pub path: PathBuf,
    pub files_checked: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub warnings: usize,
    pub results: Vec<FileResult>,
}

impl LintResult {
    /// Returns true if no file produced an error.
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }
}

/// Lint a file or directory.
///
/// If path is a directory, recursively finds all .json files.
/// If `strict` is true, warnings are treated as errors.
pub fn lint(path: &Path, strict: bool) -> LintResult {
    let files = collect_declaration_files(path);
    let mut results = Vec::new();
    let mut total_errors = 0;
    let mut total_warnings = 0;

    for file in &files {
        let file_result = lint_file(file, path);
        total_errors += file_result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count();
        total_warnings += file_result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count();
        results.push(file_result);
    }

    let failed = results
        .iter()
        .filter(|r| {
            if strict {
                r.status != FileStatus::Ok
            } else {
                r.status == FileStatus::Error
            }
        })
        .count();

    LintResult {
        path: path.to_path_buf(),
        files_checked: files.len(),
        passed: files.len() - failed,
        failed,
        errors: total_errors,
        warnings: total_warnings,
        results,
    }
}

/// Lint a single declaration file.
pub fn lint_file(file: &Path, base_path: &Path) -> FileResult {
    let diagnostics = match check_file(file) {
        Ok(diagnostics) => diagnostics,
        Err(diagnostic) => vec![diagnostic],
    };

    for d in &diagnostics {
        tracing::debug!(file = %file.display(), code = %d.code, path = %d.path, "{}", d.message);
    }

    let status = if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        FileStatus::Error
    } else if diagnostics.is_empty() {
        FileStatus::Ok
    } else {
        FileStatus::Warning
    };

    FileResult {
        file: file.strip_prefix(base_path).unwrap_or(file).to_path_buf(),
        status,
        diagnostics,
    }
}

/// Load, shape check and semantically check one file. A load or shape
/// failure ends the check early with a single diagnostic per problem.
fn check_file(file: &Path) -> Result<Vec<Diagnostic>, Diagnostic> {
    let value = load_document(file).map_err(|e| {
        Diagnostic::error("E001", "/".to_string(), format!("syntax error: {}", e))
    })?;

    match validate_declaration(&value) {
        Ok(()) => {}
        Err(LoadError::InvalidDocument { errors }) => {
            return Ok(errors
                .into_iter()
                .map(|e| Diagnostic::error("E002", pointer_or_root(e.path), e.message))
                .collect());
        }
        Err(e) => return Err(Diagnostic::error("E002", "/".to_string(), e.to_string())),
    }

    let declaration = Declaration::from_value(&value)
        .map_err(|e| Diagnostic::error("E002", "/".to_string(), e.to_string()))?;
    Ok(check_declaration(&declaration, &[]))
}

fn pointer_or_root(path: String) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path
    }
}

/// Check a parsed declaration for problems the document shape cannot
/// express.
///
/// `external_types` are resource types provided outside the declaration,
/// e.g. hand written schemas registered next to it.
///
/// Errors:
/// - `E003` relationship targets an unknown resource type
/// - `E004` resource type, relationship or field is not a legal member name
///
/// Warnings:
/// - `W001` default relationship that is not includable
/// - `W002` filterable field without lookups
/// - `W003` default relationship back to its own resource type
pub fn check_declaration(declaration: &Declaration, external_types: &[&str]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let known = |rtype: &str| {
        declaration.resources.contains_key(rtype) || external_types.contains(&rtype)
    };

    for (rtype, resource) in &declaration.resources {
        let base = format!("/resources/{}", rtype);
        check_name(&mut diagnostics, &base, "resource type", rtype);

        for (name, rel) in &resource.relationships {
            let path = format!("{}/relationships/{}", base, name);
            check_name(&mut diagnostics, &path, "relationship", name);

            if !known(&rel.target) {
                diagnostics.push(Diagnostic::error(
                    "E003",
                    format!("{}/type", path),
                    format!(
                        "relationship \"{}\" of \"{}\" targets unknown resource type \"{}\"",
                        name, rtype, rel.target
                    ),
                ));
            }
            if rel.default && !rel.includable {
                diagnostics.push(Diagnostic::warning(
                    "W001",
                    format!("{}/default", path),
                    format!(
                        "relationship \"{}\" is included by default but not includable",
                        name
                    ),
                ));
            }
            if rel.default && rel.includable && rel.target == *rtype {
                diagnostics.push(Diagnostic::warning(
                    "W003",
                    format!("{}/default", path),
                    format!(
                        "relationship \"{}\" includes \"{}\" into itself by default",
                        name, rtype
                    ),
                ));
            }
        }

        for (i, field) in resource.sortable.iter().enumerate() {
            check_name(
                &mut diagnostics,
                &format!("{}/sortable/{}", base, i),
                "sortable field",
                field,
            );
        }

        for (field, lookups) in &resource.filterable {
            let path = format!("{}/filterable/{}", base, field);
            check_name(&mut diagnostics, &path, "filterable field", field);
            if lookups.is_empty() {
                diagnostics.push(Diagnostic::warning(
                    "W002",
                    path,
                    format!("filterable field \"{}\" allows no lookups", field),
                ));
            }
        }
    }

    diagnostics
}

fn check_name(diagnostics: &mut Vec<Diagnostic>, path: &str, kind: &str, name: &str) {
    if !is_member_name(name) {
        diagnostics.push(Diagnostic::error(
            "E004",
            path.to_string(),
            format!("{} \"{}\" is not a legal member name", kind, name),
        ));
    }
}

/// Collect all .json files in a path (file or directory).
fn collect_declaration_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            return vec![path.to_path_buf()];
        }
        return vec![];
    }

    let mut files = Vec::new();
    collect_files_recursive(path, &mut files);
    files.sort();
    files
}

fn collect_files_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files_recursive(&path, files);
        } else if path.extension().map(|e| e == "json").unwrap_or(false) {
            files.push(path);
        }
    }
}
