//! Selected-file model: extension validation and output-name derivation.
//!
//! Validation stops at the extension on purpose. The service re-validates
//! server-side and does the real format work; checking more here would only
//! duplicate its rules and drift out of sync with them.

use std::path::{Path, PathBuf};

/// Extensions the conversion service accepts, compared case-insensitively
/// against the suffix after the final `.` of the file name.
pub const ACCEPTED_EXTENSIONS: [&str; 2] = ["xlsx", "xls"];

/// Message surfaced when a selected file has a non-Excel extension.
pub const SELECTION_ERROR: &str = "Please select a valid Excel file (.xlsx or .xls)";

/// The user's chosen workbook. At most one exists per flow cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    /// File-name component, as shown to the user and sent to the service.
    pub name: String,
    /// Full path, read at upload time.
    pub path: PathBuf,
}

impl SelectedFile {
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            name,
            path: path.to_path_buf(),
        }
    }

    /// Lowercase suffix after the final `.`. A name without a dot yields the
    /// whole name, which never matches an accepted extension.
    pub fn extension(&self) -> String {
        extension_of(&self.name)
    }

    pub fn is_convertible(&self) -> bool {
        ACCEPTED_EXTENSIONS.contains(&self.extension().as_str())
    }
}

/// Extension of a bare file name: the segment after the last `.`, lowercased.
pub fn extension_of(name: &str) -> String {
    name.rsplit('.').next().unwrap_or(name).to_ascii_lowercase()
}

/// Name for the downloaded artifact: the original name with its last
/// dot-suffix stripped, plus `.csv`.
///
/// `"Sales Q1.xlsx"` becomes `"Sales Q1.csv"`; a name with no dot keeps its
/// whole stem, so `"data"` becomes `"data.csv"`.
pub fn derive_output_name(name: &str) -> String {
    let stem = name.rfind('.').map(|idx| &name[..idx]).unwrap_or(name);
    format!("{stem}.csv")
}
