//! Typed wrappers turning tool parameters into `StageRequest`s.
//!
//! Each function only builds the request; running it is up to the
//! `StageRunner`.

use std::path::{Path, PathBuf};

use crate::pipeline::stage::StageRequest;

pub mod align;
pub mod annotate;
pub mod assemble;
pub mod download;
pub mod fusion;
pub mod intervals;
pub mod lncrna;
pub mod quantify;
pub mod strand;
pub mod trim;
pub mod variants;

/// Quote `s` for use in a `bash -c` script.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@%".contains(c))
    {
        s.to_owned()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

/// Quoted path for use in a `bash -c` script.
pub fn shell_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

/// Request running `script` with `bash`, failing on errors inside pipes.
pub fn bash_request(name: impl Into<String>, script: &str) -> StageRequest {
    StageRequest::new(name, "bash")
        .arg("-c")
        .arg(format!("set -euo pipefail; {}", script))
}

/// File name of `path` for use in stage names.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `path` with `suffix` appended to its file name.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// `path` without a trailing `.gz`.
pub fn without_gz(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("gz") => path.with_extension(""),
        _ => path.to_path_buf(),
    }
}

/// `<dir>/<stem>.<infix>.<ext>` for `path`, e.g., `genes.filtered.gtf`.
///
/// A trailing `.gz` is dropped as the derived files are written uncompressed.
pub fn with_infix(path: &Path, infix: &str) -> PathBuf {
    let path = without_gz(path);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}.{}.{}", stem, infix, ext.to_string_lossy()),
        None => format!("{}.{}", stem, infix),
    };
    path.with_file_name(name)
}

/// Whether `path` looks like a GFF3 file, as opposed to GTF.
pub fn is_gff3(path: &Path) -> bool {
    without_gz(path)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gff3") || ext.eq_ignore_ascii_case("gff"))
        .unwrap_or(false)
}
