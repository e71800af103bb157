//! The loading pipeline: source text to a validated directive stream.
//!
//! [`load`] (or [`load_string`]) runs the whole pipeline:
//!
//! 1. parse the top-level file, collecting options, plugins, and includes
//! 2. resolve `include` paths relative to the containing file and recurse,
//!    deduplicating by canonical path and refusing cycles
//! 3. aggregate options (top-level file dominates; included files only
//!    union their operating currencies) and plugins (first occurrence kept)
//! 4. sort the combined stream by (date, rank, declaration order)
//! 5. book, 6. pad, 7. validate; every stage runs on the previous stage's
//!    output and appends to the shared error list
//! 8. digest the loaded files into a stable input hash
//!
//! GPG-encrypted sources (`.gpg`, or `.asc` with a PGP header) are
//! decrypted through the system `gpg` before parsing. An unreadable file
//! records an error for that file and loading continues.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod options;
mod source_map;

pub use options::{OptionWarning, Options};
pub use source_map::{SourceFile, SourceMap};

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

use tally_booking::{book, process_pads, BookError, PadError};
use tally_core::{sort_directives, Directive};
use tally_parser::{ParseError, Span};
use tally_validate::{validate_with_options, ValidationError, ValidationOptions};

/// A host-level loading failure.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// A file could not be read.
    #[error("failed to read {path}: {message}")]
    Io {
        /// The unreadable path.
        path: PathBuf,
        /// The underlying error text.
        message: String,
    },

    /// Includes form a cycle.
    #[error("include cycle detected: {}", .cycle.join(" -> "))]
    IncludeCycle {
        /// The file chain forming the cycle.
        cycle: Vec<String>,
    },

    /// GPG decryption failed.
    #[error("failed to decrypt {path}: {message}")]
    Decryption {
        /// The encrypted file.
        path: PathBuf,
        /// What gpg reported.
        message: String,
    },
}

/// Any error the pipeline can produce, in one stream.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// File-level failure.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Syntax error, with the file it came from.
    #[error("{path}: {error}")]
    Parse {
        /// File containing the error.
        path: PathBuf,
        /// The parse error.
        error: ParseError,
    },

    /// Booking failure.
    #[error(transparent)]
    Book(#[from] BookError),

    /// Pad processing failure.
    #[error(transparent)]
    Pad(#[from] PadError),

    /// Validation failure.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// A plugin declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugin {
    /// Plugin module name.
    pub name: String,
    /// Optional configuration string.
    pub config: Option<String>,
    /// Where it was declared.
    pub span: Span,
    /// Source map id of the declaring file.
    pub file_id: usize,
}

/// The loader's result: the fully processed stream plus everything learned
/// along the way.
#[derive(Debug)]
pub struct LoadResult {
    /// Sorted, booked, padded directives.
    pub directives: Vec<Directive>,
    /// Aggregated options.
    pub options: Options,
    /// Declared plugins, first occurrence kept.
    pub plugins: Vec<Plugin>,
    /// Every loaded file and its text.
    pub source_map: SourceMap,
    /// All parse, booking, pad, and validation errors.
    pub errors: Vec<LedgerError>,
    /// SHA-256 over the loaded file names and their content digests.
    pub input_hash: String,
}

impl LoadResult {
    /// Whether the load produced no errors.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check if a file is GPG-encrypted by extension or content.
fn is_encrypted_file(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some("gpg") => true,
        Some("asc") => fs::read_to_string(path).is_ok_and(|content| {
            content
                .lines()
                .take(10)
                .any(|line| line.contains("-----BEGIN PGP MESSAGE-----"))
        }),
        _ => false,
    }
}

/// Decrypt through the system `gpg`, using the user's keyring and agent.
fn decrypt_gpg_file(path: &Path) -> Result<String, LoadError> {
    let output = Command::new("gpg")
        .args(["--batch", "--decrypt"])
        .arg(path)
        .output()
        .map_err(|e| LoadError::Decryption {
            path: path.to_path_buf(),
            message: format!("failed to run gpg: {e}"),
        })?;

    if !output.status.success() {
        return Err(LoadError::Decryption {
            path: path.to_path_buf(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    String::from_utf8(output.stdout).map_err(|e| LoadError::Decryption {
        path: path.to_path_buf(),
        message: format!("decrypted content is not valid UTF-8: {e}"),
    })
}

/// The recursive include walker.
#[derive(Debug, Default)]
struct Walker {
    /// Canonical paths already loaded, to dedupe diamond includes.
    loaded: HashSet<PathBuf>,
    /// The active include chain, for cycle detection.
    stack: Vec<PathBuf>,
}

/// Accumulated state while walking the include tree.
#[derive(Debug, Default)]
struct Gathered {
    directives: Vec<Directive>,
    options: Options,
    plugins: Vec<Plugin>,
    source_map: SourceMap,
    errors: Vec<LedgerError>,
}

impl Walker {
    fn walk_file(&mut self, path: &Path, depth: usize, gathered: &mut Gathered) {
        let canonical = match path.canonicalize() {
            Ok(p) => p,
            Err(e) => {
                gathered.errors.push(
                    LoadError::Io {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    }
                    .into(),
                );
                return;
            }
        };

        if self.stack.contains(&canonical) {
            let mut cycle: Vec<String> = self
                .stack
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            cycle.push(canonical.display().to_string());
            gathered
                .errors
                .push(LoadError::IncludeCycle { cycle }.into());
            return;
        }
        if !self.loaded.insert(canonical.clone()) {
            return;
        }

        let source = if is_encrypted_file(&canonical) {
            match decrypt_gpg_file(&canonical) {
                Ok(source) => source,
                Err(e) => {
                    gathered.errors.push(e.into());
                    return;
                }
            }
        } else {
            match fs::read_to_string(&canonical) {
                Ok(source) => source,
                Err(e) => {
                    gathered.errors.push(
                        LoadError::Io {
                            path: canonical.clone(),
                            message: e.to_string(),
                        }
                        .into(),
                    );
                    return;
                }
            }
        };

        self.stack.push(canonical.clone());
        let base_dir = canonical
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        self.walk_source(&canonical, &base_dir, source, depth, gathered);
        self.stack.pop();
    }

    fn walk_source(
        &mut self,
        path: &Path,
        base_dir: &Path,
        source: String,
        depth: usize,
        gathered: &mut Gathered,
    ) {
        let result = tally_parser::parse(&source);
        let file_id = gathered
            .source_map
            .add_file(path.to_path_buf(), source);

        for error in result.errors {
            gathered.errors.push(LedgerError::Parse {
                path: path.to_path_buf(),
                error,
            });
        }

        for (key, value, _span) in &result.options {
            if depth == 0 {
                gathered.options.set(key, value);
            } else {
                gathered.options.merge_included(key, value);
            }
        }

        for (name, config, span) in result.plugins {
            let duplicate = gathered
                .plugins
                .iter()
                .any(|p| p.name == name && p.config == config);
            if !duplicate {
                gathered.plugins.push(Plugin {
                    name,
                    config,
                    span,
                    file_id,
                });
            }
        }

        for (include_path, _span) in &result.includes {
            let full_path = base_dir.join(include_path);
            self.walk_file(&full_path, depth + 1, gathered);
        }

        gathered
            .directives
            .extend(result.directives.into_iter().map(|d| d.value));
    }
}

/// Load a ledger file and everything it includes.
#[must_use]
pub fn load(path: &Path) -> LoadResult {
    let mut gathered = Gathered::default();
    let mut walker = Walker::default();
    walker.walk_file(path, 0, &mut gathered);
    if gathered.options.filename.is_none() {
        gathered.options.filename = Some(path.display().to_string());
    }
    finish(gathered)
}

/// Load a ledger from a literal string.
///
/// Includes are resolved relative to the current directory.
#[must_use]
pub fn load_string(source: &str) -> LoadResult {
    let mut gathered = Gathered::default();
    let mut walker = Walker::default();
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    walker.walk_source(
        Path::new("<string>"),
        &cwd,
        source.to_string(),
        0,
        &mut gathered,
    );
    finish(gathered)
}

/// Run the pipeline stages over the gathered directives.
fn finish(gathered: Gathered) -> LoadResult {
    let Gathered {
        mut directives,
        options,
        plugins,
        source_map,
        mut errors,
    } = gathered;

    sort_directives(&mut directives);

    let booking_options = options.booking_options();
    let (booked, book_errors) = book(directives, &booking_options);
    errors.extend(book_errors.into_iter().map(LedgerError::from));

    let (padded, pad_errors) = process_pads(booked);
    errors.extend(pad_errors.into_iter().map(LedgerError::from));

    let validation_options = ValidationOptions {
        booking: booking_options,
    };
    let validation_errors = validate_with_options(&padded, &validation_options);
    errors.extend(validation_errors.into_iter().map(LedgerError::from));

    let input_hash = compute_input_hash(&source_map);

    LoadResult {
        directives: padded,
        options,
        plugins,
        source_map,
        errors,
        input_hash,
    }
}

/// SHA-256 over the sorted loaded file names and their content digests.
fn compute_input_hash(source_map: &SourceMap) -> String {
    let mut entries: Vec<(String, [u8; 32])> = source_map
        .files()
        .iter()
        .map(|file| {
            let digest = Sha256::digest(file.source.as_bytes());
            (file.path.display().to_string(), digest.into())
        })
        .collect();
    entries.sort();

    let mut hasher = Sha256::new();
    for (path, digest) in entries {
        hasher.update(path.as_bytes());
        hasher.update([0]);
        hasher.update(digest);
    }
    format!("{:x}", hasher.finalize())
}
