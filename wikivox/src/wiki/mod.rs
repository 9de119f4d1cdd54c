//! Wiki page/file repository seam
//!
//! The pipeline talks to the wiki only through [`WikiRepo`]; production
//! uses the MediaWiki HTTP client, tests use an in-memory fake.

pub mod mediawiki;

pub use mediawiki::MediaWikiClient;

use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

/// Wiki transport errors
#[derive(Debug, Error)]
pub enum WikiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Wiki API error {code}: {info}")]
    Api { code: String, info: String },

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("File not found on wiki: {0}")]
    FileNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How to resolve a "duplicate of" upload warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DuplicatePolicy {
    /// Leave both files alone
    #[default]
    Ignore,
    /// Turn the new title into a redirect to the existing file
    Redirect,
    /// Rename the existing file to the new title
    RenameExisting,
}

/// Outcome of a single file upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded,
    /// Target already exists with identical content; quiet success
    AlreadyExists,
    /// Target was previously deleted on the wiki; skipped
    WasDeleted,
    /// Identical content exists under another title
    DuplicateOf(String),
}

/// One file upload
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Target file title (without `File:` prefix)
    pub file_name: String,
    pub local_path: std::path::PathBuf,
    /// Initial page text; carries the category tag
    pub text: String,
    pub comment: String,
    /// Re-upload over an existing file
    pub ignore_warnings: bool,
}

/// Abstract page/file repository
pub trait WikiRepo {
    /// Current page text, or None for a missing page
    fn get_page(
        &self,
        title: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, WikiError>> + Send;

    fn save_page(
        &self,
        title: &str,
        text: &str,
        summary: &str,
    ) -> impl std::future::Future<Output = Result<(), WikiError>> + Send;

    /// File titles in a category; the authoritative remote set
    fn category_files(
        &self,
        category: &str,
    ) -> impl std::future::Future<Output = Result<BTreeSet<String>, WikiError>> + Send;

    fn upload_file(
        &self,
        request: &UploadRequest,
    ) -> impl std::future::Future<Output = Result<UploadOutcome, WikiError>> + Send;

    /// Download a wiki-hosted file to a local destination
    fn download_file(
        &self,
        file_name: &str,
        dest: &Path,
    ) -> impl std::future::Future<Output = Result<(), WikiError>> + Send;

    /// Move a page (and its file, for `File:` titles) to a new title
    fn move_page(
        &self,
        from: &str,
        to: &str,
        reason: &str,
    ) -> impl std::future::Future<Output = Result<(), WikiError>> + Send;
}
