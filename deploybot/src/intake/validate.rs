//! Input validation for the intake conversation

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Entry-point filenames, in priority order
pub const ENTRY_POINTS: [&str; 4] = ["main.py", "bot.py", "app.py", "__main__.py"];

/// Dependency manifest filename
pub const MANIFEST: &str = "requirements.txt";

/// Package every deployed bot is expected to depend on
pub const CHAT_FRAMEWORK_PACKAGE: &str = "python-telegram-bot";

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]{2,29}$").expect("valid name regex"));

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{8,11}:[A-Za-z0-9_-]{35}$").expect("valid token regex"));

/// A user-correctable intake rejection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("Name must be 3-30 characters: lowercase letters, digits and hyphens, starting with a letter")]
    InvalidName,

    #[error("Name `{0}` is already in use")]
    NameTaken(String),

    #[error("Token must look like `<8-11 digits>:<35 characters>`")]
    InvalidTokenFormat,

    #[error("Token was not accepted: {0}")]
    TokenRejected(String),

    #[error("`{name}` is {size} bytes, the limit is {limit} bytes")]
    FileTooLarge { name: String, size: usize, limit: usize },

    #[error("`{0}` is not a UTF-8 text file")]
    NotText(String),

    #[error("`{0}` is not a valid filename")]
    InvalidFilename(String),

    #[error("At most {0} files can be uploaded")]
    TooManyFiles(usize),

    #[error("No entry point uploaded yet, send one of: {}", ENTRY_POINTS.join(", "))]
    MissingEntryPoint,

    #[error("You are not allowed to deploy")]
    AccessDenied,
}

/// Validate a candidate deployment name (shape only)
pub fn check_name(name: &str) -> Result<(), Rejection> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(Rejection::InvalidName)
    }
}

/// Validate the shape of a bot token
pub fn check_token_shape(token: &str) -> Result<(), Rejection> {
    if TOKEN_RE.is_match(token) {
        Ok(())
    } else {
        Err(Rejection::InvalidTokenFormat)
    }
}

/// Validate an uploaded filename. Paths are not allowed.
pub fn check_filename(filename: &str) -> Result<(), Rejection> {
    let invalid = filename.is_empty()
        || filename.len() > 255
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\', '\0']);
    if invalid {
        Err(Rejection::InvalidFilename(filename.to_string()))
    } else {
        Ok(())
    }
}

/// Decode uploaded bytes as text, enforcing the size cap
pub fn decode_text(filename: &str, bytes: &[u8], limit: usize) -> Result<String, Rejection> {
    if bytes.len() > limit {
        return Err(Rejection::FileTooLarge {
            name: filename.to_string(),
            size: bytes.len(),
            limit,
        });
    }
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8(bytes.to_vec()).map_err(|_| Rejection::NotText(filename.to_string()))
}

/// Whether `filename` is a recognized entry point
pub fn is_entry_point(filename: &str) -> bool {
    ENTRY_POINTS.contains(&filename)
}

/// Parse a dependency manifest into deduplicated package names
pub fn parse_manifest(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut packages = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
            continue;
        }
        let name = line
            .split(|c: char| matches!(c, '<' | '>' | '=' | '~' | '!' | ';' | '[') || c.is_whitespace())
            .next()
            .unwrap_or("")
            .trim();
        if !name.is_empty() && seen.insert(name.to_lowercase()) {
            packages.push(name.to_string());
        }
    }

    packages
}

/// Heuristic check that an entry point is a chat bot
pub fn looks_like_bot(content: &str) -> bool {
    content.contains("Application") || content.contains("Updater")
}

/// Whether the manifest lists the chat framework
pub fn has_chat_framework(deps: &[String]) -> bool {
    deps.iter()
        .any(|d| d.to_lowercase().contains(CHAT_FRAMEWORK_PACKAGE))
}
