//! Locally stored repository auth tokens
//!
//! One file per URL prefix in the token directory, named
//! `<form-urlencoded url>.token` and holding the token text.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::form_urlencoded;

use super::TokenLookup;
use crate::baked::{normalize_url, TokenTable, CLOUD_REPO_ROOT};
use crate::error::Result;

const TOKEN_EXT: &str = ".token";

/// Token directory of the host client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoTokenStore {
    dir: PathBuf,
}

impl RepoTokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds the token for `url`
    pub fn token_path(&self, url: &str) -> PathBuf {
        let encoded: String = form_urlencoded::byte_serialize(url.as_bytes()).collect();
        self.dir.join(format!("{}{}", encoded, TOKEN_EXT))
    }

    /// Every stored token, ordered by file name
    ///
    /// A missing directory or unreadable file contributes nothing.
    pub fn read_tokens(&self) -> TokenTable {
        self.entries()
            .into_iter()
            .filter_map(|(url, path)| match fs::read_to_string(&path) {
                Ok(token) if !token.trim().is_empty() => Some((url, token.trim().to_string())),
                Ok(_) => None,
                Err(e) => {
                    debug!("Unable to read token {}: {}", path.display(), e);
                    None
                }
            })
            .collect()
    }

    /// Store `token` for `url` and make the file read-only
    ///
    /// The cloud repository root is stored under its `repo/` path.
    pub fn write_token(&self, url: &str, token: &str) -> Result<PathBuf> {
        let mut url = normalize_url(url);
        if url == CLOUD_REPO_ROOT {
            url.push_str("repo/");
        }
        fs::create_dir_all(&self.dir)?;
        let path = self.token_path(&url);
        if path.exists() {
            set_writable(&path)?;
        }
        fs::write(&path, token)?;
        set_readonly(&path)?;
        info!("Installed token for {}", url);
        Ok(path)
    }

    /// Remove stored tokens whose URL starts with `url`
    ///
    /// Returns the removed URLs.
    pub fn remove_conflicting(&self, url: &str) -> Result<Vec<String>> {
        let prefix = normalize_url(url);
        let mut removed = Vec::new();
        for (stored, path) in self.entries() {
            if !stored.starts_with(&prefix) {
                continue;
            }
            set_writable(&path)?;
            fs::remove_file(&path)?;
            info!("Removed existing token for {}", stored);
            removed.push(stored);
        }
        Ok(removed)
    }

    fn entries(&self) -> Vec<(String, PathBuf)> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!("Unable to list {}: {}", self.dir.display(), e);
                }
                return Vec::new();
            }
        };
        let mut entries: Vec<(String, PathBuf)> = read_dir
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let stem = name.strip_suffix(TOKEN_EXT)?;
                let (url, _) = form_urlencoded::parse(stem.as_bytes()).next()?;
                Some((url.into_owned(), entry.path()))
            })
            .collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1));
        entries
    }
}

impl TokenLookup for RepoTokenStore {
    fn token_for_url(&self, url: &str) -> Option<String> {
        self.read_tokens()
            .longest_prefix_match(url)
            .map(str::to_string)
    }
}

#[cfg(unix)]
fn set_writable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perm = fs::metadata(path)?.permissions();
    perm.set_mode(perm.mode() | 0o200);
    fs::set_permissions(path, perm)
}

#[cfg(not(unix))]
fn set_writable(path: &Path) -> io::Result<()> {
    let mut perm = fs::metadata(path)?.permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    perm.set_readonly(false);
    fs::set_permissions(path, perm)
}

fn set_readonly(path: &Path) -> io::Result<()> {
    let mut perm = fs::metadata(path)?.permissions();
    perm.set_readonly(true);
    fs::set_permissions(path, perm)
}
