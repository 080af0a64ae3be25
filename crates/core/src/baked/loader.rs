//! Baked repository tokens
//!
//! The loader re-parses the baked file only when its modification time
//! changes; every other access costs one `stat`.

use serde_yaml::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::debug;

use super::table::{normalize_url, TokenTable};
use crate::auth::TokenLookup;
use crate::config::REPO_TOKENS_KEY;

/// Cloud repository root that is also addressed under `repo/`
pub const CLOUD_REPO_ROOT: &str = "https://repo.anaconda.cloud/";

#[derive(Debug)]
struct Cached {
    modified: Option<SystemTime>,
    table: Arc<TokenTable>,
}

/// Reads `repo_tokens` from the baked configuration file
#[derive(Debug)]
pub struct BakedTokenLoader {
    path: PathBuf,
    cache: Mutex<Option<Cached>>,
}

impl BakedTokenLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current baked table, keys normalized to end with `/`
    pub fn tokens(&self) -> Arc<TokenTable> {
        let modified = fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = cache.as_ref() {
            if cached.modified == modified {
                return Arc::clone(&cached.table);
            }
        }

        let table = Arc::new(self.load());
        *cache = Some(Cached {
            modified,
            table: Arc::clone(&table),
        });
        table
    }

    /// Only `repo_tokens` is read, so other keys cannot spoil the table
    fn load(&self) -> TokenTable {
        debug!("Loading baked tokens from {}", self.path.display());
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return TokenTable::new(),
            Err(e) => {
                debug!("Unable to read baked tokens: {}", e);
                return TokenTable::new();
            }
        };
        let document: Value = match serde_yaml::from_str(&text) {
            Ok(document) => document,
            Err(e) => {
                debug!("Unable to parse baked tokens: {}", e);
                return TokenTable::new();
            }
        };
        let Some(value) = document.get(REPO_TOKENS_KEY).filter(|v| !v.is_null()) else {
            return TokenTable::new();
        };
        match TokenTable::from_yaml(value) {
            Some(table) => table
                .iter()
                .map(|(url, token)| (normalize_url(url), token.to_string()))
                .collect(),
            None => {
                debug!("Ignoring baked {}: not a mapping", REPO_TOKENS_KEY);
                TokenTable::new()
            }
        }
    }

    /// Token for `url`; the first baked prefix in file order wins
    pub fn load_token_for_url(&self, url: &str) -> Option<String> {
        self.tokens().first_prefix_match(url).map(str::to_string)
    }

    /// Fill gaps in `existing` with baked tokens
    ///
    /// A baked prefix is skipped when any key already in `existing` overlaps
    /// it as a prefix in either direction.
    pub fn merge_baked_tokens(&self, existing: &mut TokenTable) {
        let explicit: Vec<String> = existing.keys().map(normalize_url).collect();
        for (url, token) in self.tokens().iter() {
            if explicit
                .iter()
                .any(|key| key.starts_with(url) || url.starts_with(key.as_str()))
            {
                debug!("Keeping explicit token over baked token for {}", url);
                continue;
            }
            existing.insert(url, token);
            if url == CLOUD_REPO_ROOT {
                existing.insert(format!("{}repo/", url), token);
            }
        }
    }
}

impl TokenLookup for BakedTokenLoader {
    fn token_for_url(&self, url: &str) -> Option<String> {
        self.load_token_for_url(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_baked(path: &Path, text: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn bump_mtime(path: &Path, secs: u64) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(secs))
            .unwrap();
    }

    fn table(entries: &[(&str, &str)]) -> TokenTable {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let loader = BakedTokenLoader::new(dir.path().join("etc/pkgident.yml"));
        assert!(loader.tokens().is_empty());
        assert_eq!(loader.load_token_for_url("https://repo.example.com/main"), None);
    }

    #[test]
    fn test_lookup_normalizes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etc/pkgident.yml");
        write_baked(
            &path,
            "repo_tokens:\n  https://repo.example.com: tok1\n  https://repo.example.com/org/: tok2\n",
        );
        let loader = BakedTokenLoader::new(&path);
        assert_eq!(
            loader.tokens().keys().collect::<Vec<_>>(),
            vec!["https://repo.example.com/", "https://repo.example.com/org/"]
        );
        assert_eq!(
            loader.load_token_for_url("https://repo.example.com"),
            Some("tok1".to_string())
        );
        // File order wins over specificity
        assert_eq!(
            loader.token_for_url("https://repo.example.com/org/main/"),
            Some("tok1".to_string())
        );
    }

    #[test]
    fn test_reload_on_mtime_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etc/pkgident.yml");
        write_baked(&path, "repo_tokens:\n  https://a.example/: old\n");
        let loader = BakedTokenLoader::new(&path);
        let first = loader.tokens();
        assert!(Arc::ptr_eq(&first, &loader.tokens()));

        fs::write(&path, "repo_tokens:\n  https://a.example/: new\n").unwrap();
        bump_mtime(&path, 10);
        assert_eq!(loader.load_token_for_url("https://a.example/"), Some("new".to_string()));
    }

    #[test]
    fn test_unparseable_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etc/pkgident.yml");
        write_baked(&path, "repo_tokens: [unclosed\n");
        assert!(BakedTokenLoader::new(&path).tokens().is_empty());
    }

    #[test]
    fn test_merge_fills_gaps_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etc/pkgident.yml");
        write_baked(
            &path,
            "repo_tokens:\n  https://a.example/sub/: T2\n  https://b.example/: T3\n",
        );
        let loader = BakedTokenLoader::new(&path);
        let mut existing = table(&[("https://a.example/", "T1")]);
        loader.merge_baked_tokens(&mut existing);
        assert_eq!(existing.get("https://a.example/"), Some("T1"));
        assert_eq!(existing.get("https://b.example/"), Some("T3"));
        assert!(!existing.contains_key("https://a.example/sub/"));
    }

    #[test]
    fn test_bad_sibling_keys_keep_tokens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etc/pkgident.yml");
        for extra in [
            "default_channels: https://repo.example.com/main",
            "add_repo_token: yes",
            "channel_alias: 5",
            "pkgident_heartbeat: [1, 2]",
        ] {
            write_baked(
                &path,
                &format!("pkgident: full:acme\nrepo_tokens:\n  https://repo.example.com/: tok\n{}\n", extra),
            );
            let loader = BakedTokenLoader::new(&path);
            assert_eq!(
                loader.load_token_for_url("https://repo.example.com/main"),
                Some("tok".to_string()),
                "{}",
                extra
            );
        }
    }

    #[test]
    fn test_bad_token_entry_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etc/pkgident.yml");
        write_baked(
            &path,
            "repo_tokens:\n  https://a.example/: [oops]\n  https://b.example: tok\n",
        );
        let loader = BakedTokenLoader::new(&path);
        assert_eq!(loader.tokens().keys().collect::<Vec<_>>(), vec!["https://b.example/"]);
    }

    #[test]
    fn test_merge_normalizes_explicit_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etc/pkgident.yml");
        write_baked(
            &path,
            "repo_tokens:\n  https://b.example/: baked-b\n  https://a.example/sub/: baked-a\n",
        );
        let loader = BakedTokenLoader::new(&path);
        let mut existing = table(&[("https://b.ex", "T1"), ("https://a.example", "T2")]);
        loader.merge_baked_tokens(&mut existing);
        assert_eq!(existing.get("https://b.example/"), Some("baked-b"));
        assert!(!existing.contains_key("https://a.example/sub/"));
    }

    #[test]
    fn test_merge_skips_when_explicit_is_more_specific() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etc/pkgident.yml");
        write_baked(&path, "repo_tokens:\n  https://a.example/: baked\n");
        let loader = BakedTokenLoader::new(&path);
        let mut existing = table(&[("https://a.example/org/", "explicit")]);
        loader.merge_baked_tokens(&mut existing);
        assert_eq!(existing.len(), 1);
    }

    #[test]
    fn test_merge_adds_cloud_alias() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etc/pkgident.yml");
        write_baked(&path, "repo_tokens:\n  https://repo.anaconda.cloud: cloud\n");
        let loader = BakedTokenLoader::new(&path);
        let mut existing = TokenTable::new();
        loader.merge_baked_tokens(&mut existing);
        assert_eq!(existing.get(CLOUD_REPO_ROOT), Some("cloud"));
        assert_eq!(existing.get("https://repo.anaconda.cloud/repo/"), Some("cloud"));
    }
}
