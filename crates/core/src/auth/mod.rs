//! Repository auth-token lookups
//!
//! # Lookup order
//!
//! - **Explicit**: tokens the user stored in the token directory
//!   ([`RepoTokenStore`]), longest matching prefix wins
//! - **Baked**: install-time tokens ([`BakedTokenLoader`]), only where no
//!   explicit token covers the URL

pub mod store;

pub use store::RepoTokenStore;

use crate::baked::{BakedTokenLoader, TokenTable};

/// Source of auth tokens for request URLs
pub trait TokenLookup: Send + Sync {
    /// Token to send with a request to `url`, if any
    fn token_for_url(&self, url: &str) -> Option<String>;
}

/// Tries each lookup in order and returns the first token found
#[derive(Default)]
pub struct ChainedLookup {
    lookups: Vec<Box<dyn TokenLookup>>,
}

impl ChainedLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit store first, baked tokens second
    ///
    /// # Example
    /// ```
    /// # use pkgident_core::auth::{ChainedLookup, RepoTokenStore, TokenLookup};
    /// # use pkgident_core::baked::BakedTokenLoader;
    /// let lookup = ChainedLookup::standard(
    ///     RepoTokenStore::new("/nonexistent/tokens"),
    ///     BakedTokenLoader::new("/nonexistent/etc/pkgident.yml"),
    /// );
    /// assert_eq!(lookup.token_for_url("https://repo.example.com/"), None);
    /// ```
    pub fn standard(store: RepoTokenStore, loader: BakedTokenLoader) -> Self {
        Self::new().with(store).with(loader)
    }

    pub fn with(mut self, lookup: impl TokenLookup + 'static) -> Self {
        self.lookups.push(Box::new(lookup));
        self
    }
}

impl TokenLookup for ChainedLookup {
    fn token_for_url(&self, url: &str) -> Option<String> {
        self.lookups.iter().find_map(|l| l.token_for_url(url))
    }
}

/// The full token table the host sees: stored tokens plus baked gaps
pub fn resolved_repo_tokens(store: &RepoTokenStore, loader: &BakedTokenLoader) -> TokenTable {
    let mut tokens = store.read_tokens();
    loader.merge_baked_tokens(&mut tokens);
    tokens
}
