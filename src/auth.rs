//! Gmail OAuth2 session and its persistence.
//!
//! The consent flow and token refresh are done by `yup-oauth2` (re-exported
//! by `google-gmail1`); this module only decides where tokens live. Tokens are
//! kept in one JSON file shared by every account:
//!
//! ```json
//! { "me@example.com": { "https://www.googleapis.com/auth/gmail.readonly": { ...token... } } }
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use google_gmail1::{hyper, hyper_rustls, oauth2};
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::GmailConfig;
use crate::error::MailError;

/// Read-only access to messages is all extraction needs
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

pub type GmailAuthenticator =
    oauth2::authenticator::Authenticator<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>;

type AccountTokens = BTreeMap<String, BTreeMap<String, Value>>;

/// Token file keyed by account, then by scope set.
///
/// Token values are opaque JSON. A missing or unreadable file is an empty
/// store, which sends the user back through the consent flow.
#[derive(Debug)]
pub struct AccountTokenStore {
    path: PathBuf,
    accounts: AccountTokens,
}

impl AccountTokenStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();

        let accounts = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<AccountTokens>(&content) {
                Ok(accounts) => accounts,
                Err(e) => {
                    warn!("⚠️  Token store {} is unreadable ({}), starting empty", path.display(), e);
                    AccountTokens::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No token store at {}", path.display());
                AccountTokens::new()
            }
            Err(e) => {
                warn!("⚠️  Unable to read token store {} ({}), starting empty", path.display(), e);
                AccountTokens::new()
            }
        };

        AccountTokenStore { path, accounts }
    }

    pub fn get(&self, account: &str, scope_key: &str) -> Option<&Value> {
        self.accounts.get(account).and_then(|scopes| scopes.get(scope_key))
    }

    pub fn set(&mut self, account: &str, scope_key: &str, token: Value) -> Result<()> {
        self.accounts
            .entry(account.to_string())
            .or_default()
            .insert(scope_key.to_string(), token);
        self.save()
    }

    /// Forget every token of `account`; returns whether anything was stored
    pub fn remove_account(&mut self, account: &str) -> Result<bool> {
        let removed = self.accounts.remove(account).is_some();
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn has_account(&self, account: &str) -> bool {
        self.accounts.get(account).is_some_and(|scopes| !scopes.is_empty())
    }

    pub fn accounts(&self) -> Vec<&str> {
        self.accounts.keys().map(String::as_str).collect()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Unable to create directory {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&self.accounts)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Unable to write token store {}", self.path.display()))?;
        Ok(())
    }
}

/// Order-independent key for a set of scopes
pub fn scope_key(scopes: &[&str]) -> String {
    let mut scopes: Vec<&str> = scopes.to_vec();
    scopes.sort_unstable();
    scopes.dedup();
    scopes.join(" ")
}

/// `yup-oauth2` storage backed by one account of an [`AccountTokenStore`]
pub struct AccountStorage {
    account: String,
    store: Arc<Mutex<AccountTokenStore>>,
}

impl AccountStorage {
    pub fn new(account: &str, store: Arc<Mutex<AccountTokenStore>>) -> Self {
        AccountStorage {
            account: account.to_string(),
            store,
        }
    }
}

#[async_trait]
impl oauth2::storage::TokenStorage for AccountStorage {
    async fn set(&self, scopes: &[&str], token: oauth2::storage::TokenInfo) -> anyhow::Result<()> {
        let value = serde_json::to_value(&token).context("Unable to serialize token")?;
        let mut store = self
            .store
            .lock()
            .map_err(|_| anyhow::anyhow!("Token store lock poisoned"))?;
        store.set(&self.account, &scope_key(scopes), value)?;
        debug!("Stored token for account '{}'", self.account);
        Ok(())
    }

    async fn get(&self, scopes: &[&str]) -> Option<oauth2::storage::TokenInfo> {
        let store = self.store.lock().ok()?;
        let value = store.get(&self.account, &scope_key(scopes))?.clone();
        match serde_json::from_value(value) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!("⚠️  Stored token for account '{}' is invalid: {}", self.account, e);
                None
            }
        }
    }
}

/// Authenticated Gmail session for one account.
///
/// Tokens are refreshed transparently on use; [`refresh`](Self::refresh)
/// forces the consent flow or a refresh up front.
pub struct AuthSession {
    account: String,
    store: Arc<Mutex<AccountTokenStore>>,
    authenticator: GmailAuthenticator,
}

impl AuthSession {
    pub async fn load(config: &GmailConfig, credentials_path: &str) -> Result<Self> {
        info!("Loading Gmail session for account '{}'", config.account);

        let secret = oauth2::read_application_secret(credentials_path)
            .await
            .context("Unable to read OAuth2 client credentials file")?;

        let store = Arc::new(Mutex::new(AccountTokenStore::open(&config.token_cache_path)));
        let storage = AccountStorage::new(&config.account, Arc::clone(&store));

        let authenticator = oauth2::InstalledFlowAuthenticator::builder(
            secret,
            oauth2::InstalledFlowReturnMethod::HTTPRedirect,
        )
        .with_storage(Box::new(storage))
        .build()
        .await
        .context("Unable to create OAuth2 authenticator")?;

        Ok(AuthSession {
            account: config.account.clone(),
            store,
            authenticator,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn has_stored_session(&self) -> bool {
        self.store
            .lock()
            .map(|store| store.has_account(&self.account))
            .unwrap_or(false)
    }

    /// Obtain a valid access token, running the consent flow when none is stored
    pub async fn refresh(&self) -> Result<(), MailError> {
        info!("🔄 Refreshing Gmail OAuth2 token for account '{}'", self.account);
        match self.authenticator.token(&[GMAIL_READONLY_SCOPE]).await {
            Ok(_) => {
                info!("✅ Gmail session is valid");
                Ok(())
            }
            Err(e) => Err(MailError::Auth(e.to_string())),
        }
    }

    /// Drop the stored tokens; the next use goes through consent again
    pub fn invalidate(&self) -> Result<bool> {
        let mut store = self
            .store
            .lock()
            .map_err(|_| anyhow::anyhow!("Token store lock poisoned"))?;
        remove_session(&mut store, &self.account)
    }

    /// Drop the stored tokens of the configured account without loading
    /// client credentials
    pub fn forget(config: &GmailConfig) -> Result<bool> {
        let mut store = AccountTokenStore::open(&config.token_cache_path);
        remove_session(&mut store, &config.account)
    }

    pub fn authenticator(&self) -> GmailAuthenticator {
        self.authenticator.clone()
    }
}

fn remove_session(store: &mut AccountTokenStore, account: &str) -> Result<bool> {
    let removed = store.remove_account(account)?;
    if removed {
        info!("🔓 Session for account '{}' removed", account);
    } else {
        info!("No stored session for account '{}'", account);
    }
    Ok(removed)
}
