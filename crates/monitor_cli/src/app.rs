//! Wiring between the command line and the client: state files, session, navigator.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use monitor_client::{
    ApiClient, ClientSettings, KeyValueStore, Navigator, RonFileStore, SessionContext, StateDir,
};
use monitor_core::return_path_after_login;
use monitor_logging::{monitor_debug, monitor_warn};

use crate::args::Cli;

const SESSION_FILE: &str = "session.ron";
const TAB_FILE: &str = "tab.ron";
const PENDING_LOGIN_KEY: &str = "pending-login";

/// Stands in for the browser location bar.
///
/// The "current location" is the dashboard page equivalent to the running
/// command. A redirect to the login page is remembered in the tab store so the
/// next `login` can point the user back to where they were.
pub struct TerminalNavigator {
    location: Mutex<String>,
    tab: Arc<dyn KeyValueStore>,
}

impl TerminalNavigator {
    pub fn new(location: impl Into<String>, tab: Arc<dyn KeyValueStore>) -> Self {
        Self {
            location: Mutex::new(location.into()),
            tab,
        }
    }

    /// Where to continue after signing in, if a session expiry sent us to the login page.
    pub fn take_return_path(&self) -> Option<String> {
        let pending = self.tab.get(PENDING_LOGIN_KEY)?;
        if let Err(err) = self.tab.remove(PENDING_LOGIN_KEY) {
            monitor_warn!("Failed to clear pending login redirect: {}", err);
        }
        Some(return_path_after_login(&pending))
    }
}

impl Navigator for TerminalNavigator {
    fn current_location(&self) -> String {
        self.location
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn navigate(&self, target: &str) {
        monitor_debug!("Navigating to {}", target);
        *self.location.lock().unwrap_or_else(PoisonError::into_inner) = target.to_string();
        if let Err(err) = self.tab.set(PENDING_LOGIN_KEY, target) {
            monitor_warn!("Failed to remember login redirect: {}", err);
        }
        eprintln!("Session expired. Run `task-monitor login` to sign in again.");
    }
}

pub struct App {
    pub client: ApiClient,
    pub tab: Arc<dyn KeyValueStore>,
    pub navigator: Arc<TerminalNavigator>,
    pub json: bool,
}

impl App {
    /// Open the state directory and restore any saved session.
    ///
    /// `location` is the dashboard path the command corresponds to.
    pub fn open(cli: &Cli, location: &str) -> Result<Self> {
        let state = StateDir::open(&cli.state_dir)
            .with_context(|| format!("cannot use state directory {:?}", cli.state_dir))?;
        let durable: Arc<dyn KeyValueStore> = Arc::new(
            RonFileStore::open(state.file(SESSION_FILE)).context("cannot read saved session")?,
        );
        let tab: Arc<dyn KeyValueStore> =
            Arc::new(RonFileStore::open(state.file(TAB_FILE)).context("cannot read tab state")?);

        let navigator = Arc::new(TerminalNavigator::new(location, tab.clone()));
        let session = Arc::new(SessionContext::new(durable, navigator.clone()));

        let mut settings = ClientSettings::from_env();
        if let Some(base_url) = &cli.base_url {
            settings = settings.with_base_url(base_url.clone());
        }
        monitor_debug!("Using API at {}", settings.base_url);
        let client = ApiClient::new(settings, session).context("cannot build HTTP client")?;

        Ok(Self {
            client,
            tab,
            navigator,
            json: cli.json,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_client::MemoryStore;

    #[test]
    fn login_redirect_is_remembered_for_the_next_login() {
        let tab = Arc::new(MemoryStore::new());
        let navigator = TerminalNavigator::new("/jobs/42", tab.clone());

        navigator.navigate("/login?redirect=%2Fjobs%2F42");

        assert_eq!(navigator.current_location(), "/login?redirect=%2Fjobs%2F42");
        assert_eq!(navigator.take_return_path().as_deref(), Some("/jobs/42"));
        assert_eq!(navigator.take_return_path(), None);
    }

    #[test]
    fn open_creates_state_files_lazily() {
        let tmp = tempfile::tempdir().unwrap();
        let state_dir = tmp.path().join("state");
        let cli = <Cli as clap::Parser>::try_parse_from([
            "task-monitor",
            "--state-dir",
            state_dir.to_str().unwrap(),
            "--base-url",
            "http://127.0.0.1:9/api/v1",
            "logout",
        ])
        .unwrap();

        let app = App::open(&cli, "/").unwrap();

        assert!(state_dir.is_dir());
        assert!(!app.client.session().is_authenticated());
        assert_eq!(app.client.settings().base_url, "http://127.0.0.1:9/api/v1");
    }
}
