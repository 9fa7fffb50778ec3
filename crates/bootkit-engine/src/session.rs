//! Waiting for an interactive console session

use std::os::unix::fs::MetadataExt;
use std::sync::Arc;
use std::time::Duration;

use nix::unistd::{Uid, User};
use tracing::{debug, info};

/// Default polling interval for [`SessionWaiter::block`]
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// The account currently owning the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleUser {
    pub name: String,
    pub uid: u32,
}

/// Resolves the current console user
pub trait ConsoleUserSource: Send + Sync {
    fn console_user(&self) -> Option<ConsoleUser>;
}

/// Reads the owner of `/dev/console`
#[derive(Debug, Clone, Default)]
pub struct DevConsoleSource;

impl ConsoleUserSource for DevConsoleSource {
    fn console_user(&self) -> Option<ConsoleUser> {
        let uid = std::fs::metadata("/dev/console").ok()?.uid();
        match User::from_uid(Uid::from_raw(uid)) {
            Ok(Some(user)) => Some(ConsoleUser {
                name: user.name,
                uid,
            }),
            Ok(None) => None,
            Err(e) => {
                debug!("Failed to look up uid {}: {}", uid, e);
                None
            }
        }
    }
}

/// Whether `name` is a real person logged in at the console
///
/// Excludes the login window and Setup Assistant placeholders, root, and
/// underscore-prefixed service accounts.
pub fn is_interactive_user(name: &str) -> bool {
    !(name.is_empty()
        || name == "loginwindow"
        || name == "_mbsetupuser"
        || name == "root"
        || name.starts_with('_'))
}

/// Polls until an interactive user owns the console
#[derive(Clone)]
pub struct SessionWaiter {
    source: Arc<dyn ConsoleUserSource>,
    interval: Duration,
}

impl SessionWaiter {
    /// A waiter reading the owner of `/dev/console`
    pub fn new() -> Self {
        Self::with_source(DevConsoleSource)
    }

    pub fn with_source(source: impl ConsoleUserSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The interactive console user right now, if any
    pub fn current(&self) -> Option<ConsoleUser> {
        self.source
            .console_user()
            .filter(|user| is_interactive_user(&user.name))
    }

    /// Wait without timeout for an interactive user and return it
    pub async fn block(&self) -> ConsoleUser {
        let mut announced = false;
        loop {
            if let Some(user) = self.current() {
                info!("Console user {} (uid {}) is logged in", user.name, user.uid);
                return user;
            }
            if !announced {
                info!("Waiting for a user to log in");
                announced = true;
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

impl Default for SessionWaiter {
    fn default() -> Self {
        Self::new()
    }
}
