//! Download-if-needed with verification and retry

use std::sync::Arc;
use std::time::Duration;

use bootkit_core::retry::{RetryExecutor, TracingObserver};
use bootkit_core::types::{ManifestItem, RetryPolicy};
use bootkit_core::Architecture;
use tracing::{debug, error, info};

use crate::fetcher::{ArtifactFetcher, FetchError, FetchRequest};
use crate::verifier;

/// How an `ensure` call was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// `skip_if` matched the host architecture
    SkippedArchitecture,
    /// The destination already hashed to the expected digest
    CacheHit,
    /// Dry run, nothing fetched
    DryRun,
    Downloaded { attempts: u32 },
    Failed { attempts: u32, error: String },
}

impl EnsureOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, EnsureOutcome::Failed { .. })
    }
}

/// Makes sure an item's payload is present and verified on disk
pub struct DownloadCache {
    fetcher: Arc<dyn ArtifactFetcher>,
    architecture: Architecture,
    dry_run: bool,
    download_timeout: Duration,
    auth_header: Option<String>,
    follow_redirects: bool,
}

impl DownloadCache {
    pub fn new(fetcher: Arc<dyn ArtifactFetcher>, architecture: Architecture) -> Self {
        Self {
            fetcher,
            architecture,
            dry_run: false,
            download_timeout: Duration::from_secs(120),
            auth_header: None,
            follow_redirects: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Upper bound for a single transfer
    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_auth_header(mut self, header: Option<String>) -> Self {
        self.auth_header = header;
        self
    }

    /// Redirect policy for items that do not set their own
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// Whether the item is statically excluded on this host
    pub fn is_excluded(&self, item: &ManifestItem) -> bool {
        item.skip_if
            .as_deref()
            .is_some_and(|tag| self.architecture.matches_skip_tag(tag))
    }

    /// Returns `true` when the item's payload is ready (or legitimately not needed)
    pub async fn ensure(&self, item: &ManifestItem) -> bool {
        self.ensure_detailed(item).await.is_success()
    }

    pub async fn ensure_detailed(&self, item: &ManifestItem) -> EnsureOutcome {
        let name = item.display_name();

        if self.is_excluded(item) {
            info!(
                "Skipping {} on {} (skip_if = {})",
                name,
                self.architecture,
                item.skip_if.as_deref().unwrap_or_default()
            );
            return EnsureOutcome::SkippedArchitecture;
        }

        if verifier::matches(item.file.as_std_path(), &item.hash) {
            info!("{} already present at {}", name, item.file);
            return EnsureOutcome::CacheHit;
        }

        if self.dry_run {
            info!("[dry-run] Would download {} to {}", item.url, item.file);
            return EnsureOutcome::DryRun;
        }

        self.download(item, &name).await
    }

    async fn download(&self, item: &ManifestItem, name: &str) -> EnsureOutcome {
        let policy = RetryPolicy::fixed(item.retry_count(), item.retry_delay());
        let request = FetchRequest::new(item.url.clone(), self.download_timeout)
            .with_redirects(item.follow_redirects.unwrap_or(self.follow_redirects))
            .with_auth_header(self.auth_header.clone());

        info!(
            "Downloading {} from {} (up to {} attempts)",
            name, item.url, policy.max_attempts
        );

        let executor = RetryExecutor::new(policy)
            .retry_if(FetchError::is_retryable)
            .with_observer(TracingObserver::new(format!("download {}", name)));

        let mut attempts = 0u32;
        let result = executor
            .execute(|| {
                attempts += 1;
                self.fetch_and_verify(item, &request)
            })
            .await;

        match result {
            Ok(()) => {
                info!("Downloaded {} to {}", name, item.file);
                EnsureOutcome::Downloaded { attempts }
            }
            Err(e) => {
                error!("Failed to download {}: {}", name, e);
                EnsureOutcome::Failed {
                    attempts: e.attempts(),
                    error: e.into_last_error().to_string(),
                }
            }
        }
    }

    async fn fetch_and_verify(
        &self,
        item: &ManifestItem,
        request: &FetchRequest,
    ) -> Result<(), FetchError> {
        self.fetcher.fetch_to_file(request, item.file.as_std_path()).await?;

        let actual = verifier::file_digest(item.file.as_std_path()).map_err(|e| FetchError::Io {
            path: item.file.clone().into_std_path_buf(),
            source: e,
        })?;

        if actual.eq_ignore_ascii_case(item.hash.trim()) {
            debug!("Hash verified for {}", item.file);
            Ok(())
        } else {
            Err(FetchError::IntegrityMismatch {
                path: item.file.clone().into_std_path_buf(),
                expected: item.hash.clone(),
                actual,
            })
        }
    }
}
