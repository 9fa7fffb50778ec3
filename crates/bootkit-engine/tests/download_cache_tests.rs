//! Download cache tests against a real HTTP stack
//!
//! Tests cover:
//! - Cache hits performing no network calls
//! - Hash mismatches exhausting retries
//! - Recovery from transient server errors
//! - Symmetric architecture exclusion

mod common;

use std::sync::Arc;

use bootkit_core::types::ItemKind;
use bootkit_core::Architecture;
use bootkit_engine::{DownloadCache, EnsureOutcome, HttpFetcher};
use common::*;
use tempfile::TempDir;
use wiremock::MockServer;

fn cache(architecture: Architecture) -> DownloadCache {
    DownloadCache::new(Arc::new(HttpFetcher::new().unwrap()), architecture)
}

fn package_at(temp: &TempDir, server: &MockServer) -> ItemBuilder {
    ItemBuilder::package(temp.path(), "tool.pkg", &server.uri(), PACKAGE_PAYLOAD)
}

#[tokio::test]
async fn test_verified_file_needs_no_network() {
    let server = MockServer::start().await;
    expect_requests(&server, "/packages/tool.pkg", 0, PACKAGE_PAYLOAD).await;
    let temp = TempDir::new().unwrap();
    let item = package_at(&temp, &server).build();
    std::fs::write(&item.file, PACKAGE_PAYLOAD).unwrap();

    let outcome = cache(Architecture::Arm64).ensure_detailed(&item).await;

    assert_eq!(outcome, EnsureOutcome::CacheHit);
    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn test_stale_file_is_replaced() {
    let server = MockServer::start().await;
    mock_payload(&server, "/packages/tool.pkg", PACKAGE_PAYLOAD).await;
    let temp = TempDir::new().unwrap();
    let item = package_at(&temp, &server).retries(2, 0).build();
    std::fs::write(&item.file, TAMPERED_PAYLOAD).unwrap();

    assert!(cache(Architecture::Arm64).ensure(&item).await);
    assert_eq!(std::fs::read(&item.file).unwrap(), PACKAGE_PAYLOAD);
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_persistent_mismatch_exhausts_retries() {
    let server = MockServer::start().await;
    mock_payload(&server, "/packages/tool.pkg", TAMPERED_PAYLOAD).await;
    let temp = TempDir::new().unwrap();
    let item = package_at(&temp, &server).retries(3, 0).build();

    let outcome = cache(Architecture::Arm64).ensure_detailed(&item).await;

    match outcome {
        EnsureOutcome::Failed { attempts, error } => {
            assert_eq!(attempts, 3);
            assert!(error.contains("Hash mismatch"), "unexpected error: {error}");
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(request_count(&server).await, 3);
    // the last attempted content stays on disk, unverified
    assert_eq!(std::fs::read(&item.file).unwrap(), TAMPERED_PAYLOAD);
}

#[tokio::test]
async fn test_zero_retries_still_attempts_once() {
    let server = MockServer::start().await;
    mock_payload(&server, "/packages/tool.pkg", TAMPERED_PAYLOAD).await;
    let temp = TempDir::new().unwrap();
    let item = package_at(&temp, &server).retries(0, 0).build();

    assert!(!cache(Architecture::Arm64).ensure(&item).await);
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let server = MockServer::start().await;
    mock_flaky_payload(&server, "/packages/tool.pkg", 2, PACKAGE_PAYLOAD).await;
    let temp = TempDir::new().unwrap();
    let item = package_at(&temp, &server).retries(3, 0).build();

    let outcome = cache(Architecture::Arm64).ensure_detailed(&item).await;

    assert_eq!(outcome, EnsureOutcome::Downloaded { attempts: 3 });
    assert_eq!(std::fs::read(&item.file).unwrap(), PACKAGE_PAYLOAD);
}

#[tokio::test]
async fn test_architecture_skip_is_symmetric() {
    let server = MockServer::start().await;
    mock_payload(&server, "/packages/tool.pkg", PACKAGE_PAYLOAD).await;
    let temp = TempDir::new().unwrap();

    let arm_only_excluded = package_at(&temp, &server).skip_if("arm").build();
    assert_eq!(
        cache(Architecture::Arm64).ensure_detailed(&arm_only_excluded).await,
        EnsureOutcome::SkippedArchitecture
    );
    assert_eq!(request_count(&server).await, 0);

    let intel_excluded = package_at(&temp, &server).skip_if("x86_64").build();
    assert_eq!(
        cache(Architecture::X86_64).ensure_detailed(&intel_excluded).await,
        EnsureOutcome::SkippedArchitecture
    );

    // the same tags do not exclude on the other architecture
    assert!(matches!(
        cache(Architecture::X86_64).ensure_detailed(&arm_only_excluded).await,
        EnsureOutcome::Downloaded { .. }
    ));
    assert_eq!(
        cache(Architecture::Arm64).ensure_detailed(&intel_excluded).await,
        EnsureOutcome::CacheHit
    );
}

#[tokio::test]
async fn test_auth_header_is_sent_with_downloads() {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/packages/tool.pkg"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PACKAGE_PAYLOAD))
        .expect(1)
        .mount(&server)
        .await;
    let temp = TempDir::new().unwrap();
    let item = package_at(&temp, &server).retries(1, 0).build();

    let ok = cache(Architecture::Arm64)
        .with_auth_header(Some("Bearer secret".to_string()))
        .ensure(&item)
        .await;

    assert!(ok);
}
