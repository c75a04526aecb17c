//! HTTP source fetching against a local mock server.

use edgequake_pdf2image::{
    BucketStore, DocumentFetcher, FailureKind, SourceFetcher, SourceLocation,
};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher() -> SourceFetcher {
    SourceFetcher::new(Arc::new(BucketStore::in_memory()), 5).unwrap()
}

async fn serve(route: &str, response: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn downloads_pdf_body_to_scratch_dir() {
    let body = b"%PDF-1.4\n1 0 obj\n<<>>\nendobj\n".to_vec();
    let server = serve(
        "/files/doc.pdf",
        ResponseTemplate::new(200).set_body_bytes(body.clone()),
    )
    .await;
    let dir = tempfile::tempdir().unwrap();

    let local = fetcher()
        .fetch(
            &SourceLocation::Http(format!("{}/files/doc.pdf", server.uri())),
            dir.path(),
        )
        .await
        .unwrap();

    assert!(local.starts_with(dir.path()));
    assert_eq!(std::fs::read(local).unwrap(), body);
}

#[tokio::test]
async fn non_success_status_is_a_fetch_failure() {
    let server = serve("/missing.pdf", ResponseTemplate::new(404)).await;
    let dir = tempfile::tempdir().unwrap();

    let err = fetcher()
        .fetch(
            &SourceLocation::Http(format!("{}/missing.pdf", server.uri())),
            dir.path(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::Fetch);
    assert_eq!(err.message, "Could not download input file, status 404");
}

#[tokio::test]
async fn html_error_page_is_rejected() {
    let server = serve(
        "/login.pdf",
        ResponseTemplate::new(200).set_body_string("<html><body>Sign in</body></html>"),
    )
    .await;
    let dir = tempfile::tempdir().unwrap();

    let err = fetcher()
        .fetch(
            &SourceLocation::Http(format!("{}/login.pdf", server.uri())),
            dir.path(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::Fetch);
    assert!(err.message.contains("not a valid PDF"));
}

#[tokio::test]
async fn unreachable_host_is_a_fetch_failure() {
    let dir = tempfile::tempdir().unwrap();
    // Port 9 (discard) on loopback is closed on any sane test host.
    let err = fetcher()
        .fetch(
            &SourceLocation::Http("http://127.0.0.1:9/doc.pdf".into()),
            dir.path(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Fetch);
}
