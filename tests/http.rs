//! HTTP-level tests: the axum router driven with `tower::ServiceExt::oneshot`.

#![cfg(feature = "server")]

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::*;
use edgequake_sigredact::http::{router, FAILED_COUNT_HEADER, REDACTED_COUNT_HEADER};
use edgequake_sigredact::AnalyzeOutput;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

const BOUNDARY: &str = "X-BOUNDARY";

// ── Test helpers ─────────────────────────────────────────────────────────────

/// One multipart part: `(field name, optional filename, body)`.
type Part<'a> = (&'a str, Option<&'a str>, Vec<u8>);

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, bytes) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(f) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                     Content-Type: application/pdf\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn analyze_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::post("/api/redact/analyze")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn confirm_request(body: impl Into<Body>) -> Request<Body> {
    Request::post("/api/redact/confirm")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, headers, bytes.to_vec())
}

fn confirm_all(analysis: &AnalyzeOutput) -> Value {
    json!({
        "documents": analysis.documents.iter().map(|d| json!({
            "id": d.id,
            "filename": d.filename,
            "pages": [{ "page_index": 0, "boxes": [{ "x": 0.1, "y": 0.1, "w": 0.2, "h": 0.1 }] }],
        })).collect::<Vec<_>>()
    })
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ping_responds() {
    let base = tempfile::tempdir().unwrap();
    let app = router(redactor(&base));

    let (status, _, body) = send(
        &app,
        Request::get("/api/ping").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn analyze_preview_confirm_cycle() {
    let base = tempfile::tempdir().unwrap();
    let app = router(redactor(&base));

    let (status, _, body) = send(
        &app,
        analyze_request(&[
            ("files", Some("one.pdf"), synthetic_pdf(2)),
            ("note", None, b"ignored".to_vec()),
            ("files", Some("two.pdf"), synthetic_pdf(1)),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let analysis: AnalyzeOutput = serde_json::from_slice(&body).unwrap();
    assert_eq!(analysis.documents.len(), 2);
    assert_eq!(analysis.documents[0].filename, "one.pdf");
    assert_eq!(analysis.documents[0].pages.len(), 2);

    let reference = analysis.documents[0].pages[1].image_reference.clone();
    let (status, headers, png) = send(
        &app,
        Request::get(reference.as_str()).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    let img = image::load_from_memory(&png).unwrap().into_rgb8();
    assert_eq!(img, expected_page(1, TEST_DPI));

    let confirm = serde_json::to_vec(&confirm_all(&analysis)).unwrap();
    let (status, headers, archive) = send(&app, confirm_request(confirm.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/gzip");
    assert!(headers[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("redacted.tar.gz"));
    assert_eq!(headers[REDACTED_COUNT_HEADER], "2");
    assert_eq!(headers[FAILED_COUNT_HEADER], "0");

    let names: Vec<_> = archive_entries(&archive).into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["one.pdf", "two.pdf"]);

    // Consumed: previews and a second confirm are gone.
    let (status, _, _) = send(
        &app,
        Request::get(reference.as_str()).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, body) = send(&app, confirm_request(confirm)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], 404);
    assert_eq!(json["failures"].as_array().unwrap().len(), 2);
    assert_eq!(json["failures"][0]["error"]["kind"], "workspace_not_found");
}

#[tokio::test]
async fn analyze_without_files_is_bad_request() {
    let base = tempfile::tempdir().unwrap();
    let app = router(redactor(&base));

    let (status, _, body) = send(&app, analyze_request(&[("note", None, b"hi".to_vec())])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], 400);
}

#[tokio::test]
async fn analyze_lists_rejected_uploads() {
    let base = tempfile::tempdir().unwrap();
    let app = router(redactor(&base));

    let (status, _, body) = send(
        &app,
        analyze_request(&[
            ("files", Some("bad.pdf"), corrupt_pdf()),
            ("files", Some("good.pdf"), synthetic_pdf(1)),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["documents"].as_array().unwrap().len(), 1);
    assert_eq!(json["failures"][0]["filename"], "bad.pdf");
    assert_eq!(json["failures"][0]["error"]["kind"], "conversion");
}

#[tokio::test]
async fn malformed_confirm_json_is_bad_request() {
    let base = tempfile::tempdir().unwrap();
    let app = router(redactor(&base));

    let (status, _, body) = send(&app, confirm_request("{\"documents\": [")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], 400);

    let (status, _, _) = send(&app, confirm_request("{\"documents\": []}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(&app, confirm_request("{\"files\": []}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn confirm_with_only_bad_boxes_is_unprocessable() {
    let base = tempfile::tempdir().unwrap();
    let redactor = redactor(&base);
    let app = router(redactor.clone());

    let (_, _, body) = send(
        &app,
        analyze_request(&[("files", Some("a.pdf"), synthetic_pdf(1))]),
    )
    .await;
    let analysis: AnalyzeOutput = serde_json::from_slice(&body).unwrap();

    let req = json!({
        "documents": [{
            "id": analysis.documents[0].id,
            "filename": "a.pdf",
            "pages": [{ "page_index": 0, "boxes": [{ "x": 2.0, "y": 0.0, "w": 0.1, "h": 0.1 }] }],
        }]
    });
    let (status, _, body) = send(&app, confirm_request(serde_json::to_vec(&req).unwrap())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["failures"][0]["error"]["kind"], "redaction");
    assert!(redactor.store().is_empty());
}

#[tokio::test]
async fn malformed_box_fails_only_its_document() {
    let base = tempfile::tempdir().unwrap();
    let redactor = redactor(&base);
    let app = router(redactor.clone());

    let (_, _, body) = send(
        &app,
        analyze_request(&[
            ("files", Some("a.pdf"), synthetic_pdf(1)),
            ("files", Some("b.pdf"), synthetic_pdf(1)),
        ]),
    )
    .await;
    let analysis: AnalyzeOutput = serde_json::from_slice(&body).unwrap();

    let req = json!({
        "documents": [
            {
                "id": analysis.documents[0].id,
                "filename": "a.pdf",
                "pages": [{ "page_index": 0, "boxes": [{ "x": 0.1, "y": 0.1, "w": 0.2, "h": 0.2 }] }],
            },
            {
                "id": analysis.documents[1].id,
                "filename": "b.pdf",
                "pages": [{ "page_index": 0, "boxes": [{ "x": 0.1, "y": 0.1, "w": 0.2 }] }],
            },
        ]
    });
    let (status, headers, archive) =
        send(&app, confirm_request(serde_json::to_vec(&req).unwrap())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[REDACTED_COUNT_HEADER], "1");
    assert_eq!(headers[FAILED_COUNT_HEADER], "1");

    let names: Vec<_> = archive_entries(&archive).into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["a.pdf"]);
    assert!(redactor.store().is_empty());
}

#[tokio::test]
async fn unknown_page_route_is_not_found() {
    let base = tempfile::tempdir().unwrap();
    let app = router(redactor(&base));

    let (status, _, _) = send(
        &app,
        Request::get("/api/redact/pages/7f0c2a8e-8d0e-4d7c-9f57-2b1d2c3e4f50/0")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
