use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use tracing::{debug, instrument};

use crate::error::SiteError;
use crate::service::SiteService;
use crate::types::{
    CreateSiteRequest, CreateSiteResponse, EditQuery, EditSiteRequest, EditSiteResponse,
    EditableSite, PublicSite, UploadResponse,
};

const UPLOAD_FIELD: &str = "file";

fn rejected(err: impl std::fmt::Display) -> SiteError {
    SiteError::validation(err.to_string())
}

// ---------------------------------------------------------------------------
// POST /api/sites
// ---------------------------------------------------------------------------

#[instrument(skip_all)]
pub async fn create_site(
    State(service): State<Arc<SiteService>>,
    body: Result<Json<CreateSiteRequest>, JsonRejection>,
) -> Result<Json<CreateSiteResponse>, SiteError> {
    let Json(req) = body.map_err(rejected)?;
    let response = service.create_and_start_payment(&req).await?;
    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// GET /api/sites/{slug}
// ---------------------------------------------------------------------------

#[instrument(skip(service))]
pub async fn get_public_site(
    State(service): State<Arc<SiteService>>,
    Path(slug): Path<String>,
) -> Result<Json<PublicSite>, SiteError> {
    Ok(Json(service.get_public_site(&slug).await?))
}

// ---------------------------------------------------------------------------
// GET /api/sites/{slug}/edit?editCredential=...
// ---------------------------------------------------------------------------

#[instrument(skip(service, query))]
pub async fn get_editable_site(
    State(service): State<Arc<SiteService>>,
    Path(slug): Path<String>,
    query: Result<Query<EditQuery>, QueryRejection>,
) -> Result<Json<EditableSite>, SiteError> {
    let Query(query) = query.map_err(|_| SiteError::validation("editCredential is required"))?;
    Ok(Json(
        service
            .get_editable_site(&slug, &query.edit_credential)
            .await?,
    ))
}

// ---------------------------------------------------------------------------
// PUT /api/sites/edit
// ---------------------------------------------------------------------------

#[instrument(skip_all)]
pub async fn edit_site(
    State(service): State<Arc<SiteService>>,
    body: Result<Json<EditSiteRequest>, JsonRejection>,
) -> Result<Json<EditSiteResponse>, SiteError> {
    let Json(req) = body.map_err(rejected)?;

    let identifier = req
        .identifier()
        .ok_or_else(|| SiteError::validation("siteId or slug is required"))?;

    let site = service
        .edit_site(&req.edit_credential, &identifier, req.patch)
        .await?;

    Ok(Json(EditSiteResponse {
        success: true,
        site: site.into(),
    }))
}

// ---------------------------------------------------------------------------
// POST /api/upload
// ---------------------------------------------------------------------------

/// Accepts one image in the multipart field `file`. The size limit is
/// enforced while reading, so an oversized body never reaches the image host.
#[instrument(skip_all)]
pub async fn upload_image(
    State(service): State<Arc<SiteService>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), SiteError> {
    let limit = service.config().max_upload_bytes;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            debug!(name = ?field.name(), "Skipping unexpected multipart field");
            continue;
        }

        let mime_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        if !crate::config::SiteConfig::is_allowed_image_type(&mime_type) {
            return Err(SiteError::UnsupportedMediaType(mime_type));
        }

        let mut content = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            if content.len() + chunk.len() > limit {
                return Err(SiteError::FileTooLarge {
                    size: content.len() + chunk.len(),
                    limit,
                });
            }
            content.extend_from_slice(&chunk);
        }

        let stored = service.upload_image(&mime_type, content).await?;
        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                success: true,
                url: stored.url,
            }),
        ));
    }

    Err(SiteError::validation(format!(
        "multipart field '{UPLOAD_FIELD}' is required"
    )))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> SiteError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        SiteError::FileTooLarge {
            size: 0,
            limit: crate::config::MAX_UPLOAD_BYTES,
        }
    } else {
        SiteError::validation(err.body_text())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use be_remote_db::SiteStore;
    use chrono::Duration;
    use tower::ServiceExt;

    use super::*;
    use crate::service::tests::{Harness, harness};

    const BOUNDARY: &str = "gift-boundary";

    fn router(h: &Harness) -> axum::Router {
        crate::create_router(h.service.clone())
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-forwarded-for", "127.0.0.1")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: impl AsRef<str>) -> Request<Body> {
        Request::builder()
            .uri(uri.as_ref())
            .header("x-forwarded-for", "127.0.0.1")
            .body(Body::empty())
            .unwrap()
    }

    fn upload_request(content_type: &str, content: Vec<u8>) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"photo\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend(content);
        body.extend(format!("\r\n--{BOUNDARY}--\r\n").into_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header("x-forwarded-for", "127.0.0.1")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn create_body() -> serde_json::Value {
        serde_json::json!({
            "title": "Sarah's Day",
            "message": "Happy birthday, Sarah!",
            "templateType": "birthday",
            "customerEmail": "buyer@example.com",
            "specialDate": "2026-11-02",
            "images": ["https://cdn.example.com/cake.jpg"],
            "birthday": {
                "heading": "Happy 30th",
                "wishesTitle": "Our wishes",
                "wishes": [{ "title": "Travel", "description": "See Lisbon" }],
                "closingNote": "Love, Sam"
            }
        })
    }

    async fn create(h: &Harness) -> serde_json::Value {
        let response = router(h)
            .oneshot(json_request("POST", "/api/sites", create_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await
    }

    #[tokio::test]
    async fn create_returns_ids_and_payment_handle() {
        let h = harness();
        let body = create(&h).await;

        assert_eq!(body["success"], true);
        assert_eq!(body["slug"].as_str().unwrap().len(), 8);
        assert_eq!(body["editCredential"].as_str().unwrap().len(), 32);
        assert_eq!(body["clientSecret"], "pi_mock_1_secret");
        assert!(body.get("checkoutUrl").is_none());
    }

    // Scenario E
    #[tokio::test]
    async fn create_without_email_lists_missing_field() {
        let h = harness();
        let mut payload = create_body();
        payload.as_object_mut().unwrap().remove("customerEmail");

        let response = router(&h)
            .oneshot(json_request("POST", "/api/sites", payload))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "validation_error");
        assert!(body["details"].as_str().unwrap().contains("customerEmail"));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn create_with_malformed_json_is_bad_request() {
        let h = harness();
        let response = router(&h)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sites")
                    .header("content-type", "application/json")
                    .header("x-forwarded-for", "127.0.0.1")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn public_fetch_then_expiry_is_gone() {
        let h = harness();
        let created = create(&h).await;
        let slug = created["slug"].as_str().unwrap();

        let response = router(&h)
            .oneshot(get_request(format!("/api/sites/{slug}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["title"], "Sarah's Day");
        assert_eq!(body["templateType"], "birthday");
        assert!(body.get("editCredential").is_none());
        assert!(body.get("customerEmail").is_none());

        h.clock.advance(Duration::hours(25));
        let response = router(&h)
            .oneshot(get_request(format!("/api/sites/{slug}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GONE);

        let response = router(&h)
            .oneshot(get_request("/api/sites/nosuch00"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn public_reads_are_rate_limited_per_client() {
        let h = harness();
        let app = router(&h);

        for _ in 0..30 {
            let response = app
                .clone()
                .oneshot(get_request("/api/sites/nosuch00"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        let response = app
            .oneshot(get_request("/api/sites/nosuch00"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn edit_flow_over_http() {
        let h = harness();
        let created = create(&h).await;
        let slug = created["slug"].as_str().unwrap().to_string();
        let credential = created["editCredential"].as_str().unwrap().to_string();
        let site_id: uuid::Uuid = serde_json::from_value(created["siteId"].clone()).unwrap();

        let edit_uri = format!("/api/sites/{slug}/edit?editCredential={credential}");
        let response = router(&h)
            .oneshot(get_request(&edit_uri))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

        h.bridge.promote(site_id, None, "test").await.unwrap();

        let response = router(&h)
            .oneshot(get_request(format!("/api/sites/{slug}/edit?editCredential=wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = router(&h)
            .oneshot(get_request(format!("/api/sites/{slug}/edit")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = router(&h)
            .oneshot(get_request(&edit_uri))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["customerEmail"], "buyer@example.com");
        assert_eq!(body["birthday"]["wishes"][0]["title"], "Travel");

        let response = router(&h)
            .oneshot(json_request(
                "PUT",
                "/api/sites/edit",
                serde_json::json!({
                    "editCredential": credential,
                    "slug": slug,
                    "message": "Thirty and thriving",
                    "birthday": { "heading": "Happy 30th, Sarah" }
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["site"]["message"], "Thirty and thriving");
        assert_eq!(body["site"]["birthday"]["heading"], "Happy 30th, Sarah");
        assert_eq!(body["site"]["birthday"]["closingNote"], "Love, Sam");

        let stored = h.store.get_site(site_id).await.unwrap();
        assert_eq!(stored.message, "Thirty and thriving");
    }

    #[tokio::test]
    async fn edit_without_identifier_is_rejected() {
        let h = harness();
        let response = router(&h)
            .oneshot(json_request(
                "PUT",
                "/api/sites/edit",
                serde_json::json!({ "editCredential": "abc", "title": "x" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // Scenario D
    #[tokio::test]
    async fn upload_enforces_size_and_type() {
        let h = harness();

        let response = router(&h)
            .oneshot(upload_request("image/jpeg", vec![0u8; 6 * 1024 * 1024]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = body_json(response).await;
        assert_eq!(body["error"], "file_too_large");

        let response = router(&h)
            .oneshot(upload_request("text/plain", b"hello".to_vec()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let response = router(&h)
            .oneshot(upload_request("image/jpeg", vec![0xFFu8; 2 * 1024 * 1024]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        let url = body["url"].as_str().unwrap();
        assert!(url.starts_with("http://localhost:3000/uploads/gift-sites/"));
        assert!(url.ends_with(".jpg"));
    }
}
