//! End-to-end HTTP surface tests (§6), driven through the router directly
//! rather than a bound socket, in the teacher's in-process style
//! (`catalog-core`'s own tests use `Database::connect_in_memory()`).

use std::collections::BTreeMap;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use catalog_core::config::CatalogConfig;
use catalog_core::db::Database;
use catalog_server_test_support::{router_for, test_config};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

mod catalog_server_test_support {
	use super::*;
	use catalog_server::{routes, state::AppState};

	pub fn test_config(tmp: &TempDir) -> CatalogConfig {
		let mut model_categories = BTreeMap::new();
		model_categories.insert("loras".to_string(), vec![tmp.path().join("models/loras")]);
		CatalogConfig {
			input_base: tmp.path().join("input"),
			output_base: tmp.path().join("output"),
			model_categories,
			database_path: tmp.path().join("catalog.db"),
			max_bind_params: 800,
		}
	}

	pub async fn router_for(config: CatalogConfig) -> axum::Router {
		let db = Database::connect_in_memory().await.unwrap();
		let state = AppState::new(db.conn().clone(), config);
		routes::router(state)
	}
}

async fn body_json(response: axum::response::Response) -> Value {
	let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
	serde_json::from_slice(&bytes).unwrap()
}

fn multipart_body(boundary: &str, fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
	let mut body = Vec::new();
	for (name, value) in fields {
		body.extend_from_slice(format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes());
	}
	if let Some((filename, bytes)) = file {
		body.extend_from_slice(
			format!("--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n")
				.as_bytes(),
		);
		body.extend_from_slice(bytes);
		body.extend_from_slice(b"\r\n");
	}
	body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
	body
}

#[tokio::test]
async fn upload_new_asset_then_head_by_hash() {
	let tmp = TempDir::new().unwrap();
	let app = router_for(test_config(&tmp)).await;

	let boundary = "X-BOUNDARY";
	let body = multipart_body(boundary, &[("tags", "input"), ("name", "greeting.txt")], Some(("greeting.txt", b"hello")));

	let response = app
		.clone()
		.oneshot(
			Request::builder()
				.method("POST")
				.uri("/api/assets")
				.header("content-type", format!("multipart/form-data; boundary={boundary}"))
				.body(Body::from(body))
				.unwrap(),
		)
		.await
		.unwrap();

	assert_eq!(response.status(), StatusCode::CREATED);
	let created = body_json(response).await;
	assert_eq!(created["created_new"], json!(true));
	assert_eq!(created["tags"], json!(["input"]));
	let hash = created["asset_hash"].as_str().unwrap().to_string();
	assert!(hash.starts_with("blake3:"));

	let head = app
		.oneshot(Request::builder().method("HEAD").uri(format!("/api/assets/hash/{hash}")).body(Body::empty()).unwrap())
		.await
		.unwrap();
	assert_eq!(head.status(), StatusCode::OK);
}

#[tokio::test]
async fn head_by_hash_rejects_malformed_hash() {
	let tmp = TempDir::new().unwrap();
	let app = router_for(test_config(&tmp)).await;

	let response = app
		.oneshot(
			Request::builder()
				.method("HEAD")
				.uri("/api/assets/hash/sha256:deadbeef")
				.body(Body::empty())
				.unwrap(),
		)
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_without_tags_is_invalid_body() {
	let tmp = TempDir::new().unwrap();
	let app = router_for(test_config(&tmp)).await;

	let boundary = "X-BOUNDARY";
	let body = multipart_body(boundary, &[], Some(("f.txt", b"hi")));

	let response = app
		.oneshot(
			Request::builder()
				.method("POST")
				.uri("/api/assets")
				.header("content-type", format!("multipart/form-data; boundary={boundary}"))
				.body(Body::from(body))
				.unwrap(),
		)
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	let error = body_json(response).await;
	assert_eq!(error["error"]["code"], json!("INVALID_BODY"));
}

#[tokio::test]
async fn upload_empty_file_is_rejected() {
	let tmp = TempDir::new().unwrap();
	let app = router_for(test_config(&tmp)).await;

	let boundary = "X-BOUNDARY";
	let body = multipart_body(boundary, &[("tags", "input")], Some(("empty.txt", b"")));

	let response = app
		.oneshot(
			Request::builder()
				.method("POST")
				.uri("/api/assets")
				.header("content-type", format!("multipart/form-data; boundary={boundary}"))
				.body(Body::from(body))
				.unwrap(),
		)
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	let error = body_json(response).await;
	assert_eq!(error["error"]["code"], json!("EMPTY_UPLOAD"));
}

#[tokio::test]
async fn upload_json_body_is_unsupported_media_type() {
	let tmp = TempDir::new().unwrap();
	let app = router_for(test_config(&tmp)).await;

	let response = app
		.oneshot(
			Request::builder()
				.method("POST")
				.uri("/api/assets")
				.header("content-type", "application/json")
				.body(Body::from("{}"))
				.unwrap(),
		)
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn tag_filter_narrows_the_list() {
	let tmp = TempDir::new().unwrap();
	let app = router_for(test_config(&tmp)).await;

	for (tags, name, bytes) in [("input", "a.txt", b"aaa".as_slice()), ("input,special", "b.txt", b"bbb"), ("output", "c.txt", b"ccc")] {
		let boundary = "X-BOUNDARY";
		let body = multipart_body(boundary, &[("tags", tags), ("name", name)], Some((name, bytes)));
		let response = app
			.clone()
			.oneshot(
				Request::builder()
					.method("POST")
					.uri("/api/assets")
					.header("content-type", format!("multipart/form-data; boundary={boundary}"))
					.body(Body::from(body))
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::CREATED);
	}

	let response = app
		.oneshot(
			Request::builder()
				.method("GET")
				.uri("/api/assets?include_tags=input&exclude_tags=special")
				.body(Body::empty())
				.unwrap(),
		)
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let listed = body_json(response).await;
	assert_eq!(listed["total"], json!(1));
	assert_eq!(listed["assets"][0]["name"], json!("a.txt"));
}

#[tokio::test]
async fn update_rejects_empty_body() {
	let tmp = TempDir::new().unwrap();
	let app = router_for(test_config(&tmp)).await;

	let boundary = "X-BOUNDARY";
	let body = multipart_body(boundary, &[("tags", "input")], Some(("x.txt", b"xyz")));
	let response = app
		.clone()
		.oneshot(
			Request::builder()
				.method("POST")
				.uri("/api/assets")
				.header("content-type", format!("multipart/form-data; boundary={boundary}"))
				.body(Body::from(body))
				.unwrap(),
		)
		.await
		.unwrap();
	let created = body_json(response).await;
	let id = created["id"].as_str().unwrap();

	let response = app
		.oneshot(
			Request::builder()
				.method("PUT")
				.uri(format!("/api/assets/{id}"))
				.header("content-type", "application/json")
				.body(Body::from("{}"))
				.unwrap(),
		)
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_asset_rejects_non_canonical_uuid() {
	let tmp = TempDir::new().unwrap();
	let app = router_for(test_config(&tmp)).await;

	let response = app
		.oneshot(
			Request::builder()
				.method("GET")
				.uri("/api/assets/not-a-uuid")
				.body(Body::empty())
				.unwrap(),
		)
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_unknown_asset_is_not_found() {
	let tmp = TempDir::new().unwrap();
	let app = router_for(test_config(&tmp)).await;

	let response = app
		.oneshot(
			Request::builder()
				.method("GET")
				.uri("/api/assets/00000000-0000-0000-0000-000000000000")
				.body(Body::empty())
				.unwrap(),
		)
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
