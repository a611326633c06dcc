use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use tileboard_core::media::{content_type_for_ext, extension};
use tileboard_core::types::{PaletteEntry, DEFAULT_PALETTE_NAME};
use tileboard_core::StoreResult;

use super::{api_error, store_error, ApiResult};
use crate::state::AppState;
use crate::store::PaletteRepo;

const TARGET: &str = "tileboard.api.upload";

/// A file received by the upload endpoint.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Storage path for an upload: `{prefix}/{millis}-{uuid}.{ext}`. The
/// extension of the original name is kept, `png` when it has none.
pub fn object_path_for(prefix: &str, file_name: &str) -> String {
    let ext = extension(file_name).unwrap_or_else(|| "png".to_string());
    format!(
        "{}/{}-{}.{}",
        prefix.trim_matches('/'),
        chrono::Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple(),
        ext
    )
}

/// Display name for the new entry: the trimmed `name` field, or
/// `"palette"` when it is missing or blank.
pub fn entry_name(name: Option<&str>) -> String {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_PALETTE_NAME)
        .to_string()
}

/// Store the file, then insert a palette entry pointing at its public address.
pub async fn create_uploaded_palette(
    repo: &PaletteRepo,
    upload_prefix: &str,
    file: UploadedFile,
    name: Option<&str>,
) -> StoreResult<PaletteEntry> {
    let path = object_path_for(upload_prefix, &file.file_name);
    let content_type = file
        .content_type
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| content_type_for_ext(extension(&file.file_name).as_deref()).to_string());

    repo.upload_object(&path, file.bytes, &content_type).await?;
    let image_url = repo.public_url(&path);
    let entry = repo
        .insert_palette(&entry_name(name), Some(&image_url))
        .await?;
    log::info!(target: TARGET, "Uploaded {} as palette entry {}", path, entry.id);
    Ok(entry)
}

/// POST /api/upload -- multipart `file` and optional `name`.
pub async fn upload_palette(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let repo = state.repo().map_err(|e| store_error(TARGET, e))?;

    let mut file: Option<UploadedFile> = None;
    let mut name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        api_error(
            StatusCode::BAD_REQUEST,
            TARGET,
            format!("Failed to read multipart: {}", e),
        )
    })? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    api_error(
                        StatusCode::BAD_REQUEST,
                        TARGET,
                        format!("Failed to read file data: {}", e),
                    )
                })?;
                file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some("name") => {
                name = Some(field.text().await.map_err(|e| {
                    api_error(
                        StatusCode::BAD_REQUEST,
                        TARGET,
                        format!("Failed to read name: {}", e),
                    )
                })?);
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| api_error(StatusCode::BAD_REQUEST, TARGET, "No file provided"))?;
    if file.bytes.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, TARGET, "Empty file"));
    }

    let entry = create_uploaded_palette(&repo, &state.config.upload_prefix, file, name.as_deref())
        .await
        .map_err(|e| store_error(TARGET, e))?;
    Ok(Json(json!({ "ok": true, "palette": entry })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use axum::extract::FromRequest;

    fn png(name: &str) -> UploadedFile {
        UploadedFile {
            file_name: name.to_string(),
            content_type: Some("image/png".to_string()),
            bytes: vec![0x89, b'P', b'N', b'G'],
        }
    }

    #[test]
    fn test_object_path_keeps_extension() {
        let path = object_path_for("uploaded", "art.JPG");
        assert!(path.starts_with("uploaded/"));
        assert!(path.ends_with(".jpg"));
        assert!(object_path_for("/uploaded/", "noext").ends_with(".png"));
        assert_ne!(object_path_for("u", "a.png"), object_path_for("u", "a.png"));
    }

    #[test]
    fn test_entry_name_defaults() {
        assert_eq!(entry_name(None), "palette");
        assert_eq!(entry_name(Some("   ")), "palette");
        assert_eq!(entry_name(Some("  art ")), "art");
    }

    #[tokio::test]
    async fn test_upload_stores_file_and_inserts_entry() {
        let repo = PaletteRepo::Memory(MemoryStore::new());
        let entry = create_uploaded_palette(&repo, "uploaded", png("art.png"), Some("art"))
            .await
            .unwrap();
        assert_eq!(entry.name.as_deref(), Some("art"));

        let url = entry.image_url.unwrap();
        let path = repo.object_path(&url).unwrap();
        assert!(path.ends_with(".png"));
        let PaletteRepo::Memory(store) = &repo else {
            unreachable!()
        };
        assert!(store.has_object(&path));
    }

    #[tokio::test]
    async fn test_upload_without_name_uses_default() {
        let repo = PaletteRepo::Memory(MemoryStore::new());
        let entry = create_uploaded_palette(&repo, "uploaded", png("x.png"), None)
            .await
            .unwrap();
        assert_eq!(entry.name.as_deref(), Some("palette"));
    }

    const BOUNDARY: &str = "tileboard-test-boundary";

    enum Part<'a> {
        File(&'a str, &'a [u8]),
        Text(&'a str, &'a str),
    }

    fn form_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::File(file_name, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
                            file_name
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                }
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}",
                            name, value
                        )
                        .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn post_form(state: AppState, parts: &[Part<'_>]) -> ApiResult<Json<Value>> {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                axum::http::header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(axum::body::Body::from(form_body(parts)))
            .unwrap();
        let multipart = Multipart::from_request(request, &()).await.unwrap();
        upload_palette(State(state), multipart).await
    }

    fn memory_state() -> AppState {
        AppState::with_repo(
            crate::config::ServerConfig::default(),
            PaletteRepo::Memory(MemoryStore::new()),
        )
    }

    #[tokio::test]
    async fn test_upload_handler_returns_entry() {
        let state = memory_state();
        let Json(body) = post_form(
            state.clone(),
            &[Part::File("art.png", b"\x89PNG"), Part::Text("name", "art")],
        )
        .await
        .unwrap();

        assert_eq!(body["ok"], true);
        let palette = &body["palette"];
        assert_eq!(palette["name"], "art");
        assert!(palette["id"].is_string());
        let url = palette["image_url"].as_str().unwrap();

        let repo = state.repo().unwrap();
        let path = repo.object_path(url).unwrap();
        assert!(path.starts_with("uploaded/"));
        assert!(path.ends_with(".png"));
        let PaletteRepo::Memory(store) = repo.as_ref() else {
            unreachable!()
        };
        assert!(store.has_object(&path));
    }

    #[tokio::test]
    async fn test_upload_handler_blank_name_defaults() {
        let Json(body) = post_form(
            memory_state(),
            &[Part::Text("name", "  "), Part::File("x.png", b"\x89PNG")],
        )
        .await
        .unwrap();
        assert_eq!(body["palette"]["name"], "palette");
    }

    #[tokio::test]
    async fn test_upload_handler_requires_file() {
        let (status, Json(err)) = post_form(memory_state(), &[Part::Text("name", "art")])
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!err.ok);
        assert_eq!(err.error, "No file provided");
    }

    #[tokio::test]
    async fn test_upload_handler_rejects_empty_file() {
        let state = memory_state();
        let (status, Json(err)) = post_form(state.clone(), &[Part::File("art.png", b"")])
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err.error, "Empty file");

        let repo = state.repo().unwrap();
        let PaletteRepo::Memory(store) = repo.as_ref() else {
            unreachable!()
        };
        assert!(store.palettes().is_empty());
    }
}
