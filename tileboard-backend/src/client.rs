/// Client for the write endpoints (`/api/...`) of a running tileboard server.
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde_json::Value;
use tileboard_core::media::{content_type_for_ext, extension};
use tileboard_core::store::{UploadRequest, WriteApi};
use tileboard_core::types::{PaletteEntry, PaletteId};
use tileboard_core::{StoreError, StoreResult};

#[derive(Clone)]
pub struct EndpointClient {
    base_url: String,
    http: reqwest::Client,
}

impl EndpointClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Read an endpoint response. Anything that is not a 2xx JSON body without
/// `ok: false` becomes an error carrying the endpoint's message.
async fn read_json(response: Response) -> StoreResult<Value> {
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| StoreError::Network(e.to_string()))?;
    interpret(status, &text)
}

fn interpret(status: u16, text: &str) -> StoreResult<Value> {
    let json: Value = serde_json::from_str(text).map_err(|_| {
        let snippet: String = text.chars().take(200).collect();
        StoreError::Api {
            status,
            message: format!("API {}: {}", status, snippet),
        }
    })?;
    let failed = !(200..300).contains(&status) || json.get("ok") == Some(&Value::Bool(false));
    if failed {
        let message = json
            .get("error")
            .and_then(|e| e.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("API {}", status));
        return Err(StoreError::Api { status, message });
    }
    Ok(json)
}

impl WriteApi for EndpointClient {
    async fn ensure_wall(&self) -> StoreResult<PaletteId> {
        let response = self
            .http
            .get(self.url("/api/wall"))
            .header("cache-control", "no-store")
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let json = read_json(response).await?;
        json.get("id")
            .and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| StoreError::Decode("wall response has no id".to_string()))
    }

    async fn delete_palette(&self, id: &str) -> StoreResult<()> {
        let response = self
            .http
            .delete(self.url(&format!(
                "/api/palette/{}",
                utf8_percent_encode(id, NON_ALPHANUMERIC)
            )))
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        read_json(response).await.map(|_| ())
    }

    async fn upload_palette(&self, upload: UploadRequest) -> StoreResult<PaletteEntry> {
        let mime = upload.content_type.clone().unwrap_or_else(|| {
            content_type_for_ext(extension(&upload.file_name).as_deref()).to_string()
        });
        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&mime)
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        let mut form = Form::new().part("file", part);
        if let Some(name) = upload.name {
            form = form.text("name", name);
        }

        let response = self
            .http
            .post(self.url("/api/upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let json = read_json(response).await?;
        let palette = json
            .get("palette")
            .cloned()
            .ok_or_else(|| StoreError::Decode("upload response has no palette".to_string()))?;
        serde_json::from_value(palette).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_success() {
        let json = interpret(200, r#"{"ok":true}"#).unwrap();
        assert_eq!(json["ok"], true);
    }

    #[test]
    fn test_interpret_error_body() {
        let err = interpret(500, r#"{"ok":false,"error":"violates foreign key"}"#).unwrap_err();
        assert_eq!(err.user_message(), "violates foreign key");
    }

    #[test]
    fn test_interpret_ok_false_with_2xx() {
        let err = interpret(200, r#"{"ok":false,"error":"nope"}"#).unwrap_err();
        assert_eq!(err.user_message(), "nope");
    }

    #[test]
    fn test_interpret_non_json() {
        let err = interpret(502, "<html>Bad Gateway</html>").unwrap_err();
        assert_eq!(err.user_message(), "API 502: <html>Bad Gateway</html>");
    }

    #[test]
    fn test_interpret_error_without_message() {
        let err = interpret(404, "{}").unwrap_err();
        assert_eq!(err.user_message(), "API 404");
    }
}
