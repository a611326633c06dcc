/// REST client for the hosted backend: row API under `/rest/v1` and object
/// storage under `/storage/v1`.
///
/// The same client serves both key levels. Built with the public key it
/// backs a board session; built with the service key it backs the write
/// endpoints.
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use tileboard_core::store::BoardStore;
use tileboard_core::types::{Cell, CellId, PaletteEntry, PaletteId};
use tileboard_core::{StoreError, StoreResult};

const CELLS_TABLE: &str = "board_cells";
const PALETTE_TABLE: &str = "palette";
const CELL_COLUMNS: &str = "id,x,y,palette_id,palette:palette_id(name,image_url)";
const PALETTE_COLUMNS: &str = "id,name,image_url";

fn encode(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

#[derive(Clone)]
pub struct RestClient {
    base_url: String,
    key: String,
    bucket: String,
    http: reqwest::Client,
}

impl RestClient {
    pub fn new(base_url: &str, key: &str, bucket: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            bucket: bucket.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn rest_url(&self, table: &str, query: &str) -> String {
        format!("{}/rest/v1/{}?{}", self.base_url, table, query)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("apikey", &self.key).bearer_auth(&self.key)
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<Response> {
        let response = self
            .authed(request)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        Err(StoreError::backend(backend_message(status.as_u16(), &text)))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> StoreResult<T> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    // ── Cells ───────────────────────────────────────────────────────────

    pub async fn select_cells(&self) -> StoreResult<Vec<Cell>> {
        let url = self.rest_url(
            CELLS_TABLE,
            &format!("select={}&order=y.asc,x.asc", CELL_COLUMNS),
        );
        self.send_json(self.http.get(url)).await
    }

    pub async fn select_cell(&self, id: CellId) -> StoreResult<Cell> {
        let url = self.rest_url(
            CELLS_TABLE,
            &format!("select={}&id=eq.{}&limit=1", CELL_COLUMNS, id),
        );
        let rows: Vec<Cell> = self.send_json(self.http.get(url)).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("cell {}", id)))
    }

    pub async fn insert_cell(
        &self,
        x: u32,
        y: u32,
        palette_id: Option<PaletteId>,
    ) -> StoreResult<Cell> {
        let url = self.rest_url(CELLS_TABLE, &format!("select={}", CELL_COLUMNS));
        let request = self
            .http
            .post(url)
            .header("Prefer", "return=representation")
            .json(&json!([{ "x": x, "y": y, "palette_id": palette_id }]));
        let rows: Vec<Cell> = self.send_json(request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no row".to_string()))
    }

    /// PATCH `palette_id` on every cell matching a PostgREST filter.
    async fn set_cell_palette(&self, filter: &str, palette_id: Option<&str>) -> StoreResult<()> {
        let request = self
            .http
            .patch(self.rest_url(CELLS_TABLE, filter))
            .header("Prefer", "return=minimal")
            .json(&json!({ "palette_id": palette_id }));
        self.send(request).await.map(|_| ())
    }

    pub async fn update_cell_palette(
        &self,
        id: CellId,
        palette_id: Option<&str>,
    ) -> StoreResult<()> {
        self.set_cell_palette(&format!("id=eq.{}", id), palette_id).await
    }

    pub async fn update_cells_palette(
        &self,
        ids: &[CellId],
        palette_id: Option<&str>,
    ) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let list = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.set_cell_palette(&format!("id=in.({})", list), palette_id)
            .await
    }

    /// Null every cell reference to a palette entry.
    pub async fn clear_palette_refs(&self, palette_id: &str) -> StoreResult<()> {
        self.set_cell_palette(&format!("palette_id=eq.{}", encode(palette_id)), None)
            .await
    }

    // ── Palette ─────────────────────────────────────────────────────────

    pub async fn select_palettes(&self) -> StoreResult<Vec<PaletteEntry>> {
        let url = self.rest_url(
            PALETTE_TABLE,
            &format!("select={}&order=created_at.desc", PALETTE_COLUMNS),
        );
        self.send_json(self.http.get(url)).await
    }

    pub async fn select_palette(&self, id: &str) -> StoreResult<Option<PaletteEntry>> {
        let url = self.rest_url(
            PALETTE_TABLE,
            &format!("select={}&id=eq.{}&limit=1", PALETTE_COLUMNS, encode(id)),
        );
        let rows: Vec<PaletteEntry> = self.send_json(self.http.get(url)).await?;
        Ok(rows.into_iter().next())
    }

    /// Case-insensitive lookup by exact name.
    pub async fn find_palette_by_name(&self, name: &str) -> StoreResult<Option<PaletteEntry>> {
        let url = self.rest_url(
            PALETTE_TABLE,
            &format!(
                "select={}&name=ilike.{}&order=created_at.asc&limit=1",
                PALETTE_COLUMNS,
                encode(name)
            ),
        );
        let rows: Vec<PaletteEntry> = self.send_json(self.http.get(url)).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn insert_palette(
        &self,
        name: &str,
        image_url: Option<&str>,
    ) -> StoreResult<PaletteEntry> {
        let url = self.rest_url(PALETTE_TABLE, &format!("select={}", PALETTE_COLUMNS));
        let request = self
            .http
            .post(url)
            .header("Prefer", "return=representation")
            .json(&json!([{ "name": name, "image_url": image_url }]));
        let rows: Vec<PaletteEntry> = self.send_json(request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no row".to_string()))
    }

    pub async fn delete_palette_row(&self, id: &str) -> StoreResult<()> {
        let url = self.rest_url(PALETTE_TABLE, &format!("id=eq.{}", encode(id)));
        self.send(self.http.delete(url)).await.map(|_| ())
    }

    // ── Object storage ──────────────────────────────────────────────────

    pub async fn upload_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> StoreResult<()> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path);
        let request = self
            .http
            .post(url)
            .header("content-type", content_type)
            .header("x-upsert", "false")
            .body(bytes);
        self.send(request).await.map(|_| ())
    }

    pub async fn remove_object(&self, path: &str) -> StoreResult<()> {
        let url = format!("{}/storage/v1/object/{}", self.base_url, self.bucket);
        let request = self.http.delete(url).json(&json!({ "prefixes": [path] }));
        self.send(request).await.map(|_| ())
    }

    pub fn public_prefix(&self) -> String {
        format!("{}/storage/v1/object/public/{}/", self.base_url, self.bucket)
    }
}

/// Pull the human-readable message out of a backend error body. PostgREST
/// and storage both answer with `{ "message": ... }`; anything else is
/// reported with its status.
fn backend_message(status: u16, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            let snippet: String = body.chars().take(200).collect();
            format!("HTTP {}: {}", status, snippet)
        })
}

impl BoardStore for RestClient {
    async fn fetch_cells(&self) -> StoreResult<Vec<Cell>> {
        self.select_cells().await
    }

    async fn fetch_cell(&self, id: CellId) -> StoreResult<Cell> {
        self.select_cell(id).await
    }

    async fn fetch_palettes(&self) -> StoreResult<Vec<PaletteEntry>> {
        self.select_palettes().await
    }

    async fn create_cell(
        &self,
        x: u32,
        y: u32,
        palette_id: Option<PaletteId>,
    ) -> StoreResult<Cell> {
        self.insert_cell(x, y, palette_id).await
    }

    async fn update_cell(&self, id: CellId, palette_id: Option<PaletteId>) -> StoreResult<()> {
        self.update_cell_palette(id, palette_id.as_deref()).await
    }

    async fn update_cells(&self, ids: &[CellId], palette_id: Option<PaletteId>) -> StoreResult<()> {
        self.update_cells_palette(ids, palette_id.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_message_prefers_json_message() {
        let body = r#"{"code":"23503","message":"update or delete on table \"palette\" violates foreign key constraint"}"#;
        assert!(backend_message(409, body).contains("violates foreign key"));
        assert_eq!(backend_message(400, r#"{"error":"Bucket not found"}"#), "Bucket not found");
    }

    #[test]
    fn test_backend_message_falls_back_to_status() {
        assert_eq!(backend_message(502, "<html>bad gateway</html>"), "HTTP 502: <html>bad gateway</html>");
    }

    #[test]
    fn test_urls() {
        let client = RestClient::new("https://x.supabase.co/", "k", "palette");
        assert_eq!(client.base_url(), "https://x.supabase.co");
        assert_eq!(
            client.public_prefix(),
            "https://x.supabase.co/storage/v1/object/public/palette/"
        );
        assert_eq!(
            client.rest_url("palette", "id=eq.1"),
            "https://x.supabase.co/rest/v1/palette?id=eq.1"
        );
        assert_eq!(encode("a b"), "a%20b");
    }
}
