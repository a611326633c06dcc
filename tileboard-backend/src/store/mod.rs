pub mod memory;
pub mod rest;

use tileboard_core::types::PaletteEntry;
use tileboard_core::StoreResult;

use self::memory::{MemoryStore, MEMORY_PUBLIC_PREFIX};
use self::rest::RestClient;

/// Privileged store the write endpoints work against.
/// Implementations: the hosted backend (service key) or the in-memory store.
pub enum PaletteRepo {
    Remote(RestClient),
    Memory(MemoryStore),
}

impl PaletteRepo {
    pub fn kind(&self) -> &'static str {
        match self {
            PaletteRepo::Remote(_) => "remote",
            PaletteRepo::Memory(_) => "memory",
        }
    }

    pub async fn find_palette(&self, id: &str) -> StoreResult<Option<PaletteEntry>> {
        match self {
            PaletteRepo::Remote(client) => client.select_palette(id).await,
            PaletteRepo::Memory(store) => Ok(store.palette(id)),
        }
    }

    pub async fn find_palette_by_name(&self, name: &str) -> StoreResult<Option<PaletteEntry>> {
        match self {
            PaletteRepo::Remote(client) => client.find_palette_by_name(name).await,
            PaletteRepo::Memory(store) => Ok(store.find_palette_by_name(name)),
        }
    }

    pub async fn insert_palette(
        &self,
        name: &str,
        image_url: Option<&str>,
    ) -> StoreResult<PaletteEntry> {
        match self {
            PaletteRepo::Remote(client) => client.insert_palette(name, image_url).await,
            PaletteRepo::Memory(store) => Ok(store.insert_palette(name, image_url)),
        }
    }

    /// Null every cell reference to the entry.
    pub async fn clear_cell_refs(&self, palette_id: &str) -> StoreResult<()> {
        match self {
            PaletteRepo::Remote(client) => client.clear_palette_refs(palette_id).await,
            PaletteRepo::Memory(store) => {
                store.clear_palette_refs(palette_id);
                Ok(())
            }
        }
    }

    pub async fn delete_palette(&self, id: &str) -> StoreResult<()> {
        match self {
            PaletteRepo::Remote(client) => client.delete_palette_row(id).await,
            PaletteRepo::Memory(store) => store.delete_palette(id),
        }
    }

    pub async fn upload_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> StoreResult<()> {
        match self {
            PaletteRepo::Remote(client) => client.upload_object(path, bytes, content_type).await,
            PaletteRepo::Memory(store) => store.put_object(path, bytes, content_type),
        }
    }

    pub async fn remove_object(&self, path: &str) -> StoreResult<()> {
        match self {
            PaletteRepo::Remote(client) => client.remove_object(path).await,
            PaletteRepo::Memory(store) => {
                store.remove_object(path);
                Ok(())
            }
        }
    }

    fn public_prefix(&self) -> String {
        match self {
            PaletteRepo::Remote(client) => client.public_prefix(),
            PaletteRepo::Memory(_) => MEMORY_PUBLIC_PREFIX.to_string(),
        }
    }

    /// Public address of a stored object.
    pub fn public_url(&self, path: &str) -> String {
        format!("{}{}", self.public_prefix(), path)
    }

    /// Object path behind a public address, when it points into our bucket.
    pub fn object_path(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.public_prefix())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
    }
}
