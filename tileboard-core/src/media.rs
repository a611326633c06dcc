/// File naming helpers shared by the upload client and the upload endpoint.
use std::path::Path;

/// Extension of a file name, lower-cased. `None` when there is none.
pub fn extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_lowercase())
}

/// Palette display name for an uploaded file: the file name without its
/// last `.ext`. A dot-file such as `.hidden` is all extension and yields an
/// empty name.
pub fn display_name(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    match base.rfind('.') {
        Some(idx) if idx + 1 < base.len() => base[..idx].to_string(),
        _ => base.to_string(),
    }
}

/// Map a file extension to its MIME content type.
pub fn content_type_for_ext(ext: Option<&str>) -> &'static str {
    match ext {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("bmp") => "image/bmp",
        Some("avif") => "image/avif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_strips_extension() {
        assert_eq!(display_name("art.png"), "art");
        assert_eq!(display_name("my.cat.jpeg"), "my.cat");
        assert_eq!(display_name("noext"), "noext");
        assert_eq!(display_name(".hidden"), "");
        assert_eq!(display_name("trailing."), "trailing.");
        assert_eq!(display_name("/tmp/dir/art.png"), "art");
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("A.PNG").as_deref(), Some("png"));
        assert_eq!(extension("plain"), None);
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type_for_ext(Some("jpg")), "image/jpeg");
        assert_eq!(content_type_for_ext(None), "application/octet-stream");
    }
}
