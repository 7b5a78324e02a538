use std::collections::HashMap;
use std::path::Path;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// MIME lookup for a filename. A filename-exact override table takes
/// precedence over extension lookup; unknown extensions fall back to
/// `application/octet-stream`.
pub fn lookup(overrides: &HashMap<String, String>, filename: &str) -> String {
    let basename = Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());

    if let Some(mime) = overrides.get(&basename) {
        return mime.clone();
    }

    mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or(OCTET_STREAM)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_lookup() {
        let overrides = HashMap::new();
        assert_eq!(lookup(&overrides, "text file.txt"), "text/plain");
        assert_eq!(lookup(&overrides, "hypertext file.html"), "text/html");
        assert_eq!(lookup(&overrides, "image file.png"), "image/png");
    }

    #[test]
    fn test_unknown_extension_falls_back() {
        let overrides = HashMap::new();
        assert_eq!(lookup(&overrides, "unknown file.666"), OCTET_STREAM);
        assert_eq!(lookup(&overrides, "no extension"), OCTET_STREAM);
    }

    #[test]
    fn test_override_table_wins() {
        let mut overrides = HashMap::new();
        overrides.insert("defined file".to_string(), "test/jest".to_string());
        overrides.insert("data.txt".to_string(), "application/x-custom".to_string());

        assert_eq!(lookup(&overrides, "defined file"), "test/jest");
        assert_eq!(lookup(&overrides, "data.txt"), "application/x-custom");
        assert_eq!(lookup(&overrides, "home/data.txt"), "application/x-custom");
    }
}
