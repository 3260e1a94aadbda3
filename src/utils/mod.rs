use std::path::Path;

use url::Url;

const DEFAULT_EXTENSION: &str = ".mp4";

/// True iff `input` is an absolute http or https URL
pub fn is_valid_url(input: &str) -> bool {
    match Url::parse(input) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Sanitize filename to remove invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Extension (with the leading dot) of the last path segment of a file reference.
pub fn file_extension(file_ref: &str) -> String {
    let path = Url::parse(file_ref)
        .map(|url| url.path().to_string())
        .unwrap_or_else(|_| {
            file_ref
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_string()
        });

    Path::new(&path)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Name a finished download after the video title and the served file's extension.
pub fn download_filename(video_name: &str, file_ref: &str) -> String {
    let stem = sanitize_filename(video_name);
    let stem = stem.trim_matches(|c| c == '.' || c == ' ');
    let stem = if stem.is_empty() { "video" } else { stem };
    format!("{}{}", stem, file_extension(file_ref))
}
