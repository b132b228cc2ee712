//! Resolution of media paths returned by the service.
//!
//! Job results reference generated images by a path relative to the
//! service's media root (`media/processed/...`, `media/results/...`).
//! Workers running on Windows hosts report those paths with `\`.

/// Normalize a returned media path: backslashes become `/`, and leading
/// `./` or `/` are dropped.
pub fn normalize_path(path: &str) -> String {
    let path = path.trim().replace('\\', "/");
    let mut rest = path.as_str();
    loop {
        if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('/') {
            rest = stripped;
        } else {
            break;
        }
    }
    rest.to_string()
}

/// Absolute URL of a media path under `base_url`.
///
/// Paths that already are absolute `http(s)` URLs are returned unchanged.
pub fn media_url(base_url: &str, path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return trimmed.to_string();
    }
    format!("{}/{}", base_url.trim_end_matches('/'), normalize_path(trimmed))
}
