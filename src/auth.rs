use anyhow::{bail, Context};
use std::fs;
use std::path::Path;
use wscleaner_core::AppConfig;

/// The token is the first line of the file, surrounding whitespace removed.
pub fn read_token_file(path: &Path) -> anyhow::Result<String> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read auth token file {}", path.display()))?;
    let token = contents.lines().next().unwrap_or_default().trim();
    if token.is_empty() {
        bail!("Auth token file {} is empty", path.display());
    }
    Ok(token.to_string())
}

/// An explicit token wins over the configured token file.
pub fn resolve_token(explicit: Option<&str>, config: &AppConfig) -> anyhow::Result<String> {
    if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }
    match &config.archive.auth_token_file {
        Some(path) => read_token_file(path),
        None => bail!("No archive auth token: pass --auth <file> or set DX_AUTH_TOKEN"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_token_is_first_line_trimmed() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("token");
        fs::write(&path, "  abc123  \nsecond line\n").unwrap();
        assert_eq!(read_token_file(&path).unwrap(), "abc123");
    }

    #[test]
    fn test_empty_token_file_is_rejected() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("token");
        fs::write(&path, "\n").unwrap();
        assert!(read_token_file(&path).is_err());
    }

    #[test]
    fn test_explicit_token_wins() {
        let config = AppConfig::default();
        assert_eq!(resolve_token(Some("xyz"), &config).unwrap(), "xyz");
        assert!(resolve_token(None, &config).is_err());
    }
}
