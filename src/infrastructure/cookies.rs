//! Credential store for the parcel detail site
//!
//! 사용자가 브라우저에서 내보낸 쿠키 JSON(`{"cookies":[{"name":..,"value":..}]}`)을
//! 애플리케이션 데이터 디렉터리에 보관하고, 요청용 `Cookie` 헤더로 변환합니다.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::info;

/// Stored cookie file name
pub const COOKIE_FILE_NAME: &str = "sigef-cookies.json";

#[derive(Debug, Error)]
pub enum CookieStoreError {
    #[error("No stored cookies at {}", path.display())]
    Missing { path: PathBuf },

    #[error("Cookie file I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cookie JSON is invalid: {0}")]
    Invalid(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookiesFile {
    pub cookies: Vec<Cookie>,
}

impl CookiesFile {
    /// `name=value` pairs joined by `;`
    #[must_use]
    pub fn header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// File-backed cookie store
#[derive(Debug, Clone)]
pub struct CookieStore {
    path: PathBuf,
}

impl CookieStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store inside `dir` under the default file name
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(COOKIE_FILE_NAME))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save pasted cookie JSON text. The text must parse; it is stored as given.
    pub async fn save_text(&self, text: &str) -> Result<PathBuf, CookieStoreError> {
        let parsed: CookiesFile = serde_json::from_str(text)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|source| CookieStoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&self.path, text).await.map_err(|source| CookieStoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        info!("🍪 Saved {} cookies to {:?}", parsed.cookies.len(), self.path);
        Ok(self.path.clone())
    }

    /// Import a cookie JSON file chosen by the user
    pub async fn import_file(&self, source_path: impl AsRef<Path>) -> Result<PathBuf, CookieStoreError> {
        let source_path = source_path.as_ref();
        let content = fs::read_to_string(source_path)
            .await
            .map_err(|source| CookieStoreError::Io {
                path: source_path.to_path_buf(),
                source,
            })?;
        self.save_text(&content).await
    }

    pub async fn load(&self) -> Result<CookiesFile, CookieStoreError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CookieStoreError::Missing { path: self.path.clone() })
            }
            Err(source) => {
                return Err(CookieStoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// Render the stored cookies as a `Cookie` header value
    pub async fn cookie_header(&self) -> Result<String, CookieStoreError> {
        Ok(self.load().await?.header_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"{"cookies":[{"name":"sessionid","value":"abc"},{"name":"csrftoken","value":"xyz"}]}"#;

    #[tokio::test]
    async fn saved_text_renders_header() {
        let dir = tempdir().unwrap();
        let store = CookieStore::in_dir(dir.path().join("data"));

        let path = store.save_text(SAMPLE).await.unwrap();

        assert!(path.ends_with(COOKIE_FILE_NAME));
        assert_eq!(store.cookie_header().await.unwrap(), "sessionid=abc;csrftoken=xyz");
    }

    #[tokio::test]
    async fn import_copies_user_file() {
        let dir = tempdir().unwrap();
        let exported = dir.path().join("export.json");
        std::fs::write(&exported, SAMPLE).unwrap();
        let store = CookieStore::in_dir(dir.path());

        store.import_file(&exported).await.unwrap();

        assert_eq!(store.load().await.unwrap().cookies.len(), 2);
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let dir = tempdir().unwrap();
        let store = CookieStore::in_dir(dir.path());
        assert!(matches!(store.cookie_header().await, Err(CookieStoreError::Missing { .. })));
    }

    #[tokio::test]
    async fn invalid_text_is_rejected_and_not_written() {
        let dir = tempdir().unwrap();
        let store = CookieStore::in_dir(dir.path());

        assert!(matches!(store.save_text("not json").await, Err(CookieStoreError::Invalid(_))));
        assert!(!store.path().exists());
    }

    #[test]
    fn empty_cookie_list_renders_empty_header() {
        assert_eq!(CookiesFile { cookies: vec![] }.header_value(), "");
    }
}
