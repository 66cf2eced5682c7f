use std::io::Write;
use std::path::Path;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use super::errors::Result;

/// OAuth2 bearer credentials as persisted on disk.
///
/// `expiry_date` is an epoch timestamp in milliseconds. The record is written
/// flat and replaced atomically on every update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expiry_date: i64,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl Credentials {
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        self.access_token.is_none() || now_millis >= self.expiry_date
    }

    /// An access token is usable only while `now < expiry_date`.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }

    /// Access token, if present and not yet expired.
    pub fn bearer(&self) -> Option<&str> {
        if self.is_expired() {
            return None;
        }
        self.access_token.as_deref()
    }

    /// Reads a record from `path`. Absent or unparsable files yield `None`.
    pub fn read_from(path: &Path) -> Option<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Failed to read credentials");
                return None;
            }
        };

        match serde_json::from_str(&data) {
            Ok(credentials) => Some(credentials),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Ignoring corrupt credentials file");
                None
            }
        }
    }

    /// Writes the full record next to `path` and renames it into place, so a
    /// reader never observes a partial file.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, self)?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|err| err.error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Credentials {
        Credentials {
            access_token: Some("ya29.token".to_string()),
            refresh_token: Some("1//refresh".to_string()),
            expiry_date: 1_700_000_000_000,
            client_id: "client.apps.googleusercontent.com".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://127.0.0.1:52719".to_string(),
        }
    }

    #[test]
    fn test_expiry_boundary() {
        let credentials = sample();
        assert!(!credentials.is_expired_at(credentials.expiry_date - 1));
        assert!(credentials.is_expired_at(credentials.expiry_date));

        let no_access = Credentials { access_token: None, ..sample() };
        assert!(no_access.is_expired_at(0));
    }

    #[test]
    fn test_persisted_record_reads_back_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token.json");

        let credentials = sample();
        credentials.write_to(&path).unwrap();
        let first = std::fs::read(&path).unwrap();

        let loaded = Credentials::read_from(&path).unwrap();
        assert_eq!(loaded, credentials);

        loaded.write_to(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }

    #[test]
    fn test_missing_or_corrupt_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        assert!(Credentials::read_from(&path).is_none());

        std::fs::write(&path, "{ not json").unwrap();
        assert!(Credentials::read_from(&path).is_none());
    }
}
