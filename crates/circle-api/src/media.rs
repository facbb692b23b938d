use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, info};
use uuid::Uuid;

use circle_types::api::SignedMediaQuery;

use crate::error::ApiError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Largest image accepted for an avatar, post or story.
pub const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;

/// Reject empty or oversized image uploads before anything touches disk.
pub fn check_upload(bytes: &[u8]) -> Result<(), ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::Validation("Image is required.".into()));
    }
    if bytes.len() > MAX_IMAGE_SIZE {
        return Err(ApiError::PayloadTooLarge);
    }
    Ok(())
}

/// Avatar blob storage on local disk plus time-limited signed display URLs.
///
/// A stored avatar reference is either an absolute `http(s)` URL, passed
/// through unchanged, or a storage key (a UUID) that resolves to
/// `{public_url}/media/{key}?expires=..&signature=..`.
pub struct MediaStore {
    dir: PathBuf,
    public_url: String,
    url_ttl_secs: i64,
    mac: HmacSha256,
}

impl MediaStore {
    pub fn new(dir: PathBuf, public_url: &str, secret: &[u8], url_ttl_secs: i64) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret).context("invalid media signing key")?;
        Ok(Self {
            dir,
            public_url: public_url.trim_end_matches('/').to_string(),
            url_ttl_secs,
            mac,
        })
    }

    /// Store a blob under a fresh key and return the key.
    pub async fn save(&self, bytes: &[u8]) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating media directory {}", self.dir.display()))?;

        let key = Uuid::new_v4().to_string();
        let path = self.dir.join(&key);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        info!("Stored media {} ({} bytes)", key, bytes.len());
        Ok(key)
    }

    /// Read a blob back. Keys that are not UUIDs never touch the filesystem.
    pub async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if key.parse::<Uuid>().is_err() {
            return Ok(None);
        }
        let path = self.dir.join(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    /// Delete a blob. Returns false if there was nothing stored under `key`.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        if key.parse::<Uuid>().is_err() {
            return Ok(false);
        }
        let path = self.dir.join(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }

    /// Resolve a stored avatar reference to something a browser can load.
    pub fn display_url(&self, reference: Option<&str>) -> Option<String> {
        self.display_url_at(reference, chrono::Utc::now().timestamp())
    }

    pub fn display_url_at(&self, reference: Option<&str>, now: i64) -> Option<String> {
        let reference = reference.filter(|r| !r.is_empty())?;
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return Some(reference.to_string());
        }

        let expires = now + self.url_ttl_secs;
        Some(format!(
            "{}/media/{}?expires={}&signature={}",
            self.public_url,
            reference,
            expires,
            self.signature(reference, expires)
        ))
    }

    pub fn verify(&self, key: &str, expires: i64, signature: &str, now: i64) -> bool {
        if expires < now {
            return false;
        }
        let Ok(given) = hex::decode(signature) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(format!("{key}:{expires}").as_bytes());
        mac.verify_slice(&given).is_ok()
    }

    fn signature(&self, key: &str, expires: i64) -> String {
        let mut mac = self.mac.clone();
        mac.update(format!("{key}:{expires}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// GET /media/{key}?expires=..&signature=..: public, authorized by the
/// signature alone.
pub async fn serve_media(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<SignedMediaQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let now = chrono::Utc::now().timestamp();
    if !state.media.verify(&key, query.expires, &query.signature, now) {
        debug!("Rejected media request for {}", key);
        return Err(ApiError::Forbidden);
    }

    let bytes = state.media.load(&key).await?.ok_or(ApiError::NotFound)?;
    Ok(([(header::CONTENT_TYPE, sniff_content_type(&bytes))], bytes))
}

fn sniff_content_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: PathBuf) -> MediaStore {
        MediaStore::new(dir, "http://localhost:5001/", b"secret", 60).unwrap()
    }

    fn query_param<'a>(url: &'a str, name: &str) -> &'a str {
        url.split(['?', '&'])
            .find_map(|part| part.strip_prefix(&format!("{name}=")))
            .unwrap()
    }

    #[test]
    fn absolute_urls_pass_through() {
        let media = store(PathBuf::from("unused"));
        let url = "https://cdn.example.com/a.png";
        assert_eq!(media.display_url(Some(url)).as_deref(), Some(url));
        assert_eq!(media.display_url(None), None);
        assert_eq!(media.display_url(Some("")), None);
    }

    #[test]
    fn signed_urls_verify_until_they_expire() {
        let media = store(PathBuf::from("unused"));
        let key = Uuid::new_v4().to_string();
        let url = media.display_url_at(Some(&key), 1_000).unwrap();
        assert!(url.starts_with(&format!("http://localhost:5001/media/{key}?")));

        let expires: i64 = query_param(&url, "expires").parse().unwrap();
        let signature = query_param(&url, "signature");
        assert_eq!(expires, 1_060);

        assert!(media.verify(&key, expires, signature, 1_030));
        assert!(!media.verify(&key, expires, signature, 1_061));
        assert!(!media.verify(&key, expires + 1, signature, 1_030));
        assert!(!media.verify("other", expires, signature, 1_030));
        assert!(!media.verify(&key, expires, "not-hex", 1_030));
    }

    #[tokio::test]
    async fn blobs_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let media = store(dir.path().join("media"));

        let key = media.save(b"\x89PNG....").await.unwrap();
        let bytes = media.load(&key).await.unwrap().unwrap();
        assert_eq!(sniff_content_type(&bytes), "image/png");

        assert!(media.load("../etc/passwd").await.unwrap().is_none());
        assert!(media.load(&Uuid::new_v4().to_string()).await.unwrap().is_none());
    }
}
