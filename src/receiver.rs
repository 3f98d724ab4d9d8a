//! Artifact validation and buffering.
//!
//! The receiver checks an upload's declared media type and size before reading
//! any payload, then buffers the stream fully while enforcing the size ceiling
//! on every chunk. Scoring backends in scope need complete artifacts, so no
//! streaming interface is exposed past this point.

use crate::config::ReceiverConfig;
use crate::error::ValidationError;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// SHA-256 of an artifact's bytes; the artifact's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactDigest(pub [u8; 32]);

impl ArtifactDigest {
    /// Digest the given bytes.
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Get as hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ArtifactDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// A validated, fully buffered upload.
#[derive(Debug, Clone)]
pub struct Artifact {
    bytes: Bytes,
    media_type: String,
    received_at: DateTime<Utc>,
    digest: ArtifactDigest,
}

impl Artifact {
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn digest(&self) -> ArtifactDigest {
        self.digest
    }
}

/// Normalize a `Content-Type` value: lowercase, parameters stripped, aliases folded.
pub fn normalize_media_type(raw: &str) -> String {
    let essence = raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "image/x-png" => "image/png".to_string(),
        _ => essence,
    }
}

/// Validates and buffers uploaded artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactReceiver {
    max_bytes: u64,
    allowed: BTreeSet<String>,
}

impl ArtifactReceiver {
    /// Create a receiver from configuration.
    pub fn new(config: &ReceiverConfig) -> Self {
        Self {
            max_bytes: config.max_artifact_bytes,
            allowed: config
                .allowed_media_types
                .iter()
                .map(|m| normalize_media_type(m))
                .collect(),
        }
    }

    /// Size ceiling in bytes.
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Whether a (raw or normalized) media type is on the allow-list.
    pub fn is_allowed(&self, media_type: &str) -> bool {
        self.allowed.contains(&normalize_media_type(media_type))
    }

    /// Check the declared attributes of an upload before reading its payload.
    pub fn precheck(
        &self,
        declared_media_type: Option<&str>,
        declared_size: Option<u64>,
    ) -> Result<String, ValidationError> {
        let media_type = declared_media_type
            .map(normalize_media_type)
            .unwrap_or_else(|| "application/octet-stream".to_string());

        if !self.allowed.contains(&media_type) {
            return Err(ValidationError::UnsupportedMediaType(media_type));
        }

        match declared_size {
            Some(0) => Err(ValidationError::Empty),
            Some(size) if size > self.max_bytes => Err(ValidationError::Oversize {
                size,
                max: self.max_bytes,
            }),
            _ => Ok(media_type),
        }
    }

    /// Validate and buffer an upload into an [`Artifact`].
    ///
    /// Fails with `UnsupportedMediaType` or `Oversize` before the first chunk
    /// is read when the declared attributes already violate limits. While
    /// buffering, the ceiling is enforced against the bytes actually received.
    pub async fn receive<S, E>(
        &self,
        stream: S,
        declared_media_type: Option<&str>,
        declared_size: Option<u64>,
    ) -> Result<Artifact, ValidationError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: fmt::Display,
    {
        let media_type = self.precheck(declared_media_type, declared_size)?;

        let capacity = declared_size.unwrap_or(0).min(self.max_bytes) as usize;
        let mut buffer = BytesMut::with_capacity(capacity);

        futures::pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                debug!(received = buffer.len(), error = %e, "Artifact stream failed");
                ValidationError::Truncated {
                    received: buffer.len() as u64,
                    declared: declared_size,
                }
            })?;

            let received = (buffer.len() + chunk.len()) as u64;
            if received > self.max_bytes {
                return Err(ValidationError::Oversize {
                    size: received,
                    max: self.max_bytes,
                });
            }
            buffer.extend_from_slice(&chunk);
        }

        let size = buffer.len() as u64;
        if size == 0 {
            return Err(ValidationError::Empty);
        }
        if let Some(declared) = declared_size {
            if size < declared {
                return Err(ValidationError::Truncated {
                    received: size,
                    declared: Some(declared),
                });
            }
        }

        let bytes = buffer.freeze();
        let digest = ArtifactDigest::of(&bytes);
        debug!(%digest, size, media_type = %media_type, "Artifact received");

        Ok(Artifact {
            bytes,
            media_type,
            received_at: Utc::now(),
            digest,
        })
    }

    /// Validate an in-memory payload.
    pub async fn receive_bytes(
        &self,
        data: Bytes,
        declared_media_type: Option<&str>,
    ) -> Result<Artifact, ValidationError> {
        let size = data.len() as u64;
        let stream = futures::stream::iter([Ok::<_, std::convert::Infallible>(data)]);
        self.receive(stream, declared_media_type, Some(size)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn receiver(max: u64) -> ArtifactReceiver {
        ArtifactReceiver::new(&ReceiverConfig {
            max_artifact_bytes: max,
            ..Default::default()
        })
    }

    fn chunks(parts: Vec<&'static [u8]>) -> impl Stream<Item = Result<Bytes, String>> {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p))))
    }

    #[test]
    fn test_normalize_media_type() {
        assert_eq!(normalize_media_type("IMAGE/PNG"), "image/png");
        assert_eq!(normalize_media_type("image/jpeg; charset=binary"), "image/jpeg");
        assert_eq!(normalize_media_type("image/jpg"), "image/jpeg");
        assert_eq!(normalize_media_type(" text/plain "), "text/plain");
    }

    #[test]
    fn test_digest_hex() {
        let digest = ArtifactDigest::of(b"abc");
        assert_eq!(
            digest.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digest.to_string(), "ba7816bf8f01cfea");
    }

    #[tokio::test]
    async fn test_receive_chunked() {
        let artifact = receiver(64)
            .receive(chunks(vec![&b"\x89PNG"[..], &b"\r\n"[..], &b"data"[..]]), Some("image/png"), None)
            .await
            .unwrap();

        assert_eq!(artifact.size(), 10);
        assert_eq!(artifact.media_type(), "image/png");
        assert_eq!(artifact.bytes().as_ref(), b"\x89PNG\r\ndata");
        assert_eq!(artifact.digest(), ArtifactDigest::of(b"\x89PNG\r\ndata"));
    }

    #[tokio::test]
    async fn test_declared_oversize_rejected_before_reading() {
        let polled = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = polled.clone();
        let stream = stream::once(async move {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok::<_, String>(Bytes::from_static(b"x"))
        });

        let err = receiver(5).receive(stream, Some("image/png"), Some(6)).await.unwrap_err();
        assert_eq!(err, ValidationError::Oversize { size: 6, max: 5 });
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_undeclared_oversize_rejected_while_buffering() {
        let err = receiver(5)
            .receive(chunks(vec![&b"abc"[..], &b"def"[..]]), Some("image/png"), None)
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::Oversize { size: 6, max: 5 });
    }

    #[tokio::test]
    async fn test_exactly_at_ceiling_accepted() {
        let artifact = receiver(5)
            .receive(chunks(vec![&b"abcde"[..]]), Some("image/png"), Some(5))
            .await
            .unwrap();
        assert_eq!(artifact.size(), 5);
    }

    #[tokio::test]
    async fn test_disallowed_media_type() {
        let err = receiver(64)
            .receive(chunks(vec![&b"hello"[..]]), Some("text/plain"), None)
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedMediaType("text/plain".into()));

        let err = receiver(64)
            .receive(chunks(vec![&b"hello"[..]]), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedMediaType(_)));
    }

    #[tokio::test]
    async fn test_empty_payload() {
        let err = receiver(64)
            .receive(chunks(vec![]), Some("image/png"), None)
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::Empty);
    }

    #[tokio::test]
    async fn test_short_stream_is_truncated() {
        let err = receiver(64)
            .receive(chunks(vec![&b"abc"[..]]), Some("image/png"), Some(10))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::Truncated {
                received: 3,
                declared: Some(10)
            }
        );
    }

    #[tokio::test]
    async fn test_stream_error_is_truncated() {
        let stream = stream::iter(vec![
            Ok(Bytes::from_static(b"abcd")),
            Err("connection reset".to_string()),
        ]);
        let err = receiver(64).receive(stream, Some("image/png"), None).await.unwrap_err();
        assert_eq!(
            err,
            ValidationError::Truncated {
                received: 4,
                declared: None
            }
        );
    }

    #[tokio::test]
    async fn test_receive_bytes() {
        let artifact = receiver(64)
            .receive_bytes(Bytes::from_static(b"jpegdata"), Some("image/jpg"))
            .await
            .unwrap();
        assert_eq!(artifact.media_type(), "image/jpeg");
    }
}
