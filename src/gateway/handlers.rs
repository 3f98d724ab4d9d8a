//! Gateway request handlers.

use super::GatewayState;
use crate::error::{OracleError, Result, ValidationError};
use crate::health::{self, LivenessResponse, ReadinessResponse};
use crate::observability;
use crate::receiver::{Artifact, ArtifactReceiver};
use crate::shortage::ShortagePrediction;
use crate::verdict::Verdict;
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::TryStreamExt;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Multipart field expected to carry the artifact.
pub const ARTIFACT_FIELD: &str = "file";

const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Body of `GET /`.
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub status: String,
    pub version: String,
}

pub async fn root(State(state): State<GatewayState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        status: state.service.status_line.clone(),
        version: state.service.version.clone(),
    })
}

/// Liveness. Never consults admission or collaborators.
pub async fn health(State(state): State<GatewayState>) -> Json<LivenessResponse> {
    Json(LivenessResponse::healthy(state.service.name.as_str()))
}

pub async fn ready(State(state): State<GatewayState>) -> Response {
    let report = ReadinessResponse::new(
        state.service.name.as_str(),
        state.service.version.as_str(),
        state.started_at,
    )
    .with_components(vec![
        health::admission_component(&state.admission.stats()),
        health::collaborator_component(
            "scoring",
            state.scoring.backend_name(),
            state.scoring.health(),
        ),
        health::collaborator_component(
            "provenance",
            state.assembler.anchor_name(),
            state.assembler.anchor_health(),
        ),
        health::collaborator_component(
            "shortage",
            state.forecaster.name(),
            state.forecast_health.stats(),
        ),
    ]);

    let status = StatusCode::from_u16(report.status.to_status_code())
        .unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
    (status, Json(report)).into_response()
}

/// `POST /verify`: admit, receive, score, assemble.
pub async fn verify(
    State(state): State<GatewayState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    match run_verification(&state, multipart).await {
        Ok(verdict) => {
            observability::record_verify_request("verified", StatusCode::OK.as_u16());
            Json(verdict).into_response()
        }
        Err(e) => {
            observability::record_verify_request(e.error_kind(), e.status_code().as_u16());
            e.into_response()
        }
    }
}

async fn run_verification(
    state: &GatewayState,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Verdict> {
    let ticket = state.admission.admit()?;
    debug!(ticket = %ticket.id(), "Verification admitted");

    let mut multipart = multipart.map_err(|e| ValidationError::Malformed(e.body_text()))?;

    let result = ticket
        .run(async {
            let artifact = receive_artifact(&state.receiver, &mut multipart).await?;
            let score = state.scoring.score(&artifact).await?;
            state.assembler.assemble(&score).await
        })
        .await;
    drop(ticket);

    if let Err(OracleError::Validation(_)) = &result {
        discard_remaining(&mut multipart).await;
    }
    result
}

/// Read and discard what is left of a rejected upload so the client sees the
/// error response rather than a reset connection. Bounded by the body limit.
async fn discard_remaining(multipart: &mut Multipart) {
    let drain = async {
        while let Ok(Some(mut field)) = multipart.next_field().await {
            while let Ok(Some(_)) = field.chunk().await {}
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        debug!("Gave up draining rejected upload");
    }
}

/// Find the artifact part and buffer it through the receiver.
///
/// Parts are consumed in order; the first one named [`ARTIFACT_FIELD`] or
/// carrying a filename is taken, the rest of the body is left unread.
async fn receive_artifact(receiver: &ArtifactReceiver, multipart: &mut Multipart) -> Result<Artifact> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let is_artifact = field.name() == Some(ARTIFACT_FIELD) || field.file_name().is_some();
        if !is_artifact {
            continue;
        }

        let media_type = field.content_type().map(str::to_string);
        let declared_size = field
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let limit_hit = AtomicBool::new(false);
        let stream = field.inspect_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                limit_hit.store(true, Ordering::Relaxed);
            }
        });

        return match receiver
            .receive(stream, media_type.as_deref(), declared_size)
            .await
        {
            Ok(artifact) => Ok(artifact),
            Err(ValidationError::Truncated { received, .. })
                if limit_hit.load(Ordering::Relaxed) =>
            {
                Err(ValidationError::BodyTooLarge(format!(
                    "artifact cut off after {} bytes",
                    received
                ))
                .into())
            }
            Err(e) => Err(e.into()),
        };
    }

    Err(OracleError::Validation(ValidationError::MissingFile))
}

/// Length-limit failures keep their 413; everything else is a malformed upload.
fn multipart_error(e: MultipartError) -> ValidationError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ValidationError::BodyTooLarge(e.body_text())
    } else {
        ValidationError::Malformed(e.body_text())
    }
}

pub async fn shortage_prediction(
    State(state): State<GatewayState>,
) -> Result<Json<ShortagePrediction>> {
    let prediction = state.forecaster.forecast().await;
    state.forecast_health.record(&prediction);
    Ok(Json(prediction?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReceiverConfig;
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::Request;

    const BOUNDARY: &str = "oracle-boundary";

    fn part(name: &str, filename: Option<&str>, media_type: Option<&str>, data: &[u8]) -> Vec<u8> {
        let mut part = format!("--{}\r\nContent-Disposition: form-data; name=\"{}\"", BOUNDARY, name);
        if let Some(filename) = filename {
            part.push_str(&format!("; filename=\"{}\"", filename));
        }
        part.push_str("\r\n");
        if let Some(media_type) = media_type {
            part.push_str(&format!("Content-Type: {}\r\n", media_type));
        }
        part.push_str("\r\n");

        let mut bytes = part.into_bytes();
        bytes.extend_from_slice(data);
        bytes.extend_from_slice(b"\r\n");
        bytes
    }

    // No DefaultBodyLimit layer here, so axum's 2 MiB default applies.
    async fn multipart(parts: Vec<Vec<u8>>) -> Multipart {
        let mut body: Vec<u8> = parts.concat();
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri("/verify")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        Multipart::from_request(request, &()).await.unwrap()
    }

    fn receiver(max_artifact_bytes: u64) -> ArtifactReceiver {
        ArtifactReceiver::new(&ReceiverConfig {
            max_artifact_bytes,
            ..Default::default()
        })
    }

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00];

    #[tokio::test]
    async fn test_receive_artifact_after_text_fields() {
        let mut multipart = multipart(vec![
            part("notes", None, None, b"lot 42"),
            part("file", Some("pack.png"), Some("image/png"), PNG),
        ])
        .await;

        let artifact = receive_artifact(&receiver(1024), &mut multipart).await.unwrap();
        assert_eq!(artifact.size(), PNG.len() as u64);
    }

    #[tokio::test]
    async fn test_body_limit_on_leading_field_is_payload_too_large() {
        let filler = vec![b'a'; 3 * 1024 * 1024];
        let mut multipart = multipart(vec![
            part("notes", None, None, &filler),
            part("file", Some("pack.png"), Some("image/png"), PNG),
        ])
        .await;

        let err = receive_artifact(&receiver(1024), &mut multipart).await.unwrap_err();
        assert!(
            matches!(err, OracleError::Validation(ValidationError::BodyTooLarge(_))),
            "unexpected: {:?}",
            err
        );
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_body_limit_inside_artifact_is_payload_too_large() {
        let mut artifact = PNG.to_vec();
        artifact.resize(3 * 1024 * 1024, 0);
        let mut multipart =
            multipart(vec![part("file", Some("pack.png"), Some("image/png"), &artifact)]).await;

        let err = receive_artifact(&receiver(10 * 1024 * 1024), &mut multipart)
            .await
            .unwrap_err();
        assert!(
            matches!(err, OracleError::Validation(ValidationError::BodyTooLarge(_))),
            "unexpected: {:?}",
            err
        );
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_missing_file_stays_bad_request() {
        let mut multipart = multipart(vec![part("notes", None, None, b"no artifact")]).await;

        let err = receive_artifact(&receiver(1024), &mut multipart).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
