//! `POST /pstprnt`: synchronous label upload.

use axum::{body::Bytes, extract::State, http::StatusCode};

use crate::{
    application::{
        error::HttpError,
        pipeline::{Channel, SubmitOutcome},
    },
    domain::document::Document,
};

use super::HttpState;

/// Body returned when the upload carries no label data.
pub const BLANK_DOCUMENT_MESSAGE: &str = "no label data received";
const NOT_TEXT_MESSAGE: &str = "label data must be UTF-8 text";
const SUBMISSION_FAILED_MESSAGE: &str = "label submission failed";
const SOURCE: &str = "infra::http::ingest::submit_label";

/// Accept one document of any content type and render it before answering.
///
/// The rendered images travel only over the viewer channel; the response body
/// is empty on success and carries the failure message when rendering fails.
/// The submission runs in its own task so it completes and broadcasts even
/// when the client hangs up first.
pub async fn submit_label(
    State(state): State<HttpState>,
    body: Bytes,
) -> Result<StatusCode, HttpError> {
    let text = std::str::from_utf8(&body).map_err(|err| {
        HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, NOT_TEXT_MESSAGE, &err)
    })?;
    let document = Document::parse(text).map_err(|err| {
        HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, BLANK_DOCUMENT_MESSAGE, &err)
    })?;

    let pipeline = state.pipeline.clone();
    let submission =
        tokio::spawn(async move { pipeline.submit(document, Channel::Http).await });
    let outcome = submission.await.map_err(|err| {
        HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            SUBMISSION_FAILED_MESSAGE,
            &err,
        )
    })?;

    match outcome {
        SubmitOutcome::Rendered { .. } => Ok(StatusCode::ACCEPTED),
        SubmitOutcome::Failed { failure, .. } => Err(HttpError::from_error(
            SOURCE,
            StatusCode::BAD_GATEWAY,
            failure.message.clone(),
            &failure,
        )),
        SubmitOutcome::Rejected => Err(HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            BLANK_DOCUMENT_MESSAGE,
            "document rejected by pipeline",
        )),
    }
}
