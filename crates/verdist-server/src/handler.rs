use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use verdist_service::{
    ConsumerService, FeedFilter, FeedStream, IngestService, ServedFile, ServiceError,
};
use verdist_types::FileName;

use crate::api::{
    FilesResponse, HealthResponse, UpdatesQuery, UploadResponse, VersionsResponse,
    CHECKSUM_HEADER, FIELD_FILE, FIELD_FILENAME, FIELD_VERSION, LAGGED_EVENT, PUBLISH_EVENT,
    VERSION_HEADER,
};
use crate::error::ApiError;

pub async fn ingest_health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy("ingest"))
}

pub async fn consumer_health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy("consumer"))
}

/// `POST /upload` with multipart fields `filename`, `version` and `file`.
pub async fn upload(
    State(ingest): State<Arc<IngestService>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut filename: Option<String> = None;
    let mut version: Option<String> = None;
    let mut content: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(FIELD_FILENAME) => filename = Some(field.text().await?),
            Some(FIELD_VERSION) => version = Some(field.text().await?),
            Some(FIELD_FILE) => content = Some(field.bytes().await?),
            _ => {}
        }
    }

    let (Some(filename), Some(version)) = (filename, version) else {
        return Err(ApiError::BadRequest("filename and version are required".into()));
    };
    let content =
        content.ok_or_else(|| ApiError::BadRequest("no file field in upload".into()))?;

    let result = ingest.upload(&filename, &version, &content[..]).await?;
    let message = if result.duplicate {
        info!(%filename, %version, "duplicate upload acknowledged");
        "File already uploaded with identical content"
    } else {
        "File uploaded successfully"
    };
    Ok(Json(UploadResponse {
        success: true,
        message: message.into(),
        metadata: result.record.into(),
    }))
}

/// `GET /updates?filename=a,b`: server-sent events, one per accepted
/// publish of the listed files (all files when the list is absent).
pub async fn updates(
    State(ingest): State<Arc<IngestService>>,
    Query(query): Query<UpdatesQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let feed = ingest.feed().ok_or(ApiError::FeedDisabled)?;
    let filter = match query.filename.as_deref() {
        None | Some("") => FeedFilter::default(),
        Some(list) => FeedFilter::files(
            list.split(',')
                .map(FileName::new)
                .collect::<Result<Vec<_>, _>>()
                .map_err(ServiceError::from)?,
        ),
    };
    info!(files = ?filter.filenames, "update subscriber connected");
    let stream = futures::stream::unfold(feed.subscribe(filter), next_update);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn next_update(mut rx: FeedStream) -> Option<(Result<Event, Infallible>, FeedStream)> {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let sse = Event::default()
                    .event(PUBLISH_EVENT)
                    .id(event.sequence.to_string())
                    .json_data(&event);
                match sse {
                    Ok(sse) => return Some((Ok(sse), rx)),
                    Err(e) => warn!(sequence = event.sequence, error = %e, "failed to encode publish event"),
                }
            }
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "update subscriber lagged");
                let sse = Event::default().event(LAGGED_EVENT).data(missed.to_string());
                return Some((Ok(sse), rx));
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

/// `GET /files`
pub async fn list_files(
    State(consumer): State<Arc<ConsumerService>>,
) -> Result<Json<FilesResponse>, ApiError> {
    let files = consumer.list_files().await?;
    Ok(Json(FilesResponse { files }))
}

/// `GET /file/:filename`
pub async fn get_latest(
    State(consumer): State<Arc<ConsumerService>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    Ok(file_response(consumer.get_latest(&filename).await?))
}

/// `GET /file/:filename/version/:version`
pub async fn get_version(
    State(consumer): State<Arc<ConsumerService>>,
    Path((filename, version)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    Ok(file_response(consumer.get_version(&filename, &version).await?))
}

/// `GET /file/:filename/info`
pub async fn get_info(
    State(consumer): State<Arc<ConsumerService>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    Ok(Json(consumer.get_info(&filename).await?).into_response())
}

/// `GET /file/:filename/versions`
pub async fn list_versions(
    State(consumer): State<Arc<ConsumerService>>,
    Path(filename): Path<String>,
) -> Result<Json<VersionsResponse>, ApiError> {
    let versions = consumer.list_versions(&filename).await?;
    let filename = FileName::new(filename).map_err(ServiceError::from)?;
    let latest = versions
        .first()
        .cloned()
        .ok_or_else(|| ServiceError::FileNotFound {
            filename: filename.clone(),
        })?;
    Ok(Json(VersionsResponse {
        filename,
        latest,
        versions,
    }))
}

fn file_response(served: ServedFile) -> Response {
    let ServedFile { record, bytes } = served;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        record.filename.as_str().replace('"', "\\\"")
    );
    (
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::HeaderName::from_static(VERSION_HEADER), record.version.to_string()),
            (header::HeaderName::from_static(CHECKSUM_HEADER), record.checksum.to_hex()),
        ],
        bytes,
    )
        .into_response()
}
