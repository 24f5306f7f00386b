use std::future::Future;

use futures::StreamExt;
use futures::stream::BoxStream;
use reconcile::Dataset;
use reconcile::protocol::{DATASET_EVENT, ErrorBody, EVENTS_PATH, SYNC_PATH};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use crate::config::ClientConfig;
use crate::error::SyncError;
use crate::sse::SseDecoder;

/// Datasets pushed by the authority. The stream ends, or yields an error, when the channel drops.
pub type PushStream = BoxStream<'static, Result<Dataset, SyncError>>;

/// How the coordinator reaches the authority.
pub trait Transport: Send + Sync + 'static {
    /// Send the whole local dataset and get the authority's merged dataset back.
    fn sync(&self, payload: Dataset) -> impl Future<Output = Result<Dataset, SyncError>> + Send;

    /// Open the push channel.
    fn subscribe(&self) -> impl Future<Output = Result<PushStream, SyncError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn with_client(client: reqwest::Client, config: ClientConfig) -> Self {
        Self { client, config }
    }
}

impl Transport for HttpTransport {
    async fn sync(&self, payload: Dataset) -> Result<Dataset, SyncError> {
        let response = self
            .client
            .post(self.config.url(SYNC_PATH))
            .timeout(self.config.request_timeout)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|e| e.detail.or(Some(e.error)))
                .unwrap_or(body);
            return Err(SyncError::Rejected(reason));
        }
        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let bytes = response.bytes().await?;
        Ok(Dataset::from_slice(&bytes)?)
    }

    async fn subscribe(&self) -> Result<PushStream, SyncError> {
        let response = self
            .client
            .get(self.config.url(EVENTS_PATH))
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
            log::debug!("Push channel open ({content_type:?})");
        }

        Ok(decode_push_stream(response.bytes_stream()))
    }
}

/// Turn a raw event-stream body into the datasets it carries. Keep-alives and unknown events are
/// dropped; a `dataset` event that doesn't parse is logged and skipped rather than closing the channel.
pub fn decode_push_stream<S, B, E>(body: S) -> PushStream
where
    S: futures::Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<SyncError> + Send + 'static,
{
    body.scan(SseDecoder::new(), |decoder, chunk| {
        let items: Vec<Result<Dataset, SyncError>> = match chunk {
            Ok(bytes) => decoder
                .feed(bytes.as_ref())
                .into_iter()
                .filter(|event| event.event.as_deref() == Some(DATASET_EVENT))
                .filter_map(|event| {
                    Dataset::from_slice(event.data.as_bytes())
                        .inspect_err(|e| log::error!("Dropping malformed pushed dataset: {e}"))
                        .ok()
                        .map(Ok)
                })
                .collect(),
            Err(e) => vec![Err(e.into())],
        };
        futures::future::ready(Some(futures::stream::iter(items)))
    })
    .flatten()
    .boxed()
}
