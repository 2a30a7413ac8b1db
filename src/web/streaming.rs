use axum::body::Bytes;
use futures::{future, Stream, StreamExt};
use std::time::Duration;
use tracing::error;

use crate::llm::{LlmError, TextStream};

/// Adapts the model's text stream into HTTP body chunks.
///
/// Empty deltas are dropped and nothing is emitted after the first error,
/// which the body turns into an aborted response. With a non-zero `pacing`
/// every chunk waits that long before it is written.
pub fn paced_chunks(
    upstream: TextStream,
    pacing: Duration,
) -> impl Stream<Item = Result<Bytes, LlmError>> + Send + 'static {
    upstream
        .filter(|item| future::ready(!matches!(item, Ok(text) if text.is_empty())))
        .scan(false, |failed, item| {
            if *failed {
                return future::ready(None);
            }
            if let Err(e) = &item {
                error!("Answer stream failed mid-response: {}", e);
                *failed = true;
            }
            future::ready(Some(item))
        })
        .then(move |item| async move {
            if item.is_ok() && !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
            item.map(Bytes::from)
        })
}
