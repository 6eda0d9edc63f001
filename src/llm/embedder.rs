//! Concurrency-bounded embedding of many texts.
//!
//! At most `min(limit, len)` provider calls run at once, and the output
//! sequence always matches input order regardless of completion order.

use std::future::Future;

use futures_util::stream::{self, StreamExt, TryStreamExt};

use super::openrouter::{OpenRouterClient, ProviderError};
use crate::core::errors::ApiError;

/// Reference concurrency bound for chunk embedding.
pub const EMBED_CONCURRENCY: usize = 5;

/// Run `worker` over `items` with at most `min(limit, items.len())` calls in
/// flight. Results come back in input order; the first failure fails the
/// whole batch (remaining in-flight work is dropped). `limit` must be ≥ 1.
pub async fn map_with_concurrency<T, R, E, F, Fut>(
    items: Vec<T>,
    limit: usize,
    worker: F,
) -> Result<Vec<R>, E>
where
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let bound = limit.min(items.len()).max(1);
    stream::iter(items.into_iter().enumerate().map(|(i, item)| worker(i, item)))
        .buffered(bound)
        .try_collect()
        .await
}

/// Embed each text through the provider, one vector per input in input
/// order. Fail-fast: no partial-success accumulation.
pub async fn embed_many(
    client: &OpenRouterClient,
    texts: Vec<String>,
    limit: usize,
) -> Result<Vec<Vec<f32>>, ApiError> {
    if limit == 0 {
        return Err(ApiError::BadRequest(
            "limite de concorrência deve ser maior que zero".to_string(),
        ));
    }

    map_with_concurrency(texts, limit, |_, text| async move {
        client.embed(&text).await
    })
    .await
    .map_err(|err: ProviderError| err.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn output_order_matches_input_order_despite_latency() {
        // First item is artificially the slowest.
        let out = map_with_concurrency(vec!["a", "b", "c"], 2, |i, item| async move {
            tokio::time::sleep(Duration::from_millis(if i == 0 { 80 } else { 5 })).await;
            Ok::<_, ProviderError>(item.to_uppercase())
        })
        .await
        .unwrap();

        assert_eq!(out, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_clamped_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let high_water = Arc::new(AtomicUsize::new(0));

        let items: Vec<usize> = (0..12).collect();
        let limit = 3;
        {
            let in_flight = in_flight.clone();
            let high_water = high_water.clone();
            map_with_concurrency(items, limit, move |_, n| {
                let in_flight = in_flight.clone();
                let high_water = high_water.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    high_water.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, ProviderError>(n)
                }
            })
            .await
            .unwrap();
        }

        assert!(high_water.load(Ordering::SeqCst) <= limit);
    }

    #[tokio::test]
    async fn limit_is_clamped_to_item_count() {
        let out = map_with_concurrency(vec![1, 2], 50, |_, n| async move {
            Ok::<_, ProviderError>(n * 10)
        })
        .await
        .unwrap();
        assert_eq!(out, vec![10, 20]);
    }

    #[tokio::test]
    async fn first_failure_fails_the_batch() {
        let err = map_with_concurrency(vec![0usize, 1, 2], 2, |i, _| async move {
            if i == 1 {
                Err(ProviderError::Transport("down".to_string()))
            } else {
                Ok(i)
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ProviderError::Transport(_)));
    }

    #[tokio::test]
    async fn zero_limit_is_rejected_before_any_call() {
        let server = MockServer::start().await;
        let client = OpenRouterClient::new(&server.uri(), "k");
        let err = embed_many(&client, vec!["a".to_string()], 0).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn embed_many_returns_one_vector_per_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "embedding": [1.0, 0.0] }]
            })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&server.uri(), "k");
        let texts = vec!["um".to_string(), "dois".to_string(), "três".to_string()];
        let vectors = embed_many(&client, texts, EMBED_CONCURRENCY).await.unwrap();

        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v == &vec![1.0, 0.0]));
    }
}
