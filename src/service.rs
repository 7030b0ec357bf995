//! NATS scoring service: decode request, score, publish response.

use crate::config::AppConfig;
use crate::consumer::RequestConsumer;
use crate::metrics::{MetricsReporter, ServiceMetrics};
use crate::models::inference::InferenceEngine;
use crate::producer::ResponseProducer;
use crate::types::prediction::{ScoringRequest, ScoringResponse};
use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Score one raw request payload. Never fails: every problem becomes an
/// error response so the caller always hears back.
pub fn handle_payload(
    engine: &InferenceEngine,
    metrics: &ServiceMetrics,
    payload: &[u8],
) -> ScoringResponse {
    let start_time = Instant::now();
    metrics.record_request();

    let request: ScoringRequest = match serde_json::from_slice(payload) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Failed to deserialize scoring request");
            metrics.record_failure("invalid_request", start_time.elapsed());
            return ScoringResponse::failure(
                uuid::Uuid::new_v4().to_string(),
                "invalid_request",
                e.to_string(),
            );
        }
    };

    match engine.score(&request.fields) {
        Ok(scored) => {
            let processing_time = start_time.elapsed();
            metrics.record_prediction(
                scored.prediction.label,
                scored.prediction.score,
                scored.warnings.len(),
                processing_time,
            );

            for warning in &scored.warnings {
                debug!(request_id = %request.request_id, %warning, "Numeric field defaulted");
            }
            debug!(
                request_id = %request.request_id,
                label = %scored.prediction.label,
                score = scored.prediction.score,
                processing_time_us = processing_time.as_micros(),
                "Request scored"
            );

            ScoringResponse::success(request.request_id, scored.prediction, scored.warnings)
        }
        Err(e) => {
            metrics.record_failure(e.kind(), start_time.elapsed());
            warn!(
                request_id = %request.request_id,
                kind = e.kind(),
                error = %e,
                "Scoring failed"
            );
            ScoringResponse::failure(request.request_id, e.kind(), e.to_string())
        }
    }
}

/// Subscribe to the request subject and score requests until the
/// subscription ends.
pub async fn run(config: &AppConfig, engine: Arc<InferenceEngine>) -> Result<()> {
    let metrics = Arc::new(ServiceMetrics::new());

    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(client.clone(), &config.nats.request_subject);
    let producer = ResponseProducer::new(client.clone(), &config.nats.response_subject);

    let num_workers = config.pipeline.workers.max(1);
    info!(
        workers = num_workers,
        requests = %consumer.subject(),
        responses = %producer.subject(),
        "Starting scoring service"
    );

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
    tokio::spawn(reporter.start());

    let semaphore = Arc::new(Semaphore::new(num_workers));
    let mut subscription = consumer.subscribe().await?;

    while let Some(message) = subscription.next().await {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("Worker semaphore closed")?;

        let engine = engine.clone();
        let metrics = metrics.clone();
        let producer = producer.clone();

        tokio::spawn(async move {
            let response = handle_payload(&engine, &metrics, &message.payload);

            if let Err(e) = producer.publish(&response, message.reply).await {
                error!(
                    request_id = %response.request_id,
                    error = %e,
                    "Failed to publish scoring response"
                );
            }

            drop(permit);
        });
    }

    info!("Request subscription closed, waiting for in-flight requests");
    drain_workers(&semaphore, num_workers).await?;
    metrics.print_summary();

    Ok(())
}

/// Wait until every worker permit is returned, i.e. all spawned requests
/// have published their response.
async fn drain_workers(semaphore: &Semaphore, workers: usize) -> Result<()> {
    let permits = u32::try_from(workers).context("Worker count exceeds semaphore range")?;
    let _all = semaphore
        .acquire_many(permits)
        .await
        .context("Worker semaphore closed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSpec;
    use crate::models::classifier::testing::AmountClassifier;
    use crate::types::prediction::FraudLabel;

    fn engine() -> InferenceEngine {
        InferenceEngine::from_parts(
            Arc::new(FeatureSpec::fraud_default()),
            Arc::new(AmountClassifier::new(12)),
        )
        .unwrap()
    }

    const REQUEST: &str = r#"{
        "request_id": "req-42",
        "fields": {
            "Transaction_Amount": "9500",
            "Transaction_Type_n": "Online",
            "Account_Balance": 120,
            "Device_Type_n": "Laptop",
            "Merchant_Category_n": "Travel",
            "Previous_Fraudulent_Activity": "1",
            "Avg_Transaction_Amount_7d": "80",
            "Failed_Transaction_Count_7d": "4",
            "Card_Type_n": "Discover",
            "Transaction_Distance": "4200",
            "Authentication_Method_n": "Password",
            "Risk_Score": "n/a"
        }
    }"#;

    #[test]
    fn test_handle_payload_success() {
        let metrics = ServiceMetrics::new();
        let response = handle_payload(&engine(), &metrics, REQUEST.as_bytes());

        assert_eq!(response.request_id, "req-42");
        assert!(response.error.is_none());
        let prediction = response.prediction.unwrap();
        assert_eq!(prediction.label, FraudLabel::Fraud);
        assert_eq!(response.warnings.len(), 1);
        assert_eq!(response.warnings[0].field, "Risk_Score");
        assert_eq!(metrics.fraud_predictions.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn test_handle_payload_unknown_category() {
        let metrics = ServiceMetrics::new();
        let payload = REQUEST.replace("\"Discover\"", "\"Diners\"");
        let response = handle_payload(&engine(), &metrics, payload.as_bytes());

        assert!(response.prediction.is_none());
        let error = response.error.unwrap();
        assert_eq!(error.kind, "unknown_category");
        assert!(error.message.contains("Diners"));
        assert_eq!(metrics.get_failures_by_kind().get("unknown_category"), Some(&1));
    }

    #[tokio::test]
    async fn test_drain_waits_for_in_flight_requests() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        let semaphore = Arc::new(Semaphore::new(3));
        let published = Arc::new(AtomicUsize::new(0));

        for delay in [10, 30, 60] {
            let permit = semaphore.clone().acquire_owned().await.unwrap();
            let published = published.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                published.fetch_add(1, Ordering::SeqCst);
                drop(permit);
            });
        }

        drain_workers(&semaphore, 3).await.unwrap();
        assert_eq!(published.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_handle_payload_garbage() {
        let metrics = ServiceMetrics::new();
        let response = handle_payload(&engine(), &metrics, b"{not json");

        assert_eq!(response.error.unwrap().kind, "invalid_request");
        assert_eq!(metrics.failures(), 1);
    }
}
