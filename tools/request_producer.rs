//! Scoring Request Producer
//!
//! Publishes random scoring requests to NATS for manual service testing.
//!
//! Usage: request_producer [nats_url] [subject] [count] [suspicious_rate] [delay_ms]

use fraud_screening::features::FeatureSpec;
use fraud_screening::types::{RawInput, ScoringRequest};
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

/// Random form submissions drawn from the feature spec's option lists
struct RequestGenerator {
    rng: rand::rngs::ThreadRng,
    spec: FeatureSpec,
    counter: u64,
}

impl RequestGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            spec: FeatureSpec::fraud_default(),
            counter: 0,
        }
    }

    fn next_id(&mut self) -> String {
        self.counter += 1;
        format!("req_{:012}", self.counter)
    }

    /// An ordinary card-present purchase
    fn generate_legitimate(&mut self) -> ScoringRequest {
        let fields = RawInput::new()
            .with("Transaction_Amount", format!("{:.2}", self.rng.gen_range(5.0..400.0)))
            .with("Transaction_Type_n", self.choice("Transaction_Type_n"))
            .with("Account_Balance", format!("{:.2}", self.rng.gen_range(1000.0..50000.0)))
            .with("Device_Type_n", self.choice("Device_Type_n"))
            .with("Merchant_Category_n", self.choice("Merchant_Category_n"))
            .with("Previous_Fraudulent_Activity", "0")
            .with("Avg_Transaction_Amount_7d", format!("{:.2}", self.rng.gen_range(20.0..300.0)))
            .with("Failed_Transaction_Count_7d", self.rng.gen_range(0..2).to_string())
            .with("Card_Type_n", self.choice("Card_Type_n"))
            .with("Transaction_Distance", format!("{:.1}", self.rng.gen_range(0.0..50.0)))
            .with("Authentication_Method_n", self.choice("Authentication_Method_n"))
            .with("Risk_Score", format!("{:.3}", self.rng.gen_range(0.0..0.4)));

        ScoringRequest {
            request_id: self.next_id(),
            fields,
        }
    }

    /// Large, distant, online transaction after failed attempts
    fn generate_suspicious(&mut self) -> ScoringRequest {
        let mut fields = RawInput::new()
            .with("Transaction_Amount", format!("{:.2}", self.rng.gen_range(2000.0..10000.0)))
            .with("Transaction_Type_n", "Online")
            .with("Account_Balance", format!("{:.2}", self.rng.gen_range(10.0..2000.0)))
            .with("Device_Type_n", self.choice("Device_Type_n"))
            .with("Merchant_Category_n", "Electronics")
            .with("Previous_Fraudulent_Activity", "1")
            .with("Avg_Transaction_Amount_7d", format!("{:.2}", self.rng.gen_range(20.0..150.0)))
            .with("Failed_Transaction_Count_7d", self.rng.gen_range(2..5).to_string())
            .with("Card_Type_n", self.choice("Card_Type_n"))
            .with("Transaction_Distance", format!("{:.1}", self.rng.gen_range(1000.0..5000.0)))
            .with("Authentication_Method_n", "Password")
            .with("Risk_Score", format!("{:.3}", self.rng.gen_range(0.6..1.0)));

        // exercise the parse-warning path now and then
        if self.rng.gen_bool(0.1) {
            fields.insert("Risk_Score", "unknown");
        }

        ScoringRequest {
            request_id: self.next_id(),
            fields,
        }
    }

    fn choice(&mut self, field: &str) -> String {
        let options = self
            .spec
            .field(field)
            .map(|f| f.options())
            .unwrap_or_default();
        if options.is_empty() {
            return String::new();
        }
        options[self.rng.gen_range(0..options.len())].to_string()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("request_producer=info".parse()?),
        )
        .init();

    info!("Starting scoring request producer");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("fraud.score.requests");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let suspicious_rate: f64 = args
        .get(4)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.1_f64)
        .clamp(0.0, 1.0);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        suspicious_rate = suspicious_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => Some(c),
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            None
        }
    };

    let mut generator = RequestGenerator::new();
    let mut rng = rand::thread_rng();
    let mut suspicious_count = 0;

    for i in 0..count {
        let request = if rng.gen_bool(suspicious_rate) {
            suspicious_count += 1;
            generator.generate_suspicious()
        } else {
            generator.generate_legitimate()
        };

        match &client {
            Some(client) => {
                let payload = serde_json::to_vec(&request)?;
                client.publish(subject.to_string(), payload.into()).await?;
            }
            None if i == 0 || (i + 1) % 10 == 0 => {
                info!("Sample request {}:\n{}", i + 1, serde_json::to_string_pretty(&request)?);
            }
            None => {}
        }

        if (i + 1) % 10 == 0 {
            info!(
                "Produced {}/{} requests ({} suspicious)",
                i + 1,
                count,
                suspicious_count
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    if let Some(client) = client {
        client.flush().await?;
    }

    info!(
        "Completed! Produced {} requests ({} suspicious)",
        count, suspicious_count
    );

    Ok(())
}
