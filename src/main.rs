use std::path::PathBuf;
use std::sync::Arc;

use dotenvy::dotenv;
use lambda_runtime::{run, service_fn, Error as LambdaError, LambdaEvent};
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

use logprocessor::aws_streams::AwsStreamConnector;
use logprocessor::config::Config;
use logprocessor::processor::Processor;
use logprocessor::types::{BatchResult, FirehoseEvent};

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    let _ = dotenv();
    init_tracing();

    let cfg_path = std::env::var_os("LOGPROCESSOR_CONFIG").map(PathBuf::from);
    let cfg = Config::load(cfg_path)?;
    info!("starting logprocessor with config {:?}", cfg);

    let connector = Arc::new(AwsStreamConnector::from_config(&cfg));
    let processor = Arc::new(Processor::new(cfg, connector));

    run(service_fn(move |event: LambdaEvent<FirehoseEvent>| {
        let processor = processor.clone();
        async move { handle(&processor, event).await }
    }))
    .await
}

async fn handle(
    processor: &Processor,
    event: LambdaEvent<FirehoseEvent>,
) -> Result<BatchResult, LambdaError> {
    let (payload, context) = event.into_parts();
    let span = info_span!(
        "invocation",
        request_id = %context.request_id,
        env = %processor.config().env
    );
    match processor.process(payload).instrument(span).await {
        Ok(result) => Ok(result),
        Err(err) => {
            error!(request_id = %context.request_id, "invocation failed: {err:#}");
            Err(err.into())
        }
    }
}

/// `RUST_LOG` wins; otherwise `LOG_LEVEL` (e.g. `INFO`), defaulting to info.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into());
            EnvFilter::try_new(level.to_lowercase())
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}
