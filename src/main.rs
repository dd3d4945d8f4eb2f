use anyhow::Result;
use gridwatch_ingest::{
    config::{AppConfig, SinkConfig},
    observability,
    pipeline::{Pipeline, SinkVariant},
    sinks::{IlpTcpSink, RecordApiSink},
    sources::{S3Config, S3ObjectStore},
};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::from_env()?;

    let store = S3ObjectStore::new(S3Config {
        bucket: cfg.bucket.clone(),
        region: cfg.region.clone(),
        endpoint: cfg.endpoint.clone(),
        ..S3Config::default()
    })
    .await?;

    let sink = match &cfg.sink {
        SinkConfig::Records(records) => SinkVariant::Records(RecordApiSink::new(
            &records.endpoint,
            records.token.clone(),
            records.database.clone(),
            records.table.clone(),
        )),
        SinkConfig::Ilp(ilp) => {
            let addr: SocketAddr = ilp
                .addr
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid ILP_ADDR '{}': {e}", ilp.addr))?;
            SinkVariant::Ilp(IlpTcpSink::new(addr))
        }
    };

    let pipeline = Pipeline::new(store, cfg.key.clone(), cfg.impute, cfg.batch_size, sink);
    let summary = pipeline.run().await?;

    tracing::info!(status = summary.status_code, "{}", summary.message);

    Ok(())
}
