use std::time::Duration;

use azeventhubs::consumer::{
    EventHubConsumerClient, EventHubConsumerClientOptions, ReadEventOptions,
};
use azeventhubs::BasicRetryPolicy;
use futures_util::future::join_all;
use futures_util::StreamExt;
use twinpulse::checkpoint::{Disposition, PartitionCursor};
use twinpulse::config::Config;
use twinpulse::transport::inbound_event;
use twinpulse::{AdtConnector, BatchError, BatchProcessor, BatchReport, InboundEvent};

/// Attempts per batch while the twin graph cannot be connected.
const UNAVAILABLE_ATTEMPTS: usize = 3;

const RETRY_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let config = Config::from_env()?;

    let partitions = partition_ids(&config).await?;
    log::info!(
        "consuming {} partitions of {}",
        partitions.len(),
        config.event_hub_name
    );

    let workers = partitions
        .into_iter()
        .map(|partition_id| partition_worker(&config, partition_id));

    tokio::select! {
        _ = join_all(workers) => {}
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutdown requested");
        }
    }

    Ok(())
}

async fn connect_consumer(
    config: &Config,
) -> Result<EventHubConsumerClient<BasicRetryPolicy>, Box<dyn std::error::Error>> {
    let consumer_group = config
        .consumer_group
        .as_deref()
        .unwrap_or(EventHubConsumerClient::<BasicRetryPolicy>::DEFAULT_CONSUMER_GROUP_NAME);
    let consumer_client = EventHubConsumerClient::new_from_connection_string(
        consumer_group,
        config.event_hub_connection_string.clone(),
        config.event_hub_name.clone(),
        EventHubConsumerClientOptions::default(),
    )
    .await?;
    Ok(consumer_client)
}

async fn partition_ids(config: &Config) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut consumer_client = connect_consumer(config).await?;
    let partitions = consumer_client.get_partition_ids().await?;
    consumer_client.close().await?;
    Ok(partitions)
}

/// Consume one partition forever, reopening it at the cursor after every
/// stop.
async fn partition_worker(config: &Config, partition_id: String) {
    let mut processor = BatchProcessor::new(config.connector())
        .sensor_model(config.sensor_model.clone())
        .drain_only(config.drain_only);
    let mut cursor = PartitionCursor::new(config.max_redeliveries);

    let mut error_count = 0;
    loop {
        if let Err(e) = consumer(config, &partition_id, &mut processor, &mut cursor).await {
            error_count += 1;
            log::error!(
                "partition {} consumer failed ({} errors so far): {}",
                partition_id,
                error_count,
                e
            );
        }
        tokio::time::sleep(RETRY_DELAY).await;
        log::debug!(
            "reopening partition {} at {:?}",
            partition_id,
            cursor.next_sequence_number()
        );
    }
}

/// Read batches until one has to be redelivered or the stream ends.
async fn consumer(
    config: &Config,
    partition_id: &str,
    processor: &mut BatchProcessor<AdtConnector>,
    cursor: &mut PartitionCursor,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut consumer_client = connect_consumer(config).await?;

    let position = cursor.starting_position();
    let stream = consumer_client
        .read_events_from_partition(partition_id, position.clone(), ReadEventOptions::default())
        .await?;
    log::info!("reading partition {} from {:?}", partition_id, position);

    let mut batches = stream.ready_chunks(config.max_batch_events.max(1));
    let mut counter = 0;
    while let Some(chunk) = batches.next().await {
        let mut events = Vec::with_capacity(chunk.len());
        let mut span: Option<(i64, i64)> = None;
        for event in chunk {
            let event = event?;
            let sequence_number = event.sequence_number();
            let first = span.map_or(sequence_number, |(first, _)| first);
            span = Some((first, sequence_number));
            events.push(inbound_event(&event));
        }
        let Some((first, last)) = span else {
            continue;
        };

        let result = handle_batch(processor, &events).await;
        match cursor.settle(first, last, &result) {
            Disposition::Commit => {
                counter += events.len();
                log::debug!("partition {}: events consumed: {}", partition_id, counter);
            }
            Disposition::Abandon => {
                log::error!(
                    "partition {}: dropping events {}..={} after {} deliveries",
                    partition_id,
                    first,
                    last,
                    config.max_redeliveries + 1
                );
            }
            Disposition::Redeliver => {
                log::warn!(
                    "partition {}: events {}..={} will be redelivered",
                    partition_id,
                    first,
                    last
                );
                break;
            }
        }
    }

    batches.into_inner().close().await?;
    consumer_client.close().await?;

    Ok(())
}

async fn handle_batch(
    processor: &mut BatchProcessor<AdtConnector>,
    events: &[InboundEvent],
) -> Result<BatchReport, BatchError> {
    let mut attempt = 1;
    loop {
        match processor.process_batch(events).await {
            Ok(report) => {
                log::info!(
                    "batch done: {} processed, {} skipped",
                    report.processed,
                    report.skipped
                );
                return Ok(report);
            }
            Err(BatchError::Unavailable(e)) if attempt < UNAVAILABLE_ATTEMPTS => {
                log::warn!("batch deferred (attempt {}): {}", attempt, e);
                attempt += 1;
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(e) => {
                log::error!("batch of {} events failed: {}", events.len(), e);
                return Err(e);
            }
        }
    }
}
