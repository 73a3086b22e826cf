//! Batch entry point: runs each telemetry event through resolve, update and
//! aggregate, isolating failures per event.

use crate::aggregator::recompute_health;
use crate::client::{Connect, TwinGraph};
use crate::error::{BatchError, EventFailure, TwinError};
use crate::resolver::resolve_sensor_by_device;
use crate::telemetry::{InboundEvent, TelemetryEvent};
use crate::twin::DEFAULT_SENSOR_MODEL;
use crate::updater::{apply_reading, UpdateOutcome};

/// Summary of a batch in which no event failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Events that went through the whole pipeline.
    pub processed: usize,
    /// Events dropped because their payload could not be parsed.
    pub skipped: usize,
}

/// Processes batches for one worker.
///
/// Owns the worker's twin graph handle. The handle is dropped whenever an
/// event fails with a client fault and re-established before the next
/// event that needs it.
pub struct BatchProcessor<C: Connect> {
    connector: C,
    client: Option<C::Client>,
    sensor_model: String,
    drain_only: bool,
}

impl<C: Connect> BatchProcessor<C> {
    pub fn new(connector: C) -> Self {
        BatchProcessor {
            connector,
            client: None,
            sensor_model: DEFAULT_SENSOR_MODEL.to_string(),
            drain_only: false,
        }
    }

    /// Model id used to find sensor twins.
    pub fn sensor_model(mut self, model: impl Into<String>) -> Self {
        self.sensor_model = model.into();
        self
    }

    /// Acknowledge batches without touching the twin graph.
    pub fn drain_only(mut self, drain_only: bool) -> Self {
        self.drain_only = drain_only;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Drop the current client handle.
    pub fn disconnect(&mut self) {
        if self.client.take().is_some() {
            log::info!("twin graph client disconnected");
        }
    }

    async fn ensure_connected(&mut self) -> Result<&C::Client, TwinError> {
        if self.client.is_none() {
            self.client = Some(self.connector.connect().await?);
        }
        self.client
            .as_ref()
            .ok_or_else(|| TwinError::Connection("client unavailable".to_string()))
    }

    /// Process `events` in delivery order.
    ///
    /// Returns [`BatchError::Unavailable`] without consuming any event when
    /// the client cannot be connected up front. Otherwise every event is
    /// attempted; one failure yields [`BatchError::Event`], several yield
    /// [`BatchError::Aggregate`].
    pub async fn process_batch(
        &mut self,
        events: &[InboundEvent],
    ) -> Result<BatchReport, BatchError> {
        if self.drain_only {
            log::info!("drain mode: discarding {} events", events.len());
            return Ok(BatchReport {
                processed: 0,
                skipped: events.len(),
            });
        }

        if let Err(e) = self.ensure_connected().await {
            log::error!("twin graph connection failed: {}", e);
            return Err(BatchError::Unavailable(e));
        }

        let mut report = BatchReport::default();
        let mut failures = Vec::new();

        for (index, event) in events.iter().enumerate() {
            match self.process_event(event).await {
                Ok(()) => report.processed += 1,
                Err(e) if !e.is_client_fault() => {
                    log::warn!("skipping event #{}: {}", index, e);
                    report.skipped += 1;
                }
                Err(e) => {
                    log::error!("event #{} failed: {}", index, e);
                    self.disconnect();
                    failures.push(EventFailure {
                        index,
                        device_id: event.device_id.clone(),
                        error: e,
                    });
                }
            }
        }

        match failures.len() {
            0 => Ok(report),
            1 => Err(BatchError::Event(failures.remove(0))),
            _ => Err(BatchError::Aggregate(failures)),
        }
    }

    async fn process_event(&mut self, event: &InboundEvent) -> Result<(), TwinError> {
        let telemetry = TelemetryEvent::parse(event)?;
        let sensor_model = self.sensor_model.clone();
        let client = self.ensure_connected().await?;
        process_telemetry(client, &sensor_model, &telemetry).await
    }
}

/// Run one parsed event through the pipeline against `graph`.
///
/// Store faults swallowed by the sensor update or the aggregation are
/// turned into an error here so the event is reported as failed.
pub async fn process_telemetry<G>(
    graph: &G,
    sensor_model: &str,
    event: &TelemetryEvent,
) -> Result<(), TwinError>
where
    G: TwinGraph + ?Sized,
{
    let sensor = resolve_sensor_by_device(graph, sensor_model, &event.device_id).await?;

    match apply_reading(graph, &sensor, event).await? {
        UpdateOutcome::Failed(e) => return Err(e),
        UpdateOutcome::Unchanged => return Ok(()),
        UpdateOutcome::Patched { .. } => {}
    }

    let Some(asset_id) = sensor.observes.as_deref() else {
        log::warn!("sensor {} observes no asset", sensor.dt_id);
        return Ok(());
    };

    match recompute_health(graph, sensor_model, asset_id).await {
        UpdateOutcome::Failed(e) => Err(e),
        _ => Ok(()),
    }
}
