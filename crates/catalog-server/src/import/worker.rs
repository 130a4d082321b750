//! Background consumers
//!
//! Two polling loops run side by side: one drains the upload events queue into
//! the file parser, the other drains the catalog items queue into the batch
//! processor. Both settle messages individually and stop when the
//! cancellation token fires.

use catalog_common::{CatalogError, Result};
use futures::future::join_all;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{
    settle::{SettleReport, Settlement},
    ImportPipeline,
};

/// Events queue messages handled per poll
const EVENTS_PER_POLL: usize = 10;

#[derive(Debug, Clone, Copy)]
enum Source {
    Events,
    Catalog,
}

#[derive(Clone)]
pub struct ImportWorker {
    pipeline: ImportPipeline,
    events_settlement: Settlement,
    catalog_settlement: Settlement,
    idle_backoff: Duration,
}

impl ImportWorker {
    pub fn new(pipeline: ImportPipeline, idle_backoff: Duration) -> Self {
        let events_settlement = Settlement::new(
            Arc::clone(&pipeline.events),
            pipeline.dead_letters.clone(),
            pipeline.max_receive_count,
        );
        let catalog_settlement = Settlement::new(
            Arc::clone(&pipeline.catalog),
            pipeline.dead_letters.clone(),
            pipeline.max_receive_count,
        );
        Self {
            pipeline,
            events_settlement,
            catalog_settlement,
            idle_backoff,
        }
    }

    /// Receive and handle one round of upload event messages.
    pub async fn poll_events_once(&self) -> Result<SettleReport> {
        let messages = self.pipeline.events.receive(EVENTS_PER_POLL).await?;
        if messages.is_empty() {
            return Ok(SettleReport::default());
        }

        let results = join_all(
            messages
                .iter()
                .map(|message| self.pipeline.parser.handle_notification(&message.body)),
        )
        .await;

        let outcomes: Vec<_> = messages
            .iter()
            .zip(&results)
            .map(|(message, result)| (message, result.as_ref().err()))
            .collect();

        self.events_settlement.settle(&outcomes).await
    }

    /// Receive one batch of catalog item messages and run the batch processor.
    ///
    /// When the notification cannot be published, written messages are settled
    /// with the publish error and failed messages with their own error, so
    /// nothing is acknowledged and undecodable messages still go straight to
    /// the dead-letter queue.
    pub async fn poll_catalog_once(&self) -> Result<SettleReport> {
        let batch = self
            .pipeline
            .catalog
            .receive(self.pipeline.batch_size)
            .await?;
        if batch.is_empty() {
            return Ok(SettleReport::default());
        }

        match self.pipeline.processor.process(&batch).await {
            Ok(report) => {
                let outcomes: Vec<_> = batch
                    .iter()
                    .zip(&report.outcomes)
                    .map(|(message, outcome)| (message, outcome.error()))
                    .collect();
                self.catalog_settlement.settle(&outcomes).await
            },
            Err(failure) => {
                error!(size = batch.len(), "Batch invocation failed: {}", failure);
                let outcomes: Vec<(_, Option<&CatalogError>)> = batch
                    .iter()
                    .zip(failure.errors())
                    .map(|(message, error)| (message, Some(error)))
                    .collect();
                self.catalog_settlement.settle(&outcomes).await
            },
        }
    }

    async fn poll_once(&self, source: Source) -> Result<SettleReport> {
        match source {
            Source::Events => self.poll_events_once().await,
            Source::Catalog => self.poll_catalog_once().await,
        }
    }

    /// Spawn both polling loops.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        let events_worker = self.clone();
        let events_cancel = cancel.clone();

        tokio::spawn(async move {
            info!("Import worker started");

            let events =
                tokio::spawn(async move { events_worker.run_loop(Source::Events, events_cancel).await });
            self.run_loop(Source::Catalog, cancel).await;

            if let Err(e) = events.await {
                error!("Events loop terminated abnormally: {}", e);
            }
            info!("Import worker stopped");
        })
    }

    async fn run_loop(&self, source: Source, cancel: CancellationToken) {
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.poll_once(source) => result,
            };

            let idle = match result {
                Ok(report) if report == SettleReport::default() => true,
                Ok(report) => {
                    debug!(
                        source = ?source,
                        acked = report.acked,
                        retried = report.retried,
                        dead_lettered = report.dead_lettered,
                        "Settled messages"
                    );
                    false
                },
                Err(e) => {
                    error!(source = ?source, "Poll failed: {}", e);
                    true
                },
            };

            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.idle_backoff) => {},
                }
            }
        }
        debug!(source = ?source, "Polling loop stopped");
    }
}
