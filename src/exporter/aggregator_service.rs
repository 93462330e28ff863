use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use crate::config::Config;
use crate::event::Record;
use crate::exporter::aggregator::Aggregator;
use crate::exporter::flusher::Flusher;

#[derive(Debug)]
pub enum ExporterCommand {
    InsertBatch(Vec<Record>),
    SendNow(Vec<Record>),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the exporter service. Cloning is cheap.
#[derive(Clone, Debug)]
pub struct Exporter {
    tx: mpsc::UnboundedSender<ExporterCommand>,
    flusher: Arc<Flusher>,
}

impl Exporter {
    /// Builds the handle and its service. The service must be driven with
    /// [`ExporterService::run`], usually on its own task.
    #[must_use]
    pub fn new(config: Arc<Config>, endpoint: String) -> (Exporter, ExporterService) {
        let (tx, rx) = mpsc::unbounded_channel();
        let flusher = Arc::new(Flusher::new(Arc::clone(&config), endpoint));

        let service = ExporterService {
            aggregator: Aggregator::new(config.batch_size),
            rx,
            flusher: Arc::clone(&flusher),
            interval: config.flush_strategy.interval(),
            in_flight: JoinSet::new(),
        };
        let handle = Exporter { tx, flusher };

        (handle, service)
    }

    /// Builds the exporter for `config.get_endpoint()` and spawns its service
    /// on the current runtime.
    #[must_use]
    pub fn spawn(config: Arc<Config>) -> Exporter {
        let endpoint = config.get_endpoint();
        let (exporter, service) = Exporter::new(config, endpoint);
        tokio::spawn(service.run());
        exporter
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.flusher.endpoint()
    }

    /// Queues `records` for the next batch. Never waits on the network.
    pub fn send(&self, records: Vec<Record>) {
        if records.is_empty() {
            return;
        }
        if let Err(e) = self.tx.send(ExporterCommand::InsertBatch(records)) {
            debug!("EXPORTER | Service is stopped, dropping records: {e}");
        }
    }

    /// Hands `records` to the service to be transmitted as their own batch
    /// without waiting for the window. Shutdown waits for the delivery.
    pub fn send_now(&self, records: Vec<Record>) {
        if records.is_empty() {
            return;
        }
        if let Err(e) = self.tx.send(ExporterCommand::SendNow(records)) {
            debug!("EXPORTER | Service is stopped, dropping records: {e}");
        }
    }

    /// Transmits `records` as their own batch right now.
    pub async fn send_immediate(&self, records: Vec<Record>) {
        self.flusher.flush(records).await;
    }

    /// Transmits everything pending and waits for the delivery attempts.
    pub async fn flush(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self.tx.send(ExporterCommand::Flush(response_tx)).is_err() {
            debug!("EXPORTER | Service is stopped, nothing to flush");
            return;
        }
        if let Err(e) = response_rx.await {
            error!("EXPORTER | Failed to receive flush response: {e}");
        }
    }

    /// Flushes, then stops the service.
    pub async fn shutdown(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self.tx.send(ExporterCommand::Shutdown(response_tx)).is_err() {
            return;
        }
        if let Err(e) = response_rx.await {
            error!("EXPORTER | Failed to receive shutdown response: {e}");
        }
    }
}

pub struct ExporterService {
    aggregator: Aggregator,
    rx: mpsc::UnboundedReceiver<ExporterCommand>,
    flusher: Arc<Flusher>,
    interval: Duration,
    in_flight: JoinSet<()>,
}

impl ExporterService {
    pub async fn run(mut self) {
        debug!(
            "EXPORTER | Service started, flushing every {} ms",
            self.interval.as_millis()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(ExporterCommand::InsertBatch(records)) => {
                        self.aggregator.add_batch(records);
                        for batch in self.aggregator.get_full_batches() {
                            self.spawn_flush(batch);
                        }
                    }
                    Some(ExporterCommand::SendNow(records)) => {
                        self.spawn_flush(records);
                    }
                    Some(ExporterCommand::Flush(response_tx)) => {
                        self.drain().await;
                        let _ = response_tx.send(());
                    }
                    Some(ExporterCommand::Shutdown(response_tx)) => {
                        self.drain().await;
                        let _ = response_tx.send(());
                        break;
                    }
                    None => {
                        self.drain().await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    for batch in self.aggregator.get_all_batches() {
                        self.spawn_flush(batch);
                    }
                }
                Some(result) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Err(e) = result {
                        error!("EXPORTER | Flush task failed: {e}");
                    }
                }
            }
        }

        debug!("EXPORTER | Service stopped");
    }

    fn spawn_flush(&mut self, batch: Vec<Record>) {
        let flusher = Arc::clone(&self.flusher);
        self.in_flight.spawn(async move {
            flusher.flush(batch).await;
        });
    }

    async fn drain(&mut self) {
        for batch in self.aggregator.get_all_batches() {
            self.spawn_flush(batch);
        }
        while let Some(result) = self.in_flight.join_next().await {
            if let Err(e) = result {
                error!("EXPORTER | Flush task failed: {e}");
            }
        }
    }
}
