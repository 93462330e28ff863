//! Batches finalized records and delivers them to the ingestion endpoint.
//!
//! [`Exporter`] is a handle to an [`ExporterService`] task that owns the
//! pending records. Records queued with [`Exporter::send`] leave when a full
//! batch is reached or when the flush window elapses;
//! [`Exporter::send_immediate`] bypasses the queue.

pub mod aggregator;
pub mod aggregator_service;
pub mod constants;
pub mod flusher;

pub use aggregator_service::{Exporter, ExporterCommand, ExporterService};
pub use flusher::ExportError;
