//! Email delivery and sequencing engine.
//!
//! This crate is the delivery core of the CRM: it turns a campaign or a
//! multi-step drip sequence into individually tracked, suppression-aware
//! outbound sends, records every attempt exactly once, and drives
//! time-based progression of enrolled leads through sequence steps.
//!
//! Components, leaf-first:
//! - [`SuppressionRegistry`] — answers "is this address deliverable?"
//! - [`DeliveryRecorder`] — durably persists one row per attempt and
//!   derives aggregate counters
//! - [`CampaignDispatcher`] — a single bounded blast of one campaign
//! - [`SequenceScheduler`] — the enrollment state machine and due-step
//!   driver
//! - [`EventIngestor`] — feeds provider events back into records and
//!   suppression

mod config;
mod dispatcher;
mod error;
mod events;
mod message;
mod recorder;
mod scheduler;
mod send;
mod suppression;
mod transport;

use std::sync::Arc;

pub use config::EngineConfig;
pub use dispatcher::{CampaignDispatcher, CampaignSendReport, ERROR_SAMPLE_LIMIT};
pub use error::EngineError;
pub use events::{EventIngestor, EventKind, ProviderEvent};
pub use recorder::{CampaignStats, DeliveryRecorder, RecordOutcome, SequenceStats};
pub use scheduler::{DueReport, SequenceScheduler, StepOutcome};
pub use suppression::SuppressionRegistry;
pub use transport::{
    MockTransport, OutboundMessage, SinkTransport, Transport, TransportConfig, TransportError,
};

/// The wired-up delivery core.
///
/// Thin aggregation of the components over one store and one transport;
/// surrounding admin tooling calls straight into the component it needs.
#[derive(Debug, Clone)]
pub struct Engine {
    pub suppression: SuppressionRegistry,
    pub recorder: DeliveryRecorder,
    pub dispatcher: CampaignDispatcher,
    pub scheduler: SequenceScheduler,
    pub ingestor: EventIngestor,
}

impl Engine {
    /// Wire the components over a store and an outbound transport.
    #[must_use]
    pub fn new(
        store: Arc<dyn courier_store::Store>,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
    ) -> Self {
        let suppression = SuppressionRegistry::new(Arc::clone(&store));
        let recorder = DeliveryRecorder::new(Arc::clone(&store));
        let dispatcher = CampaignDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            suppression.clone(),
            recorder.clone(),
            config.clone(),
        );
        let scheduler = SequenceScheduler::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            suppression.clone(),
            recorder.clone(),
            config,
        );
        let ingestor = EventIngestor::new(recorder.clone(), suppression.clone());

        Self {
            suppression,
            recorder,
            dispatcher,
            scheduler,
            ingestor,
        }
    }
}
