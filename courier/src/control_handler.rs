//! Control handler: dispatches admin commands onto the engine.

use std::{
    sync::Arc,
    time::Instant,
};

use async_trait::async_trait;
use chrono::Utc;
use courier_control::{
    CampaignCommand, CommandHandler, EventCommand, Request, RequestCommand, Response,
    ResponsePayload, SequenceCommand, StatusInfo, SuppressionCommand, SystemCommand,
};
use courier_engine::{Engine, EngineError};
use courier_store::Store;

/// Handler for control commands.
pub struct CourierControlHandler {
    engine: Engine,
    store: Arc<dyn Store>,
    /// Server start time for uptime calculation
    start_time: Instant,
}

impl CourierControlHandler {
    /// Create a new control handler.
    #[must_use]
    pub fn new(engine: Engine, store: Arc<dyn Store>) -> Self {
        Self {
            engine,
            store,
            start_time: Instant::now(),
        }
    }

    async fn dispatch(&self, command: RequestCommand) -> Result<ResponsePayload, EngineError> {
        match command {
            RequestCommand::Campaign(command) => self.handle_campaign(command).await,
            RequestCommand::Sequence(command) => self.handle_sequence(command).await,
            RequestCommand::Suppression(command) => self.handle_suppression(command).await,
            RequestCommand::Event(EventCommand::Ingest(event)) => {
                self.engine.ingestor.ingest(event).await?;
                Ok(ResponsePayload::Ack)
            }
            RequestCommand::System(command) => self.handle_system(command).await,
        }
    }

    async fn handle_campaign(
        &self,
        command: CampaignCommand,
    ) -> Result<ResponsePayload, EngineError> {
        match command {
            CampaignCommand::Send { id } => {
                let report = self.engine.dispatcher.send(id).await?;
                Ok(ResponsePayload::SendReport(report))
            }
            CampaignCommand::Stats { id } => {
                let stats = self.engine.recorder.campaign_stats(id).await?;
                Ok(ResponsePayload::CampaignStats(stats))
            }
        }
    }

    async fn handle_sequence(
        &self,
        command: SequenceCommand,
    ) -> Result<ResponsePayload, EngineError> {
        match command {
            SequenceCommand::Enroll {
                sequence,
                recipients,
            } => {
                let ids = self.engine.scheduler.enroll(sequence, &recipients).await?;
                Ok(ResponsePayload::Enrolled(ids))
            }
            SequenceCommand::SendStep { enrollment, step } => {
                let outcome = self.engine.scheduler.send_step(enrollment, step).await?;
                Ok(ResponsePayload::Step(outcome))
            }
            SequenceCommand::ProcessDue => {
                let report = self.engine.scheduler.process_due().await?;
                Ok(ResponsePayload::Due(report))
            }
            SequenceCommand::Stop { enrollment } => {
                self.engine.scheduler.stop(enrollment).await?;
                Ok(ResponsePayload::Ack)
            }
        }
    }

    async fn handle_suppression(
        &self,
        command: SuppressionCommand,
    ) -> Result<ResponsePayload, EngineError> {
        match command {
            SuppressionCommand::Check { address } => {
                let suppressed = self.engine.suppression.is_suppressed(&address).await?;
                Ok(ResponsePayload::SuppressionCheck {
                    address,
                    suppressed,
                })
            }
            SuppressionCommand::List => {
                let entries = self.engine.suppression.list().await?;
                Ok(ResponsePayload::Suppressions(entries))
            }
            SuppressionCommand::Add { address, reason } => {
                self.engine
                    .suppression
                    .suppress(&address, reason, None)
                    .await?;
                Ok(ResponsePayload::Ack)
            }
            SuppressionCommand::Remove { address } => {
                let count = self.engine.suppression.unsuppress(&address).await?;
                Ok(ResponsePayload::Removed { count })
            }
        }
    }

    async fn handle_system(&self, command: SystemCommand) -> Result<ResponsePayload, EngineError> {
        match command {
            SystemCommand::Ping => Ok(ResponsePayload::Pong),
            SystemCommand::Status => {
                let now = Utc::now();
                let due = self.store.due_enrollments(now, usize::MAX).await?;
                let suppressions = self.store.list_suppressions().await?;
                let suppressed_addresses = suppressions
                    .iter()
                    .map(|entry| &entry.address)
                    .collect::<std::collections::HashSet<_>>()
                    .len();

                Ok(ResponsePayload::Status(StatusInfo {
                    uptime_secs: self.start_time.elapsed().as_secs(),
                    due_enrollments: due.len(),
                    suppressed_addresses,
                    taken_at: now,
                }))
            }
        }
    }
}

#[async_trait]
impl CommandHandler for CourierControlHandler {
    async fn handle_request(&self, request: Request) -> courier_control::Result<Response> {
        match self.dispatch(request.command).await {
            Ok(payload) => Ok(Response::new(payload)),
            // Engine errors are part of the protocol, not connection
            // failures: the caller gets the machine-distinguishable kind.
            Err(error) => Ok(Response::from_engine_error(&error)),
        }
    }
}
