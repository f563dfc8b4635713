//! Command-line utility for managing a running courier instance.
//!
//! Speaks the control protocol over the Unix socket: campaign blasts,
//! enrollment management, due processing, suppression administration, and
//! health checks.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use courier_common::{
    CampaignId, EmailAddress, EnrollmentId, EventId, ProviderMessageId, RecipientId, SequenceId,
};
use courier_control::{
    CampaignCommand, ControlClient, DEFAULT_CONTROL_SOCKET, EventCommand, Request, RequestCommand,
    ResponsePayload, SequenceCommand, SuppressionCommand, SystemCommand,
};
use courier_engine::{EventKind, ProviderEvent};
use courier_store::SuppressionReason;

/// Command-line utility for managing a running courier instance
#[derive(Parser, Debug)]
#[command(name = "courierctl")]
#[command(about = "Manage the courier delivery engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the control socket
    #[arg(short = 'c', long, default_value = DEFAULT_CONTROL_SOCKET)]
    control_socket: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Campaign blasts
    Campaign {
        #[command(subcommand)]
        action: CampaignAction,
    },
    /// Sequences and enrollments
    Sequence {
        #[command(subcommand)]
        action: SequenceAction,
    },
    /// Suppression registry administration
    Suppression {
        #[command(subcommand)]
        action: SuppressionAction,
    },
    /// Provider event ingestion
    Event {
        #[command(subcommand)]
        action: EventAction,
    },
    /// System status and health
    System {
        #[command(subcommand)]
        action: SystemAction,
    },
}

#[derive(Subcommand, Debug)]
enum CampaignAction {
    /// Send a draft campaign to every eligible recipient
    Send {
        /// Campaign identifier
        id: String,
    },
    /// Show aggregate counters for a campaign
    Stats {
        /// Campaign identifier
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum SequenceAction {
    /// Enroll recipients into a sequence
    Enroll {
        /// Sequence identifier
        sequence: String,
        /// Recipient identifiers
        #[arg(required = true)]
        recipients: Vec<String>,
    },
    /// Manually send a specific step (bypasses the due-time check)
    SendStep {
        /// Enrollment identifier
        enrollment: String,
        /// 1-based step order
        step: u32,
    },
    /// Advance due enrollments now
    ProcessDue,
    /// Stop an enrollment (terminal)
    Stop {
        /// Enrollment identifier
        enrollment: String,
    },
}

#[derive(Subcommand, Debug)]
enum SuppressionAction {
    /// Check whether an address is suppressed
    Check {
        /// E-mail address
        address: String,
    },
    /// List every suppression entry
    List,
    /// Suppress an address
    Add {
        /// E-mail address
        address: String,
        /// Suppression reason
        #[arg(value_enum)]
        reason: ReasonArg,
    },
    /// Remove every suppression entry for an address (administrative)
    Remove {
        /// E-mail address
        address: String,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ReasonArg {
    Unsubscribed,
    Bounced,
}

impl From<ReasonArg> for SuppressionReason {
    fn from(value: ReasonArg) -> Self {
        match value {
            ReasonArg::Unsubscribed => Self::Unsubscribed,
            ReasonArg::Bounced => Self::Bounced,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum KindArg {
    Open,
    Click,
    Bounce,
    Unsubscribe,
}

impl From<KindArg> for EventKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Open => Self::Open,
            KindArg::Click => Self::Click,
            KindArg::Bounce => Self::Bounce,
            KindArg::Unsubscribe => Self::Unsubscribe,
        }
    }
}

#[derive(Subcommand, Debug)]
enum EventAction {
    /// Ingest one provider event
    Ingest {
        /// Event kind
        #[arg(value_enum)]
        kind: KindArg,
        /// Affected e-mail address
        address: String,
        /// Provider message id (omit for form unsubscribes)
        #[arg(short, long)]
        message_id: Option<String>,
        /// Provider detail, e.g. the bounce reason text
        #[arg(short, long)]
        detail: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum SystemAction {
    /// Check if the engine is responding
    Ping,
    /// Get system status and statistics
    Status,
}

fn build_command(command: Commands) -> anyhow::Result<RequestCommand> {
    Ok(match command {
        Commands::Campaign { action } => RequestCommand::Campaign(match action {
            CampaignAction::Send { id } => CampaignCommand::Send {
                id: CampaignId::parse(&id).context("invalid campaign id")?,
            },
            CampaignAction::Stats { id } => CampaignCommand::Stats {
                id: CampaignId::parse(&id).context("invalid campaign id")?,
            },
        }),
        Commands::Sequence { action } => RequestCommand::Sequence(match action {
            SequenceAction::Enroll {
                sequence,
                recipients,
            } => SequenceCommand::Enroll {
                sequence: SequenceId::parse(&sequence).context("invalid sequence id")?,
                recipients: recipients
                    .iter()
                    .map(|id| RecipientId::parse(id).context("invalid recipient id"))
                    .collect::<anyhow::Result<Vec<_>>>()?,
            },
            SequenceAction::SendStep { enrollment, step } => SequenceCommand::SendStep {
                enrollment: EnrollmentId::parse(&enrollment).context("invalid enrollment id")?,
                step,
            },
            SequenceAction::ProcessDue => SequenceCommand::ProcessDue,
            SequenceAction::Stop { enrollment } => SequenceCommand::Stop {
                enrollment: EnrollmentId::parse(&enrollment).context("invalid enrollment id")?,
            },
        }),
        Commands::Suppression { action } => RequestCommand::Suppression(match action {
            SuppressionAction::Check { address } => SuppressionCommand::Check {
                address: EmailAddress::parse(&address)?,
            },
            SuppressionAction::List => SuppressionCommand::List,
            SuppressionAction::Add { address, reason } => SuppressionCommand::Add {
                address: EmailAddress::parse(&address)?,
                reason: reason.into(),
            },
            SuppressionAction::Remove { address } => SuppressionCommand::Remove {
                address: EmailAddress::parse(&address)?,
            },
        }),
        Commands::Event { action } => RequestCommand::Event(match action {
            EventAction::Ingest {
                kind,
                address,
                message_id,
                detail,
            } => EventCommand::Ingest(ProviderEvent {
                id: EventId::generate(),
                provider_message_id: message_id.map(ProviderMessageId::new),
                kind: kind.into(),
                address: EmailAddress::parse(&address)?,
                occurred_at: chrono::Utc::now(),
                detail,
            }),
        }),
        Commands::System { action } => RequestCommand::System(match action {
            SystemAction::Ping => SystemCommand::Ping,
            SystemAction::Status => SystemCommand::Status,
        }),
    })
}

fn print_payload(payload: &ResponsePayload) {
    match payload {
        ResponsePayload::Ack => println!("ok"),
        ResponsePayload::Pong => println!("pong"),
        ResponsePayload::Status(status) => {
            println!("uptime:               {}s", status.uptime_secs);
            println!("due enrollments:      {}", status.due_enrollments);
            println!("suppressed addresses: {}", status.suppressed_addresses);
            println!("taken at:             {}", status.taken_at);
        }
        ResponsePayload::SendReport(report) => {
            println!("recipients: {}", report.total_recipients);
            println!("success:    {}", report.success_count);
            println!("failure:    {}", report.failure_count);
            for error in &report.errors {
                println!("  error: {error}");
            }
        }
        ResponsePayload::CampaignStats(stats) => {
            println!("attempted: {}", stats.attempted);
            println!("delivered: {}", stats.delivered);
            println!("bounced:   {}", stats.bounced);
            println!("opened:    {}", stats.opened);
            println!("clicked:   {}", stats.clicked);
        }
        ResponsePayload::Enrolled(ids) => {
            for id in ids {
                println!("{id}");
            }
        }
        ResponsePayload::Step(outcome) => println!("{outcome:?}"),
        ResponsePayload::Due(report) => {
            println!(
                "processed: {} sent: {} skipped: {}",
                report.processed, report.sent, report.skipped
            );
        }
        ResponsePayload::SuppressionCheck {
            address,
            suppressed,
        } => {
            println!(
                "{address}: {}",
                if *suppressed { "suppressed" } else { "deliverable" }
            );
        }
        ResponsePayload::Suppressions(entries) => {
            for entry in entries {
                println!(
                    "{}\t{}\t{}",
                    entry.address, entry.reason, entry.created_at
                );
            }
        }
        ResponsePayload::Removed { count } => println!("removed {count} entries"),
        ResponsePayload::Error { kind, message } => {
            eprintln!("error ({kind:?}): {message}");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let command = build_command(cli.command)?;
    let client = ControlClient::new(cli.control_socket);
    let response = client.send_request(Request::new(command)).await?;

    let is_error = matches!(response.payload, ResponsePayload::Error { .. });
    print_payload(&response.payload);
    if is_error {
        std::process::exit(1);
    }

    Ok(())
}
