//! Control protocol round-trip and live socket tests.

use std::sync::Arc;

use async_trait::async_trait;
use courier_common::{CampaignId, Signal};
use courier_control::{
    CampaignCommand, CommandHandler, ControlClient, ControlServer, ErrorKind, PROTOCOL_VERSION,
    Request, RequestCommand, Response, ResponsePayload, SystemCommand,
};
use courier_engine::CampaignSendReport;
use tokio::sync::broadcast;

#[test]
fn request_frames_survive_serialization() {
    let request = Request::new(RequestCommand::Campaign(CampaignCommand::Send {
        id: CampaignId::generate(),
    }));

    let bytes = bincode::serde::encode_to_vec(&request, bincode::config::standard())
        .expect("encode request");
    let (decoded, _): (Request, _) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
            .expect("decode request");

    assert_eq!(decoded.version, PROTOCOL_VERSION);
    match (&request.command, &decoded.command) {
        (
            RequestCommand::Campaign(CampaignCommand::Send { id: sent }),
            RequestCommand::Campaign(CampaignCommand::Send { id: received }),
        ) => assert_eq!(sent, received),
        other => panic!("unexpected commands after round-trip: {other:?}"),
    }
}

/// Test handler: answers pings and returns a canned send report for any
/// campaign command.
struct StubHandler;

#[async_trait]
impl CommandHandler for StubHandler {
    async fn handle_request(&self, request: Request) -> courier_control::Result<Response> {
        let payload = match request.command {
            RequestCommand::System(SystemCommand::Ping) => ResponsePayload::Pong,
            RequestCommand::Campaign(_) => ResponsePayload::SendReport(CampaignSendReport {
                total_recipients: 3,
                success_count: 2,
                failure_count: 1,
                errors: vec!["b@example.com: 450 mailbox busy".to_string()],
            }),
            _ => ResponsePayload::Error {
                kind: ErrorKind::Protocol,
                message: "unsupported in stub".to_string(),
            },
        };
        Ok(Response::new(payload))
    }
}

#[tokio::test]
async fn client_and_server_exchange_frames_over_the_socket() {
    let dir = tempfile::tempdir().expect("tempdir");
    let socket_path = dir
        .path()
        .join("courier-test.sock")
        .to_string_lossy()
        .into_owned();

    let (shutdown_tx, _) = broadcast::channel::<Signal>(4);
    let server = ControlServer::new(socket_path.clone(), Arc::new(StubHandler));
    let server_shutdown = shutdown_tx.subscribe();
    let server_task = tokio::spawn(async move { server.serve(server_shutdown).await });

    // Wait for the socket to appear.
    let client = ControlClient::new(socket_path.clone());
    let mut attempts = 0;
    let response = loop {
        match client
            .send_request(Request::new(RequestCommand::System(SystemCommand::Ping)))
            .await
        {
            Ok(response) => break response,
            Err(_) if attempts < 50 => {
                attempts += 1;
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
            Err(e) => panic!("control server never came up: {e}"),
        }
    };
    assert!(matches!(response.payload, ResponsePayload::Pong));

    let report_response = client
        .send_request(Request::new(RequestCommand::Campaign(
            CampaignCommand::Send {
                id: CampaignId::generate(),
            },
        )))
        .await
        .expect("campaign request");
    match report_response.payload {
        ResponsePayload::SendReport(report) => {
            assert_eq!(report.total_recipients, 3);
            assert_eq!(report.success_count, 2);
            assert_eq!(report.failure_count, 1);
        }
        other => panic!("unexpected payload: {other:?}"),
    }

    shutdown_tx.send(Signal::Shutdown).expect("signal shutdown");
    server_task
        .await
        .expect("server task join")
        .expect("server exits cleanly");
}
