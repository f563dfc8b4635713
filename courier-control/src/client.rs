//! Client for connecting to the control socket

use std::time::Duration;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::UnixStream,
};
use tracing::debug;

use crate::{ControlError, Request, Response, Result};

/// Maximum accepted response frame (10MB) — generous enough for a large
/// suppression listing while bounding memory.
const MAX_RESPONSE_SIZE: u32 = 10_000_000;

/// Client for communicating with the courier control server
pub struct ControlClient {
    socket_path: String,
    timeout: Duration,
}

impl ControlClient {
    /// Create a new control client with the given socket path
    #[must_use]
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Set the request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a request and receive a response
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails, the protocol is violated,
    /// or the exchange times out.
    pub async fn send_request(&self, request: Request) -> Result<Response> {
        tokio::time::timeout(self.timeout, self.send_request_internal(request))
            .await
            .map_err(|_| ControlError::Timeout)?
    }

    async fn send_request_internal(&self, request: Request) -> Result<Response> {
        debug!("Connecting to control socket: {}", self.socket_path);
        let mut stream = UnixStream::connect(&self.socket_path).await?;

        let request_bytes =
            bincode::serde::encode_to_vec(&request, bincode::config::standard())?;
        let len = u32::try_from(request_bytes.len()).map_err(|_| {
            ControlError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "request exceeds frame size",
            ))
        })?;

        stream.write_all(&len.to_be_bytes()).await?;
        stream.write_all(&request_bytes).await?;
        stream.flush().await?;

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ControlError::ConnectionClosed
            } else {
                ControlError::Io(e)
            }
        })?;

        let response_len = u32::from_be_bytes(len_buf);
        if response_len > MAX_RESPONSE_SIZE {
            return Err(ControlError::ProtocolDeserialization(
                bincode::error::DecodeError::OtherString(format!(
                    "Response too large: {response_len} bytes"
                )),
            ));
        }

        let mut response_bytes = vec![0u8; response_len as usize];
        stream.read_exact(&mut response_bytes).await?;

        let (response, _) =
            bincode::serde::decode_from_slice(&response_bytes, bincode::config::standard())?;
        Ok(response)
    }
}
