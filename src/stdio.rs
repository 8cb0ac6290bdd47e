//! Stdio transport loop
//!
//! Reads framed envelopes from the input stream, runs every request as its own
//! task and writes responses in completion order. A slow request never holds
//! up a later fast one. After the input closes, in-flight requests are allowed
//! to finish and their responses are still written.

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tracing::{debug, error, info, warn};

use crate::{
    errors::AppError,
    framing::Framing,
    mcp::{
        rpc::{app_error_to_response, RequestEnvelope, ResponseEnvelope},
        server::handle_envelope,
    },
    AppState,
};

const READ_BUFFER_SIZE: usize = 8 * 1024;

pub struct StdioServer {
    state: AppState,
    framing: Framing,
}

impl StdioServer {
    pub fn new(state: AppState, framing: Framing) -> Self {
        Self { state, framing }
    }

    /// Serves until the reader reaches end of input and every accepted request has answered.
    pub async fn run<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (responses, mut completed) = mpsc::unbounded_channel::<ResponseEnvelope>();
        let mut decoder = self.framing.decoder();
        let mut buffer = vec![0_u8; READ_BUFFER_SIZE];

        info!(framing = ?self.framing, "stdio server ready");

        loop {
            tokio::select! {
                read = reader.read(&mut buffer) => {
                    match read {
                        Ok(0) => break,
                        Ok(count) => {
                            for request in decoder.decode::<RequestEnvelope>(&buffer[..count]) {
                                self.spawn_request(request, responses.clone());
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "input stream failed, treating as closed");
                            break;
                        }
                    }
                }
                Some(response) = completed.recv() => {
                    self.write_response(&mut writer, &response).await?;
                }
            }
        }

        if let Some(request) = decoder.finish::<RequestEnvelope>() {
            self.spawn_request(request, responses.clone());
        }
        drop(responses);

        debug!("input closed, draining in-flight requests");
        while let Some(response) = completed.recv().await {
            self.write_response(&mut writer, &response).await?;
        }

        info!("stdio server stopped");
        writer.flush().await
    }

    fn spawn_request(&self, request: RequestEnvelope, responses: mpsc::UnboundedSender<ResponseEnvelope>) {
        let state = self.state.clone();
        let id = request.id.clone();
        let method = request.method.clone();

        tokio::spawn(async move {
            let handler = tokio::spawn(async move { handle_envelope(&state, request).await });

            let response = match handler.await {
                Ok(response) => response,
                Err(err) => {
                    error!(method = %method, error = %err, "request handler aborted");
                    id.map(|id| {
                        app_error_to_response(
                            id,
                            &AppError::internal(format!("request handler aborted: {err}")),
                        )
                    })
                }
            };

            if let Some(response) = response {
                if responses.send(response).is_err() {
                    warn!(method = %method, "response dropped, writer is gone");
                }
            }
        });
    }

    async fn write_response<W>(&self, writer: &mut W, response: &ResponseEnvelope) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let frame = match self.framing.encode(response) {
            Ok(frame) => frame,
            Err(err) => {
                error!(id = ?response.id, error = %err, "response serialization failed");
                return Ok(());
            }
        };

        writer.write_all(&frame).await?;
        writer.flush().await
    }
}
