//! Raw stream listener: one document per TCP connection, nothing written back.

use std::{io, net::SocketAddr, time::Duration};

use metrics::counter;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, info, warn};

use crate::{
    application::{
        assembler::FrameAssembler,
        pipeline::{Channel, PipelineCoordinator},
    },
    infra::{error::InfraError, telemetry::METRIC_STREAM_CONNECTIONS},
};

const READ_CHUNK_BYTES: usize = 8 * 1024;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct StreamListener {
    listener: TcpListener,
    pipeline: PipelineCoordinator,
}

impl StreamListener {
    pub async fn bind(addr: SocketAddr, pipeline: PipelineCoordinator) -> Result<Self, InfraError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| InfraError::bind(addr, err))?;
        Ok(Self { listener, pipeline })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the task is dropped. Each connection runs in
    /// its own task; none of them can take the listener down.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let pipeline = self.pipeline.clone();
                    tokio::spawn(handle_connection(stream, peer, pipeline));
                }
                Err(err) => {
                    warn!(
                        target = "zplcast::stream",
                        error = %err,
                        "failed to accept stream connection"
                    );
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, pipeline: PipelineCoordinator) {
    debug!(target = "zplcast::stream", peer = %peer, "stream connection opened");

    let mut assembler = FrameAssembler::new();
    if let Err(err) = read_frame(&mut stream, &mut assembler).await {
        assembler.abort();
        counter!(METRIC_STREAM_CONNECTIONS, "result" => "aborted").increment(1);
        warn!(
            target = "zplcast::stream",
            peer = %peer,
            error = %err,
            "stream connection failed; frame discarded"
        );
        return;
    }

    match assembler.close() {
        Ok(Some(document)) => {
            counter!(METRIC_STREAM_CONNECTIONS, "result" => "document").increment(1);
            info!(
                target = "zplcast::stream",
                peer = %peer,
                bytes = document.len(),
                "stream frame completed"
            );
            pipeline.submit(document, Channel::Stream).await;
        }
        Ok(None) => {
            counter!(METRIC_STREAM_CONNECTIONS, "result" => "blank").increment(1);
            debug!(
                target = "zplcast::stream",
                peer = %peer,
                "stream closed without label data"
            );
        }
        Err(err) => {
            counter!(METRIC_STREAM_CONNECTIONS, "result" => "undecodable").increment(1);
            warn!(
                target = "zplcast::stream",
                peer = %peer,
                error = %err,
                "stream frame discarded"
            );
        }
    }
}

/// Read until the peer closes its side, feeding every chunk to `assembler`.
pub(crate) async fn read_frame<R>(reader: &mut R, assembler: &mut FrameAssembler) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    while let Some(buffer) = assembler.buffer_mut() {
        buffer.reserve(READ_CHUNK_BYTES);
        if reader.read_buf(buffer).await? == 0 {
            break;
        }
    }
    Ok(())
}
