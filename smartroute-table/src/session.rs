use std::{net::SocketAddr, sync::Arc};

use smartroute_common::{Signal, config::SessionTimeouts, error::SessionError, incoming, internal, outgoing};
use smartroute_routing::{Decision, Router};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::broadcast,
};

use crate::protocol::{MAX_LINE, ProtocolError, Request, Response};

enum Line {
    Complete,
    TooLong,
    Eof,
}

/// One client connection, answering lookups until the client goes away.
pub struct Session<Stream> {
    peer: SocketAddr,
    stream: BufReader<Stream>,
    router: Arc<Router>,
    timeouts: SessionTimeouts,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Session<Stream> {
    pub fn new(stream: Stream, peer: SocketAddr, router: Arc<Router>, timeouts: SessionTimeouts) -> Self {
        Self {
            peer,
            stream: BufReader::new(stream),
            router,
            timeouts,
        }
    }

    /// Serve requests until EOF.
    ///
    /// # Errors
    ///
    /// On I/O failure, inactivity timeout, or shutdown while waiting for the
    /// next request. A request being answered is always completed first.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<Signal>) -> Result<(), SessionError> {
        internal!(level = DEBUG, "Connection from {}", self.peer);

        let mut line = Vec::with_capacity(256);

        loop {
            let read = tokio::select! {
                _ = shutdown.recv() => return Err(SessionError::Shutdown),
                read = self.next_line(&mut line) => read?,
            };

            let response = match read {
                Line::Eof => {
                    internal!(level = DEBUG, "Connection from {} closed", self.peer);
                    return Ok(());
                }
                Line::TooLong => {
                    incoming!(level = WARN, "{}: over-long request discarded", self.peer);
                    Response::from(ProtocolError::LineTooLong(MAX_LINE))
                }
                Line::Complete => self.answer(&line).await,
            };

            outgoing!(level = DEBUG, "{}: {response}", self.peer);

            let mut reply = response.to_string();
            reply.push('\n');
            self.stream.write_all(reply.as_bytes()).await?;
            self.stream.flush().await?;
        }
    }

    async fn next_line(&mut self, line: &mut Vec<u8>) -> Result<Line, SessionError> {
        match self.timeouts.inactivity() {
            Some(limit) => tokio::time::timeout(limit, self.read_line(line))
                .await
                .map_err(|_| SessionError::Timeout(self.timeouts.inactivity_secs))?,
            None => self.read_line(line).await,
        }
    }

    async fn read_line(&mut self, line: &mut Vec<u8>) -> Result<Line, SessionError> {
        line.clear();

        let read = (&mut self.stream)
            .take(MAX_LINE as u64 + 1)
            .read_until(b'\n', line)
            .await?;

        if read == 0 {
            return Ok(Line::Eof);
        }

        if line.last() == Some(&b'\n') || line.len() <= MAX_LINE {
            return Ok(Line::Complete);
        }

        // Drop the remainder of the over-long line
        loop {
            let buffered = self.stream.fill_buf().await?;
            if buffered.is_empty() {
                break;
            }

            if let Some(end) = buffered.iter().position(|&b| b == b'\n') {
                self.stream.consume(end + 1);
                break;
            }

            let len = buffered.len();
            self.stream.consume(len);
        }

        Ok(Line::TooLong)
    }

    async fn answer(&self, line: &[u8]) -> Response {
        match Request::parse(line) {
            Ok(Request::Get(key)) => {
                incoming!(level = DEBUG, "{}: get {key}", self.peer);

                match self.router.decide(&key).await {
                    Decision::Route(selection) => Response::Found(selection.address),
                    Decision::NoResult(reason) => {
                        internal!(level = DEBUG, "No result for {key}: {reason:?}");
                        Response::NotFound
                    }
                }
            }
            Ok(Request::Wildcard) => {
                incoming!(level = DEBUG, "{}: get *", self.peer);
                Response::NotFound
            }
            Ok(Request::Unsupported(command)) => {
                incoming!(level = DEBUG, "{}: unsupported command {command:?}", self.peer);
                Response::NotFound
            }
            Err(err) => {
                incoming!(level = WARN, "{}: {err}", self.peer);
                Response::from(err)
            }
        }
    }
}
