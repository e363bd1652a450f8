//! The I/O task of one accepted connection.
//!
//! 1. read the whole request
//! 2. hand a [`Connection`] to the sink
//! 3. wait for the sink's reply while watching the peer and the server shutdown
//! 4. write the response, if any, and close the socket
//!
//! The task owns the socket for the whole time, the sink only ever holds the id. There is
//! no keep-alive: one request per connection.

use crate::message::{IncomingRequest, Response};
use crate::runtime::panic_message;
use crate::server::arena::{ConnectionArena, ConnectionId, Reply};
use crate::server::connection::Connection;
use crate::server::http_server::ServerShared;
use bytes::{Bytes, BytesMut};
use exchange_http::codec::{RequestDecoder, ResponseEncoder};
use exchange_http::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHeader, ResponseHead, SendError};
use futures::{SinkExt, StreamExt};
use http::header::{CONNECTION, EXPECT};
use http::{HeaderValue, Method, StatusCode};
use std::net::SocketAddr;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const CONNECTION_CLOSE: HeaderValue = HeaderValue::from_static("close");

pub(crate) async fn serve_connection(shared: Arc<ServerShared>, stream: TcpStream, peer_addr: SocketAddr) {
    let cancel = shared.shutdown.child_token();
    let id = shared.arena.insert(peer_addr, cancel.clone());
    debug!(connection = %id, peer = %peer_addr, "accepted connection");

    let (reader, writer) = stream.into_split();
    let io = ConnectionIo {
        id,
        peer_addr,
        arena: Arc::clone(&shared.arena),
        cancel,
        framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), shared.config.read_buffer_size),
        framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
        max_body_size: shared.config.max_body_size,
    };
    io.process(&shared).await;

    shared.arena.remove(id);
    debug!(connection = %id, "connection closed");
}

struct ConnectionIo<R, W> {
    id: ConnectionId,
    peer_addr: SocketAddr,
    arena: Arc<ConnectionArena>,
    cancel: CancellationToken,
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
    max_body_size: usize,
}

impl<R, W> ConnectionIo<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    async fn process(mut self, shared: &ServerShared) {
        let cancel = self.cancel.clone();
        let request = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            request = self.read_request() => request,
        };

        let request = match request {
            Ok(Some(request)) => request,
            Ok(None) => {
                info!(connection = %self.id, "peer closed before sending a request");
                return;
            }
            Err(e) => {
                error!(connection = %self.id, cause = %e, "can't receive request");
                if let Some(status) = e.status() {
                    self.write_response(Response::new(status), false).await;
                }
                return;
            }
        };

        let Some(sink) = shared.sink.load_full() else {
            error!(connection = %self.id, "no sink registered, dropping connection");
            return;
        };

        let reply = match self.arena.dispatch(self.id) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(connection = %self.id, cause = %e, "connection can not be dispatched");
                return;
            }
        };

        debug!(connection = %self.id, method = %request.method(), path = request.path(), "dispatching request");
        let head_only = request.method() == Method::HEAD;
        let connection = Connection::new(self.id, Arc::clone(&self.arena));
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| sink.dispatch(connection, request))) {
            error!(connection = %self.id, panic = panic_message(payload.as_ref()), "sink panicked");
            // usually unwinding dropped the connection, which already released it; a sink that
            // stored it before panicking still holds it, take it back here
            if self.arena.release(self.id).is_ok() {
                warn!(connection = %self.id, "released the connection of the panicked sink");
            }
        }

        match self.wait_reply(reply).await {
            Some(response) => self.write_response(response, head_only).await,
            None => debug!(connection = %self.id, "connection released without response"),
        }
    }

    async fn read_request(&mut self) -> Result<Option<IncomingRequest>, RequestError> {
        let header = match self.framed_read.next().await {
            Some(Ok(Message::Header((header, _payload_size)))) => header,
            Some(Ok(Message::Payload(_))) => return Err(ParseError::invalid_body("need header while receive body").into()),
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(None),
        };

        if header.need_body() {
            self.continue_if_expected(&header).await?;
        }

        let mut body = BytesMut::new();
        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                    if body.len() + bytes.len() > self.max_body_size {
                        return Err(RequestError::BodyTooLarge { limit: self.max_body_size });
                    }
                    body.extend_from_slice(&bytes);
                }
                Some(Ok(Message::Payload(PayloadItem::Eof))) => break,
                Some(Ok(Message::Header(_))) => {
                    return Err(ParseError::invalid_body("need body while receive header").into());
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Err(ParseError::UnexpectedEof.into()),
            }
        }

        Ok(Some(IncomingRequest::new(header, body.freeze(), self.peer_addr)))
    }

    /// Answer `Expect: 100-continue` before reading the body.
    async fn continue_if_expected(&mut self, header: &RequestHeader) -> Result<(), ParseError> {
        let Some(value) = header.headers().get(EXPECT) else {
            return Ok(());
        };
        if !value.as_bytes().eq_ignore_ascii_case(b"100-continue") {
            return Ok(());
        }

        let writer = self.framed_write.get_mut();
        writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
        writer.flush().await?;
        debug!(connection = %self.id, "sent continue response");
        Ok(())
    }

    /// Wait for the sink to respond or release.
    ///
    /// Meanwhile the socket is watched so the sink can see a peer that hung up. Returns
    /// `None` when the connection is released, or taken back by the server.
    async fn wait_reply(&mut self, mut reply: oneshot::Receiver<Reply>) -> Option<Response> {
        let mut probe = [0u8; 512];
        let mut peer_open = true;
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    info!(connection = %self.id, "connection taken back by server shutdown");
                    return None;
                }
                reply = &mut reply => {
                    return match reply {
                        Ok(Reply::Respond(response)) => Some(response),
                        Ok(Reply::Release) | Err(_) => None,
                    };
                }
                read = self.framed_read.get_mut().read(&mut probe), if peer_open => {
                    if matches!(read, Ok(0) | Err(_)) {
                        debug!(connection = %self.id, "peer closed while the sink holds the connection");
                        peer_open = false;
                        self.arena.mark_peer_closed(self.id);
                    }
                }
            }
        }
    }

    /// Write `response` and close. With `head_only` the head still announces the length of
    /// the body, but the body itself is not sent.
    async fn write_response(&mut self, response: Response, head_only: bool) {
        let cancel = self.cancel.clone();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = self.do_send_response(response, head_only) => result,
        };
        if let Err(e) = result {
            warn!(connection = %self.id, cause = %e, "failed to send response");
        }
    }

    async fn do_send_response(&mut self, response: Response, head_only: bool) -> Result<(), SendError> {
        let (mut head, body) = response.into_head();
        head.headers_mut().insert(CONNECTION, CONNECTION_CLOSE);
        let payload_size = PayloadSize::new_length(body.len() as u64);

        let header = Message::<_, Bytes>::Header((head, payload_size));
        if payload_size.is_empty() || head_only {
            // flush right away, nothing follows the head
            self.framed_write.send(header).await?;
        } else {
            self.framed_write.feed(header).await?;
            self.framed_write.feed(Message::<(ResponseHead, PayloadSize), Bytes>::Payload(PayloadItem::Chunk(body))).await?;
        }
        if !head_only {
            self.framed_write.send(Message::<(ResponseHead, PayloadSize), Bytes>::Payload(PayloadItem::Eof)).await?;
        }
        self.framed_write.get_mut().shutdown().await?;
        Ok(())
    }
}

#[derive(Debug, Error)]
enum RequestError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("request body exceeds the limit of {limit} bytes")]
    BodyTooLarge { limit: usize },
}

impl RequestError {
    /// The status to answer with, `None` when the peer is gone anyway.
    fn status(&self) -> Option<StatusCode> {
        match self {
            Self::BodyTooLarge { .. } => Some(StatusCode::PAYLOAD_TOO_LARGE),
            Self::Parse(ParseError::TooLargeHeader { .. } | ParseError::TooManyHeaders { .. }) => {
                Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE)
            }
            Self::Parse(ParseError::Io { .. } | ParseError::UnexpectedEof) => None,
            Self::Parse(_) => Some(StatusCode::BAD_REQUEST),
        }
    }
}
