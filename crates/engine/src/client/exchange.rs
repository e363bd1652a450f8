//! One request/response exchange over a fresh connection.

use crate::client::request::Exchange;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::message::Response;
use bytes::{Bytes, BytesMut};
use exchange_http::codec::{RequestEncoder, ResponseDecoder};
use exchange_http::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHead};
use futures::{SinkExt, StreamExt};
use http::{HeaderValue, Version, header};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::trace;

const CONNECTION_CLOSE: HeaderValue = HeaderValue::from_static("close");

/// Connect to the target of `exchange`, send it and read the whole response.
pub(crate) async fn perform(exchange: &Exchange, config: &ClientConfig) -> Result<Response, ClientError> {
    let stream = TcpStream::connect((exchange.host(), exchange.port())).await?;
    trace!(uri = %exchange.uri, local = ?stream.local_addr().ok(), "connected");

    // the write half stays open until the response is read, dropping it would half close
    let (reader, mut writer) = stream.into_split();
    send_request(&mut writer, exchange, &config.user_agent).await?;
    read_response(reader, exchange, config).await
}

async fn send_request<W>(writer: W, exchange: &Exchange, user_agent: &str) -> Result<(), ClientError>
where
    W: AsyncWrite + Unpin,
{
    let mut head = RequestHead::new(());
    *head.method_mut() = exchange.method.clone();
    *head.uri_mut() = exchange.uri.clone();
    *head.version_mut() = Version::HTTP_11;

    let headers = head.headers_mut();
    headers.clone_from(&exchange.headers);
    if let Some(authority) = exchange.authority() {
        let host = HeaderValue::from_str(authority.as_str()).map_err(ClientError::invalid_request)?;
        headers.insert(header::HOST, host);
    }
    if !headers.contains_key(header::USER_AGENT) {
        let user_agent = HeaderValue::from_str(user_agent).map_err(ClientError::invalid_request)?;
        headers.insert(header::USER_AGENT, user_agent);
    }
    headers.insert(header::CONNECTION, CONNECTION_CLOSE);

    let payload_size = PayloadSize::new_length(exchange.body.len() as u64);
    let mut framed_write = FramedWrite::new(writer, RequestEncoder::new());

    framed_write.feed(Message::<_, Bytes>::Header((head, payload_size))).await?;
    if !payload_size.is_empty() {
        let chunk = Message::<(RequestHead, PayloadSize), Bytes>::Payload(PayloadItem::Chunk(exchange.body.clone()));
        framed_write.feed(chunk).await?;
    }
    // send flushes the request to the socket
    framed_write.send(Message::<(RequestHead, PayloadSize), Bytes>::Payload(PayloadItem::Eof)).await?;
    Ok(())
}

async fn read_response<R>(reader: R, exchange: &Exchange, config: &ClientConfig) -> Result<Response, ClientError>
where
    R: AsyncRead + Unpin,
{
    let decoder = ResponseDecoder::new(exchange.method.clone());
    let mut framed_read = FramedRead::with_capacity(reader, decoder, config.read_buffer_size);

    let header = match framed_read.next().await {
        Some(Ok(Message::Header((header, _payload_size)))) => header,
        Some(Ok(Message::Payload(_))) => {
            return Err(ParseError::invalid_body("response payload arrived before its head").into());
        }
        Some(Err(e)) => return Err(e.into()),
        None => return Err(ClientError::ConnectionReset),
    };
    trace!(uri = %exchange.uri, status = %header.status(), "received response head");

    let mut body = BytesMut::new();
    loop {
        match framed_read.next().await {
            Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                if body.len() + bytes.len() > config.max_body_size {
                    let reason = format!("response body exceeds the limit of {} bytes", config.max_body_size);
                    return Err(ParseError::invalid_body(reason).into());
                }
                body.extend_from_slice(&bytes);
            }
            Some(Ok(Message::Payload(PayloadItem::Eof))) => break,
            Some(Ok(Message::Header(_))) => {
                return Err(ParseError::invalid_body("response head arrived before the previous body ended").into());
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Err(ClientError::ConnectionReset),
        }
    }

    Ok(Response::from_header(header, body.freeze()))
}
