//! Core HTTP protocol types shared by the codec and the engine.
//!
//! - **Message Handling** ([`message`]): [`Message`], [`PayloadItem`] and [`PayloadSize`]
//! - **Request heads** ([`request`]): [`RequestHeader`] (decoded) and [`RequestHead`] (to encode)
//! - **Response heads** ([`response`]): [`ResponseHeader`] (decoded) and [`ResponseHead`] (to encode)
//! - **Error Handling** ([`error`]): [`HttpError`], [`ParseError`], [`SendError`]

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHead;
pub use request::RequestHeader;

mod response;
pub use response::ResponseHead;
pub use response::ResponseHeader;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
