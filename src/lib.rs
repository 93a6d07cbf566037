#![warn(future_incompatible, nonstandard_style, rust_2018_idioms, unused)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
)]

mod body;
mod buf;
mod config;
mod connection;
mod flags;
mod frame;
mod handlers;
mod headers;
mod hpack;
mod huffman;
mod request;
mod stream;
mod types;

pub use buf::{link, Buf, BufRef, BufTag, Chain};
pub use bytes::Bytes;
pub use config::{Config, ServerTokens};
pub use connection::{Connection, Transport};
pub use flags::{ContinuationFlags, DataFlags, HeadersFlags};
pub use frame::{frame_header, FrameKind, OutFrame};
pub use headers::{SERVER, SERVER_BUILD, SERVER_SHORT};
pub use request::{http_time, HeaderEntry, HeadersOut, Method, Request};
pub use stream::{Stream, WriteEvent};
pub use types::{
    FrameType, H2Error, SendStatus, StreamId, DEFAULT_FRAME_SIZE, DEFAULT_WINDOW,
    FRAME_HEADER_SIZE, MAX_FIELD,
};
