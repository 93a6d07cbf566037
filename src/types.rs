use num_derive::{FromPrimitive, ToPrimitive};

pub type StreamId = u32;

/// Size of the fixed frame header preceding every frame payload.
pub const FRAME_HEADER_SIZE: usize = 9;

/// Default SETTINGS_MAX_FRAME_SIZE until the peer advertises one.
pub const DEFAULT_FRAME_SIZE: usize = 1 << 14;
/// Largest SETTINGS_MAX_FRAME_SIZE the protocol allows (2^24 - 1).
pub const MAX_FRAME_SIZE: usize = (1 << 24) - 1;

/// Initial flow-control window for the connection and for new streams.
pub const DEFAULT_WINDOW: i32 = 65_535;

/// Worst-case octets needed for an HPACK integer we are willing to emit.
pub const INT_OCTETS: usize = 4;

/// Longest header name or value that fits the integer budget above.
pub const MAX_FIELD: usize = 127 + (1 << ((INT_OCTETS - 1) * 7)) - 1;

/// Live outbound frames allowed per connection before the response
/// producer is considered to be flooding the peer.
pub const FRAME_FLOOD_LIMIT: u32 = 10_000;

/// https://httpwg.org/specs/rfc7540.html#FrameTypes
///
/// Only the frame types this filter emits; control frames belong to the
/// connection layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Continuation = 0x9,
}

/// Outcome of a flush attempt: either everything queued for the stream
/// reached the transport, or some of it is still buffered and the caller
/// must wait for the write event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Done,
    Again,
}

#[derive(thiserror::Error, Debug)]
pub enum H2Error {
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),
    #[error("too long response {0}: \"{1}\"")]
    FieldTooLong(&'static str, String),
    #[error("http2 flood detected")]
    Flood,
    #[error("output on closed stream")]
    ClosedStream,
    #[error("unknown http2 stream {0}")]
    UnknownStream(StreamId),
    #[error("stream in error state")]
    StreamError,
    #[error("connection in error state")]
    ConnectionError,
}
