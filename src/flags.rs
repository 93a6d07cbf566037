use bitflags::bitflags;

bitflags! {
    /// https://httpwg.org/specs/rfc7540.html#DATA
    #[repr(transparent)]
    pub struct DataFlags: u8 {
        /// When set, bit 0 indicates that this frame is the last that the endpoint will send for the identified stream. Setting this flag causes the stream to enter one of the "half-closed" states or the "closed" state (Section 5.1).
        const END_STREAM = 0x1;
    }

    /// https://httpwg.org/specs/rfc7540.html#HEADERS
    #[repr(transparent)]
    pub struct HeadersFlags: u8 {
        /// When set, bit 0 indicates that the header block (Section 4.3) is the last that the endpoint will send for the identified stream.
        /// A HEADERS frame carries the END_STREAM flag that signals the end of a stream. However, a HEADERS frame with the END_STREAM flag set can be followed by CONTINUATION frames on the same stream. Logically, the CONTINUATION frames are part of the HEADERS frame.
        const END_STREAM = 0x1;
        /// When set, bit 2 indicates that this frame contains an entire header block (Section 4.3) and is not followed by any CONTINUATION frames.
        /// A HEADERS frame without the END_HEADERS flag set MUST be followed by a CONTINUATION frame for the same stream. A receiver MUST treat the receipt of any other type of frame or a frame on a different stream as a connection error (Section 5.4.1) of type PROTOCOL_ERROR.
        const END_HEADERS = 0x4;
    }

    /// https://httpwg.org/specs/rfc7540.html#CONTINUATION
    #[repr(transparent)]
    pub struct ContinuationFlags: u8 {
        /// When set, bit 2 indicates that this frame ends a header block (Section 4.3).
        /// If the END_HEADERS bit is not set, this frame MUST be followed by another CONTINUATION frame. A receiver MUST treat the receipt of any other type of frame or a frame on a different stream as a connection error (Section 5.4.1) of type PROTOCOL_ERROR.
        const END_HEADERS = 0x4;
    }
}
