use crate::{
    buf::{link_from, Buf, BufTag, Chain},
    connection::Connection,
    flags::{DataFlags, HeadersFlags},
    types::{FrameType, H2Error, StreamId, FRAME_FLOOD_LIMIT, FRAME_HEADER_SIZE},
};
use bytes::Bytes;
use log::{debug, error};
use num_traits::ToPrimitive;

/// Which post-send handler a frame runs once the transport has taken it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Headers,
    Data,
}

/// An outbound frame: a chain of links whose first element is the 9-octet
/// frame header, followed by payload views. `first` advances past fully
/// written links when a send ends mid-frame.
#[derive(Debug)]
pub struct OutFrame {
    pub kind: FrameKind,
    pub stream: StreamId,
    /// Payload length announced in the frame header; for a HEADERS chain it
    /// additionally counts the header octets of every CONTINUATION.
    pub length: usize,
    /// Position in the outbound queue is fixed; never reordered past other
    /// blocked frames and never dropped by stream cleanup.
    pub blocked: bool,
    /// Closes the stream once fully written.
    pub fin: bool,
    pub(crate) first: usize,
    pub(crate) chain: Chain,
}

/// Writes the fixed frame header: 24-bit length, type, flags, 31-bit
/// stream id with the reserved bit cleared.
/// https://httpwg.org/specs/rfc7540.html#FrameHeader
#[must_use]
pub fn frame_header(length: usize, ty: FrameType, flags: u8, sid: StreamId) -> [u8; FRAME_HEADER_SIZE] {
    let len = length as u32;
    // unwrap: FrameType is repr(u8)
    let ty = ty.to_u8().unwrap();
    let sid = sid & (u32::MAX >> 1);
    [
        (len >> 16) as u8,
        (len >> 8) as u8,
        len as u8,
        ty,
        flags,
        (sid >> 24) as u8,
        (sid >> 16) as u8,
        (sid >> 8) as u8,
        sid as u8,
    ]
}

impl Connection {
    /// Chunks an encoded header block into one HEADERS frame plus as many
    /// CONTINUATION frames as the peer's frame size demands. Every chunk is
    /// a fresh header buffer followed by a zero-copy slice of `block`; the
    /// whole chain forms a single blocked [`OutFrame`].
    pub(crate) fn create_headers_frame(
        &self,
        sid: StreamId,
        block: Bytes,
        fin: bool,
        flush: bool,
    ) -> OutFrame {
        let mut rest = block.len();
        let mut frame_size = self.frame_size();
        let mut length = rest;
        let mut chain = Chain::new();

        let mut ty = FrameType::Headers;
        let mut flags = if fin {
            HeadersFlags::END_STREAM.bits()
        } else {
            0
        };

        let mut off = 0;

        loop {
            if rest <= frame_size {
                frame_size = rest;
                flags |= HeadersFlags::END_HEADERS.bits();
            }

            let mut header =
                Buf::new(Bytes::copy_from_slice(&frame_header(frame_size, ty, flags, sid)));
            header.tag = BufTag::FrameHeader;
            chain.push(link_from(header));

            let mut payload = Buf::new(block.slice(off..off + frame_size));
            off += frame_size;
            rest -= frame_size;

            if rest > 0 {
                chain.push(link_from(payload));

                length += FRAME_HEADER_SIZE;
                ty = FrameType::Continuation;
                flags = 0;
                continue;
            }

            payload.last_buf = fin;
            payload.flush = flush;
            chain.push(link_from(payload));

            debug!("http2:{sid} create HEADERS frame: len:{length} fin:{fin}");

            return OutFrame {
                kind: FrameKind::Headers,
                stream: sid,
                length,
                blocked: true,
                fin,
                first: 0,
                chain,
            };
        }
    }

    /// Wraps a carved body chain into a DATA frame, recycling a descriptor
    /// and header buffer from the stream's free lists when possible. The
    /// flood ceiling applies to fresh allocations only.
    pub(crate) fn get_data_frame(
        &mut self,
        sid: StreamId,
        len: usize,
        out: Chain,
    ) -> Result<OutFrame, H2Error> {
        let can_alloc = self.frames < FRAME_FLOOD_LIMIT;

        let stream = self
            .streams
            .get_mut(&sid)
            .ok_or(H2Error::UnknownStream(sid))?;

        let mut allocated = false;
        let mut frame = match stream.free_frames.pop() {
            Some(frame) => frame,
            None if can_alloc => {
                stream.frames += 1;
                allocated = true;
                OutFrame {
                    kind: FrameKind::Data,
                    stream: sid,
                    length: 0,
                    blocked: false,
                    fin: false,
                    first: 0,
                    chain: Chain::new(),
                }
            }
            None => {
                error!("http2 flood detected");
                self.error = true;
                return Err(H2Error::Flood);
            }
        };

        // unwrap: the carving loop never produces an empty chain
        let fin = out.last().unwrap().borrow().last_buf;
        let flags = if fin { DataFlags::END_STREAM.bits() } else { 0 };

        debug!("http2:{sid} create DATA frame: len:{len} flags:{flags}");

        let header = stream
            .free_frame_headers
            .pop()
            .unwrap_or_else(|| link_from(Buf::new(Bytes::new())));
        {
            let mut b = header.borrow_mut();
            b.data = Bytes::copy_from_slice(&frame_header(len, FrameType::Data, flags, sid));
            b.pos = 0;
            b.last = FRAME_HEADER_SIZE;
            b.last_buf = false;
            b.flush = false;
            b.tag = BufTag::FrameHeader;
            b.shadow = None;
        }

        // unwrap: checked non-empty above
        out.last().unwrap().borrow_mut().flush = true;

        frame.kind = FrameKind::Data;
        frame.stream = sid;
        frame.length = len;
        frame.blocked = false;
        frame.fin = fin;
        frame.first = 0;
        frame.chain.clear();
        frame.chain.push(header);
        frame.chain.extend(out);

        if allocated {
            self.frames += 1;
        }

        Ok(frame)
    }
}
