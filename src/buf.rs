use bytes::Bytes;
use std::{cell::RefCell, rc::Rc};

/// Origin of a buffer, deciding which per-stream free list takes it back
/// once its frame has been fully written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufTag {
    /// 9-octet frame header owned by this module.
    FrameHeader,
    /// Zero-copy view over a sub-range of an upstream buffer.
    Shadow,
    /// Buffer handed in by the upstream caller, or a header-block slice.
    Plain,
}

/// One link of an output chain. `pos..last` is the unsent range within
/// `data`; the transport advances `pos` as bytes leave the process.
#[derive(Debug)]
pub struct Buf {
    pub data: Bytes,
    pub pos: usize,
    pub last: usize,
    /// Terminates the response body; the frame wrapping this link carries
    /// END_STREAM.
    pub last_buf: bool,
    /// Push this link (and everything before it) out without waiting for
    /// more output.
    pub flush: bool,
    pub tag: BufTag,
    /// Set on shadow buffers only: the buffer this one is a view of. The
    /// origin's cursor is advanced to match before the shadow is released.
    pub shadow: Option<BufRef>,
}

pub type BufRef = Rc<RefCell<Buf>>;
pub type Chain = Vec<BufRef>;

impl Buf {
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            pos: 0,
            last: data.len(),
            data,
            last_buf: false,
            flush: false,
            tag: BufTag::Plain,
            shadow: None,
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.last - self.pos
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data[self.pos..self.last]
    }
}

/// Builds a chain link around caller-owned bytes; the usual way for the
/// HTTP core to assemble a body chain.
pub fn link(data: impl Into<Bytes>, last_buf: bool) -> BufRef {
    let mut buf = Buf::new(data);
    buf.last_buf = last_buf;
    Rc::new(RefCell::new(buf))
}

pub(crate) fn link_from(buf: Buf) -> BufRef {
    Rc::new(RefCell::new(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_tracks_cursor() {
        let cl = link(&b"hello"[..], true);
        {
            let mut b = cl.borrow_mut();
            assert_eq!(b.size(), 5);
            assert_eq!(b.bytes(), b"hello");
            b.pos += 2;
        }
        let b = cl.borrow();
        assert_eq!(b.size(), 3);
        assert_eq!(b.bytes(), b"llo");
        assert!(b.last_buf);
    }
}
