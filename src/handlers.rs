use crate::{
    buf::BufTag,
    connection::Connection,
    frame::{FrameKind, OutFrame},
    types::{StreamId, FRAME_HEADER_SIZE},
};
use log::debug;

impl Connection {
    /// Runs the post-send handler matching the frame's kind. `None` means
    /// the frame was fully written and recycled; `Some` returns it with
    /// `first` advanced to the earliest unsent link.
    pub(crate) fn run_handler(&mut self, frame: OutFrame) -> Option<OutFrame> {
        match frame.kind {
            FrameKind::Headers => self.headers_frame_handler(frame),
            FrameKind::Data => self.data_frame_handler(frame),
        }
    }

    /// HEADERS (and CONTINUATION) chains own every link they carry: header
    /// buffers go back to the frame-header free list, block slices to the
    /// scratch list.
    fn headers_frame_handler(&mut self, mut frame: OutFrame) -> Option<OutFrame> {
        let sid = frame.stream;

        for at in frame.first..frame.chain.len() {
            let cl = &frame.chain[at];

            let (done, tag) = {
                let b = cl.borrow();
                (b.pos == b.last, b.tag)
            };

            if !done {
                frame.first = at;
                debug!("http2:{sid} HEADERS frame was sent partially");
                return Some(frame);
            }

            if let Some(stream) = self.streams.get_mut(&sid) {
                if tag == BufTag::FrameHeader {
                    stream.free_frame_headers.push(cl.clone());
                } else {
                    stream.free_bufs.push(cl.clone());
                }
            }
        }

        debug!("http2:{sid} HEADERS frame was sent");

        self.payload_bytes += frame.length as u64;

        self.handle_frame(frame);
        self.handle_stream(sid);

        None
    }

    /// DATA chains mix ownership: the leading header buffer is ours, the
    /// payload links are caller buffers or shadows over them. A shadow's
    /// final cursor is pushed back onto its origin before release, so the
    /// caller observes consumption even across partial sends.
    fn data_frame_handler(&mut self, mut frame: OutFrame) -> Option<OutFrame> {
        let sid = frame.stream;
        let mut at = frame.first;

        if frame.chain[at].borrow().tag == BufTag::FrameHeader {
            let cl = &frame.chain[at];

            let done = {
                let b = cl.borrow();
                b.pos == b.last
            };
            if !done {
                debug!("http2:{sid} DATA frame was sent partially");
                return Some(frame);
            }

            if let Some(stream) = self.streams.get_mut(&sid) {
                stream.free_frame_headers.push(cl.clone());
            }

            if at == frame.chain.len() - 1 {
                return self.data_frame_done(frame);
            }

            at += 1;
        }

        loop {
            let cl = &frame.chain[at];

            let (size, tag) = {
                let b = cl.borrow();
                if b.tag == BufTag::Shadow {
                    if let Some(origin) = &b.shadow {
                        origin.borrow_mut().pos = b.pos;
                    }
                }
                (b.size(), b.tag)
            };

            if size != 0 {
                if at != frame.first {
                    frame.first = at;
                    self.handle_stream(sid);
                }

                debug!("http2:{sid} DATA frame was sent partially");
                return Some(frame);
            }

            if tag == BufTag::Shadow {
                if let Some(stream) = self.streams.get_mut(&sid) {
                    stream.free_bufs.push(cl.clone());
                }
            }

            if at == frame.chain.len() - 1 {
                break;
            }

            at += 1;
        }

        self.data_frame_done(frame)
    }

    fn data_frame_done(&mut self, frame: OutFrame) -> Option<OutFrame> {
        let sid = frame.stream;

        debug!("http2:{sid} DATA frame was sent");

        self.payload_bytes += frame.length as u64;

        self.handle_frame(frame);
        self.handle_stream(sid);

        None
    }

    /// Common completion accounting: close the stream on fin, recycle the
    /// descriptor, release the queue's claim on the stream.
    fn handle_frame(&mut self, mut frame: OutFrame) {
        self.total_bytes += (FRAME_HEADER_SIZE + frame.length) as u64;

        let Some(stream) = self.streams.get_mut(&frame.stream) else {
            return;
        };

        if frame.fin {
            stream.out_closed = true;
        }

        frame.chain.clear();
        frame.first = 0;
        stream.free_frames.push(frame);

        stream.queued -= 1;
    }

    /// Marks the stream's write event ready and posts it, unless the stream
    /// is parked, mid-flush, or still exhausted with a healthy downstream.
    pub(crate) fn handle_stream(&mut self, sid: StreamId) {
        let Some(stream) = self.streams.get_mut(&sid) else {
            return;
        };

        if stream.waiting || stream.blocked {
            return;
        }

        if !stream.error && stream.exhausted {
            return;
        }

        stream.write.active = false;
        stream.write.ready = true;

        if !stream.error && stream.write.delayed {
            return;
        }

        self.post_write_event(sid);
    }

    /// Tears down a stream that dies with frames still queued: drop its
    /// reorderable frames, hand their reserved connection credit back, and
    /// wake everyone the empty window was holding up. Blocked frames stay;
    /// they are inside a HEADERS sequence or already partially written and
    /// must drain normally.
    pub fn cleanup_stream(&mut self, sid: StreamId) {
        let Some(stream) = self.streams.get_mut(&sid) else {
            return;
        };

        if stream.waiting {
            stream.waiting = false;
            self.waiting.retain(|&s| s != sid);
        }

        let mut queued = stream.queued;
        if queued == 0 {
            return;
        }

        let mut window = 0usize;

        self.last_out.retain(|frame| {
            if queued > 0 && frame.stream == sid && !frame.blocked {
                window += frame.length;
                queued -= 1;
                false
            } else {
                true
            }
        });

        if let Some(stream) = self.streams.get_mut(&sid) {
            stream.queued = queued;
        }

        debug!("http2:{sid} cleanup reclaimed {window} window bytes");

        if self.send_window == 0 && window > 0 {
            while let Some(waiter) = self.waiting.pop_front() {
                let Some(stream) = self.streams.get_mut(&waiter) else {
                    continue;
                };

                stream.waiting = false;
                stream.write.active = false;
                stream.write.ready = true;

                if !stream.write.delayed {
                    self.post_write_event(waiter);
                }
            }
        }

        self.send_window += window as i32;
    }
}
