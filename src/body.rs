use crate::{
    buf::{link_from, Buf, BufRef, BufTag, Chain},
    connection::{Connection, Transport},
    request::Request,
    types::{H2Error, SendStatus, StreamId},
};
use log::{debug, error, trace};

impl Connection {
    /// Pushes body bytes for one stream. Walks the input chain, carves it
    /// into DATA frames bounded by the flow-control windows, the configured
    /// chunk size and the peer's frame size, queues them (plus a trailers
    /// frame after the final DATA when the response expects one) and
    /// attempts a flush.
    ///
    /// Returns the unconsumed tail of the chain, empty when everything was
    /// queued. `limit` of zero means unlimited. Payload bytes are never
    /// copied: whole input buffers are linked directly and partial ones go
    /// through shadow views that advance the origin's cursor on release.
    pub fn send_chain<T: Transport>(
        &mut self,
        transport: &mut T,
        r: &mut Request,
        mut input: Chain,
        limit: u64,
    ) -> Result<Chain, H2Error> {
        let sid = r.stream;

        debug!("http2:{sid} send chain, {} links", input.len());

        let out_closed = self
            .streams
            .get(&sid)
            .ok_or(H2Error::UnknownStream(sid))?
            .out_closed;

        // leading zero-size buffers carry nothing; skip to the first one
        // with bytes or the terminal marker
        let mut at = 0;
        let mut size = 0usize;
        while at < input.len() {
            let b = input[at].borrow();
            size = b.size();
            if size > 0 || b.last_buf {
                break;
            }
            drop(b);
            at += 1;
        }

        if at == input.len() || out_closed {
            if out_closed && at < input.len() && size > 0 {
                error!("http2:{sid} output on closed stream");
                return Err(H2Error::ClosedStream);
            }

            self.filter_send(transport, sid)?;
            return Ok(Chain::new());
        }

        if size > 0 && !self.flow_control(sid) {
            self.filter_send(transport, sid)?;

            if !self.flow_control(sid) {
                if let Some(stream) = self.streams.get_mut(&sid) {
                    stream.write.active = true;
                    stream.write.ready = false;
                }
                return Ok(input.split_off(at));
            }
        }

        // a leading shadow is leftover from an earlier call: recover the
        // origin buffer and how far into it that call got
        let mut offset = 0usize;
        if input[at].borrow().tag == BufTag::Shadow {
            let spent = input[at].clone();
            let origin = {
                let b = spent.borrow();
                // unwrap: shadows always point at their origin
                let origin = b.shadow.clone().unwrap();
                offset = b.pos - origin.borrow().pos;
                origin
            };
            input[at] = origin;
            if let Some(stream) = self.streams.get_mut(&sid) {
                stream.free_bufs.push(spent);
            }
        }

        let conn_window = self.send_window.max(0) as u64;
        let mut limit = if limit == 0 || limit > conn_window {
            conn_window
        } else {
            limit
        };

        let stream_window = self.streams[&sid].send_window.max(0) as u64;
        if limit > stream_window {
            limit = stream_window;
        }

        let mut frame_size = self.conf.chunk_size.min(self.frame_size());

        let mut trailers: Option<crate::frame::OutFrame> = None;

        loop {
            if frame_size as u64 > limit {
                frame_size = limit as usize;
            }

            let mut out = Chain::new();
            let mut rest = frame_size;

            // whole buffers are linked as-is; the loop ends when the next
            // buffer no longer fits the frame or the chain runs out
            while rest >= size {
                let cl = if offset != 0 {
                    let cl = self.get_shadow(sid, &input[at], offset, size);
                    offset = 0;
                    cl
                } else {
                    input[at].clone()
                };

                out.push(cl);
                rest -= size;
                at += 1;

                if at == input.len() {
                    frame_size -= rest;
                    rest = 0;
                    break;
                }

                size = input[at].borrow().size();
            }

            if rest > 0 {
                let cl = self.get_shadow(sid, &input[at], offset, rest);
                {
                    let mut b = cl.borrow_mut();
                    b.flush = false;
                    b.last_buf = false;
                }
                out.push(cl);

                offset += rest;
                size -= rest;
            }

            // unwrap: the carving above always pushes at least one link
            let tail = out.last().unwrap().clone();

            if tail.borrow().last_buf {
                if let Some(frame) = self.create_trailers_frame(r)? {
                    tail.borrow_mut().last_buf = false;
                    trailers = Some(frame);
                }
            }

            if frame_size > 0 || tail.borrow().last_buf {
                let frame = self.get_data_frame(sid, frame_size, out)?;
                self.queue_frame(frame);

                self.send_window -= frame_size as i32;

                let stream = self.streams.get_mut(&sid).expect("stream exists");
                stream.send_window -= frame_size as i32;
                stream.queued += 1;
            }

            if at == input.len() {
                if let Some(frame) = trailers.take() {
                    self.queue_frame(frame);
                    if let Some(stream) = self.streams.get_mut(&sid) {
                        stream.queued += 1;
                    }
                }
                break;
            }

            limit -= frame_size as u64;
            if limit == 0 {
                break;
            }
        }

        // re-shadow a partially carved buffer so the caller's view starts
        // exactly at the first unqueued byte
        if offset > 0 {
            let cl = self.get_shadow(sid, &input[at], offset, size);
            input[at] = cl;
        }

        self.filter_send(transport, sid)?;

        let remaining = input.split_off(at);

        if !remaining.is_empty() && !self.flow_control(sid) {
            if let Some(stream) = self.streams.get_mut(&sid) {
                stream.write.active = true;
                stream.write.ready = false;
            }
        }

        Ok(remaining)
    }

    /// Structural clone of `buf` narrowed to `offset..offset + size` of its
    /// unread range, back-pointing at `buf` so the cursor can be
    /// propagated on release. Drawn from the stream's scratch list when
    /// one is free.
    fn get_shadow(&mut self, sid: StreamId, buf: &BufRef, offset: usize, size: usize) -> BufRef {
        let cl = self
            .streams
            .get_mut(&sid)
            .and_then(|stream| stream.free_bufs.pop())
            .unwrap_or_else(|| link_from(Buf::new(bytes::Bytes::new())));

        {
            let src = buf.borrow();
            let mut b = cl.borrow_mut();
            b.data = src.data.clone();
            b.pos = src.pos + offset;
            b.last = src.pos + offset + size;
            b.last_buf = src.last_buf;
            b.flush = src.flush;
            b.tag = BufTag::Shadow;
            b.shadow = Some(buf.clone());
        }

        cl
    }

    /// One flow-control decision: false parks or latches the stream
    /// (stream window empty sets `exhausted`; connection window empty puts
    /// it in the waiting queue), true clears it to send.
    pub(crate) fn flow_control(&mut self, sid: StreamId) -> bool {
        let Some(stream) = self.streams.get_mut(&sid) else {
            return false;
        };

        trace!(
            "http2:{sid} windows: conn:{} stream:{}",
            self.send_window,
            stream.send_window
        );

        if stream.send_window <= 0 {
            stream.exhausted = true;
            return false;
        }

        if self.send_window == 0 {
            self.waiting_queue(sid);
            return false;
        }

        true
    }

    /// Parks the stream in the connection's waiting queue, scanning from
    /// the tail: it lands behind every stream of lower rank, and behind
    /// equal-rank streams of equal or greater weight.
    fn waiting_queue(&mut self, sid: StreamId) {
        let (already, rank, weight) = {
            let Some(stream) = self.streams.get_mut(&sid) else {
                return;
            };
            let already = stream.waiting;
            stream.waiting = true;
            (already, stream.rank, stream.rel_weight)
        };

        if already {
            return;
        }

        let mut at = self.waiting.len();
        while at > 0 {
            let queued = &self.streams[&self.waiting[at - 1]];
            if queued.rank < rank || (queued.rank == rank && queued.rel_weight >= weight) {
                break;
            }
            at -= 1;
        }

        trace!("http2:{sid} waiting at {at}");
        self.waiting.insert(at, sid);
    }

    /// Flushes whatever is queued. `Again` leaves the stream buffered with
    /// its write event armed; re-entry resumes exactly where the transport
    /// stopped.
    pub(crate) fn filter_send<T: Transport>(
        &mut self,
        transport: &mut T,
        sid: StreamId,
    ) -> Result<SendStatus, H2Error> {
        {
            let Some(stream) = self.streams.get_mut(&sid) else {
                return Err(H2Error::UnknownStream(sid));
            };

            if stream.queued == 0 {
                stream.buffered = false;
                return Ok(SendStatus::Done);
            }

            stream.blocked = true;
        }

        if let Err(err) = self.send_output_queue(transport) {
            if let Some(stream) = self.streams.get_mut(&sid) {
                stream.blocked = false;
                stream.error = true;
            }
            return Err(err);
        }

        let Some(stream) = self.streams.get_mut(&sid) else {
            return Err(H2Error::UnknownStream(sid));
        };
        stream.blocked = false;

        if stream.queued > 0 {
            stream.buffered = true;
            stream.write.active = true;
            stream.write.ready = false;
            return Ok(SendStatus::Again);
        }

        stream.buffered = false;

        Ok(SendStatus::Done)
    }
}
