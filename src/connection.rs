use crate::{
    config::Config,
    frame::OutFrame,
    stream::Stream,
    types::{
        H2Error, StreamId, DEFAULT_FRAME_SIZE, DEFAULT_WINDOW, MAX_FRAME_SIZE,
    },
};
use log::{debug, trace};
use std::collections::{HashMap, VecDeque};
use std::io;

/// Byte sink standing in for the socket (or the TLS layer in front of it).
/// Short writes and `WouldBlock` model backpressure; queued frames resume
/// at the first unsent octet on the next drain.
pub trait Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// State shared by every stream multiplexed on one transport. Single
/// threaded by design: one event-loop thread owns the connection, its
/// streams and all of their buffers, so run-to-completion of each entry
/// point is the only mutual exclusion needed.
pub struct Connection {
    pub(crate) conf: Config,
    pub(crate) streams: HashMap<StreamId, Stream>,
    /// Connection-level send credit, consumed by every DATA payload octet.
    pub send_window: i32,
    frame_size: usize,
    init_window: i32,
    /// The next emitted header block must open with a "dynamic table size
    /// zero" instruction.
    pub table_update: bool,
    /// Streams blocked on the connection window, highest priority first.
    pub(crate) waiting: VecDeque<StreamId>,
    /// Outbound frames in write order.
    pub(crate) last_out: Vec<OutFrame>,
    /// Frame headers plus payload octets handed to the transport.
    pub total_bytes: u64,
    /// Payload octets of completed frames.
    pub payload_bytes: u64,
    /// Live outbound frame descriptors, capped by the flood guard.
    pub(crate) frames: u32,
    pub error: bool,
    pub(crate) posted: Vec<StreamId>,
}

impl Connection {
    #[must_use]
    pub fn new(conf: Config) -> Self {
        Self {
            conf,
            streams: HashMap::new(),
            send_window: DEFAULT_WINDOW,
            frame_size: DEFAULT_FRAME_SIZE,
            init_window: DEFAULT_WINDOW,
            table_update: false,
            waiting: VecDeque::new(),
            last_out: Vec::new(),
            total_bytes: 0,
            payload_bytes: 0,
            frames: 0,
            error: false,
            posted: Vec::new(),
        }
    }

    /// Registers a stream; its send window starts at the peer's current
    /// initial-window setting.
    pub fn add_stream(&mut self, id: StreamId) -> &mut Stream {
        self.streams
            .entry(id)
            .or_insert_with(|| Stream::new(id, self.init_window))
    }

    #[must_use]
    pub fn stream(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(&id)
    }

    pub fn stream_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(&id)
    }

    #[must_use]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Applies the peer's SETTINGS_MAX_FRAME_SIZE.
    pub fn set_frame_size(&mut self, size: usize) {
        self.frame_size = size.clamp(DEFAULT_FRAME_SIZE, MAX_FRAME_SIZE);
    }

    /// Applies the peer's SETTINGS_INITIAL_WINDOW_SIZE for future streams.
    pub fn set_initial_window(&mut self, window: i32) {
        self.init_window = window;
    }

    /// Frames waiting for the transport.
    #[must_use]
    pub fn queued_frames(&self) -> usize {
        self.last_out.len()
    }

    /// Streams whose write events were posted since the last call, in
    /// posting order. The event loop drains this and re-enters the filter.
    pub fn take_posted(&mut self) -> Vec<StreamId> {
        for sid in &self.posted {
            if let Some(stream) = self.streams.get_mut(sid) {
                stream.write.posted = false;
            }
        }
        std::mem::take(&mut self.posted)
    }

    pub(crate) fn post_write_event(&mut self, sid: StreamId) {
        let Some(stream) = self.streams.get_mut(&sid) else {
            return;
        };
        if !stream.write.posted {
            stream.write.posted = true;
            self.posted.push(sid);
        }
    }

    fn priority(&self, sid: StreamId) -> (u32, f64) {
        self.streams
            .get(&sid)
            .map_or((1, 0.0), |s| (s.rank, s.rel_weight))
    }

    /// Queues a frame for output. Within the unsent (non-blocked) tail of
    /// the queue the frame is placed by its stream's priority: ahead of
    /// strictly lower-priority frames, behind equal and higher ones, which
    /// keeps one stream's DATA in submission order.
    pub fn queue_frame(&mut self, frame: OutFrame) {
        let (rank, weight) = self.priority(frame.stream);

        let mut at = self.last_out.len();
        while at > 0 {
            let queued = &self.last_out[at - 1];
            if queued.blocked {
                break;
            }

            let (q_rank, q_weight) = self.priority(queued.stream);
            if q_rank < rank || (q_rank == rank && q_weight >= weight) {
                break;
            }

            at -= 1;
        }

        trace!(
            "http2:{} queue frame len:{} at:{at}",
            frame.stream,
            frame.length
        );
        self.last_out.insert(at, frame);
    }

    /// Queues a frame whose position must not float: it goes right after
    /// the last blocked frame, before any reorderable ones.
    pub fn queue_blocked_frame(&mut self, frame: OutFrame) {
        let mut at = self.last_out.len();
        while at > 0 && !self.last_out[at - 1].blocked {
            at -= 1;
        }

        trace!(
            "http2:{} queue blocked frame len:{} at:{at}",
            frame.stream,
            frame.length
        );
        self.last_out.insert(at, frame);
    }

    /// Drains queued frames to the transport, oldest first, then runs each
    /// fully attempted frame's post-send handler. A frame the transport
    /// only took part of stays queued, marked blocked, with its cursor on
    /// the first unsent link; everything behind it waits.
    pub fn send_output_queue<T: Transport>(&mut self, transport: &mut T) -> Result<(), H2Error> {
        if self.error {
            return Err(H2Error::ConnectionError);
        }

        let mut frames = std::mem::take(&mut self.last_out);

        let mut write_error = None;
        'frames: for frame in &mut frames {
            for cl in &frame.chain[frame.first..] {
                loop {
                    let mut b = cl.borrow_mut();
                    if b.pos == b.last {
                        break;
                    }

                    let want = b.last - b.pos;
                    match transport.write(&b.data[b.pos..b.last]) {
                        Ok(n) => {
                            b.pos += n;
                            if n < want {
                                break 'frames;
                            }
                        }
                        Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                            break 'frames;
                        }
                        Err(err) => {
                            write_error = Some(err);
                            break 'frames;
                        }
                    }
                }
            }
        }

        if let Some(err) = write_error {
            self.error = true;
            self.last_out = frames;
            return Err(H2Error::Transport(err));
        }

        let mut kept = Vec::new();
        let mut stopped = false;
        for frame in frames {
            if stopped {
                kept.push(frame);
                continue;
            }

            let sid = frame.stream;
            let length = frame.length;
            match self.run_handler(frame) {
                None => {
                    trace!("http2:{sid} frame sent len:{length}");
                }
                Some(mut frame) => {
                    frame.blocked = true;
                    stopped = true;
                    kept.push(frame);
                }
            }
        }

        self.last_out = kept;
        Ok(())
    }

    /// Connection-level WINDOW_UPDATE: every parked stream is woken, in
    /// queue (priority) order, and its write event posted.
    pub fn window_update(&mut self, increment: u32) {
        self.send_window += increment as i32;

        debug!("http2 connection window: {}", self.send_window);

        while let Some(sid) = self.waiting.pop_front() {
            let Some(stream) = self.streams.get_mut(&sid) else {
                continue;
            };

            stream.waiting = false;
            stream.write.active = false;
            stream.write.ready = true;

            if !stream.write.delayed {
                self.post_write_event(sid);
            }
        }
    }

    /// Stream-level WINDOW_UPDATE: credit the stream and, once the window
    /// turns positive again, lift the exhausted latch and post its write
    /// event.
    pub fn stream_window_update(&mut self, sid: StreamId, increment: u32) -> Result<(), H2Error> {
        let stream = self
            .streams
            .get_mut(&sid)
            .ok_or(H2Error::UnknownStream(sid))?;

        stream.send_window += increment as i32;

        debug!("http2:{sid} stream window: {}", stream.send_window);

        if stream.send_window > 0 && stream.exhausted {
            stream.exhausted = false;
            stream.write.active = false;
            stream.write.ready = true;

            if !stream.write.delayed {
                self.post_write_event(sid);
            }
        }

        Ok(())
    }
}
