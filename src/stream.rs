use crate::{
    buf::BufRef,
    frame::OutFrame,
    types::StreamId,
};

/// Write-readiness state of a stream's fake connection. The event loop owns
/// the real edge triggering; the filter only flips these and appends the
/// stream to the connection's posted list.
#[derive(Debug, Default, Clone, Copy)]
pub struct WriteEvent {
    pub active: bool,
    pub ready: bool,
    /// Rate-limit delay imposed by the core; a delayed event is made ready
    /// but not posted.
    pub delayed: bool,
    pub(crate) posted: bool,
}

/// Per-stream send state. Streams are owned by the [`Connection`] they run
/// on and addressed by id everywhere else.
///
/// [`Connection`]: crate::Connection
#[derive(Debug)]
pub struct Stream {
    pub id: StreamId,
    /// Remaining stream-level send credit; goes negative only when the peer
    /// shrinks SETTINGS_INITIAL_WINDOW_SIZE mid-stream.
    pub send_window: i32,
    /// Depth in the dependency tree; lower is closer to the root.
    pub rank: u32,
    /// Normalized weight within the tree, higher first among equal ranks.
    pub rel_weight: f64,
    /// Frames of this stream currently owned by the outbound queue.
    pub(crate) queued: usize,
    pub(crate) initialized: bool,
    /// The END_STREAM frame has been fully written.
    pub out_closed: bool,
    /// Parked in the connection's waiting queue.
    pub(crate) waiting: bool,
    /// Inside a synchronous flush attempt; suppresses write-event posting.
    pub(crate) blocked: bool,
    /// Latched when the stream window hit zero; cleared by a stream-level
    /// WINDOW_UPDATE.
    pub exhausted: bool,
    /// The downstream connection failed this stream.
    pub error: bool,
    pub(crate) buffered: bool,
    /// Frame descriptors ever allocated for this stream.
    pub(crate) frames: u32,
    pub(crate) free_frames: Vec<OutFrame>,
    pub(crate) free_frame_headers: Vec<BufRef>,
    pub(crate) free_bufs: Vec<BufRef>,
    pub write: WriteEvent,
}

impl Stream {
    #[must_use]
    pub(crate) fn new(id: StreamId, send_window: i32) -> Self {
        Self {
            id,
            send_window,
            rank: 1,
            rel_weight: 16.0 / 256.0,
            queued: 0,
            initialized: false,
            out_closed: false,
            waiting: false,
            blocked: false,
            exhausted: false,
            error: false,
            buffered: false,
            frames: 0,
            free_frames: Vec::new(),
            free_frame_headers: Vec::new(),
            free_bufs: Vec::new(),
            write: WriteEvent::default(),
        }
    }

    /// Frames of this stream still sitting in the outbound queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queued
    }
}
