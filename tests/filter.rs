use h2out::{
    link, Chain, Config, Connection, H2Error, HeaderEntry, Method, Request, SendStatus,
    ServerTokens, Transport,
};
use std::io;

/// Transport double: collects written bytes, optionally refusing anything
/// past a byte budget the way a congested socket would.
#[derive(Default)]
struct Sink {
    data: Vec<u8>,
    budget: Option<usize>,
}

impl Sink {
    fn blocked() -> Self {
        Self {
            data: Vec::new(),
            budget: Some(0),
        }
    }

    fn with_budget(budget: usize) -> Self {
        Self {
            data: Vec::new(),
            budget: Some(budget),
        }
    }
}

impl Transport for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let take = match self.budget {
            Some(0) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(budget) => buf.len().min(budget),
            None => buf.len(),
        };

        if let Some(budget) = &mut self.budget {
            *budget -= take;
        }

        self.data.extend_from_slice(&buf[..take]);
        Ok(take)
    }
}

#[derive(Debug)]
struct RawFrame {
    ty: u8,
    flags: u8,
    sid: u32,
    payload: Vec<u8>,
}

const DATA: u8 = 0x0;
const HEADERS: u8 = 0x1;
const CONTINUATION: u8 = 0x9;
const END_STREAM: u8 = 0x1;
const END_HEADERS: u8 = 0x4;

fn parse_frames(mut data: &[u8]) -> Vec<RawFrame> {
    let mut frames = Vec::new();
    while !data.is_empty() {
        assert!(data.len() >= 9, "truncated frame header");
        let len = usize::from(data[0]) << 16 | usize::from(data[1]) << 8 | usize::from(data[2]);
        let frame = RawFrame {
            ty: data[3],
            flags: data[4],
            sid: u32::from_be_bytes([data[5], data[6], data[7], data[8]]) & (u32::MAX >> 1),
            payload: data[9..9 + len].to_vec(),
        };
        data = &data[9 + len..];
        frames.push(frame);
    }
    frames
}

fn decode_block(payload: &[u8]) -> Vec<(String, String)> {
    let mut decoder = hpack::Decoder::new();
    decoder
        .decode(payload)
        .expect("well-formed header block")
        .into_iter()
        .map(|(k, v)| {
            (
                String::from_utf8(k).unwrap(),
                String::from_utf8(v).unwrap(),
            )
        })
        .collect()
}

fn field<'a>(list: &'a [(String, String)], name: &str) -> Option<&'a str> {
    list.iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn conn_with_stream(sid: u32) -> Connection {
    let mut conn = Connection::new(Config::default());
    conn.add_stream(sid);
    conn
}

fn body(data: &'static [u8]) -> Chain {
    vec![link(data, true)]
}

#[test]
fn small_response() {
    init();

    let mut conn = conn_with_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Get, 200);
    r.headers_out.content_type = Some("text/plain".to_owned());
    r.headers_out.content_length_n = 5;

    assert!(matches!(
        conn.header_filter(&mut sink, &mut r),
        Ok(SendStatus::Done)
    ));

    let rest = conn.send_chain(&mut sink, &mut r, body(b"hello"), 0).unwrap();
    assert!(rest.is_empty());

    let frames = parse_frames(&sink.data);
    assert_eq!(frames.len(), 2);

    assert_eq!(frames[0].ty, HEADERS);
    assert_eq!(frames[0].sid, 1);
    assert_eq!(frames[0].flags & END_HEADERS, END_HEADERS);
    assert_eq!(frames[0].flags & END_STREAM, 0);

    let list = decode_block(&frames[0].payload);
    assert_eq!(field(&list, ":status"), Some("200"));
    assert_eq!(field(&list, "content-type"), Some("text/plain"));
    assert_eq!(field(&list, "content-length"), Some("5"));
    assert!(field(&list, "server").unwrap().starts_with("h2out/"));
    assert!(field(&list, "date").unwrap().ends_with(" GMT"));

    assert_eq!(frames[1].ty, DATA);
    assert_eq!(frames[1].payload, b"hello");
    assert_eq!(frames[1].flags & END_STREAM, END_STREAM);

    let stream = conn.stream(1).unwrap();
    assert!(stream.out_closed);
    assert_eq!(stream.queued(), 0);
}

#[test]
fn head_response_closes_stream_in_headers() {
    init();

    let mut conn = conn_with_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Head, 200);
    r.headers_out.content_length_n = 100;

    conn.header_filter(&mut sink, &mut r).unwrap();

    let frames = parse_frames(&sink.data);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].ty, HEADERS);
    assert_eq!(frames[0].flags & END_STREAM, END_STREAM);
    assert_eq!(frames[0].flags & END_HEADERS, END_HEADERS);

    let list = decode_block(&frames[0].payload);
    assert_eq!(field(&list, "content-length"), Some("100"));

    assert!(conn.stream(1).unwrap().out_closed);
}

#[test]
fn body_is_sliced_to_frame_size() {
    init();

    let mut conn = Connection::new(Config {
        chunk_size: 16_384,
        ..Config::default()
    });
    conn.add_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Get, 200);
    r.headers_out.content_length_n = 40_000;

    conn.header_filter(&mut sink, &mut r).unwrap();

    let payload = vec![0xa5u8; 40_000];
    let rest = conn
        .send_chain(&mut sink, &mut r, vec![link(payload, true)], 0)
        .unwrap();
    assert!(rest.is_empty());

    let frames = parse_frames(&sink.data);
    let sizes: Vec<_> = frames
        .iter()
        .filter(|f| f.ty == DATA)
        .map(|f| (f.payload.len(), f.flags & END_STREAM != 0))
        .collect();
    assert_eq!(
        sizes,
        [(16_384, false), (16_384, false), (7_232, true)]
    );
}

#[test]
fn stream_window_blocks_and_resumes() {
    init();

    let mut conn = Connection::new(Config::default());
    conn.set_initial_window(10);
    conn.add_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Get, 200);
    r.headers_out.content_length_n = 25;

    conn.header_filter(&mut sink, &mut r).unwrap();

    let rest = conn
        .send_chain(&mut sink, &mut r, body(b"abcdefghijklmnopqrstuvwxy"), 0)
        .unwrap();

    let pending: usize = rest.iter().map(|b| b.borrow().size()).sum();
    assert_eq!(pending, 15);

    {
        let stream = conn.stream(1).unwrap();
        assert!(stream.exhausted);
        assert_eq!(stream.send_window, 0);
        assert!(!stream.out_closed);
    }

    conn.stream_window_update(1, 15).unwrap();
    assert_eq!(conn.take_posted(), [1]);
    assert!(!conn.stream(1).unwrap().exhausted);

    let rest = conn.send_chain(&mut sink, &mut r, rest, 0).unwrap();
    assert!(rest.is_empty());

    let frames = parse_frames(&sink.data);
    let data: Vec<_> = frames.iter().filter(|f| f.ty == DATA).collect();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0].payload, b"abcdefghij");
    assert_eq!(data[0].flags & END_STREAM, 0);
    assert_eq!(data[1].payload, b"klmnopqrstuvwxy");
    assert_eq!(data[1].flags & END_STREAM, END_STREAM);
    assert!(conn.stream(1).unwrap().out_closed);
}

#[test]
fn connection_window_contention_respects_weight() {
    init();

    let mut conn = Connection::new(Config::default());
    {
        let a = conn.add_stream(1);
        a.rank = 1;
        a.rel_weight = 256.0 / 256.0;
    }
    {
        let b = conn.add_stream(3);
        b.rank = 1;
        b.rel_weight = 128.0 / 256.0;
    }
    conn.send_window = 60;

    let mut sink = Sink::default();

    let mut ra = Request::new(1, Method::Get, 200);
    ra.headers_out.content_length_n = 100;
    let mut rb = Request::new(3, Method::Get, 200);
    rb.headers_out.content_length_n = 100;

    conn.header_filter(&mut sink, &mut ra).unwrap();
    conn.header_filter(&mut sink, &mut rb).unwrap();

    let body_a = vec![link(vec![0xaau8; 100], true)];
    let body_b = vec![link(vec![0xbbu8; 100], true)];

    let rest_a = conn.send_chain(&mut sink, &mut ra, body_a, 0).unwrap();
    assert_eq!(
        rest_a.iter().map(|b| b.borrow().size()).sum::<usize>(),
        40
    );
    assert_eq!(conn.send_window, 0);

    let rest_b = conn.send_chain(&mut sink, &mut rb, body_b, 0).unwrap();
    assert_eq!(
        rest_b.iter().map(|b| b.borrow().size()).sum::<usize>(),
        100
    );

    // the heavier stream was parked first and wakes first
    conn.window_update(60);
    assert_eq!(conn.take_posted(), [1, 3]);

    let rest_a = conn.send_chain(&mut sink, &mut ra, rest_a, 0).unwrap();
    assert!(rest_a.is_empty());
    assert_eq!(conn.send_window, 20);

    let rest_b = conn.send_chain(&mut sink, &mut rb, rest_b, 0).unwrap();
    assert_eq!(
        rest_b.iter().map(|b| b.borrow().size()).sum::<usize>(),
        80
    );

    conn.window_update(80);
    let rest_b = conn.send_chain(&mut sink, &mut rb, rest_b, 0).unwrap();
    assert!(rest_b.is_empty());

    let frames = parse_frames(&sink.data);
    let data: Vec<_> = frames
        .iter()
        .filter(|f| f.ty == DATA)
        .map(|f| (f.sid, f.payload.len()))
        .collect();
    assert_eq!(data, [(1, 60), (1, 40), (3, 20), (3, 80)]);
}

#[test]
fn trailers_follow_the_final_data_frame() {
    init();

    let mut conn = conn_with_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Get, 200);
    r.expect_trailers = true;
    r.headers_out.content_length_n = 1;
    r.headers_out.trailers.push(HeaderEntry::new("x-trace", "t"));

    conn.header_filter(&mut sink, &mut r).unwrap();
    let rest = conn.send_chain(&mut sink, &mut r, body(b"x"), 0).unwrap();
    assert!(rest.is_empty());

    let frames = parse_frames(&sink.data);
    assert_eq!(frames.len(), 3);

    assert_eq!(frames[0].ty, HEADERS);
    assert_eq!(frames[0].flags, END_HEADERS);

    assert_eq!(frames[1].ty, DATA);
    assert_eq!(frames[1].payload, b"x");
    assert_eq!(frames[1].flags & END_STREAM, 0);

    assert_eq!(frames[2].ty, HEADERS);
    assert_eq!(frames[2].flags, END_HEADERS | END_STREAM);
    assert_eq!(
        decode_block(&frames[2].payload),
        [("x-trace".to_owned(), "t".to_owned())]
    );

    assert!(conn.stream(1).unwrap().out_closed);
}

#[test]
fn tombstoned_trailers_keep_end_stream_on_data() {
    init();

    let mut conn = conn_with_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Get, 200);
    r.expect_trailers = true;
    r.headers_out.content_length_n = 1;
    let mut dead = HeaderEntry::new("x-trace", "t");
    dead.hash = 0;
    r.headers_out.trailers.push(dead);

    conn.header_filter(&mut sink, &mut r).unwrap();
    conn.send_chain(&mut sink, &mut r, body(b"x"), 0).unwrap();

    let frames = parse_frames(&sink.data);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1].ty, DATA);
    assert_eq!(frames[1].flags & END_STREAM, END_STREAM);
}

#[test]
fn cleanup_returns_reserved_window_and_wakes_waiters() {
    init();

    let mut conn = Connection::new(Config::default());
    conn.add_stream(1);
    conn.add_stream(3);
    conn.send_window = 16_384;

    let mut blocked = Sink::blocked();

    let mut ra = Request::new(1, Method::Get, 200);
    ra.headers_out.content_length_n = 16_384;
    conn.header_filter(&mut blocked, &mut ra).unwrap();

    let rest = conn
        .send_chain(&mut blocked, &mut ra, vec![link(vec![0u8; 16_384], true)], 0)
        .unwrap();
    assert!(rest.is_empty());
    assert_eq!(conn.send_window, 0);

    // stream 3 now finds the connection window empty and parks
    let mut rb = Request::new(3, Method::Get, 200);
    rb.headers_out.content_length_n = 10;
    conn.header_filter(&mut blocked, &mut rb).unwrap();
    let rest_b = conn
        .send_chain(&mut blocked, &mut rb, body(b"0123456789"), 0)
        .unwrap();
    assert_eq!(rest_b.len(), 1);

    conn.take_posted();

    let queued_before = conn.queued_frames();
    conn.cleanup_stream(1);

    // both DATA frames are gone, their credit is back, the waiter was posted
    assert_eq!(conn.queued_frames(), queued_before - 2);
    assert_eq!(conn.send_window, 16_384);
    assert_eq!(conn.stream(1).unwrap().queued(), 1); // blocked HEADERS stays
    assert_eq!(conn.take_posted(), [3]);
}

#[test]
fn partial_write_resumes_at_unsent_octet() {
    init();

    let mut conn = conn_with_stream(1);

    let mut sink = Sink::with_budget(12);

    let mut r = Request::new(1, Method::Head, 200);
    conn.header_filter(&mut sink, &mut r).unwrap();

    assert_eq!(conn.queued_frames(), 1);
    assert_eq!(conn.stream(1).unwrap().queued(), 1);
    let written = sink.data.len();
    assert_eq!(written, 12);

    sink.budget = None;
    conn.send_output_queue(&mut sink).unwrap();

    assert_eq!(conn.queued_frames(), 0);
    assert_eq!(conn.stream(1).unwrap().queued(), 0);

    let frames = parse_frames(&sink.data);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].ty, HEADERS);
    assert_eq!(field(&decode_block(&frames[0].payload), ":status"), Some("200"));
}

#[test]
fn transport_failure_marks_the_connection() {
    init();

    struct Broken;
    impl Transport for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
    }

    let mut conn = conn_with_stream(1);
    let mut r = Request::new(1, Method::Head, 200);

    assert!(matches!(
        conn.header_filter(&mut Broken, &mut r),
        Err(H2Error::Transport(_))
    ));
    assert!(conn.error);
    assert!(conn.stream(1).unwrap().error);

    assert!(matches!(
        conn.send_output_queue(&mut Sink::default()),
        Err(H2Error::ConnectionError)
    ));
}

#[test]
fn frame_flood_aborts_the_connection() {
    init();

    let mut conn = conn_with_stream(1);
    let mut blocked = Sink::blocked();

    let mut r = Request::new(1, Method::Get, 200);
    conn.header_filter(&mut blocked, &mut r).unwrap();

    let mut result = Ok(Vec::new());
    for _ in 0..10_001 {
        result = conn.send_chain(&mut blocked, &mut r, vec![link(&b"a"[..], false)], 0);
        if result.is_err() {
            break;
        }
    }

    assert!(matches!(result, Err(H2Error::Flood)));
    assert!(conn.error);
}

#[test]
fn long_header_block_spills_into_continuation() {
    init();

    let mut conn = conn_with_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Head, 200);
    // large enough that even the Huffman form exceeds one frame
    let huge: String = (0..40_000)
        .map(|i| char::from(b'0' + (i * 7 % 75) as u8))
        .collect();
    r.headers_out
        .headers
        .push(HeaderEntry::new("x-filler", huge.clone()));

    conn.header_filter(&mut sink, &mut r).unwrap();

    let frames = parse_frames(&sink.data);
    assert!(frames.len() >= 2, "expected CONTINUATION frames");

    let total: usize = frames.iter().map(|f| f.payload.len()).sum();
    assert_eq!(frames[0].ty, HEADERS);
    assert_eq!(frames[0].flags & END_HEADERS, 0);
    assert_eq!(frames[0].payload.len(), conn.frame_size());

    for f in &frames[1..frames.len() - 1] {
        assert_eq!(f.ty, CONTINUATION);
        assert_eq!(f.flags, 0);
        assert_eq!(f.payload.len(), conn.frame_size());
    }

    let last = frames.last().unwrap();
    assert_eq!(last.ty, CONTINUATION);
    assert_eq!(last.flags, END_HEADERS);
    let tail = match total % conn.frame_size() {
        0 => conn.frame_size(),
        rem => rem,
    };
    assert_eq!(last.payload.len(), tail);

    let block: Vec<u8> = frames.iter().flat_map(|f| f.payload.clone()).collect();
    let list = decode_block(&block);
    assert_eq!(field(&list, "x-filler"), Some(huge.as_str()));
}

#[test]
fn early_hints_precede_the_response() {
    init();

    let mut conn = conn_with_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Get, 200);
    r.headers_out
        .headers
        .push(HeaderEntry::new("link", "</style.css>; rel=preload; as=style"));

    conn.early_hints_filter(&mut sink, &mut r).unwrap();

    // the hint list is consumed before the final response is produced
    r.headers_out.headers.clear();
    r.headers_out.content_length_n = 0;
    conn.header_filter(&mut sink, &mut r).unwrap();

    let frames = parse_frames(&sink.data);
    assert_eq!(frames.len(), 2);

    assert_eq!(frames[0].ty, HEADERS);
    assert_eq!(frames[0].flags, END_HEADERS);
    let hints = decode_block(&frames[0].payload);
    assert_eq!(field(&hints, ":status"), Some("103"));
    assert_eq!(
        field(&hints, "link"),
        Some("</style.css>; rel=preload; as=style")
    );

    assert_eq!(frames[1].flags, END_HEADERS | END_STREAM);
    assert_eq!(
        field(&decode_block(&frames[1].payload), ":status"),
        Some("200")
    );
}

#[test]
fn early_hints_without_headers_emit_nothing() {
    init();

    let mut conn = conn_with_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Get, 200);
    conn.early_hints_filter(&mut sink, &mut r).unwrap();

    assert!(sink.data.is_empty());
    assert_eq!(conn.queued_frames(), 0);
}

#[test]
fn status_204_drops_entity_headers() {
    init();

    let mut conn = conn_with_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Get, 204);
    r.headers_out.content_type = Some("text/plain".to_owned());
    r.headers_out.content_length_n = 5;
    r.headers_out.last_modified_time = 784_111_777;

    conn.header_filter(&mut sink, &mut r).unwrap();

    let frames = parse_frames(&sink.data);
    assert_eq!(frames[0].flags & END_STREAM, END_STREAM);

    let list = decode_block(&frames[0].payload);
    assert_eq!(field(&list, ":status"), Some("204"));
    assert_eq!(field(&list, "content-type"), None);
    assert_eq!(field(&list, "content-length"), None);
    assert_eq!(field(&list, "last-modified"), None);
}

#[test]
fn non_cacheable_status_drops_last_modified() {
    init();

    let mut conn = conn_with_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Head, 403);
    r.headers_out.last_modified_time = 784_111_777;

    conn.header_filter(&mut sink, &mut r).unwrap();

    let list = decode_block(&parse_frames(&sink.data)[0].payload);
    assert_eq!(field(&list, ":status"), Some("403"));
    assert_eq!(field(&list, "last-modified"), None);
}

#[test]
fn status_304_keeps_last_modified() {
    init();

    let mut conn = conn_with_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Get, 304);
    r.headers_out.last_modified_time = 784_111_777;

    conn.header_filter(&mut sink, &mut r).unwrap();

    let frames = parse_frames(&sink.data);
    assert_eq!(frames[0].flags & END_STREAM, END_STREAM);

    let list = decode_block(&frames[0].payload);
    assert_eq!(field(&list, ":status"), Some("304"));
    assert_eq!(
        field(&list, "last-modified"),
        Some("Sun, 06 Nov 1994 08:49:37 GMT")
    );
}

#[test]
fn header_names_are_lowercased_on_the_wire() {
    init();

    let mut conn = conn_with_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Head, 200);
    r.headers_out
        .headers
        .push(HeaderEntry::new("X-Custom-Header", "Value"));

    conn.header_filter(&mut sink, &mut r).unwrap();

    let list = decode_block(&parse_frames(&sink.data)[0].payload);
    assert_eq!(field(&list, "x-custom-header"), Some("Value"));
}

#[test]
fn tombstoned_headers_are_skipped() {
    init();

    let mut conn = conn_with_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Head, 200);
    let mut dead = HeaderEntry::new("x-removed", "by-a-filter");
    dead.hash = 0;
    r.headers_out.headers.push(dead);
    r.headers_out.headers.push(HeaderEntry::new("x-kept", "yes"));

    conn.header_filter(&mut sink, &mut r).unwrap();

    let list = decode_block(&parse_frames(&sink.data)[0].payload);
    assert_eq!(field(&list, "x-removed"), None);
    assert_eq!(field(&list, "x-kept"), Some("yes"));
}

#[test]
fn oversized_header_is_rejected() {
    init();

    let mut conn = conn_with_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Head, 200);
    r.headers_out
        .headers
        .push(HeaderEntry::new("x-big", "v".repeat(h2out::MAX_FIELD + 1)));

    assert!(matches!(
        conn.header_filter(&mut sink, &mut r),
        Err(H2Error::FieldTooLong(..))
    ));
    assert!(sink.data.is_empty());
}

#[test]
fn location_is_rewritten_to_absolute_url() {
    init();

    let mut conn = conn_with_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Get, 301);
    r.host = Some("example.com".to_owned());
    r.local_addr = Some("192.0.2.1:8080".parse().unwrap());
    r.headers_out.location = Some("/moved/here".to_owned());
    r.headers_out.content_length_n = 0;

    conn.header_filter(&mut sink, &mut r).unwrap();

    let list = decode_block(&parse_frames(&sink.data)[0].payload);
    assert_eq!(
        field(&list, "location"),
        Some("http://example.com:8080/moved/here")
    );
}

#[test]
fn default_port_is_omitted_from_redirects() {
    init();

    let mut conn = conn_with_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Get, 302);
    r.ssl = true;
    r.host = Some("example.com".to_owned());
    r.local_addr = Some("192.0.2.1:443".parse().unwrap());
    r.headers_out.location = Some("/next".to_owned());
    r.headers_out.content_length_n = 0;

    conn.header_filter(&mut sink, &mut r).unwrap();

    let list = decode_block(&parse_frames(&sink.data)[0].payload);
    assert_eq!(field(&list, "location"), Some("https://example.com/next"));
}

#[test]
fn absolute_locations_pass_through() {
    init();

    let mut conn = conn_with_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Get, 301);
    r.headers_out.location = Some("https://other.example/".to_owned());
    r.headers_out.content_length_n = 0;

    conn.header_filter(&mut sink, &mut r).unwrap();

    let list = decode_block(&parse_frames(&sink.data)[0].payload);
    assert_eq!(field(&list, "location"), Some("https://other.example/"));
}

#[test]
fn gzip_vary_emits_accept_encoding() {
    init();

    let mut conn = Connection::new(Config {
        gzip_vary: true,
        ..Config::default()
    });
    conn.add_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Head, 200);
    r.gzip_vary = true;

    conn.header_filter(&mut sink, &mut r).unwrap();

    let list = decode_block(&parse_frames(&sink.data)[0].payload);
    assert_eq!(field(&list, "vary"), Some("Accept-Encoding"));
}

#[test]
fn server_tokens_modes() {
    init();

    for (tokens, expect) in [
        (ServerTokens::On, h2out::SERVER),
        (ServerTokens::Build, h2out::SERVER_BUILD),
        (ServerTokens::Off, h2out::SERVER_SHORT),
    ] {
        let mut conn = Connection::new(Config {
            server_tokens: tokens,
            ..Config::default()
        });
        conn.add_stream(1);
        let mut sink = Sink::default();

        let mut r = Request::new(1, Method::Head, 200);
        conn.header_filter(&mut sink, &mut r).unwrap();

        let list = decode_block(&parse_frames(&sink.data)[0].payload);
        assert_eq!(field(&list, "server"), Some(expect));
    }
}

#[test]
fn table_update_prefixes_the_next_block_once() {
    init();

    let mut conn = conn_with_stream(1);
    conn.table_update = true;
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Head, 200);
    conn.header_filter(&mut sink, &mut r).unwrap();

    let frames = parse_frames(&sink.data);
    // "dynamic table size update to 0" opcode leads the block
    assert_eq!(frames[0].payload[0], 0x20);
    assert!(!conn.table_update);

    let list = decode_block(&frames[0].payload);
    assert_eq!(field(&list, ":status"), Some("200"));
}

#[test]
fn empty_body_finalization_sends_bare_end_stream() {
    init();

    let mut conn = conn_with_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Get, 200);
    // length unknown up front, so HEADERS cannot carry END_STREAM
    conn.header_filter(&mut sink, &mut r).unwrap();

    let rest = conn.send_chain(&mut sink, &mut r, vec![link(&b""[..], true)], 0).unwrap();
    assert!(rest.is_empty());

    let frames = parse_frames(&sink.data);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].flags & END_STREAM, 0);
    assert_eq!(frames[1].ty, DATA);
    assert!(frames[1].payload.is_empty());
    assert_eq!(frames[1].flags & END_STREAM, END_STREAM);
    assert!(conn.stream(1).unwrap().out_closed);
}

#[test]
fn window_accounting_is_exact() {
    init();

    let mut conn = conn_with_stream(1);
    let mut sink = Sink::default();

    let mut r = Request::new(1, Method::Get, 200);
    r.headers_out.content_length_n = 1000;

    conn.header_filter(&mut sink, &mut r).unwrap();

    let conn_before = conn.send_window;
    let stream_before = conn.stream(1).unwrap().send_window;

    conn.send_chain(&mut sink, &mut r, vec![link(vec![7u8; 1000], true)], 0)
        .unwrap();

    assert_eq!(conn.send_window, conn_before - 1000);
    assert_eq!(conn.stream(1).unwrap().send_window, stream_before - 1000);
    assert!(conn.send_window >= 0);
}
