use crate::types::StreamId;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Method {
    #[display(fmt = "GET")]
    Get,
    #[display(fmt = "HEAD")]
    Head,
    #[display(fmt = "POST")]
    Post,
    #[display(fmt = "PUT")]
    Put,
    #[display(fmt = "DELETE")]
    Delete,
    #[display(fmt = "OPTIONS")]
    Options,
}

/// One entry of the additional response header (or trailer) list. Entries
/// with `hash == 0` are tombstones left behind by earlier filters and are
/// skipped on output.
#[derive(Debug, Clone)]
pub struct HeaderEntry {
    pub key: String,
    pub value: String,
    pub hash: u32,
}

impl HeaderEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            hash: 1,
        }
    }
}

/// The response head handed down by the HTTP core. Well-known headers live
/// in dedicated slots; anything else goes through `headers`.
#[derive(Debug, Default)]
pub struct HeadersOut {
    pub status: u16,
    pub content_type: Option<String>,
    /// Appended as `; charset=` when the content type carries no
    /// parameters of its own.
    pub charset: Option<String>,
    /// Negative means unknown.
    pub content_length_n: i64,
    /// Unix seconds; negative means unset.
    pub last_modified_time: i64,
    pub location: Option<String>,
    /// Upstream-supplied `server` value; `None` emits the configured
    /// server token.
    pub server: Option<String>,
    /// Upstream-supplied `date` value; `None` emits the current time.
    pub date: Option<String>,
    pub headers: Vec<HeaderEntry>,
    pub trailers: Vec<HeaderEntry>,
}

impl HeadersOut {
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            content_length_n: -1,
            last_modified_time: -1,
            ..Self::default()
        }
    }
}

/// Per-request view the filter consumes: the method and response head plus
/// the connection facts needed for redirect rewriting.
#[derive(Debug)]
pub struct Request {
    pub stream: StreamId,
    pub method: Method,
    pub header_only: bool,
    pub(crate) header_sent: bool,
    pub expect_trailers: bool,
    /// Set by the compression filter when the response varies on
    /// `accept-encoding`.
    pub gzip_vary: bool,
    pub ssl: bool,
    /// The request's `host` header, if any.
    pub host: Option<String>,
    pub local_addr: Option<SocketAddr>,
    pub headers_out: HeadersOut,
}

impl Request {
    #[must_use]
    pub fn new(stream: StreamId, method: Method, status: u16) -> Self {
        Self {
            stream,
            method,
            header_only: false,
            header_sent: false,
            expect_trailers: false,
            gzip_vary: false,
            ssl: false,
            host: None,
            local_addr: None,
            headers_out: HeadersOut::new(status),
        }
    }
}

const WEEK: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Formats Unix seconds as an IMF-fixdate (`Wed, 31 Dec 1986 18:00:00 GMT`),
/// the only date shape HTTP emits.
#[must_use]
pub fn http_time(secs: i64) -> String {
    let days = secs.div_euclid(86_400);
    let rem = secs.rem_euclid(86_400);

    let wday = (days + 4).rem_euclid(7) as usize;

    // civil-from-days, Gregorian
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    format!(
        "{}, {:02} {} {} {:02}:{:02}:{:02} GMT",
        WEEK[wday],
        day,
        MONTHS[month as usize - 1],
        year,
        rem / 3600,
        rem % 3600 / 60,
        rem % 60,
    )
}

/// Current time as an IMF-fixdate, for responses without an upstream date.
#[must_use]
pub fn http_time_now() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64);
    http_time(secs)
}
