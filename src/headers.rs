use crate::{
    config::ServerTokens,
    connection::{Connection, Transport},
    frame::OutFrame,
    hpack::{
        self, inc_indexed, indexed, literal_size, CONTENT_LENGTH_INDEX, CONTENT_TYPE_INDEX,
        DATE_INDEX, LAST_MODIFIED_INDEX, LOCATION_INDEX, SERVER_INDEX, STATUS_200_INDEX,
        STATUS_204_INDEX, STATUS_206_INDEX, STATUS_304_INDEX, STATUS_400_INDEX, STATUS_404_INDEX,
        STATUS_500_INDEX, STATUS_INDEX, ENCODE_RAW,
    },
    request::{http_time, http_time_now, Method, Request},
    types::{H2Error, SendStatus, StreamId, INT_OCTETS, MAX_FIELD},
};
use bytes::Bytes;
use log::{debug, error};
use std::net::IpAddr;
use std::sync::OnceLock;

/// Server identity for the three `server_tokens` modes.
pub const SERVER: &str = concat!("h2out/", env!("CARGO_PKG_VERSION"));
pub const SERVER_BUILD: &str = concat!("h2out/", env!("CARGO_PKG_VERSION"), " (dev)");
pub const SERVER_SHORT: &str = "h2out";

/// The three encodings of the `server` value never change, so each is
/// rendered once per process on first use.
fn server_token_value(tokens: ServerTokens) -> &'static [u8] {
    static FULL: OnceLock<Vec<u8>> = OnceLock::new();
    static BUILD: OnceLock<Vec<u8>> = OnceLock::new();
    static SHORT: OnceLock<Vec<u8>> = OnceLock::new();

    fn render(value: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(literal_size(value.len()));
        let mut tmp = vec![0; value.len()];
        hpack::write_value(&mut out, value.as_bytes(), &mut tmp);
        out
    }

    match tokens {
        ServerTokens::On => FULL.get_or_init(|| render(SERVER)),
        ServerTokens::Build => BUILD.get_or_init(|| render(SERVER_BUILD)),
        ServerTokens::Off => SHORT.get_or_init(|| render(SERVER_SHORT)),
    }
}

impl Connection {
    /// Turns the response head into a HEADERS (+ CONTINUATION) chain and
    /// queues it. Called once per response, before any body; afterwards the
    /// core feeds the body through [`send_chain`].
    ///
    /// [`send_chain`]: Connection::send_chain
    pub fn header_filter<T: Transport>(
        &mut self,
        transport: &mut T,
        r: &mut Request,
    ) -> Result<SendStatus, H2Error> {
        let sid = r.stream;

        debug!("http2:{sid} header filter");

        if r.header_sent {
            return Ok(SendStatus::Done);
        }
        r.header_sent = true;

        {
            let stream = self
                .streams
                .get(&sid)
                .ok_or(H2Error::UnknownStream(sid))?;
            if stream.error {
                return Err(H2Error::StreamError);
            }
        }

        if r.method == Method::Head {
            r.header_only = true;
        }

        let status_byte = match r.headers_out.status {
            200 => Some(indexed(STATUS_200_INDEX)),

            204 => {
                r.header_only = true;

                r.headers_out.content_type = None;
                r.headers_out.charset = None;
                r.headers_out.content_length_n = -1;
                r.headers_out.last_modified_time = -1;

                Some(indexed(STATUS_204_INDEX))
            }

            206 => Some(indexed(STATUS_206_INDEX)),

            304 => {
                r.header_only = true;
                Some(indexed(STATUS_304_INDEX))
            }

            status => {
                r.headers_out.last_modified_time = -1;

                match status {
                    400 => Some(indexed(STATUS_400_INDEX)),
                    404 => Some(indexed(STATUS_404_INDEX)),
                    500 => Some(indexed(STATUS_500_INDEX)),
                    _ => None,
                }
            }
        };

        self.rewrite_location(r)?;

        // upper bound on the encoded block, computed before anything is
        // written so both buffers are allocated exactly once
        let mut len = usize::from(self.table_update);

        len += if status_byte.is_some() {
            1
        } else {
            1 + literal_size(3)
        };

        match &r.headers_out.server {
            None => len += 1 + server_token_value(self.conf.server_tokens).len(),
            Some(server) => len += 1 + INT_OCTETS + server.len(),
        }

        let date = r
            .headers_out
            .date
            .clone()
            .unwrap_or_else(http_time_now);
        len += 1 + INT_OCTETS + date.len();

        let content_type = r.headers_out.content_type.as_ref().map(|ct| {
            match &r.headers_out.charset {
                // a bare media type gets the configured charset appended
                Some(charset) if !ct.contains(';') => format!("{ct}; charset={charset}"),
                _ => ct.clone(),
            }
        });
        if let Some(ct) = &content_type {
            len += 1 + INT_OCTETS + ct.len();
        }

        let content_length = (r.headers_out.content_length_n >= 0)
            .then(|| r.headers_out.content_length_n.to_string());
        if let Some(cl) = &content_length {
            len += 1 + literal_size(cl.len());
        }

        let last_modified =
            (r.headers_out.last_modified_time >= 0).then(|| http_time(r.headers_out.last_modified_time));
        if let Some(lm) = &last_modified {
            len += 1 + INT_OCTETS + lm.len();
        }

        if let Some(location) = &r.headers_out.location {
            if !location.is_empty() {
                len += 1 + INT_OCTETS + location.len();
            }
        }

        let mut tmp_len = len;

        if r.gzip_vary {
            if self.conf.gzip_vary {
                len += 1 + INT_OCTETS + "Accept-Encoding".len();
            } else {
                r.gzip_vary = false;
            }
        }

        for h in &r.headers_out.headers {
            if h.hash == 0 {
                continue;
            }

            if h.key.len() > MAX_FIELD {
                error!("too long response header name: \"{}\"", h.key);
                return Err(H2Error::FieldTooLong("header name", h.key.clone()));
            }

            if h.value.len() > MAX_FIELD {
                error!("too long response header value: \"{}: {}\"", h.key, h.value);
                return Err(H2Error::FieldTooLong("header value", h.key.clone()));
            }

            len += 1 + INT_OCTETS + h.key.len() + INT_OCTETS + h.value.len();

            tmp_len = tmp_len.max(h.key.len()).max(h.value.len());
        }

        let mut pos = Vec::with_capacity(len);
        let mut tmp = vec![0u8; tmp_len];

        if self.table_update {
            debug!("http2 table size update: 0");
            pos.push(1 << 5);
            self.table_update = false;
        }

        debug!("http2 output header: \":status: {}\"", r.headers_out.status);

        match status_byte {
            Some(byte) => pos.push(byte),
            None => {
                pos.push(inc_indexed(STATUS_INDEX));
                pos.push(ENCODE_RAW | 3);
                pos.extend_from_slice(format!("{:03}", r.headers_out.status).as_bytes());
            }
        }

        match &r.headers_out.server {
            None => {
                let value = server_token_value(self.conf.server_tokens);
                pos.push(inc_indexed(SERVER_INDEX));
                pos.extend_from_slice(value);
            }
            Some(server) => {
                debug!("http2 output header: \"server: {server}\"");
                pos.push(inc_indexed(SERVER_INDEX));
                hpack::write_value(&mut pos, server.as_bytes(), &mut tmp);
            }
        }

        debug!("http2 output header: \"date: {date}\"");
        pos.push(inc_indexed(DATE_INDEX));
        hpack::write_value(&mut pos, date.as_bytes(), &mut tmp);

        if let Some(ct) = content_type {
            debug!("http2 output header: \"content-type: {ct}\"");
            pos.push(inc_indexed(CONTENT_TYPE_INDEX));
            hpack::write_value(&mut pos, ct.as_bytes(), &mut tmp);

            // keep the merged value visible to access logging
            r.headers_out.content_type = Some(ct);
        }

        if let Some(cl) = content_length {
            debug!("http2 output header: \"content-length: {cl}\"");
            pos.push(inc_indexed(CONTENT_LENGTH_INDEX));
            pos.push(ENCODE_RAW | cl.len() as u8);
            pos.extend_from_slice(cl.as_bytes());
        }

        if let Some(lm) = last_modified {
            debug!("http2 output header: \"last-modified: {lm}\"");
            pos.push(inc_indexed(LAST_MODIFIED_INDEX));
            hpack::write_value(&mut pos, lm.as_bytes(), &mut tmp);
        }

        if let Some(location) = &r.headers_out.location {
            if !location.is_empty() {
                debug!("http2 output header: \"location: {location}\"");
                pos.push(inc_indexed(LOCATION_INDEX));
                hpack::write_value(&mut pos, location.as_bytes(), &mut tmp);
            }
        }

        if r.gzip_vary {
            debug!("http2 output header: \"vary: Accept-Encoding\"");
            pos.push(inc_indexed(hpack::VARY_INDEX));
            hpack::write_value(&mut pos, b"Accept-Encoding", &mut tmp);
        }

        for h in &r.headers_out.headers {
            if h.hash == 0 {
                continue;
            }

            debug!("http2 output header: \"{}: {}\"", h.key, h.value);

            pos.push(0);
            hpack::write_name(&mut pos, h.key.as_bytes(), &mut tmp);
            hpack::write_value(&mut pos, h.value.as_bytes(), &mut tmp);
        }

        let fin =
            r.header_only || (r.headers_out.content_length_n == 0 && !r.expect_trailers);

        let frame = self.create_headers_frame(sid, Bytes::from(pos), fin, false);
        self.queue_blocked_frame(frame);

        if let Some(stream) = self.streams.get_mut(&sid) {
            stream.queued += 1;
        }

        self.init_stream(sid);

        self.filter_send(transport, sid)
    }

    /// Emits a `103 Early Hints` informational response carrying whatever
    /// link headers the core accumulated so far. May run any number of
    /// times before the final header filter; a call without any live
    /// header entries emits nothing.
    pub fn early_hints_filter<T: Transport>(
        &mut self,
        transport: &mut T,
        r: &mut Request,
    ) -> Result<SendStatus, H2Error> {
        let sid = r.stream;

        {
            let stream = self
                .streams
                .get(&sid)
                .ok_or(H2Error::UnknownStream(sid))?;
            if stream.error {
                return Err(H2Error::StreamError);
            }
        }

        let mut len = 0;
        let mut tmp_len = 0;

        for h in &r.headers_out.headers {
            if h.hash == 0 {
                continue;
            }

            if h.key.len() > MAX_FIELD {
                error!("too long response header name: \"{}\"", h.key);
                return Err(H2Error::FieldTooLong("header name", h.key.clone()));
            }

            if h.value.len() > MAX_FIELD {
                error!("too long response header value: \"{}: {}\"", h.key, h.value);
                return Err(H2Error::FieldTooLong("header value", h.key.clone()));
            }

            len += 1 + INT_OCTETS + h.key.len() + INT_OCTETS + h.value.len();

            tmp_len = tmp_len.max(h.key.len()).max(h.value.len());
        }

        if len == 0 {
            return Ok(SendStatus::Done);
        }

        len += usize::from(self.table_update);
        len += 1 + literal_size(3);

        let mut pos = Vec::with_capacity(len);
        let mut tmp = vec![0u8; tmp_len];

        if self.table_update {
            debug!("http2 table size update: 0");
            pos.push(1 << 5);
            self.table_update = false;
        }

        debug!("http2 output header: \":status: 103\"");

        pos.push(inc_indexed(STATUS_INDEX));
        pos.push(ENCODE_RAW | 3);
        pos.extend_from_slice(b"103");

        for h in &r.headers_out.headers {
            if h.hash == 0 {
                continue;
            }

            debug!("http2 output header: \"{}: {}\"", h.key, h.value);

            pos.push(0);
            hpack::write_name(&mut pos, h.key.as_bytes(), &mut tmp);
            hpack::write_value(&mut pos, h.value.as_bytes(), &mut tmp);
        }

        let frame = self.create_headers_frame(sid, Bytes::from(pos), false, true);
        self.queue_blocked_frame(frame);

        if let Some(stream) = self.streams.get_mut(&sid) {
            stream.queued += 1;
        }

        self.init_stream(sid);

        self.filter_send(transport, sid)
    }

    /// Builds the trailers HEADERS frame closing a response that promised
    /// them. `None` means every trailer entry was a tombstone and the final
    /// DATA frame should carry END_STREAM itself.
    pub(crate) fn create_trailers_frame(
        &mut self,
        r: &Request,
    ) -> Result<Option<OutFrame>, H2Error> {
        let mut len = 0;
        let mut tmp_len = 0;

        for h in &r.headers_out.trailers {
            if h.hash == 0 {
                continue;
            }

            if h.key.len() > MAX_FIELD {
                error!("too long response trailer name: \"{}\"", h.key);
                return Err(H2Error::FieldTooLong("trailer name", h.key.clone()));
            }

            if h.value.len() > MAX_FIELD {
                error!("too long response trailer value: \"{}: {}\"", h.key, h.value);
                return Err(H2Error::FieldTooLong("trailer value", h.key.clone()));
            }

            len += 1 + INT_OCTETS + h.key.len() + INT_OCTETS + h.value.len();

            tmp_len = tmp_len.max(h.key.len()).max(h.value.len());
        }

        if len == 0 {
            return Ok(None);
        }

        let mut pos = Vec::with_capacity(len);
        let mut tmp = vec![0u8; tmp_len];

        for h in &r.headers_out.trailers {
            if h.hash == 0 {
                continue;
            }

            debug!("http2 output trailer: \"{}: {}\"", h.key, h.value);

            pos.push(0);
            hpack::write_name(&mut pos, h.key.as_bytes(), &mut tmp);
            hpack::write_value(&mut pos, h.value.as_bytes(), &mut tmp);
        }

        Ok(Some(self.create_headers_frame(
            r.stream,
            Bytes::from(pos),
            true,
            false,
        )))
    }

    /// Rewrites a host-relative `location` into an absolute URL when the
    /// configuration asks for it: scheme from the TLS state, host from the
    /// configured name, the request host, or the local address, plus a
    /// non-default port when ports are kept.
    fn rewrite_location(&self, r: &mut Request) -> Result<(), H2Error> {
        let rewritten = {
            let Some(location) = r.headers_out.location.as_deref() else {
                return Ok(());
            };

            if !location.starts_with('/') || !self.conf.absolute_redirect {
                return Ok(());
            }

            let host = if self.conf.server_name_in_redirect {
                self.conf.server_name.clone()
            } else if let Some(host) = &r.host {
                host.clone()
            } else if let Some(addr) = r.local_addr {
                match addr.ip() {
                    IpAddr::V4(ip) => ip.to_string(),
                    IpAddr::V6(ip) => format!("[{ip}]"),
                }
            } else {
                return Err(H2Error::StreamError);
            };

            let mut port = r.local_addr.map_or(0, |addr| addr.port());

            if self.conf.port_in_redirect {
                let default = if r.ssl { 443 } else { 80 };
                if port == default {
                    port = 0;
                }
            } else {
                port = 0;
            }

            let scheme = if r.ssl { "https" } else { "http" };

            if port != 0 {
                format!("{scheme}://{host}:{port}{location}")
            } else {
                format!("{scheme}://{host}{location}")
            }
        };

        r.headers_out.location = Some(rewritten);

        Ok(())
    }

    /// First emission on a stream arms it for body output; repeated calls
    /// are no-ops.
    fn init_stream(&mut self, sid: StreamId) {
        if let Some(stream) = self.streams.get_mut(&sid) {
            stream.initialized = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_tokens_are_memoized() {
        let a = server_token_value(ServerTokens::On);
        let b = server_token_value(ServerTokens::On);
        assert_eq!(a.as_ptr(), b.as_ptr());
        assert_ne!(
            server_token_value(ServerTokens::Off),
            server_token_value(ServerTokens::Build)
        );
    }

    #[test]
    fn short_token_is_huffman_coded() {
        let short = server_token_value(ServerTokens::Off);
        // Huffman flag set and strictly shorter than the raw form
        assert_eq!(short[0] & 0x80, 0x80);
        assert!(short.len() <= SERVER_SHORT.len());
    }
}
