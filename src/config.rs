/// How much of the server identity the `server` response header reveals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerTokens {
    /// Full product/version string.
    On,
    /// Bare product name.
    Off,
    /// Product/version plus build name.
    Build,
}

/// Static output-filter configuration, fixed for the lifetime of a
/// connection.
#[derive(Debug, Clone)]
pub struct Config {
    /// Ceiling on a single DATA frame's payload, before the peer's frame
    /// size is applied.
    pub chunk_size: usize,
    pub server_tokens: ServerTokens,
    /// Rewrite relative `location` values into absolute URLs.
    pub absolute_redirect: bool,
    /// Prefer the configured server name over the request host when
    /// rewriting redirects.
    pub server_name_in_redirect: bool,
    /// Keep a non-default port in rewritten redirects.
    pub port_in_redirect: bool,
    /// Emit `vary: Accept-Encoding` on responses flagged by the gzip
    /// filter.
    pub gzip_vary: bool,
    pub server_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: 8 * 1024,
            server_tokens: ServerTokens::On,
            absolute_redirect: true,
            server_name_in_redirect: false,
            port_in_redirect: true,
            gzip_vary: false,
            server_name: String::new(),
        }
    }
}
