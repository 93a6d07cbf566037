use crate::huffman;

/// https://httpwg.org/specs/rfc7541.html#static.table.definition
///
/// Indices into the HPACK static table for the fields this filter emits.
/// The table is fixed by the RFC; only the entries we reference are named.
pub const STATUS_INDEX: u8 = 8;
pub const STATUS_200_INDEX: u8 = 8;
pub const STATUS_204_INDEX: u8 = 9;
pub const STATUS_206_INDEX: u8 = 10;
pub const STATUS_304_INDEX: u8 = 11;
pub const STATUS_400_INDEX: u8 = 12;
pub const STATUS_404_INDEX: u8 = 13;
pub const STATUS_500_INDEX: u8 = 14;
pub const CONTENT_LENGTH_INDEX: u8 = 28;
pub const CONTENT_TYPE_INDEX: u8 = 31;
pub const DATE_INDEX: u8 = 33;
pub const LAST_MODIFIED_INDEX: u8 = 44;
pub const LOCATION_INDEX: u8 = 46;
pub const SERVER_INDEX: u8 = 54;
pub const VARY_INDEX: u8 = 59;

/// String-length octet markers.
pub const ENCODE_RAW: u8 = 0;
pub const ENCODE_HUFF: u8 = 0x80;

/// All-ones prefix value for an integer with `bits` prefix bits.
#[must_use]
pub const fn prefix(bits: u8) -> u8 {
    (1 << bits) - 1
}

/// Indexed header field: the entire field is one static-table reference.
#[must_use]
pub const fn indexed(index: u8) -> u8 {
    0x80 | index
}

/// Literal with incremental indexing, name taken from the static table.
#[must_use]
pub const fn inc_indexed(index: u8) -> u8 {
    0x40 | index
}

/// Octets an HPACK integer takes: exact for 0..=253, an upper estimate for
/// larger values, never an underestimate.
#[must_use]
pub const fn integer_octets(value: usize) -> usize {
    1 + value / 127
}

/// Upper estimate for a literal of `len` octets: length integer + payload.
#[must_use]
pub const fn literal_size(len: usize) -> usize {
    integer_octets(len) + len
}

/// https://httpwg.org/specs/rfc7541.html#integer.representation
///
/// Writes `value` with an N-bit prefix, merging the prefix byte with the
/// opcode bits in `marker`.
pub fn write_int(out: &mut Vec<u8>, marker: u8, prefix: u8, mut value: usize) {
    if value < prefix as usize {
        out.push(marker | value as u8);
        return;
    }

    out.push(marker | prefix);
    value -= prefix as usize;

    while value >= 128 {
        out.push((value % 128 + 128) as u8);
        value /= 128;
    }

    out.push(value as u8);
}

/// Writes a string literal, Huffman-coded when that is shorter, raw
/// otherwise; lowercases on either path when `lower` is set. `tmp` is
/// caller-provided scratch at least `src.len()` long.
fn string_encode(out: &mut Vec<u8>, src: &[u8], tmp: &mut [u8], lower: bool) {
    match huffman::encode(src, &mut tmp[..src.len()], lower) {
        Some(hlen) => {
            write_int(out, ENCODE_HUFF, prefix(7), hlen);
            out.extend_from_slice(&tmp[..hlen]);
        }
        None => {
            write_int(out, ENCODE_RAW, prefix(7), src.len());
            if lower {
                out.extend(src.iter().map(u8::to_ascii_lowercase));
            } else {
                out.extend_from_slice(src);
            }
        }
    }
}

/// Writes a header name literal (always lowercased on the wire).
pub fn write_name(out: &mut Vec<u8>, name: &[u8], tmp: &mut [u8]) {
    string_encode(out, name, tmp, true);
}

/// Writes a header value literal.
pub fn write_value(out: &mut Vec<u8>, value: &[u8], tmp: &mut [u8]) {
    string_encode(out, value, tmp, false);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(marker: u8, prefix_bits: u8, value: usize) -> Vec<u8> {
        let mut out = Vec::new();
        write_int(&mut out, marker, prefix(prefix_bits), value);
        out
    }

    #[test]
    fn integer_fits_prefix() {
        // https://httpwg.org/specs/rfc7541.html#integer.representation.example1
        assert_eq!(int(0, 5, 10), [0b0000_1010]);
    }

    #[test]
    fn integer_with_continuation() {
        // https://httpwg.org/specs/rfc7541.html#integer.representation.example2
        assert_eq!(int(0, 5, 1337), [0b0001_1111, 0b1001_1010, 0b0000_1010]);
    }

    #[test]
    fn integer_full_octet() {
        // https://httpwg.org/specs/rfc7541.html#integer.representation.example3
        assert_eq!(int(0, 8, 42), [0b0010_1010]);
    }

    #[test]
    fn integer_keeps_marker_bits() {
        assert_eq!(int(0x80, 7, STATUS_200_INDEX as usize), [0x88]);
        assert_eq!(int(0x40, 6, SERVER_INDEX as usize), [0x76]);
    }

    #[test]
    fn octet_estimates_never_undershoot() {
        for v in 0..10_000 {
            let exact = int(0, 7, v).len();
            assert!(integer_octets(v) >= exact, "estimate for {v}");
        }
    }

    #[test]
    fn value_prefers_huffman() {
        let mut out = Vec::new();
        let mut tmp = vec![0; 64];
        write_value(&mut out, b"Accept-Encoding", &mut tmp);
        // the Huffman form is 11 octets against 15 raw
        assert_eq!(
            out,
            [0x8b, 0x84, 0x84, 0x2d, 0x69, 0x5b, 0x05, 0x44, 0x3c, 0x86, 0xaa, 0x6f]
        );
    }

    #[test]
    fn name_is_lowercased() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        let mut tmp = vec![0; 64];
        write_name(&mut a, b"X-Trace-Id", &mut tmp);
        write_name(&mut b, b"x-trace-id", &mut tmp);
        assert_eq!(a, b);
    }

    #[test]
    fn incompressible_value_is_raw() {
        let mut out = Vec::new();
        let mut tmp = vec![0; 8];
        write_value(&mut out, b"\x01\x02\x03\x04", &mut tmp);
        assert_eq!(out, [0x04, 0x01, 0x02, 0x03, 0x04]);
    }
}
