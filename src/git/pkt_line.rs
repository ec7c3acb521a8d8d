//! Git smart HTTP packet-line framing.
//!
//! Each packet line is prefixed with a 4-character lowercase-hex length
//! that includes the prefix itself:
//!
//! - `0000` -- flush packet (section boundary, no payload)
//! - `0004`+ -- data packet (length includes the 4 prefix bytes)

use tracing::warn;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A single packet line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// A data packet containing arbitrary bytes.
    Data(Vec<u8>),
    /// Flush packet (`0000`) -- marks the end of a section.
    Flush,
}

/// The fixed flush-packet sentinel.
pub const FLUSH: &[u8] = b"0000";

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Frame a byte slice as a packet line (4-hex-digit length prefix + data).
///
/// The length includes the 4 prefix bytes themselves.  Callers are
/// responsible for including any trailing newline in `data` if the protocol
/// requires it.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let total_len = data.len() + 4;
    assert!(
        total_len <= 0xFFFF,
        "packet-line data too large ({total_len} bytes)"
    );
    let mut buf = Vec::with_capacity(total_len);
    buf.extend_from_slice(format!("{total_len:04x}").as_bytes());
    buf.extend_from_slice(data);
    buf
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a sequence of packet lines from raw bytes.
///
/// Returns all successfully parsed packets.  If the input is malformed the
/// parser stops at the first unparseable position and returns whatever was
/// decoded up to that point.
pub fn decode(data: &[u8]) -> Vec<PktLine> {
    let mut packets = Vec::new();
    let mut pos = 0;

    while pos + 4 <= data.len() {
        let len_hex = match std::str::from_utf8(&data[pos..pos + 4]) {
            Ok(s) => s,
            Err(_) => {
                warn!(offset = pos, "non-UTF-8 packet-line length prefix");
                break;
            }
        };

        let pkt_len = match u16::from_str_radix(len_hex, 16) {
            Ok(n) => n as usize,
            Err(_) => {
                warn!(offset = pos, len_hex, "invalid packet-line length");
                break;
            }
        };

        match pkt_len {
            0 => {
                packets.push(PktLine::Flush);
                pos += 4;
            }
            1..=3 => {
                // A data packet can never be shorter than its own prefix.
                warn!(offset = pos, pkt_len, "invalid packet-line length");
                break;
            }
            n => {
                if pos + n > data.len() {
                    warn!(
                        offset = pos,
                        declared = n,
                        available = data.len() - pos,
                        "truncated packet-line"
                    );
                    break;
                }
                packets.push(PktLine::Data(data[pos + 4..pos + n].to_vec()));
                pos += n;
            }
        }
    }

    packets
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
