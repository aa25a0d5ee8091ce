/// Line framing for the IRC byte stream.
///
/// Splits a per-connection read buffer into CR-LF delimited lines. The
/// buffer may hold fragments of a line or several coalesced lines; callers
/// pull lines off the front until none remain. Empty lines are the
/// caller's to discard.
use bytes::{Buf, BytesMut};

/// The EOT byte (Ctrl-D). Interactive clients emit it; it is stripped
/// before the bytes ever reach the framer.
pub const EOT: u8 = 0x04;

/// Extract the first complete CR-LF terminated line from `buf`.
///
/// The line is removed from the buffer along with its terminator and
/// returned without it. Returns `None` when no full line is buffered yet.
pub fn next_line(buf: &mut BytesMut) -> Option<BytesMut> {
    let pos = buf.windows(2).position(|w| w == b"\r\n")?;
    let line = buf.split_to(pos);
    buf.advance(2);
    Some(line)
}

/// Append `chunk` to `buf`, dropping any embedded EOT bytes.
pub fn append_stripped(buf: &mut BytesMut, chunk: &[u8]) {
    if chunk.contains(&EOT) {
        buf.extend(chunk.iter().copied().filter(|&b| b != EOT));
    } else {
        buf.extend_from_slice(chunk);
    }
}
