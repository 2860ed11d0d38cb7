use meshnet_routing::{Instance, MeshError, INSTANCE_ID_LEN};

use crate::packet::{kind, Packet};

/// Sanity ceiling on a single length-prefixed field. A declared length
/// above this is never "just not here yet" — it is treated as a malformed
/// frame immediately rather than buffered indefinitely.
const MAX_FIELD_LEN: usize = 8 * 1024 * 1024;

/// A cursor over an immutable byte slice used for incremental framing:
/// reads past the end of the buffer report `None` ("not enough bytes
/// yet") rather than failing, so the same parser drives both the
/// single-shot [`decode`] and the streaming [`try_decode`].
struct Reader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    fn read_slice(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.offset + len > self.buffer.len() {
            return None;
        }
        let slice = &self.buffer[self.offset..self.offset + len];
        self.offset += len;
        Some(slice)
    }

    fn read_u8(&mut self) -> Option<u8> {
        Some(self.read_slice(1)?[0])
    }

    fn read_u16(&mut self) -> Option<u16> {
        let bytes: [u8; 2] = self.read_slice(2)?.try_into().ok()?;
        Some(u16::from_be_bytes(bytes))
    }

    fn read_u32(&mut self) -> Option<u32> {
        let bytes: [u8; 4] = self.read_slice(4)?.try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }

    fn read_instance(&mut self) -> Option<Instance> {
        let bytes: [u8; INSTANCE_ID_LEN] = self.read_slice(INSTANCE_ID_LEN)?.try_into().ok()?;
        Some(Instance::from_bytes(bytes))
    }

    /// Reads a `u32`-length-prefixed byte field. Returns `Err` only when
    /// the declared length is implausibly large (corrupt frame); returns
    /// `Ok(None)` when the length itself, or the bytes it promises, are
    /// simply not all present yet.
    fn read_variable(&mut self) -> Result<Option<&'a [u8]>, MeshError> {
        let Some(len) = self.read_u32() else { return Ok(None) };
        let len = len as usize;
        if len > MAX_FIELD_LEN {
            return Err(MeshError::malformed(format!("length prefix {len} exceeds {MAX_FIELD_LEN} byte ceiling")));
        }
        Ok(self.read_slice(len))
    }

    fn read_string(&mut self) -> Result<Option<String>, MeshError> {
        let Some(bytes) = self.read_variable()? else { return Ok(None) };
        String::from_utf8(bytes.to_vec()).map(Some).map_err(|_| MeshError::malformed("url field is not valid utf-8"))
    }
}

fn write_variable(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

/// Serialize a packet to its wire frame: a one-byte kind tag followed by
/// the fixed and variable fields from §6, all big-endian.
pub fn encode(packet: &Packet) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(packet.kind_tag());
    out.extend_from_slice(&packet.sequence().to_be_bytes());

    match packet {
        Packet::Handshake { originator, internet_hops, .. } => {
            out.extend_from_slice(originator.as_bytes());
            out.push(*internet_hops);
        }
        Packet::Update { instance, hop_count, reachable, internet_hops, .. } => {
            out.extend_from_slice(instance.as_bytes());
            out.push(*hop_count);
            out.push(u8::from(*reachable));
            out.push(*internet_hops);
        }
        Packet::Data { origin, destination, payload, .. } => {
            out.extend_from_slice(origin.as_bytes());
            out.extend_from_slice(destination.as_bytes());
            write_variable(&mut out, payload);
        }
        Packet::Ack { origin, destination, .. } => {
            out.extend_from_slice(origin.as_bytes());
            out.extend_from_slice(destination.as_bytes());
        }
        Packet::Internet { originator, url, body, test_id, hop_count, .. } => {
            out.extend_from_slice(originator.as_bytes());
            out.push(*hop_count);
            out.extend_from_slice(&test_id.to_be_bytes());
            write_variable(&mut out, url.as_bytes());
            write_variable(&mut out, body);
        }
        Packet::InternetResponse { originator, code, body, .. } => {
            out.extend_from_slice(originator.as_bytes());
            out.extend_from_slice(&code.to_be_bytes());
            write_variable(&mut out, body);
        }
    }

    out
}

/// Attempts to parse one frame from the front of `bytes`. On success
/// returns the packet and how many bytes it consumed, leaving the caller
/// to keep buffering anything beyond that for the next frame.
fn parse(bytes: &[u8]) -> Result<Option<(Packet, usize)>, MeshError> {
    let mut reader = Reader::new(bytes);

    let Some(tag) = reader.read_u8() else { return Ok(None) };
    let Some(sequence) = reader.read_u16() else { return Ok(None) };

    let packet = match tag {
        kind::HANDSHAKE => {
            let Some(originator) = reader.read_instance() else { return Ok(None) };
            let Some(internet_hops) = reader.read_u8() else { return Ok(None) };
            Packet::Handshake { sequence, originator, internet_hops }
        }
        kind::UPDATE => {
            let Some(instance) = reader.read_instance() else { return Ok(None) };
            let Some(hop_count) = reader.read_u8() else { return Ok(None) };
            let Some(reachable) = reader.read_u8() else { return Ok(None) };
            let Some(internet_hops) = reader.read_u8() else { return Ok(None) };
            Packet::Update { sequence, instance, hop_count, reachable: reachable != 0, internet_hops }
        }
        kind::DATA => {
            let Some(origin) = reader.read_instance() else { return Ok(None) };
            let Some(destination) = reader.read_instance() else { return Ok(None) };
            let Some(payload) = reader.read_variable()? else { return Ok(None) };
            Packet::Data { sequence, origin, destination, payload: payload.to_vec() }
        }
        kind::ACK => {
            let Some(origin) = reader.read_instance() else { return Ok(None) };
            let Some(destination) = reader.read_instance() else { return Ok(None) };
            Packet::Ack { sequence, origin, destination }
        }
        kind::INTERNET => {
            let Some(originator) = reader.read_instance() else { return Ok(None) };
            let Some(hop_count) = reader.read_u8() else { return Ok(None) };
            let Some(test_id) = reader.read_u32() else { return Ok(None) };
            let Some(url) = reader.read_string()? else { return Ok(None) };
            let Some(body) = reader.read_variable()? else { return Ok(None) };
            Packet::Internet { sequence, originator, url, body: body.to_vec(), test_id, hop_count }
        }
        kind::INTERNET_RESPONSE => {
            let Some(originator) = reader.read_instance() else { return Ok(None) };
            let Some(code) = reader.read_u16() else { return Ok(None) };
            let Some(body) = reader.read_variable()? else { return Ok(None) };
            Packet::InternetResponse { sequence, originator, code, body: body.to_vec() }
        }
        other => return Err(MeshError::malformed(format!("unknown packet kind tag {other:#04x}"))),
    };

    Ok(Some((packet, reader.offset)))
}

/// Parse a complete wire frame into a `Packet`, requiring `bytes` to hold
/// exactly one frame and nothing more. Fails with `MeshError::Malformed`
/// on truncation, an unknown tag, trailing bytes, or a length overflow.
pub fn decode(bytes: &[u8]) -> Result<Packet, MeshError> {
    match parse(bytes)? {
        Some((packet, consumed)) if consumed == bytes.len() => Ok(packet),
        Some(_) => Err(MeshError::malformed("trailing bytes after frame")),
        None => Err(MeshError::malformed("unexpected end of frame")),
    }
}

/// Parse one frame from the front of a growing byte accumulator, used by
/// the I/O controller's inbound stream assembler. `Ok(None)` means
/// "buffer more bytes and try again"; the caller is expected to retain
/// everything from `consumed` onward in the accumulator on success.
pub fn try_decode(bytes: &[u8]) -> Result<Option<(Packet, usize)>, MeshError> {
    parse(bytes)
}

/// `true` when sequence `a` is newer than `b` under wraparound comparison:
/// `(a - b) mod 65536 < 32768`.
pub fn is_newer(a: u16, b: u16) -> bool {
    a.wrapping_sub(b) < 0x8000
}
