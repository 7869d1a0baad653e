//! Control messages exchanged between client and peer.
//!
//! Two encodings are supported. [`WireFormat::Legacy`] reproduces the
//! NUL-terminated sentinels spoken by existing peers byte for byte.
//! [`WireFormat::Framed`] wraps each message in a small tagged envelope.
//! Bulk payloads (digest table, bitmap, chunk data, compressed stream) are raw
//! in both formats because each side already knows their length.

use std::io::{Read, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::{recv_exact, recv_some, send_all};
use crate::config::WireFormat;
use crate::error::{Result, SyncError};

/// Protocol magic bytes: "CSYN"
pub const PROTOCOL_MAGIC: [u8; 4] = *b"CSYN";

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum framed payload size (64 KB); control messages are tiny.
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024;

/// Legacy sentinel sent when no usable local copy exists.
pub const NO_LOCAL_FILE: &str = "local file not exist!";

/// Legacy acknowledgement sentinel sent after the bitmap is stored.
pub const ACK: &str = "ACK";

/// Terminator byte after every legacy text message.
pub const TERMINATOR: u8 = 0;

/// Longest legacy text message accepted, terminator excluded.
const MAX_LEGACY_TEXT: usize = 64;

/// Protocol message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Client has no usable local copy.
    NoLocalFile = 0x01,
    /// Client announces its digest-table length.
    DigestLength = 0x02,
    /// Peer pre-announces the bitmap length.
    BitmapLength = 0x03,
    /// Client stored the bitmap.
    Ack = 0x04,
}

impl MessageType {
    /// Convert from u8.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the value is invalid.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::NoLocalFile),
            0x02 => Ok(Self::DigestLength),
            0x03 => Ok(Self::BitmapLength),
            0x04 => Ok(Self::Ack),
            _ => Err(SyncError::ProtocolError(format!(
                "Invalid message type: {value:#x}"
            ))),
        }
    }
}

/// Framed envelope header.
///
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │  MAGIC  │ LENGTH  │  TYPE   │ VERSION │  FLAGS  │
/// │ 4 bytes │ 4 bytes │ 1 byte  │ 1 byte  │ 2 bytes │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Magic bytes: "CSYN".
    pub magic: [u8; 4],
    /// Payload length (little-endian).
    pub length: u32,
    /// Message type.
    pub msg_type: MessageType,
    /// Protocol version.
    pub version: u8,
    /// Reserved flags.
    pub flags: u16,
}

impl FrameHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 12;

    /// Create a new frame header.
    #[must_use]
    pub const fn new(msg_type: MessageType, payload_len: u32) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            length: payload_len,
            msg_type,
            version: PROTOCOL_VERSION,
            flags: 0,
        }
    }

    /// Validate the header.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if validation fails.
    pub fn validate(&self) -> Result<()> {
        if self.magic != PROTOCOL_MAGIC {
            return Err(SyncError::ProtocolError(format!(
                "Invalid magic: expected {PROTOCOL_MAGIC:?}, got {:?}",
                self.magic
            )));
        }
        if self.version != PROTOCOL_VERSION {
            return Err(SyncError::ProtocolError(format!(
                "Unsupported version: expected {PROTOCOL_VERSION}, got {}",
                self.version
            )));
        }
        if self.length > MAX_PAYLOAD_SIZE {
            return Err(SyncError::ProtocolError(format!(
                "Payload too large: {} > {MAX_PAYLOAD_SIZE}",
                self.length
            )));
        }
        Ok(())
    }

    /// Encode header to bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..8].copy_from_slice(&self.length.to_le_bytes());
        buf[8] = self.msg_type as u8;
        buf[9] = self.version;
        buf[10..12].copy_from_slice(&self.flags.to_le_bytes());
        buf
    }

    /// Decode and validate a header.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if decoding or validation fails.
    pub fn decode(buf: &[u8; Self::SIZE]) -> Result<Self> {
        let header = Self {
            magic: [buf[0], buf[1], buf[2], buf[3]],
            length: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            msg_type: MessageType::from_u8(buf[8])?,
            version: buf[9],
            flags: u16::from_le_bytes([buf[10], buf[11]]),
        };
        header.validate()?;
        Ok(header)
    }
}

/// Control messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Client has no usable local copy; a full transfer follows.
    NoLocalFile,
    /// Byte length of the digest table the client is about to send.
    DigestLength {
        /// Table length in bytes.
        len: u64,
    },
    /// Byte length of the bitmap the peer will send.
    BitmapLength {
        /// Bitmap length in bytes.
        len: u32,
    },
    /// Bitmap received and persisted.
    Ack,
}

impl Message {
    /// Get the message type.
    #[must_use]
    pub const fn msg_type(&self) -> MessageType {
        match self {
            Self::NoLocalFile => MessageType::NoLocalFile,
            Self::DigestLength { .. } => MessageType::DigestLength,
            Self::BitmapLength { .. } => MessageType::BitmapLength,
            Self::Ack => MessageType::Ack,
        }
    }

    /// Legacy wire bytes.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if a bitmap length does not fit in one byte.
    pub fn encode_legacy(&self) -> Result<Vec<u8>> {
        let text = match self {
            Self::NoLocalFile => NO_LOCAL_FILE.to_string(),
            Self::DigestLength { len } => len.to_string(),
            Self::Ack => ACK.to_string(),
            Self::BitmapLength { len } => {
                let byte = u8::try_from(*len).map_err(|_| {
                    SyncError::ProtocolError(format!(
                        "Bitmap length {len} does not fit the legacy single-byte field"
                    ))
                })?;
                return Ok(vec![byte]);
            }
        };
        let mut bytes = text.into_bytes();
        bytes.push(TERMINATOR);
        Ok(bytes)
    }

    /// Parse a legacy text message, with or without its terminator.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` for text that is neither a sentinel nor a decimal
    /// length.
    pub fn from_legacy(bytes: &[u8]) -> Result<Self> {
        let text = bytes.strip_suffix(&[TERMINATOR]).unwrap_or(bytes);
        let text = std::str::from_utf8(text)
            .map_err(|e| SyncError::ProtocolError(format!("Non-UTF-8 control message: {e}")))?;
        match text {
            NO_LOCAL_FILE => Ok(Self::NoLocalFile),
            ACK => Ok(Self::Ack),
            digits => digits
                .parse::<u64>()
                .map(|len| Self::DigestLength { len })
                .map_err(|_| {
                    SyncError::ProtocolError(format!("Unrecognized control message: {digits:?}"))
                }),
        }
    }

    /// Encode message payload with bincode.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| SyncError::ProtocolError(format!("Failed to encode message: {e}")))
    }

    /// Decode message payload with bincode.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn decode(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| SyncError::ProtocolError(format!("Failed to decode message: {e}")))
    }
}

/// Reads and writes control messages in either wire format.
#[derive(Debug)]
pub struct Codec {
    format: WireFormat,
    timeout: Option<Duration>,
    read_buf: Vec<u8>,
}

impl Codec {
    /// Create a codec without channel timeouts.
    #[must_use]
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            timeout: None,
            read_buf: Vec::with_capacity(64),
        }
    }

    /// Set the per-operation channel timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Encode a message for the wire.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the message cannot be encoded.
    pub fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        match self.format {
            WireFormat::Legacy => message.encode_legacy(),
            WireFormat::Framed => {
                let payload = message.encode()?;
                let payload_len = u32::try_from(payload.len())
                    .ok()
                    .filter(|len| *len <= MAX_PAYLOAD_SIZE)
                    .ok_or_else(|| {
                        SyncError::ProtocolError(format!(
                            "Payload exceeds maximum size: {} > {MAX_PAYLOAD_SIZE}",
                            payload.len()
                        ))
                    })?;
                let mut frame = Vec::with_capacity(FrameHeader::SIZE + payload.len());
                frame.extend_from_slice(&FrameHeader::new(message.msg_type(), payload_len).encode());
                frame.extend_from_slice(&payload);
                Ok(frame)
            }
        }
    }

    /// Write a message to a channel.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if encoding fails and `ChannelSend` if writing
    /// fails.
    pub fn write_message<W: Write + ?Sized>(&self, writer: &mut W, message: &Message) -> Result<()> {
        let bytes = self.encode(message)?;
        send_all(writer, &bytes, self.timeout)
    }

    /// Read one message.
    ///
    /// In legacy format this reads a NUL-terminated text message, so it cannot
    /// return [`Message::BitmapLength`]; use [`Codec::read_bitmap_length`] for
    /// that reply.
    ///
    /// # Errors
    ///
    /// Returns `ChannelReceive` if reading fails and `ProtocolError` if the
    /// message is malformed.
    pub fn read_message<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<Message> {
        match self.format {
            WireFormat::Legacy => {
                self.read_buf.clear();
                let mut byte = [0u8; 1];
                loop {
                    recv_exact(reader, &mut byte, self.timeout)?;
                    if byte[0] == TERMINATOR {
                        break;
                    }
                    if self.read_buf.len() == MAX_LEGACY_TEXT {
                        return Err(SyncError::ProtocolError(format!(
                            "Control message exceeds {MAX_LEGACY_TEXT} bytes without terminator"
                        )));
                    }
                    self.read_buf.push(byte[0]);
                }
                Message::from_legacy(&self.read_buf)
            }
            WireFormat::Framed => {
                let mut header = [0u8; FrameHeader::SIZE];
                recv_exact(reader, &mut header, self.timeout)?;
                let header = FrameHeader::decode(&header)?;

                self.read_buf.resize(header.length as usize, 0);
                recv_exact(reader, &mut self.read_buf, self.timeout)?;
                let message = Message::decode(&self.read_buf)?;
                if message.msg_type() != header.msg_type {
                    return Err(SyncError::ProtocolError(format!(
                        "Frame type {:?} does not match payload {:?}",
                        header.msg_type,
                        message.msg_type()
                    )));
                }
                Ok(message)
            }
        }
    }

    /// Read the peer's bitmap-length announcement.
    ///
    /// Legacy peers send a buffer whose first byte is the length; this performs
    /// a single receive of up to `scratch_len` bytes and discards the rest of
    /// that buffer.
    ///
    /// # Errors
    ///
    /// Returns `ChannelReceive` if the channel fails or closes and
    /// `ProtocolError` if a framed reply is not a bitmap length.
    pub fn read_bitmap_length<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
        scratch_len: usize,
    ) -> Result<usize> {
        match self.format {
            WireFormat::Legacy => {
                self.read_buf.resize(scratch_len.max(1), 0);
                let n = recv_some(reader, &mut self.read_buf, self.timeout)?;
                if n == 0 {
                    return Err(SyncError::ChannelReceive(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "channel closed before bitmap length",
                    )));
                }
                Ok(usize::from(self.read_buf[0]))
            }
            WireFormat::Framed => match self.read_message(reader)? {
                Message::BitmapLength { len } => Ok(len as usize),
                other => Err(SyncError::ProtocolError(format!(
                    "Expected bitmap length, got {:?}",
                    other.msg_type()
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::scripted::{Event, ScriptedChannel};
    use std::io::Cursor;

    // ==========================================================================
    // MESSAGE TYPE TESTS
    // ==========================================================================

    #[test]
    fn message_type_from_u8_valid() {
        assert_eq!(MessageType::from_u8(0x01).unwrap(), MessageType::NoLocalFile);
        assert_eq!(MessageType::from_u8(0x02).unwrap(), MessageType::DigestLength);
        assert_eq!(MessageType::from_u8(0x03).unwrap(), MessageType::BitmapLength);
        assert_eq!(MessageType::from_u8(0x04).unwrap(), MessageType::Ack);
    }

    #[test]
    fn message_type_from_u8_invalid() {
        assert!(MessageType::from_u8(0x00).is_err());
        assert!(MessageType::from_u8(0x05).is_err());
        assert!(MessageType::from_u8(0xFF).is_err());
    }

    // ==========================================================================
    // FRAME HEADER TESTS
    // ==========================================================================

    #[test]
    fn frame_header_encode_decode() {
        let header = FrameHeader::new(MessageType::DigestLength, 9);
        let encoded = header.encode();
        assert_eq!(&encoded[0..4], b"CSYN");
        assert_eq!(FrameHeader::decode(&encoded).unwrap(), header);
    }

    #[test]
    fn frame_header_validate_invalid_magic() {
        let mut header = FrameHeader::new(MessageType::Ack, 4);
        header.magic = *b"XXXX";
        assert!(header.validate().is_err());
    }

    #[test]
    fn frame_header_validate_invalid_version() {
        let mut header = FrameHeader::new(MessageType::Ack, 4);
        header.version = 99;
        assert!(header.validate().is_err());
    }

    #[test]
    fn frame_header_validate_payload_too_large() {
        let header = FrameHeader::new(MessageType::Ack, MAX_PAYLOAD_SIZE + 1);
        assert!(header.validate().is_err());
    }

    // ==========================================================================
    // LEGACY ENCODING TESTS
    // ==========================================================================

    #[test]
    fn legacy_no_local_file_bytes() {
        let bytes = Message::NoLocalFile.encode_legacy().unwrap();
        assert_eq!(bytes, b"local file not exist!\0");
        assert_eq!(bytes.len(), 22);
    }

    #[test]
    fn legacy_digest_length_is_decimal() {
        let bytes = Message::DigestLength { len: 48 }.encode_legacy().unwrap();
        assert_eq!(bytes, b"48\0");
    }

    #[test]
    fn legacy_ack_is_four_bytes() {
        assert_eq!(Message::Ack.encode_legacy().unwrap(), b"ACK\0");
    }

    #[test]
    fn legacy_bitmap_length_single_byte() {
        assert_eq!(
            Message::BitmapLength { len: 200 }.encode_legacy().unwrap(),
            vec![200]
        );
        assert!(Message::BitmapLength { len: 256 }.encode_legacy().is_err());
    }

    #[test]
    fn legacy_parse() {
        assert_eq!(
            Message::from_legacy(b"local file not exist!\0").unwrap(),
            Message::NoLocalFile
        );
        assert_eq!(Message::from_legacy(b"ACK").unwrap(), Message::Ack);
        assert_eq!(
            Message::from_legacy(b"4112\0").unwrap(),
            Message::DigestLength { len: 4112 }
        );
        assert!(Message::from_legacy(b"hello\0").is_err());
        assert!(Message::from_legacy(&[0xFF, 0xFE, 0]).is_err());
    }

    // ==========================================================================
    // CODEC TESTS
    // ==========================================================================

    #[test]
    fn codec_legacy_write_read() {
        let mut codec = Codec::new(WireFormat::Legacy);
        let mut buf = Vec::new();
        codec.write_message(&mut buf, &Message::DigestLength { len: 32 }).unwrap();
        codec.write_message(&mut buf, &Message::Ack).unwrap();
        assert_eq!(buf, b"32\0ACK\0");

        let mut cursor = Cursor::new(buf);
        assert_eq!(
            codec.read_message(&mut cursor).unwrap(),
            Message::DigestLength { len: 32 }
        );
        assert_eq!(codec.read_message(&mut cursor).unwrap(), Message::Ack);
    }

    #[test]
    fn codec_legacy_read_unterminated() {
        let mut codec = Codec::new(WireFormat::Legacy);
        let err = codec.read_message(&mut Cursor::new(b"ACK".to_vec())).unwrap_err();
        assert!(matches!(err, SyncError::ChannelReceive(_)));
    }

    #[test]
    fn codec_legacy_read_overlong() {
        let mut codec = Codec::new(WireFormat::Legacy);
        let err = codec.read_message(&mut Cursor::new(vec![b'9'; 100])).unwrap_err();
        assert!(matches!(err, SyncError::ProtocolError(_)));
    }

    #[test]
    fn codec_framed_multiple_messages() {
        let mut codec = Codec::new(WireFormat::Framed);
        let messages = vec![
            Message::NoLocalFile,
            Message::DigestLength { len: 1 << 40 },
            Message::BitmapLength { len: 70_000 },
            Message::Ack,
        ];

        let mut buf = Vec::new();
        for msg in &messages {
            codec.write_message(&mut buf, msg).unwrap();
        }
        assert_eq!(&buf[0..4], &PROTOCOL_MAGIC);

        let mut cursor = Cursor::new(buf);
        for expected in &messages {
            assert_eq!(&codec.read_message(&mut cursor).unwrap(), expected);
        }
    }

    #[test]
    fn codec_framed_rejects_type_mismatch() {
        let payload = Message::Ack.encode().unwrap();
        #[allow(clippy::cast_possible_truncation)]
        let header = FrameHeader::new(MessageType::NoLocalFile, payload.len() as u32);
        let mut buf = header.encode().to_vec();
        buf.extend_from_slice(&payload);

        let mut codec = Codec::new(WireFormat::Framed);
        let err = codec.read_message(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, SyncError::ProtocolError(_)));
    }

    #[test]
    fn codec_legacy_bitmap_length_uses_first_byte() {
        let mut codec = Codec::new(WireFormat::Legacy);
        let mut channel = ScriptedChannel::new([Event::Data(vec![3, 0, 0, 0]), Event::Data(vec![9])]);
        assert_eq!(codec.read_bitmap_length(&mut channel, 4096).unwrap(), 3);
        // The next segment is untouched.
        assert_eq!(channel.remaining(), 1);
    }

    #[test]
    fn codec_legacy_bitmap_length_closed() {
        let mut codec = Codec::new(WireFormat::Legacy);
        let err = codec
            .read_bitmap_length(&mut ScriptedChannel::new([]), 16)
            .unwrap_err();
        assert!(matches!(err, SyncError::ChannelReceive(_)));
    }

    #[test]
    fn codec_framed_bitmap_length() {
        let mut codec = Codec::new(WireFormat::Framed);
        let mut buf = Vec::new();
        codec
            .write_message(&mut buf, &Message::BitmapLength { len: 300 })
            .unwrap();
        assert_eq!(codec.read_bitmap_length(&mut Cursor::new(buf), 16).unwrap(), 300);

        let mut buf = Vec::new();
        codec.write_message(&mut buf, &Message::Ack).unwrap();
        assert!(codec.read_bitmap_length(&mut Cursor::new(buf), 16).is_err());
    }
}
