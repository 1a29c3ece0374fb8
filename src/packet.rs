//! Owned IEEE 802.15.4 frame
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use ieee802154::mac::*;
use ieee802154::mac::{beacon::Beacon, command::Command};

use heapless::Vec;

/// Maximum MAC payload carried by a [`Packet`] (aMaxPHYPacketSize)
pub const MAX_PAYLOAD_LEN: usize = 127;

/// Scratch buffer size used when encoding, large enough for any header + payload
pub const ENCODE_BUFF_LEN: usize = 256;

/// Packet object represents an IEEE 802.15.4 object with owned storage.
///
/// Based on https://docs.rs/ieee802154/0.3.0/ieee802154/mac/frame/struct.Frame.html
/// altered for static / owned storage via heapless
#[derive(Clone, Debug)]
pub struct Packet {
    pub header: Header,

    pub content: FrameContent,

    payload: Vec<u8, MAX_PAYLOAD_LEN>,

    pub footer: [u8; 2],
}

impl PartialEq for Packet {
    fn eq(&self, o: &Self) -> bool {
        self.header == o.header &&
        self.content == o.content &&
        self.payload() == o.payload() &&
        self.footer == o.footer
    }
}

/// Frame header without security or information elements
fn header(frame_type: FrameType, dest: Address, source: Address, seq: u8, ack: bool) -> Header {
    Header {
        frame_type,
        frame_pending: false,
        security: Security::None,
        ack_request: ack,
        pan_id_compress: false,
        version: FrameVersion::Ieee802154_2006,
        destination: dest,
        source,
        seq,
        seq_no_suppress: false,
        ie_present: false,
    }
}

impl Packet {
    fn new(header: Header, content: FrameContent, payload: Vec<u8, MAX_PAYLOAD_LEN>) -> Packet {
        Packet { header, content, payload, footer: [0u8; 2] }
    }

    /// Build a beacon frame, beacons carry no destination
    pub fn beacon(source: Address, seq: u8, beacon: Beacon) -> Packet {
        let h = header(FrameType::Beacon, Address::None, source, seq, false);
        Self::new(h, FrameContent::Beacon(beacon), Vec::new())
    }

    /// Build a MAC command frame
    pub fn command(dest: Address, source: Address, seq: u8, ack: bool, command: Command) -> Packet {
        let h = header(FrameType::MacCommand, dest, source, seq, ack);
        Self::new(h, FrameContent::Command(command), Vec::new())
    }

    /// Build a data frame, `None` if the payload exceeds [`MAX_PAYLOAD_LEN`]
    pub fn data(dest: Address, source: Address, seq: u8, data: &[u8], ack: bool) -> Option<Packet> {
        let payload = Vec::from_slice(data).ok()?;
        let h = header(FrameType::Data, dest, source, seq, ack);

        Some(Self::new(h, FrameContent::Data, payload))
    }

    /// Command view of a MAC command frame
    pub fn as_command(&self) -> Option<&Command> {
        match &self.content {
            FrameContent::Command(c) if self.header.frame_type == FrameType::MacCommand => Some(c),
            _ => None,
        }
    }

    /// Beacon view of a beacon frame
    pub fn as_beacon(&self) -> Option<&Beacon> {
        match &self.content {
            FrameContent::Beacon(b) if self.header.frame_type == FrameType::Beacon => Some(b),
            _ => None,
        }
    }

    // Based on https://docs.rs/ieee802154/0.3.0/ieee802154/mac/frame/struct.Frame.html#method.encode
    pub fn encode(&self, buf: &mut [u8], write_footer: WriteFooter) -> usize {
        let mut len = 0;

        // Write header
        len += self.header.encode(&mut buf[len..]);

        // Write content
        len += self.content.encode(&mut buf[len..]);

        // Write payload
        buf[len .. len+self.payload.len()].copy_from_slice(&self.payload);

        len += self.payload.len();

        // Write footer
        match write_footer {
            WriteFooter::No => (),
        }
        len
    }

    // Based on https://docs.rs/ieee802154/0.3.0/ieee802154/mac/frame/struct.Frame.html#method.decode
    pub fn decode(buf: &[u8], contains_footer: bool) -> Result<Self, DecodeError> {
        // First decode header
        let (header, header_len) = Header::decode(buf)?;
        let mut body_end = buf.len();

        // If there's a footer, decode this
        let mut footer = [0; 2];
        if contains_footer {
            if body_end < header_len + 2 {
                return Err(DecodeError::NotEnoughBytes);
            }

            body_end -= 2;
            footer.copy_from_slice(&buf[body_end..]);
        }

        // Fetch the body subslice
        let body = &buf[header_len..body_end];

        // Decode the FrameContent
        let (content, used) = FrameContent::decode(body, &header)?;

        // Copy out the payload
        let payload = Vec::from_slice(&body[used..]).map_err(|_e| DecodeError::NotEnoughBytes)?;

        Ok(Packet {
            header,
            content,
            payload,
            footer,
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl From<&Packet> for std::vec::Vec<u8> {
    fn from(p: &Packet) -> std::vec::Vec<u8> {
        let mut buff = [0u8; ENCODE_BUFF_LEN];
        let n = p.encode(&mut buff, WriteFooter::No);
        buff[..n].to_vec()
    }
}
