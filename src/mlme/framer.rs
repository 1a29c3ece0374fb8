use core::sync::atomic::{AtomicU8, Ordering};

use bytes::Bytes;
use rand_core::{OsRng, RngCore};

use ieee802154::mac::{Address, PanId, ShortAddress, WriteFooter};
use ieee802154::mac::command::Command;

use crate::packet::{Packet, ENCODE_BUFF_LEN};

/// Builds encoded, reference counted frames for transmission
#[derive(Debug)]
pub struct Framer {
    seq: AtomicU8,
    max_frame_len: usize,
}

impl Framer {
    /// Create a framer with a randomly seeded data sequence number
    pub fn new(max_frame_len: usize) -> Self {
        Self::with_seq(max_frame_len, OsRng.next_u32() as u8)
    }

    pub fn with_seq(max_frame_len: usize, seq: u8) -> Self {
        Self {
            seq: AtomicU8::new(seq),
            max_frame_len,
        }
    }

    /// Fetch and increment the data sequence number
    pub fn seq(&self) -> u8 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Encode a packet, `None` if it does not fit in a single PSDU
    pub fn encode(&self, packet: &Packet) -> Option<Bytes> {
        let mut buff = [0u8; ENCODE_BUFF_LEN];
        let n = packet.encode(&mut buff, WriteFooter::No);

        if n > self.max_frame_len {
            return None;
        }

        Some(Bytes::copy_from_slice(&buff[..n]))
    }

    /// Build a MAC command frame
    pub fn command(&self, dest: Address, source: Address, ack: bool, command: Command) -> Option<Bytes> {
        let p = Packet::command(dest, source, self.seq(), ack, command);
        self.encode(&p)
    }

    /// Build a broadcast beacon request (no source address, no ACK)
    pub fn beacon_request(&self) -> Option<Bytes> {
        let dest = Address::Short(PanId::broadcast(), ShortAddress::broadcast());
        self.command(dest, Address::None, false, Command::BeaconRequest)
    }

    /// Build a data frame
    pub fn data(&self, dest: Address, source: Address, payload: &[u8], ack: bool) -> Option<Bytes> {
        let p = Packet::data(dest, source, self.seq(), payload, ack)?;
        self.encode(&p)
    }
}
