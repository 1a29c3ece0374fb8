//! 802.15.4 MAC sublayer management entity (MLME)
//!
//! Scanning, association and parameter management for a single interface.
//! Management requests block the calling thread while the receive path
//! ([`Mlme::receive`]) runs concurrently from a driver or worker thread, so
//! an [`Mlme`] is shared between threads by reference (typically via `Arc`).
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Weak};
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::{trace, debug, warn};
use parking_lot::{Condvar, Mutex};

use ieee802154::mac::{Address, ExtendedAddress, FrameType, PanId, ShortAddress};
use ieee802154::mac::command::AssociationStatus;

use crate::channels::ChannelSet;
use crate::error::MgmtError;
use crate::events::{EventBus, MgmtEvent};
use crate::packet::Packet;
use crate::radio::RadioControl;

pub mod config;
pub use config::Config;

pub mod framer;
pub use framer::Framer;

mod scan;
pub use scan::ScanMode;

mod assoc;
pub use assoc::AssociateParams;

mod command;

mod params;
pub use params::ParamKind;

/// Short address indicating the device has none assigned
pub const NO_SHORT_ADDRESS: ShortAddress = ShortAddress(0xfffe);

/// Outcome of handling a received frame
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Verdict {
    /// Frame consumed by the management plane
    Accept,
    /// Frame discarded
    Drop,
    /// Not a management frame, pass to the upper layer
    Continue,
}

/// Association state
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AssocState {
    Unassociated,
    AwaitingResponse,
    Associated,
}

/// Coordinator address, tagged by length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorAddress {
    Short(ShortAddress),
    Extended(ExtendedAddress),
}

impl CoordinatorAddress {
    /// Parse from raw bytes, a 2-byte little-endian short address or an
    /// 8-byte canonical (big-endian) extended address
    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        match b.len() {
            2 => Some(CoordinatorAddress::Short(ShortAddress(LittleEndian::read_u16(b)))),
            8 => Some(CoordinatorAddress::Extended(ExtendedAddress(BigEndian::read_u64(b)))),
            _ => None,
        }
    }

    /// Source address of a received frame
    pub fn from_address(a: &Address) -> Option<Self> {
        match a {
            Address::Short(_, s) => Some(CoordinatorAddress::Short(*s)),
            Address::Extended(_, e) => Some(CoordinatorAddress::Extended(*e)),
            _ => None,
        }
    }

    /// Address length in bytes
    pub fn len(&self) -> usize {
        match self {
            CoordinatorAddress::Short(_) => 2,
            CoordinatorAddress::Extended(_) => 8,
        }
    }

    /// Raw bytes, in the same order accepted by [`CoordinatorAddress::from_bytes`]
    pub fn to_bytes(&self) -> heapless::Vec<u8, 8> {
        let mut b = [0u8; 8];
        let n = match self {
            CoordinatorAddress::Short(s) => {
                LittleEndian::write_u16(&mut b, s.0);
                2
            },
            CoordinatorAddress::Extended(e) => {
                BigEndian::write_u64(&mut b, e.0);
                8
            },
        };
        let mut v = heapless::Vec::new();
        let _ = v.extend_from_slice(&b[..n]);
        v
    }

    /// MAC address on the provided PAN
    pub fn address(&self, pan_id: PanId) -> Address {
        match self {
            CoordinatorAddress::Short(s) => Address::Short(pan_id, *s),
            CoordinatorAddress::Extended(e) => Address::Extended(pan_id, *e),
        }
    }

    /// Check whether a frame address refers to this coordinator (PAN ignored)
    pub fn matches(&self, a: &Address) -> bool {
        Self::from_address(a).as_ref() == Some(self)
    }
}

/// Snapshot of link state
#[derive(Debug, Clone, PartialEq)]
pub struct LinkState {
    pub channel: u16,
    pub pan_id: PanId,
    pub short_address: ShortAddress,
    pub coordinator: Option<CoordinatorAddress>,
    pub assoc: AssocState,
    pub ack_requested: bool,
}

impl LinkState {
    pub fn is_associated(&self) -> bool {
        self.assoc == AssocState::Associated
    }
}

/// Response recorded by the receive path for a pending association
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AssocResponse {
    pub status: AssociationStatus,
    pub short_address: ShortAddress,
}

#[derive(Debug)]
pub(crate) struct Link {
    pub state: LinkState,
    pub response: Option<AssocResponse>,
}

/// Beacon recorded during a scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    pub pan_id: PanId,
    pub link_quality: u8,
    pub address: CoordinatorAddress,
}

/// Scan request and result storage, owned by the scan caller
#[derive(Debug)]
pub struct ScanContext {
    channels: ChannelSet,
    dwell: Duration,
    channel: AtomicU16,
    result: Mutex<Option<ScanResult>>,
}

impl ScanContext {
    pub fn new(channels: ChannelSet, dwell: Duration) -> Self {
        Self {
            channels,
            dwell,
            channel: AtomicU16::new(0),
            result: Mutex::new(None),
        }
    }

    pub fn channels(&self) -> ChannelSet {
        self.channels
    }

    pub fn dwell(&self) -> Duration {
        self.dwell
    }

    /// Channel currently (or last) being scanned
    pub fn channel(&self) -> Option<u16> {
        match self.channel.load(Ordering::Acquire) {
            0 => None,
            c => Some(c),
        }
    }

    /// Latest beacon recorded, read under the result lock
    pub fn result(&self) -> Option<ScanResult> {
        self.result.lock().clone()
    }

    pub(crate) fn set_channel(&self, channel: u16) {
        self.channel.store(channel, Ordering::Release);
    }
}

/// Cancellation token with an interruptible wait
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<(Mutex<bool>, Condvar)>);

impl CancelToken {
    pub fn cancel(&self) {
        let (m, cv) = &*self.0;
        *m.lock() = true;
        cv.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.0.lock()
    }

    /// Wait for up to `timeout`, returning early (true) on cancellation.
    /// Timeouts beyond the clock range wait for cancellation only.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (m, cv) = &*self.0;
        let deadline = Instant::now().checked_add(timeout);

        let mut cancelled = m.lock();
        while !*cancelled {
            match deadline {
                Some(d) => if cv.wait_until(&mut cancelled, d).timed_out() {
                    break;
                },
                None => cv.wait(&mut cancelled),
            }
        }

        *cancelled
    }

    pub fn same(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Attached scan, non-owning
#[derive(Debug)]
pub(crate) struct ActiveScan {
    pub context: Weak<ScanContext>,
    pub cancel: CancelToken,
}

/// MAC management entity for a single interface
pub struct Mlme<R> {
    config: Config,
    framer: Framer,

    radio: Mutex<R>,

    link: Mutex<Link>,
    assoc_signal: Condvar,
    req_lock: Mutex<()>,

    scan: Mutex<Option<ActiveScan>>,

    events: EventBus,
    running: AtomicBool,
}

impl <R> Mlme<R>
where
    R: RadioControl,
{
    /// Create a management entity, applying the configured channel,
    /// PAN ID and short address to the radio
    pub fn new(config: Config, mut radio: R) -> Result<Self, MgmtError<R::Error>> {
        debug!("Setup MLME for {:?} (address: {:?}, channel: {})",
            config.interface, config.extended_address, config.channel);

        if !crate::channels::is_valid_channel(config.channel) {
            return Err(MgmtError::InvalidArgument);
        }

        radio.set_channel(config.channel).map_err(MgmtError::Device)?;
        radio.set_pan_id(config.pan_id).map_err(MgmtError::Device)?;
        radio.set_short_address(config.short_address).map_err(MgmtError::Device)?;

        let state = LinkState {
            channel: config.channel,
            pan_id: config.pan_id,
            short_address: config.short_address,
            coordinator: None,
            assoc: AssocState::Unassociated,
            ack_requested: false,
        };

        Ok(Self {
            framer: Framer::new(config.max_frame_len),
            config,
            radio: Mutex::new(radio),
            link: Mutex::new(Link{ state, response: None }),
            assoc_signal: Condvar::new(),
            req_lock: Mutex::new(()),
            scan: Mutex::new(None),
            events: EventBus::default(),
            running: AtomicBool::new(true),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch a snapshot of the link state
    pub fn state(&self) -> LinkState {
        self.link.lock().state.clone()
    }

    pub fn channel(&self) -> u16 {
        self.link.lock().state.channel
    }

    pub fn pan_id(&self) -> PanId {
        self.link.lock().state.pan_id
    }

    pub fn short_address(&self) -> ShortAddress {
        self.link.lock().state.short_address
    }

    pub fn coordinator(&self) -> Option<CoordinatorAddress> {
        self.link.lock().state.coordinator
    }

    pub fn assoc_state(&self) -> AssocState {
        self.link.lock().state.assoc
    }

    pub fn is_associated(&self) -> bool {
        self.link.lock().state.is_associated()
    }

    pub fn ack_requested(&self) -> bool {
        self.link.lock().state.ack_requested
    }

    /// Check whether a scan is currently attached
    pub fn is_scanning(&self) -> bool {
        self.scan.lock().is_some()
    }

    /// Subscribe to management events
    pub fn subscribe(&self) -> Receiver<MgmtEvent> {
        self.events.subscribe()
    }

    /// Stop the interface, cancelling any active scan
    pub fn shutdown(&self) -> Result<(), MgmtError<R::Error>> {
        debug!("Shutting down {:?}", self.config.interface);

        self.cancel_scan();
        self.running.store(false, Ordering::Release);

        self.with_radio(|r| r.stop())
    }

    /// Build and transmit a data frame, requesting an ACK when enabled
    pub fn send_data(&self, dest: Address, payload: &[u8]) -> Result<(), MgmtError<R::Error>> {
        let (source, ack) = {
            let link = self.link.lock();
            (self.own_address(&link.state), link.state.ack_requested)
        };

        let frame = self.framer.data(dest, source, payload, ack)
            .ok_or(MgmtError::ResourceExhausted)?;

        trace!("Transmit {} byte data frame to {:?} (ack: {})", frame.len(), dest, ack);

        self.with_radio(|r| r.transmit(&frame))
    }

    /// Handle a received frame from the driver
    pub fn receive(&self, frame: &[u8]) -> Verdict {
        if !self.running.load(Ordering::Acquire) {
            return Verdict::Drop;
        }

        let p = match Packet::decode(frame, self.config.rx_has_footer) {
            Ok(p) => p,
            Err(e) => {
                warn!("Error decoding received frame: {:?}", e);
                return Verdict::Drop;
            }
        };

        trace!("Received {:?} frame {} from {:?}", p.header.frame_type, p.header.seq, p.header.source);

        if !self.address_match(&p) {
            debug!("Address mismatch, dropped frame {} for {:?}", p.header.seq, p.header.destination);
            return Verdict::Drop;
        }

        match p.header.frame_type {
            FrameType::Beacon => self.handle_beacon(&p),
            FrameType::MacCommand => self.handle_mac_command(&p),
            FrameType::Data => Verdict::Continue,
            _ => Verdict::Drop,
        }
    }

    /// Check whether a received frame is addressed to us
    fn address_match(&self, p: &Packet) -> bool {
        let link = self.link.lock();
        let state = &link.state;

        // Filter by PAN ID once associated
        if state.is_associated() {
            if let Some(pan_id) = p.header.destination.pan_id() {
                if pan_id != PanId::broadcast() && pan_id != state.pan_id {
                    return false;
                }
            }
        }

        match p.header.destination {
            Address::Short(_, s) if s == ShortAddress::broadcast() => true,
            Address::Short(_, s) => s != NO_SHORT_ADDRESS && s == state.short_address,
            Address::Extended(_, e) => e == self.config.extended_address,
            // Beacons carry no destination
            _ => p.header.frame_type == FrameType::Beacon,
        }
    }

    /// Our source address, short if assigned
    fn own_address(&self, state: &LinkState) -> Address {
        match state.short_address {
            s if s == NO_SHORT_ADDRESS || s == ShortAddress::broadcast() => {
                Address::Extended(state.pan_id, self.config.extended_address)
            },
            s => Address::Short(state.pan_id, s),
        }
    }

    /// Run a single radio operation under the radio lock
    fn with_radio<T, F>(&self, f: F) -> Result<T, MgmtError<R::Error>>
    where
        F: FnOnce(&mut R) -> Result<T, R::Error>,
    {
        let mut radio = self.radio.lock();
        f(&mut radio).map_err(MgmtError::Device)
    }
}
