//! Active / passive beacon scanning
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use std::sync::Arc;

use log::{trace, debug, info, warn};

use ieee802154::mac::{Address, PanId};

use crate::error::MgmtError;
use crate::events::MgmtEvent;
use crate::packet::Packet;
use crate::radio::RadioControl;

use super::{ActiveScan, CancelToken, CoordinatorAddress, Mlme, ScanContext, ScanResult, Verdict};

/// Scan mode
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanMode {
    /// Listen for periodic beacons
    Passive,
    /// Transmit a beacon request on each channel
    Active,
}

/// Detaches the scan on drop, unless already cancelled (and possibly replaced)
struct Attached<'a, R: RadioControl> {
    mlme: &'a Mlme<R>,
    cancel: &'a CancelToken,
}

impl <'a, R: RadioControl> Drop for Attached<'a, R> {
    fn drop(&mut self) {
        let mut active = self.mlme.scan.lock();
        if let Some(a) = active.as_ref() {
            if a.cancel.same(self.cancel) {
                *active = None;
            }
        }
    }
}

/// Returns the radio to the committed channel and PAN ID on drop
struct Restore<'a, R: RadioControl> {
    mlme: &'a Mlme<R>,
}

impl <'a, R: RadioControl> Drop for Restore<'a, R> {
    fn drop(&mut self) {
        let (channel, pan_id) = {
            let link = self.mlme.link.lock();
            (link.state.channel, link.state.pan_id)
        };

        if let Err(e) = self.mlme.with_radio(|r| {
            r.set_pan_id(pan_id)?;
            r.set_channel(channel)
        }) {
            warn!("Failed to restore channel {} / PAN 0x{:04x} after scan: {:?}", channel, pan_id.0, e);
        }
    }
}

impl <R> Mlme<R>
where
    R: RadioControl,
{
    /// Scan the channels selected in `ctx`, blocking for `dwell` on each.
    ///
    /// Discovered beacons are written to `ctx` by the receive path and
    /// announced with [`MgmtEvent::ScanResult`]. Channel and PAN ID are
    /// restored on every exit path.
    pub fn scan(&self, mode: ScanMode, ctx: &Arc<ScanContext>) -> Result<(), MgmtError<R::Error>> {
        debug!("{:?} scan requested (channels: {:04x}, dwell: {:?})", mode, ctx.channels().bits(), ctx.dwell());

        // Attach the scan context
        let cancel = CancelToken::default();
        {
            let mut active = self.scan.lock();
            if active.is_some() {
                return Err(MgmtError::AlreadyInProgress);
            }
            *active = Some(ActiveScan{
                context: Arc::downgrade(ctx),
                cancel: cancel.clone(),
            });
        }
        let _attached = Attached{ mlme: self, cancel: &cancel };

        // Build the beacon request up front, shared between channels
        let request = match mode {
            ScanMode::Active => match self.framer.beacon_request() {
                Some(f) => Some(f),
                None => {
                    debug!("Could not create beacon request");
                    return Err(MgmtError::ResourceExhausted);
                },
            },
            ScanMode::Passive => None,
        };

        // Scans and associations share the radio channel, serialize them
        let res = {
            let _req = self.req_lock.lock();

            if cancel.is_cancelled() {
                Err(MgmtError::Cancelled)
            } else {
                self.scan_channels(ctx, &cancel, request.as_ref().map(|f| &f[..]))
            }
        };

        match &res {
            Ok(_) => info!("Scan complete"),
            Err(e) => debug!("Scan ended: {:?}", e),
        }

        res
    }

    fn scan_channels(&self, ctx: &ScanContext, cancel: &CancelToken, request: Option<&[u8]>) -> Result<(), MgmtError<R::Error>> {
        let _restore = Restore{ mlme: self };

        self.with_radio(|r| {
            r.set_pan_id(PanId::broadcast())?;
            r.start()
        })?;

        for channel in ctx.channels().channels() {
            trace!("Scanning channel {}", channel);

            ctx.set_channel(channel);
            self.with_radio(|r| r.set_channel(channel))?;

            // Active scan sends a beacon request
            if let Some(frame) = request {
                self.with_radio(|r| r.transmit(frame))?;
            }

            // Dwell, waking early on cancellation
            if cancel.wait(ctx.dwell()) {
                debug!("Scan request cancelled on channel {}", channel);
                return Err(MgmtError::Cancelled);
            }
        }

        Ok(())
    }

    /// Cancel an active scan, the scan returns [`MgmtError::Cancelled`]
    pub fn cancel_scan(&self) {
        debug!("Cancelling scan request");

        if let Some(a) = self.scan.lock().take() {
            a.cancel.cancel();
        }
    }

    /// Record a beacon from an association-permitting coordinator in the
    /// attached scan context
    pub fn handle_beacon(&self, p: &Packet) -> Verdict {
        let beacon = match p.as_beacon() {
            Some(b) => b,
            None => return Verdict::Drop,
        };

        trace!("Beacon received from {:?}", p.header.source);

        let ctx = match self.scan.lock().as_ref().and_then(|a| a.context.upgrade()) {
            Some(c) => c,
            None => return Verdict::Drop,
        };

        if !beacon.superframe_spec.association_permit {
            trace!("Beacon does not permit association");
            return Verdict::Drop;
        }

        let (pan_id, address) = match p.header.source {
            Address::Short(pan_id, _) | Address::Extended(pan_id, _) => {
                (pan_id, CoordinatorAddress::from_address(&p.header.source))
            },
            _ => return Verdict::Drop,
        };
        let address = match address {
            Some(a) => a,
            None => return Verdict::Drop,
        };

        {
            let mut result = ctx.result.lock();
            let link_quality = self.radio.lock().get_link_quality();

            debug!("Scan result on channel {:?}: PAN 0x{:04x} {:?} (lqi: {})",
                ctx.channel(), pan_id.0, address, link_quality);

            *result = Some(ScanResult{
                pan_id,
                link_quality,
                address,
            });
        }

        self.events.notify(MgmtEvent::ScanResult(self.config.interface));

        Verdict::Accept
    }
}
