//! Link parameter management
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use strum::Display;

use ieee802154::mac::{PanId, ShortAddress};

use crate::channels::is_valid_channel;
use crate::error::MgmtError;
use crate::radio::RadioControl;

use super::Mlme;

/// Configurable link parameter
#[derive(Debug, Clone, Copy, PartialEq, Display)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParamKind {
    Channel,
    PanId,
    ShortAddr,
}

impl <R> Mlme<R>
where
    R: RadioControl,
{
    /// Set a link parameter from a raw 2-byte little-endian value
    pub fn set_parameter(&self, kind: ParamKind, value: &[u8]) -> Result<(), MgmtError<R::Error>> {
        if self.is_associated() {
            return Err(MgmtError::Busy);
        }
        if value.len() != 2 {
            return Err(MgmtError::InvalidArgument);
        }

        let v = LittleEndian::read_u16(value);

        match kind {
            ParamKind::Channel => self.set_channel(v),
            ParamKind::PanId => self.set_pan_id(PanId(v)),
            ParamKind::ShortAddr => self.set_short_address(ShortAddress(v)),
        }
    }

    /// Set the operating channel (11..=26)
    pub fn set_channel(&self, channel: u16) -> Result<(), MgmtError<R::Error>> {
        let mut link = self.link.lock();

        if link.state.is_associated() {
            return Err(MgmtError::Busy);
        }
        if !is_valid_channel(channel) {
            return Err(MgmtError::InvalidArgument);
        }
        if link.state.channel == channel {
            return Ok(());
        }

        self.with_radio(|r| r.set_channel(channel))?;
        link.state.channel = channel;

        debug!("Set channel: {}", channel);

        Ok(())
    }

    /// Set the PAN ID
    pub fn set_pan_id(&self, pan_id: PanId) -> Result<(), MgmtError<R::Error>> {
        let mut link = self.link.lock();

        if link.state.is_associated() {
            return Err(MgmtError::Busy);
        }
        if link.state.pan_id == pan_id {
            return Ok(());
        }

        self.with_radio(|r| r.set_pan_id(pan_id))?;
        link.state.pan_id = pan_id;

        debug!("Set PAN ID: 0x{:04x}", pan_id.0);

        Ok(())
    }

    /// Set our short address
    pub fn set_short_address(&self, short_address: ShortAddress) -> Result<(), MgmtError<R::Error>> {
        let mut link = self.link.lock();

        if link.state.is_associated() {
            return Err(MgmtError::Busy);
        }
        if link.state.short_address == short_address {
            return Ok(());
        }

        self.with_radio(|r| r.set_short_address(short_address))?;
        link.state.short_address = short_address;

        debug!("Set short address: 0x{:04x}", short_address.0);

        Ok(())
    }

    /// Enable or disable ACK requests on outgoing data frames
    pub fn set_ack(&self, enabled: bool) {
        self.link.lock().state.ack_requested = enabled;
    }
}
