//! Numeric management request surface
//!
//! Requests are selected by code and return `0` on success or a negative
//! errno value, for integration with network management shells and IPC.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use std::sync::Arc;

use log::{debug, warn};
use strum::{Display, FromRepr};

use crate::error::{MgmtError, EINVAL};
use crate::mlme::{AssociateParams, Mlme, ParamKind, ScanContext, ScanMode};
use crate::radio::RadioControl;

/// Management request codes
#[derive(Debug, Clone, Copy, PartialEq, Display, FromRepr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum RequestCode {
    SetAck = 1,
    UnsetAck = 2,
    PassiveScan = 3,
    ActiveScan = 4,
    CancelScan = 5,
    Associate = 6,
    Disassociate = 7,
    SetChan = 8,
    SetPanId = 9,
    SetShortAddr = 10,
}

/// Request payloads
#[derive(Debug, Clone, Copy)]
pub enum RequestData<'a> {
    None,
    /// Scan context, retained by the caller to read results
    Scan(&'a Arc<ScanContext>),
    Associate(&'a AssociateParams),
    /// Raw 2-byte parameter value
    Value(&'a [u8]),
}

impl <R> Mlme<R>
where
    R: RadioControl,
{
    /// Execute a management request by numeric code, returning 0 or a
    /// negative errno
    pub fn request(&self, code: u32, data: RequestData) -> i32 {
        let code = match RequestCode::from_repr(code) {
            Some(c) => c,
            None => {
                warn!("Unknown management request: {}", code);
                return -EINVAL;
            }
        };

        match self.handle(code, data) {
            Ok(_) => 0,
            Err(e) => {
                debug!("Request {} failed: {}", code, e);
                e.errno()
            }
        }
    }

    /// Execute a typed management request
    pub fn handle(&self, code: RequestCode, data: RequestData) -> Result<(), MgmtError<R::Error>> {
        debug!("Handle request {} ({:?})", code, self.config().interface);

        match (code, data) {
            (RequestCode::SetAck, RequestData::None) => {
                self.set_ack(true);
                Ok(())
            },
            (RequestCode::UnsetAck, RequestData::None) => {
                self.set_ack(false);
                Ok(())
            },
            (RequestCode::PassiveScan, RequestData::Scan(ctx)) => self.scan(ScanMode::Passive, ctx),
            (RequestCode::ActiveScan, RequestData::Scan(ctx)) => self.scan(ScanMode::Active, ctx),
            (RequestCode::CancelScan, RequestData::None) => {
                self.cancel_scan();
                Ok(())
            },
            (RequestCode::Associate, RequestData::Associate(p)) => self.associate(p),
            (RequestCode::Disassociate, RequestData::None) => self.disassociate(),
            (RequestCode::SetChan, RequestData::Value(v)) => self.set_parameter(ParamKind::Channel, v),
            (RequestCode::SetPanId, RequestData::Value(v)) => self.set_parameter(ParamKind::PanId, v),
            (RequestCode::SetShortAddr, RequestData::Value(v)) => self.set_parameter(ParamKind::ShortAddr, v),
            (code, data) => {
                warn!("Invalid payload for request {}: {:?}", code, data);
                Err(MgmtError::InvalidArgument)
            },
        }
    }
}
