//! LPWAN MLME prelude
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

pub use crate::radio::{RadioControl, HalRadio, HalConfig};

pub use crate::error::MgmtError;
pub use crate::events::{InterfaceId, MgmtEvent};
pub use crate::channels::ChannelSet;

pub use crate::mlme::{
    Mlme, Config as MlmeConfig, Verdict, AssocState, LinkState,
    AssociateParams, CoordinatorAddress, ParamKind,
    ScanContext, ScanMode, ScanResult,
};

pub use crate::request::{RequestCode, RequestData};

pub use ieee802154::mac::{Address as MacAddress, PanId, AddressMode, ShortAddress, ExtendedAddress};
