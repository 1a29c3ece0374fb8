//! IEEE 802.15.4 MAC management plane
//!
//! Channel scanning, association with a PAN coordinator, MAC command
//! handling and link parameter management for LPWAN network stacks.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

pub mod channels;

pub mod error;

pub mod events;

pub mod packet;

pub mod radio;

pub mod mlme;

pub mod request;

pub mod prelude;
