//! Association and disassociation with a PAN coordinator
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use ieee802154::mac::{Address, PanId, ShortAddress};
use ieee802154::mac::command::{
    Command,
    CapabilityInformation,
    AssociationStatus,
    DisassociationReason,
};

use crate::channels::is_valid_channel;
use crate::error::MgmtError;
use crate::radio::RadioControl;

use super::{AssocResponse, AssocState, CoordinatorAddress, Mlme, NO_SHORT_ADDRESS};

/// Association request parameters
#[derive(Debug, Clone, PartialEq)]
pub struct AssociateParams {
    /// Coordinator to associate with
    pub coordinator: CoordinatorAddress,
    /// Coordinator PAN ID
    pub pan_id: PanId,
    /// Coordinator channel
    pub channel: u16,
}

impl AssociateParams {
    pub fn new(coordinator: CoordinatorAddress, pan_id: PanId, channel: u16) -> Self {
        Self { coordinator, pan_id, channel }
    }

    /// Build from a raw coordinator address, the length selects short (2)
    /// or extended (8) addressing
    pub fn from_raw(address: &[u8], pan_id: u16, channel: u16) -> Option<Self> {
        let coordinator = CoordinatorAddress::from_bytes(address)?;
        Some(Self::new(coordinator, PanId(pan_id), channel))
    }
}

/// Capability information sent with association requests
fn capability() -> CapabilityInformation {
    CapabilityInformation {
        // Reduced function device
        full_function_device: false,
        // TODO: placeholders until power management / security / address
        // allocation are configurable
        mains_power: false,
        idle_receive: true,
        frame_protection: false,
        allocate_address: false,
    }
}

impl <R> Mlme<R>
where
    R: RadioControl,
{
    /// Associate with a coordinator, blocking until the coordinator responds
    /// or `assoc_timeout_ms` elapses.
    ///
    /// On success the channel, PAN ID and coordinator address are committed.
    pub fn associate(&self, params: &AssociateParams) -> Result<(), MgmtError<R::Error>> {
        if !is_valid_channel(params.channel) {
            return Err(MgmtError::InvalidArgument);
        }

        // One association in flight per interface
        let _req = self.req_lock.lock();

        debug!("Associating with {:?} on PAN 0x{:04x} channel {}",
            params.coordinator, params.pan_id.0, params.channel);

        let res = self.associate_locked(params);

        // Return to the committed settings on failure
        if res.is_err() {
            let (channel, pan_id) = {
                let mut link = self.link.lock();
                link.state.assoc = AssocState::Unassociated;
                link.response = None;
                (link.state.channel, link.state.pan_id)
            };

            if let Err(e) = self.with_radio(|r| {
                r.set_pan_id(pan_id)?;
                r.set_channel(channel)
            }) {
                warn!("Failed to restore channel {} / PAN 0x{:04x}: {:?}", channel, pan_id.0, e);
            }
        }

        res
    }

    fn associate_locked(&self, params: &AssociateParams) -> Result<(), MgmtError<R::Error>> {
        // Set channel first
        self.with_radio(|r| {
            r.set_channel(params.channel)?;
            r.set_pan_id(params.pan_id)
        })?;

        let dest = params.coordinator.address(params.pan_id);
        let source = Address::Extended(PanId::broadcast(), self.config.extended_address);

        let frame = self.framer.command(dest, source, true, Command::AssociationRequest(capability()))
            .ok_or(MgmtError::ResourceExhausted)?;

        // Clear association and arm the response
        {
            let mut link = self.link.lock();
            link.state.assoc = AssocState::AwaitingResponse;
            link.response = None;
        }

        self.with_radio(|r| r.transmit(&frame))?;

        // Wait for the receive path to deliver a response
        let deadline = Instant::now().checked_add(Duration::from_millis(self.config.assoc_timeout_ms));

        let mut link = self.link.lock();
        while link.response.is_none() {
            match deadline {
                Some(d) => if self.assoc_signal.wait_until(&mut link, d).timed_out() {
                    break;
                },
                None => self.assoc_signal.wait(&mut link),
            }
        }

        // Resolve under the same lock so late responses are never accepted
        let short_address = match link.response.take() {
            Some(AssocResponse{status: AssociationStatus::Successful, short_address}) => short_address,
            Some(r) => {
                link.state.assoc = AssocState::Unassociated;
                warn!("Association denied with status: {:?}", r.status);
                return Err(MgmtError::AccessDenied);
            },
            None => {
                link.state.assoc = AssocState::Unassociated;
                warn!("Association request timed out after {} ms", self.config.assoc_timeout_ms);
                return Err(MgmtError::AccessDenied);
            },
        };

        link.state.assoc = AssocState::Associated;
        link.state.channel = params.channel;
        link.state.pan_id = params.pan_id;
        link.state.coordinator = Some(params.coordinator);
        drop(link);

        info!("Associated with PAN 0x{:04x} via {:?}", params.pan_id.0, params.coordinator);

        // Apply the allocated short address, if any
        if short_address != NO_SHORT_ADDRESS && short_address != ShortAddress::broadcast() {
            match self.with_radio(|r| r.set_short_address(short_address)) {
                Ok(_) => self.link.lock().state.short_address = short_address,
                Err(e) => warn!("Failed to apply short address 0x{:04x}: {:?}", short_address.0, e),
            }
        }

        Ok(())
    }

    /// Notify the coordinator that we are leaving the PAN
    pub fn disassociate(&self) -> Result<(), MgmtError<R::Error>> {
        let (coordinator, pan_id) = {
            let link = self.link.lock();
            match (link.state.assoc, link.state.coordinator) {
                (AssocState::Associated, Some(c)) => (c, link.state.pan_id),
                _ => return Err(MgmtError::AlreadyDone),
            }
        };

        debug!("Disassociating from {:?}", coordinator);

        let dest = coordinator.address(pan_id);
        let source = Address::Extended(pan_id, self.config.extended_address);
        let cmd = Command::DisassociationNotification(DisassociationReason::DeviceLeave);

        let frame = self.framer.command(dest, source, true, cmd)
            .ok_or(MgmtError::ResourceExhausted)?;

        self.with_radio(|r| r.transmit(&frame))?;

        self.link.lock().state.assoc = AssocState::Unassociated;

        info!("Disassociated from PAN 0x{:04x}", pan_id.0);

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::thread;

    use ieee802154::mac::ExtendedAddress;

    use crate::radio::mock::*;
    use super::super::test::*;
    use super::super::*;
    use super::*;

    fn params() -> AssociateParams {
        AssociateParams::new(CoordinatorAddress::Extended(COORD), PanId(0x0200), 20)
    }

    #[test]
    fn associate_success() {
        let (mlme, radio) = setup(device_config());

        let h = respond(mlme.clone(), AssociationStatus::Successful, NO_SHORT_ADDRESS);
        assert_eq!(mlme.associate(&params()), Ok(()));
        assert_eq!(h.join().unwrap(), Verdict::Accept);

        let s = mlme.state();
        assert_eq!(s.assoc, AssocState::Associated);
        assert_eq!(s.channel, 20);
        assert_eq!(s.pan_id, PanId(0x0200));
        assert_eq!(s.coordinator, Some(CoordinatorAddress::Extended(COORD)));
        assert_eq!(s.short_address, NO_SHORT_ADDRESS);

        let calls = radio.calls();
        assert_eq!(calls[0], RadioCall::SetChannel(20));
        assert_eq!(calls[1], RadioCall::SetPanId(0x0200));
        assert_eq!(calls.len(), 3);

        let tx = radio.transmitted();
        let p = decode(&tx[0]);
        assert_eq!(p.header.destination, Address::Extended(PanId(0x0200), COORD));
        assert_eq!(p.header.source, Address::Extended(PanId::broadcast(), DEVICE));
        assert_eq!(p.header.ack_request, true);
        assert_eq!(p.as_command(), Some(&Command::AssociationRequest(capability())));
    }

    #[test]
    fn associate_short_coordinator_assigns_address() {
        let (mlme, radio) = setup(device_config());

        let p = AssociateParams::from_raw(&[0x01, 0x00], 0x0200, 11).unwrap();
        assert_eq!(p.coordinator, CoordinatorAddress::Short(ShortAddress(0x0001)));

        let h = respond(mlme.clone(), AssociationStatus::Successful, ShortAddress(0x1234));
        assert_eq!(mlme.associate(&p), Ok(()));
        h.join().unwrap();

        assert_eq!(mlme.short_address(), ShortAddress(0x1234));
        assert_eq!(mlme.coordinator(), Some(CoordinatorAddress::Short(ShortAddress(0x0001))));
        assert_eq!(radio.calls().last(), Some(&RadioCall::SetShortAddress(0x1234)));

        let tx = decode(&radio.transmitted()[0]);
        assert_eq!(tx.header.destination, Address::Short(PanId(0x0200), ShortAddress(0x0001)));
    }

    #[test]
    fn associate_denied() {
        let (mlme, radio) = setup(Config{ assoc_timeout_ms: 5_000, ..device_config() });

        let start = Instant::now();
        let h = respond(mlme.clone(), AssociationStatus::AccessDenied, NO_SHORT_ADDRESS);
        assert_eq!(mlme.associate(&params()), Err(MgmtError::AccessDenied));
        assert_eq!(h.join().unwrap(), Verdict::Drop);

        // Denial wakes the request without waiting for the timeout
        assert!(start.elapsed() < Duration::from_secs(4));

        let s = mlme.state();
        assert_eq!(s.assoc, AssocState::Unassociated);
        assert_eq!(s.channel, 26);
        assert_eq!(s.pan_id, PanId(0x0100));
        assert_eq!(s.coordinator, None);

        // Radio returned to the committed settings
        let calls = radio.calls();
        assert_eq!(&calls[calls.len() - 2..], &[RadioCall::SetPanId(0x0100), RadioCall::SetChannel(26)]);
    }

    #[test]
    fn associate_timeout() {
        let (mlme, radio) = setup(Config{ assoc_timeout_ms: 50, ..device_config() });

        let start = Instant::now();
        assert_eq!(mlme.associate(&params()), Err(MgmtError::AccessDenied));
        assert!(start.elapsed() >= Duration::from_millis(50));

        assert_eq!(mlme.assoc_state(), AssocState::Unassociated);
        assert_eq!(radio.transmitted().len(), 1);

        // Late responses are ignored
        let late = command(
            Address::Extended(PanId(0x0200), COORD),
            Address::Extended(PanId(0x0200), DEVICE),
            Command::AssociationResponse(NO_SHORT_ADDRESS, AssociationStatus::Successful),
        );
        assert_eq!(mlme.receive(&late), Verdict::Drop);
        assert!(!mlme.is_associated());
    }

    #[test]
    fn associate_send_failure() {
        let (mlme, radio) = setup(device_config());
        radio.fail_transmit(true);

        let start = Instant::now();
        assert_eq!(mlme.associate(&params()), Err(MgmtError::Device(MockError)));
        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(mlme.assoc_state(), AssocState::Unassociated);
    }

    #[test]
    fn associate_channel_failure() {
        let (mlme, radio) = setup(device_config());
        radio.fail_channel(true);

        assert_eq!(mlme.associate(&params()), Err(MgmtError::Device(MockError)));
        assert!(radio.transmitted().is_empty());
    }

    #[test]
    fn associate_frame_too_large() {
        let (mlme, radio) = setup(Config{ max_frame_len: 10, ..device_config() });

        assert_eq!(mlme.associate(&params()), Err(MgmtError::ResourceExhausted));
        assert!(radio.transmitted().is_empty());
        assert_eq!(mlme.assoc_state(), AssocState::Unassociated);
    }

    #[test]
    fn associate_invalid_channel() {
        let (mlme, radio) = setup(device_config());

        let p = AssociateParams::new(CoordinatorAddress::Extended(COORD), PanId(0x0200), 27);
        assert_eq!(mlme.associate(&p), Err(MgmtError::InvalidArgument));
        assert!(radio.calls().is_empty());
    }

    #[test]
    fn associations_serialized() {
        let (mlme, radio) = setup(Config{ assoc_timeout_ms: 100, ..device_config() });

        let m = mlme.clone();
        let a = thread::spawn(move || m.associate(&params()));
        let m = mlme.clone();
        let b = thread::spawn(move || m.associate(&params()));

        assert_eq!(a.join().unwrap(), Err(MgmtError::AccessDenied));
        assert_eq!(b.join().unwrap(), Err(MgmtError::AccessDenied));

        // Second request only sent after the first timed out
        let calls = radio.calls();
        let tx: Vec<usize> = calls.iter().enumerate()
            .filter(|(_, c)| matches!(c, RadioCall::Transmit(_)))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(tx.len(), 2);
        assert_eq!(&calls[tx[0] + 1..tx[0] + 3], &[RadioCall::SetPanId(0x0100), RadioCall::SetChannel(26)]);
    }

    #[test]
    fn disassociate_unassociated() {
        let (mlme, radio) = setup(device_config());

        assert_eq!(mlme.disassociate(), Err(MgmtError::AlreadyDone));
        assert!(radio.calls().is_empty());
    }

    #[test]
    fn disassociate_sends_notification() {
        let (mlme, radio) = setup(device_config());
        associate(&mlme, &params());
        radio.clear();

        assert_eq!(mlme.disassociate(), Ok(()));
        assert!(!mlme.is_associated());

        let tx = radio.transmitted();
        assert_eq!(tx.len(), 1);

        let p = decode(&tx[0]);
        assert_eq!(p.header.destination, Address::Extended(PanId(0x0200), COORD));
        assert_eq!(p.header.source, Address::Extended(PanId(0x0200), DEVICE));
        assert_eq!(p.as_command(), Some(&Command::DisassociationNotification(DisassociationReason::DeviceLeave)));

        assert_eq!(mlme.disassociate(), Err(MgmtError::AlreadyDone));
    }

    #[test]
    fn disassociate_send_failure() {
        let (mlme, radio) = setup(device_config());
        associate(&mlme, &params());
        radio.fail_transmit(true);

        assert_eq!(mlme.disassociate(), Err(MgmtError::Device(MockError)));
        assert!(mlme.is_associated());
    }

    #[test]
    fn raw_params() {
        assert_eq!(AssociateParams::from_raw(&[1, 2, 3], 1, 11), None);

        let p = AssociateParams::from_raw(&[0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff], 0x0200, 20).unwrap();
        assert_eq!(p, params());
        assert_ne!(p.coordinator, CoordinatorAddress::Extended(ExtendedAddress(0)));
    }
}
