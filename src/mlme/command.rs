//! MAC command dispatch for the receive path
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use log::{debug, info, warn};

use ieee802154::mac::command::{Command, AssociationStatus, DisassociationReason};

use crate::packet::Packet;
use crate::radio::RadioControl;

use super::{AssocResponse, AssocState, Mlme, Verdict};

impl <R> Mlme<R>
where
    R: RadioControl,
{
    /// Handle a received MAC command frame
    pub(crate) fn handle_mac_command(&self, p: &Packet) -> Verdict {
        let cmd = match p.as_command() {
            Some(c) => c,
            None => {
                warn!("MAC command frame {} without command payload", p.header.seq);
                return Verdict::Drop;
            }
        };

        match cmd {
            Command::AssociationResponse(short_address, status) => {
                let mut link = self.link.lock();

                if link.state.assoc != AssocState::AwaitingResponse || link.response.is_some() {
                    debug!("Unexpected association response from {:?}", p.header.source);
                    return Verdict::Drop;
                }

                // The pending request commits the link state
                link.response = Some(AssocResponse{ status: status.clone(), short_address: *short_address });

                // Wake the pending request, success or not
                self.assoc_signal.notify_all();

                if *status != AssociationStatus::Successful {
                    debug!("Association response status: {:?}", status);
                    return Verdict::Drop;
                }

                Verdict::Accept
            },
            Command::DisassociationNotification(reason) => {
                if *reason != DisassociationReason::CoordinatorLeave {
                    debug!("Drop disassociation with reason: {:?}", reason);
                    return Verdict::Drop;
                }

                let mut link = self.link.lock();

                if !link.state.is_associated() {
                    debug!("Disassociation while not associated");
                    return Verdict::Drop;
                }

                if self.config.verify_disassociation_source {
                    match &link.state.coordinator {
                        Some(c) if c.matches(&p.header.source) => (),
                        _ => {
                            warn!("Disassociation from unknown source {:?}", p.header.source);
                            return Verdict::Drop;
                        }
                    }
                }

                link.state.assoc = AssocState::Unassociated;

                info!("Coordinator {:?} disassociated us from PAN 0x{:04x}",
                    p.header.source, link.state.pan_id.0);

                Verdict::Accept
            },
            _ => {
                debug!("Drop unsupported MAC command: {:?}", cmd);
                Verdict::Drop
            },
        }
    }
}

#[cfg(test)]
mod test {
    use ieee802154::mac::{Address, ExtendedAddress, PanId, ShortAddress};

    use super::super::test::*;
    use super::super::*;
    use super::*;

    fn params() -> AssociateParams {
        AssociateParams::new(CoordinatorAddress::Extended(COORD), PanId(0x0200), 15)
    }

    fn disassociation(source: Address, reason: DisassociationReason) -> Vec<u8> {
        command(source, Address::Extended(PanId(0x0200), DEVICE), Command::DisassociationNotification(reason))
    }

    #[test]
    fn unsolicited_response_dropped() {
        let (mlme, _radio) = setup(device_config());

        let resp = command(
            Address::Extended(PanId(0x0200), COORD),
            Address::Extended(PanId(0x0200), DEVICE),
            Command::AssociationResponse(ShortAddress(0x0001), AssociationStatus::Successful),
        );

        assert_eq!(mlme.receive(&resp), Verdict::Drop);
        assert_eq!(mlme.assoc_state(), AssocState::Unassociated);
        assert_eq!(mlme.short_address(), NO_SHORT_ADDRESS);
    }

    #[test]
    fn response_recorded_for_pending_request() {
        let (mlme, _radio) = setup(device_config());
        mlme.link.lock().state.assoc = AssocState::AwaitingResponse;

        let resp = command(
            Address::Extended(PanId(0x0200), COORD),
            Address::Extended(PanId(0x0200), DEVICE),
            Command::AssociationResponse(ShortAddress(0x0001), AssociationStatus::Successful),
        );

        assert_eq!(mlme.receive(&resp), Verdict::Accept);

        // Left for the pending request to commit
        assert_eq!(mlme.assoc_state(), AssocState::AwaitingResponse);
        assert_eq!(mlme.link.lock().response, Some(AssocResponse{
            status: AssociationStatus::Successful,
            short_address: ShortAddress(0x0001),
        }));

        // Duplicates are ignored
        assert_eq!(mlme.receive(&resp), Verdict::Drop);
    }

    #[test]
    fn coordinator_disassociation() {
        let (mlme, _radio) = setup(device_config());
        associate(&mlme, &params());

        let coord = Address::Extended(PanId(0x0200), COORD);

        // Device initiated reasons are ignored
        assert_eq!(mlme.receive(&disassociation(coord, DisassociationReason::DeviceLeave)), Verdict::Drop);
        assert!(mlme.is_associated());

        assert_eq!(mlme.receive(&disassociation(coord, DisassociationReason::CoordinatorLeave)), Verdict::Accept);
        assert_eq!(mlme.assoc_state(), AssocState::Unassociated);

        // Link settings remain for later requests
        assert_eq!(mlme.channel(), 15);
        assert_eq!(mlme.pan_id(), PanId(0x0200));

        assert_eq!(mlme.receive(&disassociation(coord, DisassociationReason::CoordinatorLeave)), Verdict::Drop);
    }

    #[test]
    fn disassociation_from_any_source() {
        let (mlme, _radio) = setup(device_config());
        associate(&mlme, &params());

        let other = Address::Extended(PanId(0x0200), ExtendedAddress(0x42));
        assert_eq!(mlme.receive(&disassociation(other, DisassociationReason::CoordinatorLeave)), Verdict::Accept);
        assert!(!mlme.is_associated());
    }

    #[test]
    fn disassociation_source_verified() {
        let (mlme, _radio) = setup(Config{ verify_disassociation_source: true, ..device_config() });
        associate(&mlme, &params());

        let other = Address::Extended(PanId(0x0200), ExtendedAddress(0x42));
        assert_eq!(mlme.receive(&disassociation(other, DisassociationReason::CoordinatorLeave)), Verdict::Drop);
        assert!(mlme.is_associated());

        let coord = Address::Extended(PanId(0x0200), COORD);
        assert_eq!(mlme.receive(&disassociation(coord, DisassociationReason::CoordinatorLeave)), Verdict::Accept);
        assert!(!mlme.is_associated());
    }

    #[test]
    fn disassociation_other_pan_filtered() {
        let (mlme, _radio) = setup(device_config());
        associate(&mlme, &params());

        let d = command(
            Address::Extended(PanId(0x0300), COORD),
            Address::Extended(PanId(0x0300), DEVICE),
            Command::DisassociationNotification(DisassociationReason::CoordinatorLeave),
        );
        assert_eq!(mlme.receive(&d), Verdict::Drop);
        assert!(mlme.is_associated());
    }
}
