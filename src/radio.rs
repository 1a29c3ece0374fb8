//! Radio control seam used by the management plane
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use core::convert::TryFrom;
use core::fmt::Debug;
use std::time::{Duration, Instant};

use log::{trace, debug};

use ieee802154::mac::{PanId, ShortAddress};
use radio::{State, Transmit, Receive, Channel, Rssi, RadioState};

/// Radio control interface required by the MAC management plane
pub trait RadioControl {
    type Error: Debug;

    /// Link quality indicator for the most recently received frame
    fn get_link_quality(&mut self) -> u8;

    /// Switch to the provided 2.4 GHz channel (11..=26)
    fn set_channel(&mut self, channel: u16) -> Result<(), Self::Error>;

    /// Set the PAN ID used for frame filtering
    fn set_pan_id(&mut self, pan_id: PanId) -> Result<(), Self::Error>;

    /// Set the short address used for frame filtering
    fn set_short_address(&mut self, address: ShortAddress) -> Result<(), Self::Error>;

    /// Power up and start receiving
    fn start(&mut self) -> Result<(), Self::Error>;

    /// Stop the radio
    fn stop(&mut self) -> Result<(), Self::Error>;

    /// Transmit an encoded frame, blocking until complete
    fn transmit(&mut self, frame: &[u8]) -> Result<(), Self::Error>;
}

/// Configuration for [`HalRadio`]
#[derive(Clone, PartialEq, Debug)]
pub struct HalConfig {
    /// Maximum time to wait for a transmission to complete
    pub tx_timeout_ms: u32,

    /// RSSI mapped to a link quality of zero
    pub lqi_rssi_floor: i16,

    /// RSSI mapped to a link quality of 255
    pub lqi_rssi_ceiling: i16,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            tx_timeout_ms: 100,
            lqi_rssi_floor: -100,
            lqi_rssi_ceiling: -20,
        }
    }
}

/// Errors from the [`HalRadio`] adapter
#[derive(Debug, Clone, PartialEq)]
pub enum HalError<E> {
    /// Wrapper for underlying radio errors
    Radio(E),

    /// Transmission did not complete within the configured timeout
    Timeout,

    /// Channel not representable by the driver
    InvalidChannel(u16),
}

/// Adapter providing [`RadioControl`] over `radio` HAL drivers
///
/// `radio` devices do not implement address filtering, PAN ID and short
/// address updates are recorded here only. Frame filtering is done by
/// [`crate::mlme::Mlme::receive`] against the committed link state.
#[derive(Debug)]
pub struct HalRadio<R> {
    radio: R,
    config: HalConfig,

    pan_id: PanId,
    short_address: ShortAddress,
}

impl <R> HalRadio<R> {
    pub fn new(radio: R, config: HalConfig) -> Self {
        Self {
            radio,
            config,
            pan_id: PanId::broadcast(),
            short_address: ShortAddress(0xfffe),
        }
    }

    /// PAN ID last applied
    pub fn pan_id(&self) -> PanId {
        self.pan_id
    }

    /// Short address last applied
    pub fn short_address(&self) -> ShortAddress {
        self.short_address
    }

    /// Release the wrapped driver
    pub fn inner(self) -> R {
        self.radio
    }
}

/// Scale an RSSI reading linearly onto the 0..=255 LQI range
pub fn rssi_to_lqi(rssi: i16, floor: i16, ceiling: i16) -> u8 {
    if ceiling <= floor || rssi <= floor {
        return 0;
    }
    if rssi >= ceiling {
        return 255;
    }

    let span = (ceiling - floor) as i32;
    ((rssi - floor) as i32 * 255 / span) as u8
}

impl <R, S, C, E> RadioControl for HalRadio<R>
where
    R: State<State=S, Error=E> + Transmit<Error=E> + Receive<Error=E> + Channel<Channel=C, Error=E> + Rssi<Error=E>,
    S: RadioState,
    C: TryFrom<u16>,
    E: Debug,
{
    type Error = HalError<E>;

    fn get_link_quality(&mut self) -> u8 {
        match self.radio.poll_rssi() {
            Ok(rssi) => rssi_to_lqi(rssi, self.config.lqi_rssi_floor, self.config.lqi_rssi_ceiling),
            Err(e) => {
                debug!("RSSI poll failed: {:?}", e);
                0
            }
        }
    }

    fn set_channel(&mut self, channel: u16) -> Result<(), Self::Error> {
        trace!("Set channel {}", channel);
        let c = C::try_from(channel).map_err(|_| HalError::InvalidChannel(channel))?;
        self.radio.set_channel(&c).map_err(HalError::Radio)
    }

    fn set_pan_id(&mut self, pan_id: PanId) -> Result<(), Self::Error> {
        trace!("Record PAN ID 0x{:04x}", pan_id.0);
        self.pan_id = pan_id;
        Ok(())
    }

    fn set_short_address(&mut self, address: ShortAddress) -> Result<(), Self::Error> {
        trace!("Record short address 0x{:04x}", address.0);
        self.short_address = address;
        Ok(())
    }

    fn start(&mut self) -> Result<(), Self::Error> {
        self.radio.start_receive().map_err(HalError::Radio)
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        self.radio.set_state(S::sleep()).map_err(HalError::Radio)
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<(), Self::Error> {
        let deadline = Instant::now() + Duration::from_millis(self.config.tx_timeout_ms as u64);

        self.radio.start_transmit(frame).map_err(HalError::Radio)?;

        // Poll for completion
        while !self.radio.check_transmit().map_err(HalError::Radio)? {
            if Instant::now() >= deadline {
                debug!("Transmit timeout ({} bytes)", frame.len());
                return Err(HalError::Timeout);
            }
            std::thread::sleep(Duration::from_micros(250));
        }

        // Return to receive for responses
        self.radio.start_receive().map_err(HalError::Radio)
    }
}

#[cfg(any(test, feature="mocks"))]
pub mod mock {
    use std::sync::{Arc, Mutex};
    use std::vec::Vec;

    use ieee802154::mac::{PanId, ShortAddress};

    /// Radio operations recorded by [`MockRadio`]
    #[derive(Debug, Clone, PartialEq)]
    pub enum RadioCall {
        SetChannel(u16),
        SetPanId(u16),
        SetShortAddress(u16),
        Start,
        Stop,
        Transmit(Vec<u8>),
        GetLinkQuality,
    }

    /// Error injected by [`MockRadio`]
    #[derive(Debug, Clone, PartialEq)]
    pub struct MockError;

    #[derive(Debug, Default)]
    struct Inner {
        calls: Vec<RadioCall>,
        lqi: u8,
        fail_channel: bool,
        fail_pan_id: bool,
        fail_short_address: bool,
        fail_start: bool,
        fail_transmit: bool,
        panic_transmit: bool,
    }

    /// Mock radio implementation to assist with testing
    ///
    /// Clones share state, so a test can keep a handle while the radio is
    /// owned by the MAC.
    #[derive(Clone, Debug)]
    pub struct MockRadio (Arc<Mutex<Inner>>);

    impl MockRadio {
        pub fn new() -> Self {
            Self(Arc::new(Mutex::new(Inner::default())))
        }

        /// Recorded calls since the last [`MockRadio::clear`]
        pub fn calls(&self) -> Vec<RadioCall> {
            self.0.lock().unwrap().calls.clone()
        }

        /// Recorded transmissions
        pub fn transmitted(&self) -> Vec<Vec<u8>> {
            self.calls().into_iter().filter_map(|c| match c {
                RadioCall::Transmit(d) => Some(d),
                _ => None,
            }).collect()
        }

        /// Recorded channel changes
        pub fn channels(&self) -> Vec<u16> {
            self.calls().into_iter().filter_map(|c| match c {
                RadioCall::SetChannel(c) => Some(c),
                _ => None,
            }).collect()
        }

        pub fn clear(&self) {
            self.0.lock().unwrap().calls.clear();
        }

        pub fn set_lqi(&self, lqi: u8) {
            self.0.lock().unwrap().lqi = lqi;
        }

        pub fn fail_channel(&self, fail: bool) {
            self.0.lock().unwrap().fail_channel = fail;
        }

        pub fn fail_pan_id(&self, fail: bool) {
            self.0.lock().unwrap().fail_pan_id = fail;
        }

        pub fn fail_short_address(&self, fail: bool) {
            self.0.lock().unwrap().fail_short_address = fail;
        }

        pub fn fail_start(&self, fail: bool) {
            self.0.lock().unwrap().fail_start = fail;
        }

        pub fn fail_transmit(&self, fail: bool) {
            self.0.lock().unwrap().fail_transmit = fail;
        }

        /// Panic inside `transmit`, as a faulty driver might
        pub fn panic_transmit(&self, panic: bool) {
            self.0.lock().unwrap().panic_transmit = panic;
        }

        fn record(&self, call: RadioCall, fail: impl Fn(&Inner) -> bool) -> Result<(), MockError> {
            let mut i = self.0.lock().unwrap();
            i.calls.push(call);
            match fail(&i) {
                true => Err(MockError),
                false => Ok(()),
            }
        }
    }

    impl super::RadioControl for MockRadio {
        type Error = MockError;

        fn get_link_quality(&mut self) -> u8 {
            let mut i = self.0.lock().unwrap();
            i.calls.push(RadioCall::GetLinkQuality);
            i.lqi
        }

        fn set_channel(&mut self, channel: u16) -> Result<(), MockError> {
            self.record(RadioCall::SetChannel(channel), |i| i.fail_channel)
        }

        fn set_pan_id(&mut self, pan_id: PanId) -> Result<(), MockError> {
            self.record(RadioCall::SetPanId(pan_id.0), |i| i.fail_pan_id)
        }

        fn set_short_address(&mut self, address: ShortAddress) -> Result<(), MockError> {
            self.record(RadioCall::SetShortAddress(address.0), |i| i.fail_short_address)
        }

        fn start(&mut self) -> Result<(), MockError> {
            self.record(RadioCall::Start, |i| i.fail_start)
        }

        fn stop(&mut self) -> Result<(), MockError> {
            self.record(RadioCall::Stop, |_| false)
        }

        fn transmit(&mut self, frame: &[u8]) -> Result<(), MockError> {
            if self.0.lock().unwrap().panic_transmit {
                panic!("mock radio transmit panic");
            }
            self.record(RadioCall::Transmit(frame.to_vec()), |i| i.fail_transmit)
        }
    }
}

#[cfg(test)]
mod test {
    use ::radio::mock::{MockRadio as HalMock, MockState, Transaction};

    use super::*;

    fn hal(radio: &HalMock, tx_timeout_ms: u32) -> HalRadio<HalMock> {
        HalRadio::new(radio.clone(), HalConfig{ tx_timeout_ms, ..Default::default() })
    }

    #[test]
    fn hal_transmit_polls_for_completion() {
        let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, simplelog::Config::default());

        let mut radio = HalMock::new(&[]);
        let mut h = hal(&radio, 100);

        radio.expect(&[
            Transaction::start_transmit(vec![0x01, 0x02, 0x03], None),
            Transaction::check_transmit(Ok(false)),
            Transaction::check_transmit(Ok(true)),
            // Back to receive for responses
            Transaction::start_receive(None),
        ]);

        assert!(h.transmit(&[0x01, 0x02, 0x03]).is_ok());
        radio.done();
    }

    #[test]
    fn hal_transmit_timeout() {
        let mut radio = HalMock::new(&[]);
        let mut h = hal(&radio, 0);

        radio.expect(&[
            Transaction::start_transmit(vec![0xaa], None),
            Transaction::check_transmit(Ok(false)),
        ]);

        assert!(matches!(h.transmit(&[0xaa]), Err(HalError::Timeout)));
        radio.done();
    }

    #[test]
    fn hal_start_stop() {
        let mut radio = HalMock::new(&[]);
        let mut h = hal(&radio, 100);

        radio.expect(&[
            Transaction::start_receive(None),
            Transaction::set_state(MockState::Sleep, None),
        ]);

        assert!(h.start().is_ok());
        assert!(h.stop().is_ok());
        radio.done();
    }

    #[test]
    fn hal_link_quality() {
        let mut radio = HalMock::new(&[]);
        let mut h = hal(&radio, 100);

        radio.expect(&[
            Transaction::poll_rssi(Ok(-60i16)),
            Transaction::poll_rssi(Ok(-120i16)),
        ]);

        assert_eq!(h.get_link_quality(), 127);
        assert_eq!(h.get_link_quality(), 0);
        radio.done();
    }

    #[test]
    fn hal_address_updates() {
        let mut radio = HalMock::new(&[]);
        let mut h = hal(&radio, 100);

        assert!(h.set_pan_id(PanId(0x1234)).is_ok());
        assert!(h.set_short_address(ShortAddress(0x0042)).is_ok());

        // Recorded only, the driver is not touched
        assert_eq!(h.pan_id(), PanId(0x1234));
        assert_eq!(h.short_address(), ShortAddress(0x0042));
        radio.done();
    }

    #[test]
    fn lqi_scaling() {
        assert_eq!(rssi_to_lqi(-110, -100, -20), 0);
        assert_eq!(rssi_to_lqi(-100, -100, -20), 0);
        assert_eq!(rssi_to_lqi(-60, -100, -20), 127);
        assert_eq!(rssi_to_lqi(-20, -100, -20), 255);
        assert_eq!(rssi_to_lqi(0, -100, -20), 255);
        assert_eq!(rssi_to_lqi(-50, -20, -100), 0);
    }
}
