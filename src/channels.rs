//! 2.4 GHz channel plan helpers
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use bitflags::bitflags;

/// First 2.4 GHz (page 0) channel
pub const FIRST_CHANNEL: u16 = 11;

/// Last 2.4 GHz (page 0) channel
pub const LAST_CHANNEL: u16 = 26;

/// 2.45 GHz Channel Pages
pub const CHANNEL_PAGES_2450: &'static [&'static [u16]] = &[
    // Page 0
    &[11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26],
];

/// Check whether a channel lies within the 2.4 GHz band
pub fn is_valid_channel(channel: u16) -> bool {
    (FIRST_CHANNEL..=LAST_CHANNEL).contains(&channel)
}

bitflags! {
    /// Channel presence bitmap, bit `i` selects channel `11 + i`
    #[derive(Default)]
    pub struct ChannelSet: u16 {
        const CH11 = 1 << 0;
        const CH12 = 1 << 1;
        const CH13 = 1 << 2;
        const CH14 = 1 << 3;
        const CH15 = 1 << 4;
        const CH16 = 1 << 5;
        const CH17 = 1 << 6;
        const CH18 = 1 << 7;
        const CH19 = 1 << 8;
        const CH20 = 1 << 9;
        const CH21 = 1 << 10;
        const CH22 = 1 << 11;
        const CH23 = 1 << 12;
        const CH24 = 1 << 13;
        const CH25 = 1 << 14;
        const CH26 = 1 << 15;
    }
}

impl ChannelSet {
    /// Build a set from a list of channel numbers, `None` if any is out of band
    pub fn from_channels(channels: &[u16]) -> Option<Self> {
        let mut set = ChannelSet::empty();

        for c in channels {
            set.insert(Self::channel(*c)?);
        }

        Some(set)
    }

    /// Single channel flag
    pub fn channel(channel: u16) -> Option<Self> {
        if !is_valid_channel(channel) {
            return None;
        }

        Some(ChannelSet::from_bits_truncate(1 << (channel - FIRST_CHANNEL)))
    }

    /// Check whether the set selects the provided channel
    pub fn includes(&self, channel: u16) -> bool {
        match Self::channel(channel) {
            Some(c) => self.contains(c),
            None => false,
        }
    }

    /// Iterate over selected channels in ascending order
    pub fn channels(&self) -> impl Iterator<Item = u16> {
        let set = *self;
        (FIRST_CHANNEL..=LAST_CHANNEL).filter(move |c| set.includes(*c))
    }
}

#[cfg(test)]
mod test {
    use std::vec::Vec;

    use super::*;

    #[test]
    fn channel_set_ascending() {
        let set = ChannelSet::from_channels(&[20, 11, 15]).unwrap();
        let c: Vec<_> = set.channels().collect();
        assert_eq!(c, vec![11, 15, 20]);

        assert_eq!(set.bits(), (1 << 0) | (1 << 4) | (1 << 9));
    }

    #[test]
    fn channel_set_bounds() {
        assert_eq!(ChannelSet::from_channels(&[10]), None);
        assert_eq!(ChannelSet::from_channels(&[27]), None);

        let all: Vec<_> = ChannelSet::all().channels().collect();
        assert_eq!(all, CHANNEL_PAGES_2450[0].to_vec());
        assert_eq!(ChannelSet::empty().channels().count(), 0);
    }
}
