//! Out-of-band management events

use std::sync::mpsc::{channel, Receiver, Sender};

use log::trace;
use parking_lot::Mutex;

/// Identifier of the interface raising an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterfaceId(pub u8);

/// Management events delivered to subscribers
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MgmtEvent {
    /// A beacon was recorded in the attached scan context.
    /// Consumers re-read [`crate::mlme::ScanContext::result`] for details.
    ScanResult(InterfaceId),
}

/// Fan-out of events to any number of subscribers
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<MgmtEvent>>>,
}

impl EventBus {
    pub fn subscribe(&self) -> Receiver<MgmtEvent> {
        let (tx, rx) = channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Notify subscribers, dropping any that have hung up
    pub fn notify(&self, event: MgmtEvent) {
        trace!("Notify {:?}", event);

        self.subscribers.lock().retain(|s| s.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fan_out_and_prune() {
        let bus = EventBus::default();

        let a = bus.subscribe();
        let b = bus.subscribe();
        drop(b);

        bus.notify(MgmtEvent::ScanResult(InterfaceId(2)));

        assert_eq!(a.try_recv(), Ok(MgmtEvent::ScanResult(InterfaceId(2))));
        assert_eq!(bus.subscribers.lock().len(), 1);
    }
}
