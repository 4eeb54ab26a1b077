//! Stop signal for the event pump thread.
//!
//! The signal is the closing of a channel, so the pump notices it while
//! parked on the event stream without polling a flag.

use async_channel::{Receiver, Sender};

/// Closes the pump's stop channel when told to or when dropped.
#[derive(Debug)]
pub(crate) struct PumpStop {
    sender: Sender<()>,
}

impl PumpStop {
    pub(crate) fn new() -> (Self, PumpStopped) {
        let (sender, receiver) = async_channel::bounded(1);
        (Self { sender }, PumpStopped { receiver })
    }

    /// Signals the pump. Returns `false` if it was already signalled.
    pub(crate) fn signal(&self) -> bool {
        self.sender.close()
    }
}

impl Drop for PumpStop {
    fn drop(&mut self) {
        self.sender.close();
    }
}

/// The pump's end of the stop channel.
#[derive(Debug, Clone)]
pub(crate) struct PumpStopped {
    receiver: Receiver<()>,
}

impl PumpStopped {
    #[cfg(test)]
    pub(crate) fn is_signalled(&self) -> bool {
        self.receiver.is_closed()
    }

    /// Resolves once [`PumpStop`] is signalled or dropped.
    pub(crate) async fn wait(&self) {
        // Nothing is ever sent; recv only returns on close.
        let _ = self.receiver.recv().await;
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;

    #[test]
    fn signal_is_observed_once() {
        let (stop, stopped) = PumpStop::new();
        assert!(!stopped.is_signalled());
        assert!(stop.signal());
        assert!(!stop.signal());
        assert!(stopped.is_signalled());
        block_on(stopped.wait());
    }

    #[test]
    fn dropping_the_sender_stops_the_pump() {
        let (stop, stopped) = PumpStop::new();
        drop(stop);
        block_on(stopped.wait());
        assert!(stopped.is_signalled());
    }
}
