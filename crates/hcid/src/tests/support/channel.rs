//! Agent channel double that records outbound PIN requests.

use std::time::Duration;

use crate::agent::AgentChannel;
use crate::bus::{BusError, Message};

#[derive(Debug, Default)]
pub(crate) struct RecordingChannel {
    pub(crate) sent: Vec<(u32, Message, Duration)>,
    pub(crate) cancelled: Vec<u32>,
    pub(crate) disconnected: bool,
    next_serial: u32,
}

impl RecordingChannel {
    pub(crate) fn last_serial(&self) -> Option<u32> {
        self.sent.last().map(|(serial, _, _)| *serial)
    }
}

impl AgentChannel for RecordingChannel {
    fn call(&mut self, message: Message, timeout: Duration) -> Result<u32, BusError> {
        if self.disconnected {
            return Err(BusError::Disconnected);
        }
        self.next_serial += 1;
        self.sent.push((self.next_serial, message, timeout));
        Ok(self.next_serial)
    }

    fn cancel(&mut self, serial: u32) {
        self.cancelled.push(serial);
    }
}
