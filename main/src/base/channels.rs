use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::warn;

pub trait NamedChannelSender {
    type Msg;

    /// Sends the given message if the channel still has space and the
    /// receiver is still connected, otherwise discards it.
    fn send_if_space(&self, msg: Self::Msg);
}

/// A bounded sender whose sends never block.
///
/// Intended for channels that are written from the event path: a full or
/// disconnected channel discards the message instead of blocking the sender.
#[derive(Clone, Debug)]
pub struct SenderToNormalThread<T> {
    channel_name: &'static str,
    sender: Sender<T>,
}

impl<T> NamedChannelSender for SenderToNormalThread<T> {
    type Msg = T;

    fn send_if_space(&self, msg: T) {
        if let Err(TrySendError::Full(_)) = self.sender.try_send(msg) {
            warn!(channel = self.channel_name, "channel full, discarding message");
        }
    }
}

impl<T> SenderToNormalThread<T> {
    pub fn new_bounded_channel(name: &'static str, capacity: usize) -> (Self, Receiver<T>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (
            Self {
                channel_name: name,
                sender,
            },
            receiver,
        )
    }

    pub fn channel_name(&self) -> &'static str {
        self.channel_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_channel_discards_instead_of_blocking() {
        // Given
        let (sender, receiver) = SenderToNormalThread::new_bounded_channel("test", 1);
        // When
        sender.send_if_space(1);
        sender.send_if_space(2);
        // Then
        assert_eq!(receiver.try_recv(), Ok(1));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn disconnected_channel_is_ignored() {
        // Given
        let (sender, receiver) = SenderToNormalThread::new_bounded_channel("test", 1);
        drop(receiver);
        // When
        sender.send_if_space(1);
        // Then no panic.
    }
}
