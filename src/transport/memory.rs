use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::transport::{RouterChannel, TransportError};
use crate::wire::codec::{Frame, Message};

#[derive(Default)]
struct Shared {
    inbound: VecDeque<Message>,
    sent: Vec<Message>,
    unreachable: HashSet<Frame>,
}

pub struct MemoryChannel {
    endpoint: String,
    shared: Arc<Mutex<Shared>>,
}

#[derive(Clone)]
pub struct MemoryPeer {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryChannel {
    pub fn pair(endpoint: &str) -> (Self, MemoryPeer) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                endpoint: format!("inproc://{endpoint}"),
                shared: Arc::clone(&shared),
            },
            MemoryPeer { shared },
        )
    }
}

impl RouterChannel for MemoryChannel {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn poll_readable(&mut self) -> Result<bool, TransportError> {
        Ok(!self
            .shared
            .lock()
            .expect("memory channel lock poisoned")
            .inbound
            .is_empty())
    }

    fn recv(&mut self) -> Result<Option<Message>, TransportError> {
        Ok(self
            .shared
            .lock()
            .expect("memory channel lock poisoned")
            .inbound
            .pop_front())
    }

    fn send(&mut self, message: Message) -> Result<bool, TransportError> {
        let mut shared = self.shared.lock().expect("memory channel lock poisoned");
        match message.first() {
            Some(address) if !shared.unreachable.contains(address) => {
                shared.sent.push(message);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl MemoryPeer {
    pub fn inject(&self, message: Message) {
        self.shared
            .lock()
            .expect("memory channel lock poisoned")
            .inbound
            .push_back(message);
    }

    pub fn take_sent(&self) -> Vec<Message> {
        std::mem::take(&mut self.shared.lock().expect("memory channel lock poisoned").sent)
    }

    pub fn pending_inbound(&self) -> usize {
        self.shared
            .lock()
            .expect("memory channel lock poisoned")
            .inbound
            .len()
    }

    pub fn disconnect(&self, address: Frame) {
        self.shared
            .lock()
            .expect("memory channel lock poisoned")
            .unreachable
            .insert(address);
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryChannel;
    use crate::transport::RouterChannel;

    #[test]
    fn delivers_injected_messages_in_order() {
        let (mut channel, peer) = MemoryChannel::pair("test");
        peer.inject(vec![b"a".to_vec()]);
        peer.inject(vec![b"b".to_vec()]);

        assert!(channel.poll_readable().expect("poll should succeed"));
        assert_eq!(channel.recv().expect("recv"), Some(vec![b"a".to_vec()]));
        assert_eq!(channel.recv().expect("recv"), Some(vec![b"b".to_vec()]));
        assert_eq!(channel.recv().expect("recv"), None);
        assert_eq!(peer.pending_inbound(), 0);
    }

    #[test]
    fn sends_to_disconnected_address_are_dropped() {
        let (mut channel, peer) = MemoryChannel::pair("test");
        peer.disconnect(b"gone".to_vec());

        assert!(channel
            .send(vec![b"here".to_vec(), b"x".to_vec()])
            .expect("send should succeed"));
        assert!(!channel
            .send(vec![b"gone".to_vec(), b"x".to_vec()])
            .expect("send should succeed"));
        assert!(!channel.send(Vec::new()).expect("send should succeed"));

        assert_eq!(peer.take_sent(), vec![vec![b"here".to_vec(), b"x".to_vec()]]);
        assert!(peer.take_sent().is_empty());
    }
}
