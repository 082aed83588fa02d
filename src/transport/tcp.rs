use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};

use uuid::Uuid;

use crate::address::BINARY_ADDRESS_LEN;
use crate::transport::{parse_endpoint, RouterChannel, TransportError};
use crate::wire::codec::{
    encode_message, Frame, Message, MessageReader, LENGTH_PREFIX_SIZE_BYTES,
    MAX_MESSAGE_SIZE_BYTES,
};

const READ_CHUNK_SIZE_BYTES: usize = 16 * 1024;
const MAX_PENDING_INBOUND_MESSAGES: usize = 1000;
const MAX_PENDING_OUTBOUND_BYTES: usize = 4 * 1024 * 1024;
// Enough to always hold one complete message of the largest size.
const MAX_BUFFERED_INBOUND_BYTES: usize = LENGTH_PREFIX_SIZE_BYTES + MAX_MESSAGE_SIZE_BYTES;

pub fn generate_peer_address() -> Frame {
    let mut address = Vec::with_capacity(BINARY_ADDRESS_LEN);
    address.push(0);
    address.extend_from_slice(Uuid::new_v4().as_bytes());
    address
}

struct Peer {
    stream: TcpStream,
    reader: MessageReader,
    outbound: Vec<u8>,
    queued: usize,
    closed: bool,
}

impl Peer {
    fn new(stream: TcpStream) -> Result<Self, TransportError> {
        stream
            .set_nodelay(true)
            .map_err(|source| TransportError::ConfigureAcceptedStream { source })?;
        stream
            .set_nonblocking(true)
            .map_err(|source| TransportError::ConfigureAcceptedStream { source })?;

        Ok(Self {
            stream,
            reader: MessageReader::new(),
            outbound: Vec::new(),
            queued: 0,
            closed: false,
        })
    }

    fn flush(&mut self) {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => {
                    self.closed = true;
                    return;
                }
                Ok(written) => {
                    self.outbound.drain(..written);
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => return,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => {
                    self.closed = true;
                    return;
                }
            }
        }
    }

    fn read_available(&mut self) -> Vec<Message> {
        let mut chunk = [0_u8; READ_CHUNK_SIZE_BYTES];
        // Past either cap the socket is left unread and TCP pushes back on the sender.
        while self.queued < MAX_PENDING_INBOUND_MESSAGES
            && self.reader.buffered_len() < MAX_BUFFERED_INBOUND_BYTES
        {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.closed = true;
                    break;
                }
                Ok(size) => self.reader.extend(&chunk[..size]),
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => {
                    self.closed = true;
                    break;
                }
            }
        }

        let mut messages = Vec::new();
        while self.closed || self.queued + messages.len() < MAX_PENDING_INBOUND_MESSAGES {
            match self.reader.next_message() {
                Ok(Some(message)) => messages.push(message),
                Ok(None) => break,
                Err(_) => {
                    // A framing error leaves the stream unsynchronised.
                    self.closed = true;
                    break;
                }
            }
        }
        self.queued += messages.len();
        messages
    }

    fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

pub struct TcpRouter {
    endpoint: String,
    listener: TcpListener,
    peers: HashMap<Frame, Peer>,
    inbound: VecDeque<Message>,
}

impl TcpRouter {
    pub fn bind(endpoint: &str) -> Result<Self, TransportError> {
        let address = parse_endpoint(endpoint)?;
        let listener = TcpListener::bind(&address).map_err(|source| TransportError::Bind {
            address: address.clone(),
            source,
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| TransportError::SetNonBlocking { source })?;

        Ok(Self {
            endpoint: endpoint.to_owned(),
            listener,
            peers: HashMap::new(),
            inbound: VecDeque::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    #[cfg(test)]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    #[cfg(test)]
    fn pending_outbound_bytes(&self, address: &[u8]) -> Option<usize> {
        self.peers.get(address).map(|peer| peer.outbound.len())
    }

    fn accept_pending(&mut self) -> Result<(), TransportError> {
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    let peer = Peer::new(stream)?;
                    self.peers.insert(generate_peer_address(), peer);
                }
                Err(source) if source.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(source) if source.kind() == io::ErrorKind::Interrupted => {}
                Err(source) => return Err(TransportError::Accept { source }),
            }
        }
    }

    fn pump(&mut self) -> Result<(), TransportError> {
        self.accept_pending()?;

        for (address, peer) in self.peers.iter_mut() {
            peer.flush();
            for mut message in peer.read_available() {
                message.insert(0, address.clone());
                self.inbound.push_back(message);
            }
        }

        self.peers.retain(|_, peer| {
            if peer.closed {
                peer.shutdown();
            }
            !peer.closed
        });

        Ok(())
    }
}

impl RouterChannel for TcpRouter {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn poll_readable(&mut self) -> Result<bool, TransportError> {
        self.pump()?;
        Ok(!self.inbound.is_empty())
    }

    fn recv(&mut self) -> Result<Option<Message>, TransportError> {
        if self.inbound.is_empty() {
            self.pump()?;
        }

        let message = self.inbound.pop_front();
        if let Some(peer) = message
            .as_ref()
            .and_then(|message| message.first())
            .and_then(|address| self.peers.get_mut(address))
        {
            peer.queued -= 1;
        }
        Ok(message)
    }

    fn send(&mut self, mut message: Message) -> Result<bool, TransportError> {
        if message.is_empty() {
            return Ok(false);
        }

        let address = message.remove(0);
        let Some(peer) = self.peers.get_mut(&address) else {
            return Ok(false);
        };
        peer.flush();
        if peer.outbound.len() >= MAX_PENDING_OUTBOUND_BYTES {
            return Ok(false);
        }

        let encoded = encode_message(&message).map_err(TransportError::Encode)?;
        peer.outbound.extend_from_slice(&encoded);
        peer.flush();
        Ok(true)
    }
}

impl Drop for TcpRouter {
    fn drop(&mut self) {
        for peer in self.peers.values() {
            peer.shutdown();
        }
    }
}
