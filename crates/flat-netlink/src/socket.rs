//! Request/response exchange over a NETLINK_ROUTE socket
//!
//! Every request opens its own socket, so concurrent callers never see each
//! other's replies.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};

use netlink_packet_core::{NLM_F_ACK, NLM_F_DUMP, NetlinkMessage, NetlinkPayload};
use netlink_packet_route::RtnlMessage;
use netlink_sys::protocols::NETLINK_ROUTE;
use netlink_sys::{Socket, SocketAddr};
use thiserror::Error;

/// Failure of one rtnetlink exchange
#[derive(Debug, Error)]
pub(crate) enum RequestError {
    #[error("netlink socket error: {0}")]
    Io(#[from] io::Error),

    #[error("kernel rejected request: {0}")]
    Kernel(io::Error),

    #[error("malformed netlink reply: {0}")]
    Decode(String),

    #[error("netlink receive buffer overrun")]
    Overrun,
}

impl RequestError {
    /// errno reported by the kernel, if the kernel answered with one
    pub(crate) fn kernel_errno(&self) -> Option<i32> {
        match self {
            Self::Kernel(e) => e.raw_os_error(),
            _ => None,
        }
    }
}

impl From<RequestError> for flat_core::Error {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Io(e) | RequestError::Kernel(e) => flat_core::Error::Host(e),
            other => flat_core::Error::Host(io::Error::new(
                io::ErrorKind::InvalidData,
                other.to_string(),
            )),
        }
    }
}

pub(crate) struct RouteSocket {
    sequence: AtomicU32,
}

impl RouteSocket {
    pub(crate) fn new() -> Self {
        Self {
            sequence: AtomicU32::new(1),
        }
    }

    /// Send `message` with `flags` and collect the inner replies.
    ///
    /// Dumps end at NLMSG_DONE, acknowledged requests at the ack, and plain
    /// requests at their first reply.
    pub(crate) fn request(
        &self,
        message: RtnlMessage,
        flags: u16,
    ) -> Result<Vec<RtnlMessage>, RequestError> {
        let mut socket = Socket::new(NETLINK_ROUTE)?;
        socket.bind_auto()?;
        socket.connect(&SocketAddr::new(0, 0))?;

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut request = NetlinkMessage::from(message);
        request.header.flags = flags;
        request.header.sequence_number = sequence;
        request.finalize();

        let mut buf = vec![0u8; request.buffer_len()];
        request.serialize(&mut buf[..]);
        socket.send(&buf, 0)?;

        let dump = flags & NLM_F_DUMP == NLM_F_DUMP;
        let acked = flags & NLM_F_ACK == NLM_F_ACK;
        let mut replies = Vec::new();

        loop {
            let (data, _) = socket.recv_from_full()?;
            let mut offset = 0;

            while offset < data.len() {
                let reply = NetlinkMessage::<RtnlMessage>::deserialize(&data[offset..])
                    .map_err(|e| RequestError::Decode(e.to_string()))?;
                let length = reply.header.length as usize;
                if length == 0 {
                    return Err(RequestError::Decode("zero-length message".to_string()));
                }
                offset += (length + 3) & !3;

                if reply.header.sequence_number != sequence {
                    continue;
                }

                match reply.payload {
                    NetlinkPayload::InnerMessage(inner) => {
                        replies.push(inner);
                        if !dump && !acked {
                            return Ok(replies);
                        }
                    }
                    NetlinkPayload::Done(_) => return Ok(replies),
                    NetlinkPayload::Error(err) => {
                        return match err.code {
                            None => Ok(replies),
                            Some(_) => Err(RequestError::Kernel(err.to_io())),
                        };
                    }
                    NetlinkPayload::Overrun(_) => return Err(RequestError::Overrun),
                    _ => {}
                }
            }
        }
    }
}
