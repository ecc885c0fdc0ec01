//! Session identifiers derived from host, process and thread

use crate::metadata::ThreadSeq;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, UdpSocket};
use std::sync::OnceLock;

/// Length of a session identifier in hex characters
pub const SESSION_ID_LEN: usize = 16;

/// Short hex digest identifying one thread of one process on one host
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// First 16 hex characters of `md5("{ip}-{parent_pid}-{pid}-{thread_id}")`
    pub fn compute(ip: &str, parent_pid: u32, pid: u32, thread_id: u64) -> Self {
        let input = format!("{ip}-{parent_pid}-{pid}-{thread_id}");
        let mut digest = format!("{:x}", md5::compute(input.as_bytes()));
        digest.truncate(SESSION_ID_LEN);
        Self(digest)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

thread_local! {
    static THREAD_SESSION: SessionId = SessionId::compute(
        host_ip(),
        parent_pid(),
        std::process::id(),
        ThreadSeq::current().as_u64(),
    );
}

/// Session identifier of the calling thread.
///
/// Never fails: an unresolvable host address contributes an empty segment.
pub fn session_id() -> SessionId {
    THREAD_SESSION.with(SessionId::clone)
}

/// Outbound interface address of this host, looked up once per process
pub fn host_ip() -> &'static str {
    static HOST_IP: OnceLock<String> = OnceLock::new();

    HOST_IP.get_or_init(|| match lookup_host_ip() {
        Ok(ip) => ip.to_string(),
        Err(e) => {
            tracing::debug!(
                logchan.event = "host_ip_unavailable",
                error = %e,
                "Host address lookup failed, session ids use an empty ip segment"
            );
            String::new()
        }
    })
}

// Connecting a UDP socket only selects a route; nothing is sent.
fn lookup_host_ip() -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:80")?;
    Ok(socket.local_addr()?.ip())
}

#[cfg(unix)]
fn parent_pid() -> u32 {
    std::os::unix::process::parent_id()
}

#[cfg(not(unix))]
fn parent_pid() -> u32 {
    0
}
