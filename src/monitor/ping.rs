// src/monitor/ping.rs

use std::fmt::Debug;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::errors::{McProdError, Result};

/// Liveness check of a service endpoint.
pub trait ServicePinger: Send + Sync + Debug {
    fn ping(&self, host: &str, port: u16) -> Result<()>;
}

/// Considers a service alive when its port accepts a TCP connection.
#[derive(Debug, Clone)]
pub struct TcpPinger {
    timeout: Duration,
}

impl TcpPinger {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ServicePinger for TcpPinger {
    fn ping(&self, host: &str, port: u16) -> Result<()> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| McProdError::host("ping", format!("{host}:{port} did not resolve")))?;
        TcpStream::connect_timeout(&addr, self.timeout)
            .map_err(|e| McProdError::host("ping", format!("{host}:{port}: {e}")))?;
        Ok(())
    }
}
