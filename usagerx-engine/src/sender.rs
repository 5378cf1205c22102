//! ## usagerx-engine::sender
//! Client side of the usage protocol: encodes a text packet and sends it to
//! every configured collector.

use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use chrono::Utc;
use tracing::{debug, warn};

use usagerx_protocols::{PacketHeader, UsagePacketBuilder};

use crate::error::SenderError;

/// Public collector used when no targets are given.
pub const DEFAULT_TARGETS: &str = "usage-stats.globus.org:4810";

/// Whitespace-separated targets used when none are passed explicitly.
pub const TARGETS_ENV: &str = "GLOBUS_USAGE_TARGETS";

/// When set to any value, senders built by `from_env` send nothing.
pub const OPTOUT_ENV: &str = "GLOBUS_USAGE_OPTOUT";

#[derive(Debug)]
pub struct UsageSender {
    builder: UsagePacketBuilder,
    targets: Vec<SocketAddr>,
    socket_v4: Option<UdpSocket>,
    socket_v6: Option<UdpSocket>,
    opted_out: bool,
}

impl UsageSender {
    /// Resolves the whitespace-separated `host:port` list in `targets`.
    ///
    /// The sender address written into each packet is the local address the
    /// OS would route to the first target through.
    pub fn new(
        header: PacketHeader,
        hostname: Option<String>,
        targets: &str,
    ) -> Result<Self, SenderError> {
        let mut resolved = Vec::new();
        for target in targets.split_whitespace() {
            let addr = target
                .to_socket_addrs()
                .map_err(|source| SenderError::Resolve {
                    target: target.to_string(),
                    source,
                })?
                .next()
                .ok_or_else(|| SenderError::Resolve {
                    target: target.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "no addresses found",
                    ),
                })?;
            resolved.push(addr);
        }
        let first = *resolved.first().ok_or(SenderError::NoTargets)?;

        let socket_v4 = resolved
            .iter()
            .any(SocketAddr::is_ipv4)
            .then(|| UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)))
            .transpose()?;
        let socket_v6 = resolved
            .iter()
            .any(SocketAddr::is_ipv6)
            .then(|| UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0)))
            .transpose()?;

        let host = local_address_towards(first)?;
        debug!(%host, targets = resolved.len(), "Usage sender ready");

        Ok(Self {
            builder: UsagePacketBuilder::new(header, host, hostname),
            targets: resolved,
            socket_v4,
            socket_v6,
            opted_out: false,
        })
    }

    /// Sender configured like a component's usage library: `targets` if
    /// given, else `GLOBUS_USAGE_TARGETS`, else [`DEFAULT_TARGETS`]. Opted
    /// out when `GLOBUS_USAGE_OPTOUT` is set.
    pub fn from_env(
        header: PacketHeader,
        hostname: Option<String>,
        targets: Option<&str>,
    ) -> Result<Self, SenderError> {
        let env_targets = env::var(TARGETS_ENV).ok();
        let targets = select_targets(targets, env_targets.as_deref());
        let opted_out = env::var_os(OPTOUT_ENV).is_some();
        Ok(Self::new(header, hostname, targets)?.opt_out(opted_out))
    }

    /// When set, `send` returns without touching the network.
    #[must_use]
    pub fn opt_out(mut self, opted_out: bool) -> Self {
        self.opted_out = opted_out;
        self
    }

    pub fn is_opted_out(&self) -> bool {
        self.opted_out
    }

    pub fn targets(&self) -> &[SocketAddr] {
        &self.targets
    }

    /// Sends one packet to every target. Returns how many targets it reached;
    /// fails only if none were reached.
    pub fn send<K, V>(&self, params: &[(K, V)]) -> Result<usize, SenderError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if self.opted_out {
            debug!("Usage reporting disabled, not sending");
            return Ok(0);
        }

        let packet = self.builder.encode(Utc::now(), params)?;
        let mut delivered = 0;
        let mut last_error = None;
        for target in &self.targets {
            let socket = if target.is_ipv4() {
                self.socket_v4.as_ref()
            } else {
                self.socket_v6.as_ref()
            };
            let Some(socket) = socket else { continue };
            match socket.send_to(&packet, target) {
                Ok(_) => delivered += 1,
                Err(source) => {
                    warn!(%target, error = %source, "Usage packet send failed");
                    last_error = Some(SenderError::Send {
                        target: *target,
                        source,
                    });
                }
            }
        }

        match last_error {
            Some(e) if delivered == 0 => Err(e),
            _ => Ok(delivered),
        }
    }
}

fn select_targets<'a>(explicit: Option<&'a str>, from_env: Option<&'a str>) -> &'a str {
    explicit
        .or(from_env)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(DEFAULT_TARGETS)
}

/// Source address the OS picks for `target`; connecting a UDP socket sends
/// nothing.
fn local_address_towards(target: SocketAddr) -> Result<IpAddr, SenderError> {
    let unspecified: IpAddr = if target.is_ipv4() {
        Ipv4Addr::UNSPECIFIED.into()
    } else {
        Ipv6Addr::UNSPECIFIED.into()
    };
    let socket = UdpSocket::bind((unspecified, 0))?;
    socket.connect(target)?;
    Ok(socket.local_addr()?.ip())
}
