use anyhow::{anyhow, Context, Result};
use std::collections::HashSet;
use std::net::TcpListener;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Answers whether a port currently has a listener on this host.
pub trait PortProbe {
    fn is_bound(&self, port: u16) -> bool;
}

/// Snapshot of the listening sockets reported by `ss -tuln`.
///
/// Take a new snapshot right before each allocation; bindings change.
#[derive(Debug, Clone, Default)]
pub struct SocketTableProbe {
    listening: HashSet<u16>,
}

impl SocketTableProbe {
    pub fn scan() -> Result<Self> {
        let output = Command::new("ss")
            .arg("-tuln")
            .output()
            .context("Failed to execute ss")?;

        if !output.status.success() {
            return Err(anyhow!(
                "ss exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        let table = String::from_utf8_lossy(&output.stdout);
        let probe = Self::from_table(&table);
        tracing::debug!("Socket table lists {} listening ports", probe.listening.len());
        Ok(probe)
    }

    /// Parse `ss -tuln` (or `ss -tln`) output.
    pub fn from_table(table: &str) -> Self {
        let listening = table
            .lines()
            .filter_map(|line| {
                let fields: Vec<&str> = line.split_whitespace().collect();
                let local = match fields.first() {
                    Some(&"Netid") | Some(&"State") | None => return None,
                    // -tuln prefixes each row with the protocol
                    Some(&"tcp") | Some(&"udp") => fields.get(4)?,
                    Some(_) => fields.get(3)?,
                };
                parse_local_port(local)
            })
            .collect();

        Self { listening }
    }

}

impl PortProbe for SocketTableProbe {
    fn is_bound(&self, port: u16) -> bool {
        self.listening.contains(&port)
    }
}

/// `0.0.0.0:4444`, `[::]:4444`, `*:4444`, `127.0.0.53%lo:53`
fn parse_local_port(address: &str) -> Option<u16> {
    let (_, port) = address.rsplit_once(':')?;
    port.parse().ok()
}

/// Tries to bind each port on all interfaces. Any failure counts as bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct BindProbe;

impl PortProbe for BindProbe {
    fn is_bound(&self, port: u16) -> bool {
        TcpListener::bind(("0.0.0.0", port)).is_err()
    }
}

/// Fixed set of bound ports. Counts how often it was asked.
#[derive(Debug, Default)]
pub struct StaticProbe {
    bound: HashSet<u16>,
    probes: AtomicUsize,
}

impl StaticProbe {
    pub fn new<I: IntoIterator<Item = u16>>(bound: I) -> Self {
        Self {
            bound: bound.into_iter().collect(),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::Relaxed)
    }
}

impl PortProbe for StaticProbe {
    fn is_bound(&self, port: u16) -> bool {
        self.probes.fetch_add(1, Ordering::Relaxed);
        self.bound.contains(&port)
    }
}

/// Reports `reclaimed` ports as free whatever `inner` says. These are the
/// ports of the grid being replaced.
pub struct ReclaimingProbe<'a> {
    inner: &'a dyn PortProbe,
    reclaimed: HashSet<u16>,
}

impl<'a> ReclaimingProbe<'a> {
    pub fn new<I: IntoIterator<Item = u16>>(inner: &'a dyn PortProbe, reclaimed: I) -> Self {
        Self {
            inner,
            reclaimed: reclaimed.into_iter().collect(),
        }
    }
}

impl PortProbe for ReclaimingProbe<'_> {
    fn is_bound(&self, port: u16) -> bool {
        !self.reclaimed.contains(&port) && self.inner.is_bound(port)
    }
}

/// Best probe available on this host: the socket table, or bind attempts
/// when `ss` is missing.
pub fn system_probe() -> Box<dyn PortProbe> {
    match SocketTableProbe::scan() {
        Ok(probe) => Box::new(probe),
        Err(e) => {
            tracing::warn!("Cannot read socket table ({}), probing by bind instead", e);
            Box::new(BindProbe)
        }
    }
}
