use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{DnsError, Result};

/// TOML configuration. Every key has a working default, so a generated
/// file is immediately usable as a public recursive resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// UDP/TCP listen address.
    pub bind: String,
    /// DNS-over-TLS listen address.
    pub bindtls: String,
    /// DNS-over-HTTPS listen address.
    pub binddoh: String,
    /// TLS certificate chain (PEM) for DoT and DoH.
    pub tlscertificate: String,
    /// TLS private key (PEM) for DoT and DoH.
    pub tlsprivatekey: String,

    /// IPv4 root server addresses used until priming replaces them.
    pub rootservers: Vec<String>,
    /// IPv6 root server addresses.
    pub root6servers: Vec<String>,
    /// Root DNSKEY trust anchors in zone-file presentation.
    pub rootkeys: Vec<String>,
    /// Recursive forwarders of last resort for nameserver lookups.
    pub fallbackservers: Vec<String>,
    /// Source addresses for upstream queries; one is picked at random
    /// per exchange when several are given.
    pub outboundips: Vec<String>,

    /// Upstream read/write timeout in seconds.
    pub timeout: u64,
    /// Upstream TCP connect timeout in seconds.
    pub connecttimeout: u64,
    /// Error cache lifetime in seconds.
    pub expire: u32,
    /// Maximum answer cache entries.
    pub cachesize: usize,
    /// Recursion depth bound.
    pub maxdepth: u32,
    /// Per-cache-entry queries per second; 0 disables limiting.
    pub ratelimit: u32,

    /// Log filter, e.g. "info" or "ratatoskr=debug".
    pub loglevel: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:53".to_string(),
            bindtls: "0.0.0.0:853".to_string(),
            binddoh: "0.0.0.0:8053".to_string(),
            tlscertificate: String::new(),
            tlsprivatekey: String::new(),
            rootservers: vec![
                "198.41.0.4:53".to_string(),
                "199.9.14.201:53".to_string(),
                "192.33.4.12:53".to_string(),
                "199.7.91.13:53".to_string(),
                "192.203.230.10:53".to_string(),
                "192.5.5.241:53".to_string(),
                "192.112.36.4:53".to_string(),
                "198.97.190.53:53".to_string(),
                "192.36.148.17:53".to_string(),
                "192.58.128.30:53".to_string(),
                "193.0.14.129:53".to_string(),
                "199.7.83.42:53".to_string(),
                "202.12.27.33:53".to_string(),
            ],
            root6servers: vec![
                "[2001:503:ba3e::2:30]:53".to_string(),
                "[2001:500:200::b]:53".to_string(),
                "[2001:500:2::c]:53".to_string(),
                "[2001:500:2d::d]:53".to_string(),
                "[2001:500:a8::e]:53".to_string(),
                "[2001:500:2f::f]:53".to_string(),
                "[2001:500:12::d0d]:53".to_string(),
                "[2001:500:1::53]:53".to_string(),
                "[2001:7fe::53]:53".to_string(),
                "[2001:503:c27::2:30]:53".to_string(),
                "[2001:7fd::1]:53".to_string(),
                "[2001:500:9f::42]:53".to_string(),
                "[2001:dc3::35]:53".to_string(),
            ],
            rootkeys: vec![
                ". 172800 IN DNSKEY 257 3 8 AwEAAaz/tAm8yTn4Mfeh5eyI96WSVexTBAvkMgJzkKTOiW1vkIbzxeF3+/4RgWOq7HrxRixHlFlExOLAJr5emLvN7SWXgnLh4+B5xQlNVz8Og8kvArMtNROxVQuCaSnIDdD5LKyWbRd2n9WGe2R8PzgCmr3EgVLrjyBxWezF0jLHwVN8efS3rCj/EWgvIWgb9tarpVUDK/b58Da+sqqls3eNbuv7pr+eoZG+SrDK6nWeL3c6H5Apxz7LjVc1uTIdsIXxuOLYA4/ilBmSVIzuDWfdRUfhHdY6+cn8HFRm+2hM8AnXGXws9555KrUB5qihylGa8subX2Nn6UwNR1AkUTV74bU=".to_string(),
                ". 172800 IN DNSKEY 257 3 8 AwEAAa96jeuknZlaeSrvyAJj6ZHv28hhOKkx3rLGXVaC6rXTsDc449/cidltpkyGwCJNnOAlFNKF2jBosZBU5eeHspaQWOmOElZsjICMQMC3aeHbGiShvZsx4wMYSjH8e7Vrhbu6irwCzVBApESjbUdpWWmEnhathWu1jo+siFUiRAAxm9qyJNg/wOZqqzL/dL/q8PkcRU5oUKEpUge71M3ej2/cb5PWsqGhYuPKUrXKgHjBvNzdo5Dp7cowwSqlHrhdkYeeBkdZdu7AwLuAm7d5Cwnbx8/LbGosLPhiOuCuQn6S/VG94weV10hkgnSsvHmUiKhoc7UB+fhFzPQUv1S6HGC2vg==".to_string(),
            ],
            fallbackservers: Vec::new(),
            outboundips: Vec::new(),
            timeout: 10,
            connecttimeout: 2,
            expire: 600,
            cachesize: 256000,
            maxdepth: 30,
            ratelimit: 30,
            loglevel: "info".to_string(),
        }
    }
}

impl Config {
    /// Load the configuration, generating a default file first when the
    /// path does not exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Config::default();
            let body = toml::to_string_pretty(&config)
                .map_err(|e| DnsError::Config(e.to_string()))?;
            let body = format!(
                "# {} configuration, generated with defaults.\n\n{}",
                env!("CARGO_PKG_NAME"),
                body
            );
            std::fs::write(path, body)?;
            info!(path = %path.display(), "wrote default configuration");
            return Ok(config);
        }

        let body = std::fs::read_to_string(path)?;
        toml::from_str(&body).map_err(|e| DnsError::Config(e.to_string()))
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        parse_sockaddr(&self.bind, 53)
    }

    pub fn bindtls_addr(&self) -> Result<SocketAddr> {
        parse_sockaddr(&self.bindtls, 853)
    }

    pub fn binddoh_addr(&self) -> Result<SocketAddr> {
        parse_sockaddr(&self.binddoh, 8053)
    }

    pub fn root_addrs(&self) -> Result<Vec<SocketAddr>> {
        self.rootservers
            .iter()
            .map(|s| parse_sockaddr(s, 53))
            .collect()
    }

    pub fn root6_addrs(&self) -> Result<Vec<SocketAddr>> {
        self.root6servers
            .iter()
            .map(|s| parse_sockaddr(s, 53))
            .collect()
    }

    pub fn fallback_addrs(&self) -> Result<Vec<SocketAddr>> {
        self.fallbackservers
            .iter()
            .map(|s| parse_sockaddr(s, 53))
            .collect()
    }

    pub fn outbound_addrs(&self) -> Result<Vec<IpAddr>> {
        self.outboundips
            .iter()
            .map(|s| {
                s.parse::<IpAddr>()
                    .map_err(|_| DnsError::Config(format!("invalid outbound ip: {}", s)))
            })
            .collect()
    }

    pub fn has_tls(&self) -> bool {
        !self.tlscertificate.is_empty() && !self.tlsprivatekey.is_empty()
    }
}

/// Accept "ip:port", "[v6]:port", or a bare IP that gets the default
/// port for its service.
fn parse_sockaddr(s: &str, default_port: u16) -> Result<SocketAddr> {
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = s.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }
    Err(DnsError::Config(format!("invalid address: {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let config = Config::default();
        assert_eq!(config.root_addrs().unwrap().len(), 13);
        assert_eq!(config.root6_addrs().unwrap().len(), 13);
        assert_eq!(config.bind_addr().unwrap().port(), 53);
        assert_eq!(config.maxdepth, 30);
        assert!(!config.has_tls());
    }

    #[test]
    fn bare_ip_gets_default_port() {
        let addr = parse_sockaddr("9.9.9.9", 53).unwrap();
        assert_eq!(addr.port(), 53);
        let addr = parse_sockaddr("2001:db8::1", 53).unwrap();
        assert!(addr.is_ipv6());
        assert!(parse_sockaddr("not-an-ip", 53).is_err());
    }

    #[test]
    fn generates_and_reloads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let generated = Config::load_or_create(&path).unwrap();
        assert!(path.exists());

        let reloaded = Config::load_or_create(&path).unwrap();
        assert_eq!(generated.rootservers, reloaded.rootservers);
        assert_eq!(generated.cachesize, reloaded.cachesize);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "maxdepth = 5\nratelimit = 0\n").unwrap();

        let config = Config::load_or_create(&path).unwrap();
        assert_eq!(config.maxdepth, 5);
        assert_eq!(config.ratelimit, 0);
        assert_eq!(config.timeout, 10);
        assert_eq!(config.rootservers.len(), 13);
    }
}
