//! Node Configuration
//!
//! Everything a node needs at start-up, read from `--flag value` arguments
//! and optionally from a JSON file given with `--config`. Flags override the
//! file. The result is validated before anything is bound.

use crate::cache::CacheOptions;
use crate::client::ClientOptions;
use crate::error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const USAGE: &str = "\
Usage: cache-node [--config <file.json>] [options]

  --address <host:port>            canonical address of this node (default 127.0.0.1:5837)
  --server-type <tcp|http>         request surface to expose (default tcp)
  --gossip-address <ip:port>       run gossip membership on this UDP address
  --cluster <addr>[,<addr>...]     gossip seeds, or peer cache addresses without gossip
  --segment-count <n>              power of two (default 1024)
  --map-size-of-segment <n>        initial entries per segment (default 256)
  --max-entry-size-mb <n>          capacity budget (default 4)
  --gc-interval-minutes <n>        minutes between GC sweeps (default 60)
  --max-gc-count <n>               evictions per segment per sweep (default 10)
  --dump-file <path>               snapshot path (default kafo.dump)
  --dump-interval-secs <n>         seconds between snapshots (default 30)
  --freeze-spin-sleep-micros <n>   wait step while a snapshot is written (default 1000)
  --virtual-replicas <n>           ring positions per node (default 1024)
  --ring-refresh-secs <n>          seconds between ring rebuilds (default 3)
  --max-redirects <n>              client redirect limit (default 5)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    #[default]
    Tcp,
    Http,
}

impl FromStr for ServerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(ServerType::Tcp),
            "http" => Ok(ServerType::Http),
            other => Err(Error::Config(format!("unknown server type {:?}", other))),
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerType::Tcp => write!(f, "tcp"),
            ServerType::Http => write!(f, "http"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeConfig {
    /// Canonical address: where the listener binds and what the ring stores.
    pub address: String,
    pub server_type: ServerType,
    pub gossip_address: Option<SocketAddr>,
    pub cluster: Vec<String>,

    pub segment_count: usize,
    pub map_size_of_segment: usize,
    pub max_entry_size_mb: i64,
    pub gc_interval_minutes: u64,
    pub max_gc_count: usize,
    pub dump_file: PathBuf,
    pub dump_interval_secs: u64,
    pub freeze_spin_sleep_micros: u64,

    pub virtual_replicas: usize,
    pub ring_refresh_secs: u64,
    pub max_redirects: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let cache = CacheOptions::default();
        Self {
            address: "127.0.0.1:5837".to_string(),
            server_type: ServerType::Tcp,
            gossip_address: None,
            cluster: Vec::new(),
            segment_count: cache.segment_count,
            map_size_of_segment: cache.map_size_of_segment,
            max_entry_size_mb: cache.max_entry_size_mb,
            gc_interval_minutes: cache.gc_interval_minutes,
            max_gc_count: cache.max_gc_count,
            dump_file: cache.dump_file,
            dump_interval_secs: cache.dump_interval_secs,
            freeze_spin_sleep_micros: 1000,
            virtual_replicas: crate::routing::DEFAULT_VIRTUAL_REPLICAS,
            ring_refresh_secs: 3,
            max_redirects: crate::client::DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// Builds a validated config from the arguments after the program name.
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let args: Vec<String> = args.into_iter().collect();

        let mut config = match args.iter().position(|arg| arg == "--config") {
            Some(i) => {
                let path = args
                    .get(i + 1)
                    .ok_or_else(|| Error::Config("--config needs a value".to_string()))?;
                Self::from_file(Path::new(path))?
            }
            None => Self::default(),
        };

        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            if flag == "--help" || flag == "-h" {
                return Err(Error::Config(USAGE.to_string()));
            }
            let value = args
                .get(i + 1)
                .ok_or_else(|| Error::Config(format!("{} needs a value", flag)))?;
            config.apply(flag, value)?;
            i += 2;
        }

        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, flag: &str, value: &str) -> Result<()> {
        match flag {
            "--config" => {}
            "--address" => self.address = value.to_string(),
            "--server-type" => self.server_type = value.parse()?,
            "--gossip-address" => self.gossip_address = Some(parse_flag(flag, value)?),
            "--cluster" => self.cluster.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|addr| !addr.is_empty())
                    .map(str::to_string),
            ),
            "--segment-count" => self.segment_count = parse_flag(flag, value)?,
            "--map-size-of-segment" => self.map_size_of_segment = parse_flag(flag, value)?,
            "--max-entry-size-mb" => self.max_entry_size_mb = parse_flag(flag, value)?,
            "--gc-interval-minutes" => self.gc_interval_minutes = parse_flag(flag, value)?,
            "--max-gc-count" => self.max_gc_count = parse_flag(flag, value)?,
            "--dump-file" => self.dump_file = PathBuf::from(value),
            "--dump-interval-secs" => self.dump_interval_secs = parse_flag(flag, value)?,
            "--freeze-spin-sleep-micros" => {
                self.freeze_spin_sleep_micros = parse_flag(flag, value)?
            }
            "--virtual-replicas" => self.virtual_replicas = parse_flag(flag, value)?,
            "--ring-refresh-secs" => self.ring_refresh_secs = parse_flag(flag, value)?,
            "--max-redirects" => self.max_redirects = parse_flag(flag, value)?,
            unknown => {
                return Err(Error::Config(format!("unknown flag {}\n\n{}", unknown, USAGE)));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(Error::Config("address must not be empty".to_string()));
        }
        self.cache_options().validate()?;
        if self.virtual_replicas == 0 {
            return Err(Error::Config("virtual replicas must be at least 1".to_string()));
        }
        if self.ring_refresh_secs == 0 {
            return Err(Error::Config("ring refresh interval must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            max_entry_size_mb: self.max_entry_size_mb,
            max_gc_count: self.max_gc_count,
            gc_interval_minutes: self.gc_interval_minutes,
            dump_file: self.dump_file.clone(),
            dump_interval_secs: self.dump_interval_secs,
            map_size_of_segment: self.map_size_of_segment,
            segment_count: self.segment_count,
        }
    }

    /// Client settings matching this node's ring.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            virtual_replicas: self.virtual_replicas,
            max_redirects: self.max_redirects,
            ..ClientOptions::default()
        }
    }

    pub fn freeze_poll(&self) -> Duration {
        Duration::from_micros(self.freeze_spin_sleep_micros.max(1))
    }

    pub fn ring_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.ring_refresh_secs)
    }

    /// Members used when gossip is off: this node plus the configured peers.
    pub fn static_members(&self) -> Vec<String> {
        let mut members = vec![self.address.clone()];
        members.extend(self.cluster.iter().cloned());
        members
    }

    /// Gossip seeds; only meaningful when `gossip_address` is set.
    pub fn gossip_seeds(&self) -> Result<Vec<SocketAddr>> {
        self.cluster
            .iter()
            .map(|seed| parse_flag("--cluster", seed))
            .collect()
    }
}

fn parse_flag<T: FromStr>(flag: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid value {:?} for {}", value, flag)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults_match_cache_defaults() {
        let config = NodeConfig::from_args(Vec::new()).unwrap();
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.cache_options(), CacheOptions::default());
        assert_eq!(config.server_type, ServerType::Tcp);
        assert_eq!(config.virtual_replicas, 1024);
        assert_eq!(config.max_redirects, 5);
        assert_eq!(config.freeze_poll(), Duration::from_micros(1000));
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = NodeConfig::from_args(args(&[
            "--address",
            "10.0.0.1:6000",
            "--server-type",
            "http",
            "--segment-count",
            "64",
            "--cluster",
            "10.0.0.2:6000, 10.0.0.3:6000",
            "--cluster",
            "10.0.0.4:6000",
            "--dump-file",
            "/tmp/node.dump",
        ]))
        .unwrap();

        assert_eq!(config.address, "10.0.0.1:6000");
        assert_eq!(config.server_type, ServerType::Http);
        assert_eq!(config.segment_count, 64);
        assert_eq!(config.cluster.len(), 3);
        assert_eq!(config.static_members()[0], "10.0.0.1:6000");
        assert_eq!(config.cache_options().dump_file, PathBuf::from("/tmp/node.dump"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = NodeConfig::from_args(args(&["--segment-count", "100"])).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("power of two")));

        assert!(NodeConfig::from_args(args(&["--segment-count", "many"])).is_err());
        assert!(NodeConfig::from_args(args(&["--server-type", "udp"])).is_err());
        assert!(NodeConfig::from_args(args(&["--ring-refresh-secs", "0"])).is_err());
        assert!(NodeConfig::from_args(args(&["--address"])).is_err());
        assert!(NodeConfig::from_args(args(&["--bogus", "1"])).is_err());
    }

    #[test]
    fn test_config_file_with_flag_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"address": "127.0.0.1:7000", "serverType": "http", "segmentCount": 32, "maxRedirects": 2}}"#
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config =
            NodeConfig::from_args(args(&["--config", &path, "--segment-count", "128"])).unwrap();
        assert_eq!(config.address, "127.0.0.1:7000");
        assert_eq!(config.server_type, ServerType::Http);
        assert_eq!(config.max_redirects, 2);
        assert_eq!(config.client_options().max_redirects, 2);
        // Flags win over the file; unset fields keep their defaults.
        assert_eq!(config.segment_count, 128);
        assert_eq!(config.dump_interval_secs, 30);
    }

    #[test]
    fn test_gossip_seeds_must_be_socket_addresses() {
        let config = NodeConfig {
            cluster: vec!["127.0.0.1:7946".to_string()],
            ..NodeConfig::default()
        };
        assert_eq!(config.gossip_seeds().unwrap().len(), 1);

        let config = NodeConfig {
            cluster: vec!["not-an-address".to_string()],
            ..NodeConfig::default()
        };
        assert!(config.gossip_seeds().is_err());
    }
}
