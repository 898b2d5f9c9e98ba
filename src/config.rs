//! Scheduler configuration: the handful of settings `bin.rs` collects from
//! CLI flags and environment variables before handing off to the event loop.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::ArgMatches;

pub const DEFAULT_SCHEDULER_PORT: u16 = 8786;

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub listen_address: SocketAddr,
    /// `RAIN_DEBUG_MODE`-style flag: gates `scheduler::graph::DEBUG_CHECK_CONSISTENCY`.
    pub strict: bool,
}

impl SchedulerConfig {
    pub fn from_args(args: &ArgMatches) -> Self {
        SchedulerConfig {
            listen_address: parse_listen_arg(args, "LISTEN_ADDRESS", DEFAULT_SCHEDULER_PORT),
            strict: args.is_present("STRICT") || env_flag("SKEIN_STRICT_MODE"),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|s| s == "1").unwrap_or(false)
}

/// Parse a `--listen` value that may be a bare port, a bare address, or a
/// full `address:port`, falling back to `0.0.0.0:<default_port>`.
pub fn parse_listen_arg(args: &ArgMatches, key: &str, default_port: u16) -> SocketAddr {
    let raw = match args.value_of(key) {
        Some(v) => v,
        None => return SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), default_port),
    };

    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return addr;
    }
    if let Ok(ip) = raw.parse::<IpAddr>() {
        return SocketAddr::new(ip, default_port);
    }
    if let Ok(port) = raw.parse::<u16>() {
        return SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), port);
    }
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), default_port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{App, Arg};

    fn parse(argv: &[&str]) -> ArgMatches<'static> {
        App::new("test")
            .arg(Arg::with_name("LISTEN_ADDRESS").long("listen").takes_value(true))
            .arg(Arg::with_name("STRICT").long("strict"))
            .get_matches_from(argv)
    }

    #[test]
    fn bare_port_binds_all_interfaces() {
        let args = parse(&["test", "--listen", "9999"]);
        let addr = parse_listen_arg(&args, "LISTEN_ADDRESS", DEFAULT_SCHEDULER_PORT);
        assert_eq!(addr.port(), 9999);
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
    }

    #[test]
    fn missing_flag_uses_default_port() {
        let args = parse(&["test"]);
        let addr = parse_listen_arg(&args, "LISTEN_ADDRESS", DEFAULT_SCHEDULER_PORT);
        assert_eq!(addr.port(), DEFAULT_SCHEDULER_PORT);
    }

    #[test]
    fn strict_flag_is_picked_up() {
        let args = parse(&["test", "--strict"]);
        let config = SchedulerConfig::from_args(&args);
        assert!(config.strict);
    }
}
