use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::Parser;

const BLINKY_PORT: &str = "BLINKY_PORT";

pub const DEFAULT_PORT: u16 = 7272;

pub fn get_default_port() -> u16 {
    DEFAULT_PORT
}

/// Port the aggregator binds, `BLINKY_PORT` if set and valid.
pub fn get_port() -> Option<u16> {
    std::env::var(BLINKY_PORT).ok().and_then(|res| res.parse().ok())
}

const BLINKY_ADDR: &str = "BLINKY_ADDR";

pub const DEFAULT_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0));

/// Address the aggregator binds, `BLINKY_ADDR` if set and valid.
pub fn get_addr() -> Option<IpAddr> {
    std::env::var(BLINKY_ADDR).ok().and_then(|res| res.parse().ok())
}

/// Normalize a `server[:port]` argument into a `host:port` authority,
/// filling in [`DEFAULT_PORT`] when no port is given.
pub fn server_authority(server: &str) -> String {
    let server = server
        .trim()
        .trim_start_matches("http://")
        .trim_end_matches('/');

    if server.parse::<SocketAddr>().is_ok() {
        return server.to_string();
    }

    if let Ok(IpAddr::V6(ip)) = server.parse::<IpAddr>() {
        return format!("[{ip}]:{DEFAULT_PORT}");
    }

    match server.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => server.to_string(),
        _ => format!("{server}:{DEFAULT_PORT}"),
    }
}

/// `http://<server>/metrics`, used by both the agent and the client.
pub fn metrics_url(server: &str) -> String {
    format!("http://{}/metrics", server_authority(server))
}

/// Parse command line arguments, exiting with status 1 on usage errors.
///
/// `--help` and `--version` still exit with 0.
pub fn parse_args_or_exit<T: Parser>() -> T {
    match T::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    }
}
