use std::env;
use std::net::{IpAddr, Ipv4Addr};

pub struct Config {
    pub server: ServerConfig,
    pub meetings: MeetingConfig,
    pub anti_cheat: AntiCheatConfig,
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

pub struct MeetingConfig {
    /// Default meeting duration in minutes when the creator omits one
    pub default_duration_minutes: u64,
}

pub struct AntiCheatConfig {
    /// Opt-in substring matching against the denylist
    pub fuzzy: bool,
    /// Polling interval for watch mode, in seconds
    pub scan_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .expect("Invalid SERVER_PORT"),
            },
            meetings: MeetingConfig {
                default_duration_minutes: env::var("MEETING_DEFAULT_DURATION_MIN")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(240),
            },
            anti_cheat: AntiCheatConfig {
                fuzzy: env::var("ANTI_CHEAT_FUZZY")
                    .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                    .unwrap_or(false),
                scan_interval_secs: env::var("ANTI_CHEAT_SCAN_INTERVAL_SEC")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            },
        }
    }

    pub fn bind_address(&self) -> ([u8; 4], u16) {
        let ip_addr = self.parse_host_to_ipv4();
        (ip_addr.octets(), self.server.port)
    }

    fn parse_host_to_ipv4(&self) -> Ipv4Addr {
        // Try to parse as IP address first
        if let Ok(addr) = self.server.host.parse::<IpAddr>() {
            match addr {
                IpAddr::V4(ipv4) => return ipv4,
                IpAddr::V6(_) => {
                    tracing::warn!(
                        host = %self.server.host,
                        "IPv6 address provided but only IPv4 supported, using 0.0.0.0"
                    );
                    return Ipv4Addr::new(0, 0, 0, 0);
                }
            }
        }

        // Handle common hostnames
        match self.server.host.as_str() {
            "localhost" => Ipv4Addr::new(127, 0, 0, 1),
            "" | "0.0.0.0" => Ipv4Addr::new(0, 0, 0, 0),
            _ => {
                tracing::warn!(
                    host = %self.server.host,
                    "Unable to parse host as IPv4, using 0.0.0.0"
                );
                Ipv4Addr::new(0, 0, 0, 0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_host(host: &str, port: u16) -> Config {
        Config {
            server: ServerConfig {
                host: host.to_string(),
                port,
            },
            meetings: MeetingConfig {
                default_duration_minutes: 240,
            },
            anti_cheat: AntiCheatConfig {
                fuzzy: false,
                scan_interval_secs: 10,
            },
        }
    }

    #[test]
    fn test_parse_localhost() {
        let config = config_with_host("localhost", 8080);
        assert_eq!(config.bind_address(), ([127, 0, 0, 1], 8080));
    }

    #[test]
    fn test_parse_ipv4_address() {
        let config = config_with_host("192.168.1.1", 3000);
        assert_eq!(config.bind_address(), ([192, 168, 1, 1], 3000));
    }

    #[test]
    fn test_parse_all_interfaces() {
        let config = config_with_host("0.0.0.0", 8080);
        assert_eq!(config.bind_address(), ([0, 0, 0, 0], 8080));
    }

    #[test]
    fn test_parse_empty_host() {
        let config = config_with_host("", 8080);
        assert_eq!(config.bind_address(), ([0, 0, 0, 0], 8080));
    }

    #[test]
    fn test_parse_invalid_hostname_defaults_to_all() {
        let config = config_with_host("invalid-hostname", 9000);
        assert_eq!(config.bind_address(), ([0, 0, 0, 0], 9000));
    }
}
