use crate::constants::network::SSH_DEFAULT_PORT;
use serde::{Serialize, Serializer};
use std::fmt;

/// A canonical `address:port` target. Equality is by the canonical string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Host {
    canonical: String,
}

impl Host {
    /// Appends the default port to tokens without a colon. Tokens that already
    /// carry a colon are kept verbatim; a bad port fails at connect time.
    pub fn normalize(token: &str) -> Self {
        let canonical = if token.contains(':') {
            token.to_string()
        } else {
            format!("{}:{}", token, SSH_DEFAULT_PORT)
        };
        Self { canonical }
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Address part without the port; IPv6 brackets are stripped.
    pub fn address(&self) -> &str {
        self.canonical
            .rsplit_once(':')
            .map(|(address, _)| address)
            .unwrap_or(&self.canonical)
            .trim_start_matches('[')
            .trim_end_matches(']')
    }

    /// `None` when the port is not a number, e.g. `gamma:ssh`.
    pub fn port(&self) -> Option<u16> {
        self.canonical
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse::<u16>().ok())
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl Serialize for Host {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical)
    }
}

pub fn normalize_hosts<I, S>(tokens: I) -> Vec<Host>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tokens
        .into_iter()
        .map(|token| Host::normalize(token.as_ref()))
        .collect()
}

/// Splits a `--nodes` value on commas, dropping blank entries.
pub fn split_host_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{normalize_hosts, split_host_list, Host};

    #[test]
    fn normalize_appends_default_port_only_when_missing() {
        let hosts = normalize_hosts(["alpha", "beta:2200"]);
        let rendered: Vec<&str> = hosts.iter().map(Host::as_str).collect();
        assert_eq!(rendered, vec!["alpha:22", "beta:2200"]);
    }

    #[test]
    fn normalize_keeps_malformed_ports_verbatim() {
        let host = Host::normalize("gamma:ssh");
        assert_eq!(host.as_str(), "gamma:ssh");
        assert_eq!(host.address(), "gamma");
        assert_eq!(host.port(), None);
    }

    #[test]
    fn address_and_port_split_on_last_colon() {
        let host = Host::normalize("10.0.0.5");
        assert_eq!(host.address(), "10.0.0.5");
        assert_eq!(host.port(), Some(22));
    }

    #[test]
    fn address_strips_ipv6_brackets() {
        let host = Host::normalize("[fe80::1]:2222");
        assert_eq!(host.address(), "fe80::1");
        assert_eq!(host.port(), Some(2222));
    }

    #[test]
    fn split_host_list_drops_blank_tokens() {
        assert_eq!(
            split_host_list("a, b:2200,,c "),
            vec!["a".to_string(), "b:2200".to_string(), "c".to_string()]
        );
    }
}
