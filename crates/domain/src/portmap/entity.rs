use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::entity::Protocol;

use super::error::{PortMapError, RangeSide};

// ── Port range ──────────────────────────────────────────────────────

/// A single port or an inclusive range of ports.
///
/// `end == 0` is the "unset" sentinel and means "same as `begin`"; it is
/// resolved by [`PortRange::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    pub begin: u16,
    pub end: u16,
}

impl PortRange {
    pub fn single(port: u16) -> Self {
        Self {
            begin: port,
            end: port,
        }
    }

    pub fn new(begin: u16, end: u16) -> Self {
        Self { begin, end }
    }

    /// Parse `"P"` or `"P1-P2"`.
    ///
    /// Range order is not checked here; see [`PortRange::normalize`].
    pub fn parse(spec: &str) -> Result<Self, PortMapError> {
        let (first, second) = match spec.split_once('-') {
            Some((b, e)) => (b, Some(e)),
            None => (spec, None),
        };
        let begin = parse_port(first)?;
        let end = match second {
            Some(e) => parse_port(e)?,
            None => begin,
        };
        Ok(Self { begin, end })
    }

    /// Resolve the unset sentinel and check range order.
    ///
    /// `{p, 0}` and `{p, p}` become `{p, p}`, `end > begin` is kept as a
    /// range, `end < begin` is rejected. Port 0 can never be mapped.
    pub fn normalize(self, side: RangeSide) -> Result<Self, PortMapError> {
        let end = if self.end == 0 { self.begin } else { self.end };
        if self.begin == 0 || end < self.begin {
            return Err(PortMapError::InvalidPortRange {
                side,
                begin: self.begin,
                end: self.end,
            });
        }
        Ok(Self {
            begin: self.begin,
            end,
        })
    }

    /// Copy with `end == 0` replaced by `begin`, without any validation.
    pub fn with_end_resolved(self) -> Self {
        if self.end == 0 {
            Self::single(self.begin)
        } else {
            self
        }
    }

    pub fn is_single(&self) -> bool {
        self.end == self.begin || self.end == 0
    }

    /// `end - begin`, or 0 for an inverted range.
    pub fn span(&self) -> u16 {
        self.end.saturating_sub(self.begin)
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.begin && port <= self.end
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        self.begin <= other.end && other.begin <= self.end
    }

    /// Ports in the range, in ascending order.
    pub fn ports(&self) -> std::ops::RangeInclusive<u16> {
        self.begin..=self.end
    }

    /// Rule-engine match form: `"P"` or `"P1:P2"`.
    pub fn to_match_arg(&self) -> String {
        if self.is_single() {
            self.begin.to_string()
        } else {
            format!("{}:{}", self.begin, self.end)
        }
    }

    /// Inverse of [`PortRange::to_match_arg`]: parse `"P"` or `"P1:P2"` as
    /// printed by the rule engine.
    pub fn from_match_arg(s: &str) -> Option<Self> {
        match s.split_once(':') {
            Some((b, e)) => Some(Self::new(b.parse().ok()?, e.parse().ok()?)),
            None => s.parse().ok().map(Self::single),
        }
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.begin)
        } else {
            write!(f, "{}-{}", self.begin, self.end)
        }
    }
}

impl FromStr for PortRange {
    type Err = PortMapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_port(s: &str) -> Result<u16, PortMapError> {
    // u16::from_str would also take a leading '+'.
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PortMapError::InvalidPort {
            value: s.to_string(),
            reason: "not a decimal number".to_string(),
        });
    }
    s.parse::<u16>().map_err(|e| PortMapError::InvalidPort {
        value: s.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a port or port range specification.
pub fn parse_port_range(spec: &str) -> Result<PortRange, PortMapError> {
    PortRange::parse(spec)
}

// ── Port mapping ────────────────────────────────────────────────────

/// A request to redirect host ports to container ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMapping {
    #[serde(default)]
    pub protocol: Protocol,
    /// Host-side ports.
    pub from_ports: PortRange,
    /// Container-side ports.
    pub to_ports: PortRange,
}

impl PortMapping {
    pub fn new(protocol: Protocol, from_ports: PortRange, to_ports: PortRange) -> Self {
        Self {
            protocol,
            from_ports,
            to_ports,
        }
    }
}

impl std::fmt::Display for PortMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}/{}", self.from_ports, self.to_ports, self.protocol)
    }
}

/// Build a mapping from its three textual parts.
///
/// An empty `protocol` means TCP. `from` and `to` follow
/// [`parse_port_range`].
pub fn parse_port_mapping(protocol: &str, from: &str, to: &str) -> Result<PortMapping, PortMapError> {
    let protocol = protocol
        .parse::<Protocol>()
        .map_err(|_| PortMapError::UnsupportedProtocol {
            protocol: protocol.to_string(),
        })?;
    let from_ports = parse_port_range(from)?;
    let to_ports = parse_port_range(to)?;
    Ok(PortMapping::new(protocol, from_ports, to_ports))
}

impl FromStr for PortMapping {
    type Err = PortMapError;

    /// Compact form `FROM:TO[/PROTO]`, e.g. `8080:80` or `5000-5010:5000-5010/udp`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ports, protocol) = s.rsplit_once('/').unwrap_or((s, ""));
        let Some((from, to)) = ports.split_once(':') else {
            return Err(PortMapError::InvalidMapping {
                value: s.to_string(),
                reason: "expected FROM:TO[/PROTO]".to_string(),
            });
        };
        parse_port_mapping(protocol, from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portmap::error::PortMapErrorKind;

    #[test]
    fn parse_single_port() {
        assert_eq!(parse_port_range("80").unwrap(), PortRange { begin: 80, end: 80 });
    }

    #[test]
    fn parse_range() {
        assert_eq!(
            parse_port_range("8000-8010").unwrap(),
            PortRange {
                begin: 8000,
                end: 8010
            }
        );
    }

    #[test]
    fn parse_inverted_range_is_accepted() {
        let range = parse_port_range("8010-8000").unwrap();
        assert_eq!(range.begin, 8010);
        assert_eq!(range.end, 8000);
    }

    #[test]
    fn parse_bounds() {
        assert_eq!(parse_port_range("65535").unwrap().begin, 65535);
        assert_eq!(parse_port_range("0").unwrap().begin, 0);
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", "abc", "65536", "-1", "80-", "80-x", "80-90-100", " 80", "+80"] {
            let err = parse_port_range(bad).unwrap_err();
            assert_eq!(err.kind(), PortMapErrorKind::Parse, "{bad:?} should not parse");
        }
    }

    #[test]
    fn normalize_resolves_sentinel() {
        let range = PortRange { begin: 80, end: 0 };
        assert_eq!(range.normalize(RangeSide::From).unwrap(), PortRange::single(80));
    }

    #[test]
    fn normalize_rejects_inverted() {
        let err = PortRange::new(8010, 8000)
            .normalize(RangeSide::To)
            .unwrap_err();
        assert!(matches!(
            err,
            PortMapError::InvalidPortRange {
                side: RangeSide::To,
                begin: 8010,
                end: 8000
            }
        ));
    }

    #[test]
    fn normalize_rejects_port_zero() {
        assert!(PortRange::single(0).normalize(RangeSide::From).is_err());
        assert!(PortRange::new(0, 10).normalize(RangeSide::From).is_err());
    }

    #[test]
    fn match_arg_and_display() {
        assert_eq!(PortRange::single(80).to_match_arg(), "80");
        assert_eq!(PortRange::new(80, 90).to_match_arg(), "80:90");
        assert_eq!(PortRange::new(80, 0).to_match_arg(), "80");
        assert_eq!(PortRange::new(80, 90).to_string(), "80-90");
        assert_eq!(PortRange::single(80).to_string(), "80");
    }

    #[test]
    fn from_match_arg() {
        assert_eq!(PortRange::from_match_arg("80"), Some(PortRange::single(80)));
        assert_eq!(PortRange::from_match_arg("80:90"), Some(PortRange::new(80, 90)));
        assert_eq!(PortRange::from_match_arg("80-90"), None);
        assert_eq!(PortRange::from_match_arg("http"), None);
    }

    #[test]
    fn overlaps_and_contains() {
        let a = PortRange::new(8000, 8010);
        assert!(a.contains(8005));
        assert!(!a.contains(8011));
        assert!(a.overlaps(&PortRange::new(8010, 8020)));
        assert!(a.overlaps(&PortRange::single(8000)));
        assert!(!a.overlaps(&PortRange::new(8011, 8020)));
    }

    #[test]
    fn span_of_ranges() {
        assert_eq!(PortRange::single(80).span(), 0);
        assert_eq!(PortRange::new(8000, 8010).span(), 10);
        assert_eq!(PortRange::new(8010, 8000).span(), 0);
    }

    #[test]
    fn with_end_resolved() {
        assert_eq!(PortRange::new(80, 0).with_end_resolved(), PortRange::single(80));
        assert_eq!(PortRange::new(80, 90).with_end_resolved(), PortRange::new(80, 90));
        let inverted = PortRange::new(8010, 8000).with_end_resolved();
        assert_eq!(inverted, PortRange::new(8010, 8000));
        assert_eq!(inverted.ports().count(), 0);
    }

    #[test]
    fn parse_mapping_defaults_to_tcp() {
        let m = parse_port_mapping("", "8080", "80").unwrap();
        assert_eq!(m.protocol, Protocol::Tcp);
        assert_eq!(m.from_ports, PortRange::single(8080));
        assert_eq!(m.to_ports, PortRange::single(80));
    }

    #[test]
    fn parse_mapping_udp() {
        let m = parse_port_mapping("udp", "5000-5010", "6000-6010").unwrap();
        assert_eq!(m.protocol, Protocol::Udp);
        assert_eq!(m.from_ports, PortRange::new(5000, 5010));
    }

    #[test]
    fn parse_mapping_rejects_protocol() {
        let err = parse_port_mapping("icmp", "80", "80").unwrap_err();
        assert!(matches!(err, PortMapError::UnsupportedProtocol { .. }));
        // Case-sensitive on the normalized value.
        assert!(parse_port_mapping("TCP", "80", "80").is_err());
    }

    #[test]
    fn parse_mapping_propagates_port_errors() {
        assert!(parse_port_mapping("tcp", "http", "80").is_err());
        assert!(parse_port_mapping("tcp", "80", "70000").is_err());
    }

    #[test]
    fn mapping_compact_form() {
        let m: PortMapping = "8000-8010:80-90/udp".parse().unwrap();
        assert_eq!(m.protocol, Protocol::Udp);
        assert_eq!(m.from_ports, PortRange::new(8000, 8010));
        assert_eq!(m.to_ports, PortRange::new(80, 90));

        let m: PortMapping = "8080:80".parse().unwrap();
        assert_eq!(m.protocol, Protocol::Tcp);
        assert_eq!(m.to_string(), "8080:80/tcp");
    }

    #[test]
    fn mapping_compact_form_errors() {
        assert!(matches!(
            "8080".parse::<PortMapping>().unwrap_err(),
            PortMapError::InvalidMapping { .. }
        ));
        assert!("8080:80/sctp".parse::<PortMapping>().is_err());
    }

    #[test]
    fn mapping_deserializes_with_default_protocol() {
        let json = r#"{"from_ports":{"begin":8080,"end":8080},"to_ports":{"begin":80,"end":0}}"#;
        let m: PortMapping = serde_json::from_str(json).unwrap();
        assert_eq!(m.protocol, Protocol::Tcp);
        assert_eq!(m.to_ports.end, 0);
    }
}
