//! Configuration field types that the structured codec cannot round-trip on
//! its own.
//!
//! `std::time::Duration` serializes as a `{secs, nanos}` pair, and network or
//! mailbox addresses have no std serde form at all. The wrappers here hold
//! the underlying value and speak text in both directions, so `timeout: 1m30s`
//! in a file, `-timeout 1m30s` on the command line, and `APP_TIMEOUT=1m30s`
//! in the environment all land in the same typed field. Using the wrappers is
//! optional for durations: bare `std::time::Duration` fields are recognized
//! by their struct encoding and handled the same way.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time;

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

/// Marker name under which [`Duration`] serializes, letting the value tree
/// keep the typed form while plain codecs see the text transparently.
pub(crate) const DURATION_TOKEN: &str = "$conflate::duration";

/// Field names of the std `Duration` serde encoding, matched structurally.
pub(crate) const STD_DURATION_FIELDS: [&str; 2] = ["secs", "nanos"];

/// An elapsed time that loads from text (`10s`, `1h30m`, `1.5s`, `300ms`).
///
/// Thin wrapper over `std::time::Duration`; negative durations are rejected
/// since the underlying type cannot represent them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(pub time::Duration);

impl From<time::Duration> for Duration {
    fn from(d: time::Duration) -> Self {
        Duration(d)
    }
}

impl From<Duration> for time::Duration {
    fn from(d: Duration) -> Self {
        d.0
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_duration(self.0))
    }
}

impl FromStr for Duration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s).map(Duration)
    }
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(DURATION_TOKEN, &self.to_string())
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Render a duration the way it parses: `0s`, `300ms`, `1.5s`, `1h30m0s`.
pub(crate) fn format_duration(d: time::Duration) -> String {
    let total = d.as_nanos();
    if total == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    if total < 1_000_000_000 {
        let (scale, unit) = if total < 1_000 {
            (1, "ns")
        } else if total < 1_000_000 {
            (1_000, "µs")
        } else {
            (1_000_000, "ms")
        };
        push_decimal(&mut out, total, scale);
        out.push_str(unit);
    } else {
        let minutes = total / 60_000_000_000;
        let hours = minutes / 60;
        if hours > 0 {
            out.push_str(&hours.to_string());
            out.push('h');
        }
        if hours > 0 || minutes % 60 > 0 {
            out.push_str(&(minutes % 60).to_string());
            out.push('m');
        }
        push_decimal(&mut out, total % 60_000_000_000, 1_000_000_000);
        out.push('s');
    }
    out
}

fn push_decimal(out: &mut String, nanos: u128, scale: u128) {
    out.push_str(&(nanos / scale).to_string());
    let mut frac = nanos % scale;
    if frac == 0 {
        return;
    }
    out.push('.');
    let mut digits = String::new();
    let mut div = scale / 10;
    while div > 0 {
        digits.push(char::from(b'0' + (frac / div) as u8));
        frac %= div;
        div /= 10;
    }
    out.push_str(digits.trim_end_matches('0'));
}

/// Parse the `10s` / `1h30m` / `1.5s` duration grammar.
pub(crate) fn parse_duration(input: &str) -> Result<time::Duration, String> {
    let mut s = input;
    if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    } else if s.starts_with('-') {
        return Err(format!("negative duration {input:?} is not supported"));
    }
    if s == "0" {
        return Ok(time::Duration::ZERO);
    }
    if s.is_empty() {
        return Err(format!("invalid duration {input:?}"));
    }

    let mut nanos: u128 = 0;
    while !s.is_empty() {
        let num_end = s
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(s.len());
        let (num, rest) = s.split_at(num_end);
        if num.is_empty() {
            return Err(format!("invalid duration {input:?}"));
        }

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let (unit, tail) = rest.split_at(unit_end);
        let scale: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            "" => return Err(format!("missing unit in duration {input:?}")),
            _ => return Err(format!("unknown unit {unit:?} in duration {input:?}")),
        };

        let (int_part, frac_part) = num.split_once('.').unwrap_or((num, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(format!("invalid duration {input:?}"));
        }
        let int: u128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| format!("invalid duration {input:?}"))?
        };
        nanos += int * scale;
        if !frac_part.is_empty() {
            let frac: u128 = frac_part
                .parse()
                .map_err(|_| format!("invalid duration {input:?}"))?;
            nanos += frac * scale / 10u128.pow(frac_part.len() as u32);
        }

        s = tail;
    }

    u64::try_from(nanos)
        .map(time::Duration::from_nanos)
        .map_err(|_| format!("duration {input:?} out of range"))
}

/// A network address that may be partial: host only, port only, or both,
/// with an optional IPv6 zone (`[::1%11]:80`, `127.0.0.1:53`, `:8080`).
///
/// Unlike `std::net::SocketAddr` this does not require every component,
/// which is what listen-address configuration usually wants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetAddr {
    pub ip: Option<IpAddr>,
    pub port: u16,
    pub zone: String,
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut host = match &self.ip {
            Some(ip) => ip.to_string(),
            None => String::new(),
        };
        if !host.is_empty() && !self.zone.is_empty() {
            host.push('%');
            host.push_str(&self.zone);
        }

        match (host.is_empty(), self.port) {
            (true, 0) => f.write_str(":"),
            (true, p) => write!(f, ":{p}"),
            (false, 0) => f.write_str(&host),
            (false, p) if host.contains(':') => write!(f, "[{host}]:{p}"),
            (false, p) => write!(f, "{host}:{p}"),
        }
    }
}

impl FromStr for NetAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, p) = split_host_port(s).unwrap_or((s, ""));
        let mut addr = NetAddr::default();

        if !h.is_empty() {
            let host = match h.split_once('%') {
                Some((host, zone)) => {
                    addr.zone = zone.to_string();
                    host
                }
                None => h,
            };
            addr.ip = Some(
                host.parse()
                    .map_err(|_| format!("{s}: bad IP address"))?,
            );
        }

        if !p.is_empty() {
            addr.port = p.parse().map_err(|_| format!("{s}: bad port number"))?;
        }

        Ok(addr)
    }
}

/// Split `host:port` forms, including `[v6]:port`. Returns `None` when the
/// input has no unambiguous port part (bare host, bare IPv6).
fn split_host_port(s: &str) -> Option<(&str, &str)> {
    if let Some(rest) = s.strip_prefix('[') {
        let end = rest.find(']')?;
        let port = rest[end + 1..].strip_prefix(':')?;
        return Some((&rest[..end], port));
    }
    let colon = s.find(':')?;
    if s[colon + 1..].contains(':') {
        return None; // unbracketed IPv6
    }
    Some((&s[..colon], &s[colon + 1..]))
}

impl Serialize for NetAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NetAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A mailbox: `Bob <bob@example.com>` or a bare `bob@example.com`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Email {
    pub name: String,
    pub address: String,
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "<{}>", self.address)
        } else {
            write!(f, "\"{}\" <{}>", self.name, self.address)
        }
    }
}

impl FromStr for Email {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, address) = match s.rfind('<') {
            Some(open) => {
                let close = s
                    .rfind('>')
                    .filter(|&c| c > open)
                    .ok_or_else(|| format!("{s}: unclosed angle-addr"))?;
                let name = s[..open].trim().trim_matches('"').trim();
                (name.to_string(), s[open + 1..close].to_string())
            }
            None => (String::new(), s.to_string()),
        };

        match address.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
                Ok(Email { name, address })
            }
            _ => Err(format!("{s}: invalid email address")),
        }
    }
}

impl Serialize for Email {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Email {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
