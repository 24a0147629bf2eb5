use std::fmt;
use url::{Host, Url};

/// Category assigned to channels that match no template rule.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Reachability state of a channel's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Not probed yet.
    #[default]
    Pending,
    Online,
    Offline,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Online => "online",
            Status::Offline => "offline",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address family of a stream URL's host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// Classifies a stream URL. Only a bracketed IPv6 literal host counts as
    /// `V6`; domains, IPv4 literals and unparsable URLs are `V4`.
    pub fn of_url(url: &str) -> Self {
        match Url::parse(url) {
            Ok(parsed) if matches!(parsed.host(), Some(Host::Ipv6(_))) => IpFamily::V6,
            _ => IpFamily::V4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IpFamily::V4 => "ipv4",
            IpFamily::V6 => "ipv6",
        }
    }
}

/// A named stream parsed from a playlist source.
///
/// The classifier rewrites `name` and `category`; the speed prober fills in
/// `status`, `response_time` and `download_speed`. Two channels are the same
/// stream when their `url` strings are byte-equal.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub name: String,
    pub url: String,
    pub category: String,
    /// Group the channel was listed under in its source feed.
    pub original_category: String,
    pub status: Status,
    /// Seconds, 0 if unmeasured.
    pub response_time: f64,
    /// KB/s, 0 if unmeasured.
    pub download_speed: f64,
}

impl Channel {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            category: UNCATEGORIZED.to_string(),
            original_category: UNCATEGORIZED.to_string(),
            status: Status::Pending,
            response_time: 0.0,
            download_speed: 0.0,
        }
    }

    pub fn with_original_category(mut self, category: impl Into<String>) -> Self {
        self.original_category = category.into();
        self
    }

    pub fn is_online(&self) -> bool {
        self.status == Status::Online
    }

    pub fn ip_family(&self) -> IpFamily {
        IpFamily::of_url(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_channel_defaults() {
        let channel = Channel::new("CCTV1", "http://example.com/1.m3u8");
        assert_eq!(channel.category, UNCATEGORIZED);
        assert_eq!(channel.original_category, UNCATEGORIZED);
        assert_eq!(channel.status, Status::Pending);
        assert_eq!(channel.response_time, 0.0);
        assert!(!channel.is_online());
    }

    #[test]
    fn test_status_and_family_labels() {
        assert_eq!(Status::Offline.to_string(), "offline");
        assert_eq!(format!("{}", Status::Pending), "pending");
        assert_eq!(IpFamily::V6.as_str(), "ipv6");
    }

    #[test]
    fn test_ip_family_bracketed_v6() {
        assert_eq!(
            IpFamily::of_url("http://[2409:8087:1::2]:8080/live.m3u8"),
            IpFamily::V6
        );
    }

    #[test]
    fn test_ip_family_v4_and_domains() {
        assert_eq!(IpFamily::of_url("http://10.1.2.3:8080/a"), IpFamily::V4);
        assert_eq!(IpFamily::of_url("https://cdn.example.com/a"), IpFamily::V4);
        // Host:port with hex-looking host is still a domain
        assert_eq!(IpFamily::of_url("http://abc:8080/a"), IpFamily::V4);
        assert_eq!(IpFamily::of_url("not a url"), IpFamily::V4);
    }
}
