// Combined-Log-Format parsing with a vhost-prefix fallback

use std::sync::LazyLock;

use regex::Regex;

/// One compiled pattern; server-specific formats are handled only by the
/// one-token-skip fallback, never enumerated.
static COMBINED_LOG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(\S+) \S+ \S+ \[([^\]]+)\] "(\S+) (\S+) ([^"]*)" (\d+) (\d+)"#)
        .unwrap_or_else(|e| panic!("combined log pattern: {e}"))
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLogParts {
    pub ip: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub bytes_sent: u64,
    pub user_agent: String,
}

/// Parse a combined-log line. When the standard pattern misses, the first
/// whitespace-separated token is dropped once to handle vhost-prefixed
/// variants ("example.com:443 1.2.3.4 - - [...] ...").
pub fn parse_combined_log(message: &str) -> Option<AccessLogParts> {
    let captures = COMBINED_LOG.captures(message).or_else(|| {
        let (_, rest) = message.split_once(' ')?;
        COMBINED_LOG.captures(rest)
    })?;

    let status: u16 = captures.get(6)?.as_str().parse().ok()?;
    let bytes_sent: u64 = captures.get(7)?.as_str().parse().ok()?;

    Some(AccessLogParts {
        ip: captures.get(1)?.as_str().to_string(),
        method: captures.get(3)?.as_str().to_string(),
        path: captures.get(4)?.as_str().to_string(),
        status,
        bytes_sent,
        user_agent: user_agent_of(message),
    })
}

/// User-Agent is the sixth quoted field of a full combined-format line;
/// plain common-format lines fall back to "Unknown".
fn user_agent_of(message: &str) -> String {
    let parts: Vec<&str> = message.split('"').collect();
    if parts.len() >= 6 && !parts[5].is_empty() {
        parts[5].to_string()
    } else {
        "Unknown".to_string()
    }
}

/// Derive the vhost domain from the log file basename:
/// `<domain>-access.log` → domain, bare `access.log` → "default".
pub fn domain_from_source(source_path: &str) -> String {
    let filename = source_path.rsplit('/').next().unwrap_or(source_path);
    if let Some(domain) = filename.strip_suffix("-access.log") {
        return domain.to_string();
    }
    if filename == "access.log" {
        return "default".to_string();
    }
    if let Some(domain) = filename.strip_suffix("access.log") {
        return domain.to_string();
    }
    "unknown".to_string()
}

/// True when the service name marks a web server whose lines should attempt
/// access-log structuring.
pub fn is_web_service(service: &str) -> bool {
    let svc = service.to_lowercase();
    svc == "apache" || svc == "nginx" || svc == "httpd" || svc.contains("web")
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMBINED: &str = r#"203.0.113.9 - frank [10/Oct/2000:13:55:36 -0700] "GET /apache_pb.gif HTTP/1.0" 200 2326 "http://www.example.com/start.html" "Mozilla/4.08 [en] (Win98; I ;Nav)""#;

    #[test]
    fn parses_combined_line_with_user_agent() {
        let parts = parse_combined_log(COMBINED).unwrap();
        assert_eq!(parts.ip, "203.0.113.9");
        assert_eq!(parts.method, "GET");
        assert_eq!(parts.path, "/apache_pb.gif");
        assert_eq!(parts.status, 200);
        assert_eq!(parts.bytes_sent, 2326);
        assert_eq!(parts.user_agent, "Mozilla/4.08 [en] (Win98; I ;Nav)");
    }

    #[test]
    fn parses_common_line_without_user_agent() {
        let line = r#"198.51.100.4 - - [28/Jul/2026:06:00:00 +0000] "POST /login HTTP/1.1" 302 512"#;
        let parts = parse_combined_log(line).unwrap();
        assert_eq!(parts.ip, "198.51.100.4");
        assert_eq!(parts.status, 302);
        assert_eq!(parts.user_agent, "Unknown");
    }

    #[test]
    fn vhost_prefixed_line_uses_one_token_skip() {
        let line = r#"shop.example.com:443 203.0.113.9 - - [28/Jul/2026:06:00:00 +0000] "GET /cart HTTP/2.0" 200 77 "-" "curl/8.0""#;
        let parts = parse_combined_log(line).unwrap();
        assert_eq!(parts.ip, "203.0.113.9");
        assert_eq!(parts.path, "/cart");
    }

    #[test]
    fn unparseable_line_returns_none() {
        assert!(parse_combined_log("plain syslog message without structure").is_none());
    }

    #[test]
    fn round_trips_canonical_fields() {
        // format → parse must return the same canonical fields
        let (ip, method, path, status, bytes, ua) =
            ("192.0.2.1", "DELETE", "/api/v1/thing?id=4", 404u16, 99u64, "test-agent/1.0");
        let line = format!(
            r#"{ip} - - [28/Jul/2026:06:00:00 +0000] "{method} {path} HTTP/1.1" {status} {bytes} "-" "{ua}""#
        );
        let parts = parse_combined_log(&line).unwrap();
        assert_eq!(parts.ip, ip);
        assert_eq!(parts.method, method);
        assert_eq!(parts.path, path);
        assert_eq!(parts.status, status);
        assert_eq!(parts.bytes_sent, bytes);
        assert_eq!(parts.user_agent, ua);
    }

    #[test]
    fn domain_derivation_rules() {
        assert_eq!(domain_from_source("/var/log/nginx/example.com-access.log"), "example.com");
        assert_eq!(domain_from_source("/var/log/nginx/access.log"), "default");
        assert_eq!(domain_from_source("/var/log/apache2/shopaccess.log"), "shop");
        assert_eq!(domain_from_source("/var/log/nginx/error.log"), "unknown");
    }

    #[test]
    fn web_service_detection() {
        assert!(is_web_service("nginx"));
        assert!(is_web_service("Apache"));
        assert!(is_web_service("httpd"));
        assert!(is_web_service("my-webserver"));
        assert!(!is_web_service("mysql"));
    }
}
