//! Server descriptor (`server.xml`) port handling.
//!
//! A configured descriptor is copied into the instance conf directory at
//! start. Its ports are either adopted into the configuration
//! (`keep-descriptor-ports`) or rewritten in place to the configured ones.
//! The scanner only needs `port` attributes on the `Server` and `Connector`
//! elements, so a full XML parser is not pulled in for this.

/// Ports read from, or written to, a server descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorPorts {
    pub http: i32,
    pub https: i32,
    pub stop: i32,
}

impl Default for DescriptorPorts {
    fn default() -> Self {
        Self {
            http: 8080,
            https: 8443,
            stop: 8005,
        }
    }
}

impl DescriptorPorts {
    /// Extract the ports from descriptor text. Missing elements keep their
    /// defaults.
    pub fn parse(content: &str) -> Self {
        let mut ports = Self::default();
        for tag in tags(content) {
            if tag.name == "Server" {
                if let Some(port) = tag.int_attribute("port") {
                    ports.stop = port;
                }
            } else if tag.name == "Connector" {
                let secure = tag
                    .attribute("secure")
                    .is_some_and(|v| v.eq_ignore_ascii_case("true"))
                    || tag.attribute("scheme").is_some_and(|v| v == "https");
                if let Some(port) = tag.int_attribute("port") {
                    if secure {
                        ports.https = port;
                    } else {
                        ports.http = port;
                    }
                }
            }
        }
        ports
    }

    /// Rewrite every known `port="..."` occurrence to the target ports.
    pub fn rewrite(content: &str, from: Self, to: Self) -> String {
        let mut out = content.to_string();
        for (old, new) in [(from.stop, to.stop), (from.http, to.http), (from.https, to.https)] {
            if old != new {
                out = out.replace(
                    &format!("port=\"{old}\""),
                    &format!("port=\"{new}\""),
                );
            }
        }
        out
    }
}

struct Tag<'a> {
    name: &'a str,
    body: &'a str,
}

impl Tag<'_> {
    fn attribute(&self, name: &str) -> Option<&str> {
        let needle = format!("{name}=\"");
        let start = self.body.find(&needle)? + needle.len();
        let end = self.body[start..].find('"')?;
        Some(&self.body[start..start + end])
    }

    fn int_attribute(&self, name: &str) -> Option<i32> {
        self.attribute(name)?.parse().ok()
    }
}

fn tags(content: &str) -> Vec<Tag<'_>> {
    let mut found = Vec::new();
    let mut rest = content;
    while let Some(start) = rest.find('<') {
        rest = &rest[start + 1..];
        let Some(end) = rest.find('>') else { break };
        let body = &rest[..end];
        if !body.starts_with(['/', '!', '?']) {
            let name = body
                .split(|c: char| c.is_whitespace() || c == '/')
                .next()
                .unwrap_or("");
            found.push(Tag { name, body });
        }
        rest = &rest[end + 1..];
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"<?xml version="1.0"?>
<Server port="9005" shutdown="SHUTDOWN">
  <Service name="Catalina">
    <Connector port="9080" protocol="HTTP/1.1"/>
    <Connector port="9443" secure="true" scheme="https"/>
  </Service>
</Server>
"#;

    #[test]
    fn test_parse_all_three_ports() {
        let ports = DescriptorPorts::parse(DESCRIPTOR);
        assert_eq!(ports.stop, 9005);
        assert_eq!(ports.http, 9080);
        assert_eq!(ports.https, 9443);
    }

    #[test]
    fn test_parse_missing_elements_keep_defaults() {
        let ports = DescriptorPorts::parse("<Server shutdown=\"SHUTDOWN\"/>");
        assert_eq!(ports, DescriptorPorts::default());
    }

    #[test]
    fn test_scheme_https_marks_connector_secure() {
        let ports = DescriptorPorts::parse("<Connector port=\"1234\" scheme=\"https\"/>");
        assert_eq!(ports.https, 1234);
        assert_eq!(ports.http, 8080);
    }

    #[test]
    fn test_rewrite_replaces_each_port() {
        let from = DescriptorPorts::parse(DESCRIPTOR);
        let to = DescriptorPorts {
            http: 18080,
            https: 18443,
            stop: 18005,
        };
        let rewritten = DescriptorPorts::rewrite(DESCRIPTOR, from, to);
        assert!(rewritten.contains("port=\"18080\""));
        assert!(rewritten.contains("port=\"18443\""));
        assert!(rewritten.contains("port=\"18005\""));
        assert!(!rewritten.contains("port=\"9080\""));
    }
}
