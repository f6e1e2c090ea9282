use anyhow::{anyhow, Result};

/// One endpoint to probe. Hostnames are kept unresolved: the prober connects
/// by name so HTTP probes can carry a proper Host header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

pub fn parse_targets(target_spec: &str, default_port: Option<u16>) -> Result<Vec<Target>> {
    let mut targets = Vec::new();

    for part in target_spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        targets.push(parse_single_target(part, default_port)?);
    }

    if targets.is_empty() {
        return Err(anyhow!("no targets given"));
    }

    Ok(targets)
}

fn parse_single_target(part: &str, default_port: Option<u16>) -> Result<Target> {
    // Bracketed IPv6 literal, optionally with a port: [::1] or [::1]:23
    if let Some(rest) = part.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("unclosed '[' in target: {part}"))?;
        let port = match after.strip_prefix(':') {
            Some(p) => parse_port(p)?,
            None if after.is_empty() => require_default_port(part, default_port)?,
            None => return Err(anyhow!("invalid target: {part}")),
        };
        return Ok(Target {
            host: host.to_string(),
            port,
        });
    }

    match part.matches(':').count() {
        0 => Ok(Target {
            host: part.to_string(),
            port: require_default_port(part, default_port)?,
        }),
        1 => {
            let (host, port) = match part.split_once(':') {
                Some(split) => split,
                None => return Err(anyhow!("invalid target: {part}")),
            };
            if host.is_empty() {
                return Err(anyhow!("empty host in target: {part}"));
            }
            Ok(Target {
                host: host.to_string(),
                port: parse_port(port)?,
            })
        }
        // More than one colon without brackets: a bare IPv6 address
        _ => Ok(Target {
            host: part.to_string(),
            port: require_default_port(part, default_port)?,
        }),
    }
}

fn require_default_port(part: &str, default_port: Option<u16>) -> Result<u16> {
    default_port.ok_or_else(|| anyhow!("target {part} has no port and no --port default was given"))
}

fn parse_port(port: &str) -> Result<u16> {
    let port: u16 = port
        .parse()
        .map_err(|_| anyhow!("invalid port: {port}"))?;
    if port == 0 {
        return Err(anyhow!("port must be between 1 and 65535"));
    }
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_with_port() {
        let targets = parse_targets("router.local:23", None).unwrap();
        assert_eq!(
            targets,
            vec![Target {
                host: "router.local".to_string(),
                port: 23
            }]
        );
    }

    #[test]
    fn test_parse_bare_host_uses_default_port() {
        let targets = parse_targets("10.0.0.1", Some(22)).unwrap();
        assert_eq!(targets[0].port, 22);
    }

    #[test]
    fn test_parse_bare_host_without_default_fails() {
        assert!(parse_targets("10.0.0.1", None).is_err());
    }

    #[test]
    fn test_parse_mixed_list() {
        let targets = parse_targets("a.example:22, b.example:80,c.example", Some(443)).unwrap();
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[2].port, 443);
    }

    #[test]
    fn test_parse_bracketed_ipv6() {
        let targets = parse_targets("[::1]:2323", None).unwrap();
        assert_eq!(targets[0].host, "::1");
        assert_eq!(targets[0].port, 2323);
    }

    #[test]
    fn test_parse_bare_ipv6_uses_default_port() {
        let targets = parse_targets("fe80::1", Some(23)).unwrap();
        assert_eq!(targets[0].host, "fe80::1");
        assert_eq!(targets[0].port, 23);
    }

    #[test]
    fn test_parse_port_zero_rejected() {
        assert!(parse_targets("host:0", None).is_err());
    }

    #[test]
    fn test_parse_invalid_port_rejected() {
        assert!(parse_targets("host:notaport", None).is_err());
        assert!(parse_targets("host:70000", None).is_err());
    }

    #[test]
    fn test_parse_empty_spec_rejected() {
        assert!(parse_targets(" , ,", Some(23)).is_err());
    }
}
