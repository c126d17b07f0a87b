// WG Profile Manager - Profile Config Parser
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Parser for WireGuard `<profile>.conf` files.
//!
//! Section markers and keys match case-insensitively and values are trimmed.
//! Unknown keys and sections are ignored. `Address`, `DNS` and `AllowedIPs`
//! accumulate across repeated keys and comma-separated values, keeping file
//! order and duplicates.
//!
//! A `#ping <host>` comment attaches a diagnostic target to the most recently
//! opened `[Peer]` section. Seen before any peer, it waits for the next one.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

use crate::models::{Error, Peer, Profile, Result, SecretKey};

/// Comment directive carrying a diagnostic ping target.
const PING_DIRECTIVE: &str = "#ping";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Interface,
    Peer,
    Other,
}

/// Parse a profile config file. The profile name is the file's base name.
pub fn parse_profile_file(path: &Path) -> Result<Profile> {
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::ConfigNotFound(path.to_path_buf()),
        _ => Error::config_unreadable(path, e),
    })?;

    let name = Profile::name_from_path(path)
        .ok_or_else(|| Error::InvalidProfile(format!("No profile name in {}", path.display())))?;

    Ok(parse_profile_str(&name, &text))
}

/// Parse profile config text.
pub fn parse_profile_str(name: &str, text: &str) -> Profile {
    let mut profile = Profile::new(name);
    // Section without an explicit marker is the interface.
    let mut section = Section::Interface;
    let mut pending_pings: Vec<String> = Vec::new();

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(target) = ping_directive(line) {
            match profile.peers.last_mut() {
                Some(peer) => peer.ping_target = Some(target),
                None => pending_pings.push(target),
            }
            continue;
        }

        if line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            section = match line[1..line.len() - 1].trim().to_ascii_lowercase().as_str() {
                "interface" => Section::Interface,
                "peer" => {
                    let mut peer = Peer::default();
                    if !pending_pings.is_empty() {
                        peer.ping_target = pending_pings.pop();
                        pending_pings.clear();
                    }
                    profile.peers.push(peer);
                    Section::Peer
                }
                other => {
                    debug!("{}: ignoring unknown section [{}]", name, other);
                    Section::Other
                }
            };
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            debug!("{}:{}: ignoring line without '='", name, line_no + 1);
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        match section {
            Section::Interface => apply_interface_key(&mut profile, &key, value),
            Section::Peer => {
                if let Some(peer) = profile.peers.last_mut() {
                    apply_peer_key(peer, &key, value);
                }
            }
            Section::Other => {}
        }
    }

    profile.ping_hints = pending_pings;
    profile
}

/// Extract the target of a `#ping <host>` line.
fn ping_directive(line: &str) -> Option<String> {
    let head = line.get(..PING_DIRECTIVE.len())?;
    if !head.eq_ignore_ascii_case(PING_DIRECTIVE) {
        return None;
    }
    let rest = &line[PING_DIRECTIVE.len()..];
    // "#pinger" is an ordinary comment
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let target = rest.trim();
    if target.is_empty() {
        None
    } else {
        Some(target.to_string())
    }
}

fn apply_interface_key(profile: &mut Profile, key: &str, value: &str) {
    match key {
        "address" => push_list(&mut profile.addresses, value),
        "dns" => push_list(&mut profile.dns, value),
        "privatekey" => profile.private_key = Some(SecretKey::new(value)),
        "listenport" => profile.listen_port = parse_number(key, value),
        "mtu" => profile.mtu = parse_number(key, value),
        _ => {}
    }
}

fn apply_peer_key(peer: &mut Peer, key: &str, value: &str) {
    match key {
        "publickey" => peer.public_key = Some(value.to_string()),
        "presharedkey" => peer.preshared_key = Some(SecretKey::new(value)),
        "allowedips" => push_list(&mut peer.allowed_ips, value),
        "endpoint" => peer.endpoint = Some(value.to_string()),
        "persistentkeepalive" => {
            peer.persistent_keepalive = if value.eq_ignore_ascii_case("off") {
                None
            } else {
                parse_number(key, value)
            }
        }
        _ => {}
    }
}

fn push_list(list: &mut Vec<String>, value: &str) {
    list.extend(
        value
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string),
    );
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            debug!("Ignoring non-numeric {} value: {}", key, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
[Interface]
PrivateKey = yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=
Address = 10.8.0.2/32
Address = fd00::2/128, 10.8.0.2/32
DNS = 1.1.1.1
ListenPort = 51820
MTU = 1420
Table = off

[Peer]
#ping 10.8.0.1
PublicKey = xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=
PresharedKey = /UwcSPg38hW/D9Y3tcS1FOV0K1wuURMbS0sesJEP5ak=
AllowedIPs = 0.0.0.0/0, ::/0
Endpoint = vpn.example.com:51820
PersistentKeepalive = 25
";

    #[test]
    fn test_parse_sample() {
        let profile = parse_profile_str("office", SAMPLE);
        assert_eq!(profile.name, "office");
        assert_eq!(
            profile.addresses,
            vec!["10.8.0.2/32", "fd00::2/128", "10.8.0.2/32"]
        );
        assert_eq!(profile.dns, vec!["1.1.1.1"]);
        assert_eq!(profile.listen_port, Some(51820));
        assert_eq!(profile.mtu, Some(1420));
        assert!(profile.private_key.is_some());
        assert_eq!(profile.peers.len(), 1);

        let peer = &profile.peers[0];
        assert_eq!(peer.ping_target.as_deref(), Some("10.8.0.1"));
        assert_eq!(peer.allowed_ips, vec!["0.0.0.0/0", "::/0"]);
        assert_eq!(peer.endpoint.as_deref(), Some("vpn.example.com:51820"));
        assert_eq!(peer.persistent_keepalive, Some(25));
        // Base64 padding survives the key/value split.
        assert_eq!(
            peer.public_key.as_deref(),
            Some("xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=")
        );
        assert!(profile.is_full_tunnel());
        assert!(profile.validate().is_empty());
    }

    #[test]
    fn test_case_insensitive_keys_and_sections() {
        let text = "[INTERFACE]\naddress=10.0.0.2/24\n[peer]\nALLOWEDIPS =  10.0.0.0/24 \n";
        let profile = parse_profile_str("lab", text);
        assert_eq!(profile.addresses, vec!["10.0.0.2/24"]);
        assert_eq!(profile.peers[0].allowed_ips, vec!["10.0.0.0/24"]);
        assert!(!profile.is_full_tunnel());
    }

    #[test]
    fn test_default_section_is_interface() {
        let profile = parse_profile_str("bare", "Address = 10.1.0.2/32\nDNS = 9.9.9.9\nDNS = 9.9.9.9\n");
        assert_eq!(profile.addresses, vec!["10.1.0.2/32"]);
        assert_eq!(profile.dns, vec!["9.9.9.9", "9.9.9.9"]);
        assert!(profile.peers.is_empty());
    }

    #[test]
    fn test_ping_hint_attaches_to_latest_peer() {
        let text = "\
[Peer]
PublicKey = a
[Peer]
PublicKey = b
#PING 192.168.7.1
";
        let profile = parse_profile_str("multi", text);
        assert_eq!(profile.peers[0].ping_target, None);
        assert_eq!(profile.peers[1].ping_target.as_deref(), Some("192.168.7.1"));
    }

    #[test]
    fn test_ping_hint_before_peer_waits_for_it() {
        let text = "[Interface]\n#ping 10.9.0.1\n[Peer]\nPublicKey = a\n";
        let profile = parse_profile_str("early", text);
        assert_eq!(profile.peers[0].ping_target.as_deref(), Some("10.9.0.1"));
        assert!(profile.ping_hints.is_empty());

        let profile = parse_profile_str("no-peer", "#ping 10.9.0.1\nAddress = 10.9.0.2/32\n");
        assert_eq!(profile.ping_hints, vec!["10.9.0.1"]);
    }

    #[test]
    fn test_ordinary_comments_are_ignored() {
        let text = "# Address = 1.2.3.4/32\n#pinger\n#ping\n; DNS = 8.8.8.8\nGarbage line\n";
        let profile = parse_profile_str("comments", text);
        assert!(profile.addresses.is_empty());
        assert!(profile.dns.is_empty());
        assert!(profile.ping_hints.is_empty());
    }

    #[test]
    fn test_unknown_sections_are_ignored() {
        let text = "[Interface]\nAddress = 10.0.0.2/32\n[Extra]\nAddress = 10.9.9.9/32\n";
        let profile = parse_profile_str("extra", text);
        assert_eq!(profile.addresses, vec!["10.0.0.2/32"]);
    }

    #[test]
    fn test_bad_numbers_become_none() {
        let profile = parse_profile_str("nums", "ListenPort = high\nMTU = -1\n");
        assert_eq!(profile.listen_port, None);
        assert_eq!(profile.mtu, None);
    }

    #[test]
    fn test_parse_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.conf");
        assert!(matches!(
            parse_profile_file(&missing),
            Err(Error::ConfigNotFound(p)) if p == missing
        ));

        // A directory cannot be read as a file.
        let as_dir = dir.path().join("dir.conf");
        std::fs::create_dir(&as_dir).unwrap();
        assert!(matches!(
            parse_profile_file(&as_dir),
            Err(Error::ConfigUnreadable { .. })
        ));
    }

    #[test]
    fn test_parse_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vpn1.conf");
        std::fs::write(&path, SAMPLE).unwrap();

        let first = parse_profile_file(&path).unwrap();
        let second = parse_profile_file(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.name, "vpn1");
    }
}
