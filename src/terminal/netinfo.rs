use super::{expect::send_command, link::SerialLink};
use crate::error::{FoxError, FoxResult};
use if_chain::if_chain;
use std::time::Duration;
use tracing::{info, warn};

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(i, m)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + m.len()..].chars().next();
        !before.map_or(false, is_word_char) && !after.map_or(false, is_word_char)
    })
}

/// Dotted quad with 1 to 3 digits per octet.
fn is_ipv4(text: &str) -> bool {
    let octets: Vec<&str> = text.split('.').collect();
    octets.len() == 4
        && octets
            .iter()
            .all(|o| (1..=3).contains(&o.len()) && o.chars().all(|c| c.is_ascii_digit()))
}

/// `inet 192.168.50.5/24 brd 192.168.50.255 scope global eth0`
fn from_ip_addr(output: &str, interface: &str) -> Option<String> {
    for line in output.lines() {
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            if token != "inet" {
                continue;
            }
            if_chain! {
                if let Some(cidr) = tokens.next();
                if let Some((addr, prefix)) = cidr.split_once('/');
                if is_ipv4(addr);
                if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit());
                if let Some(rest) = line.split_once(cidr).map(|(_, rest)| rest);
                if rest.starts_with(char::is_whitespace) && contains_word(rest, interface);
                then {
                    return Some(addr.to_string());
                }
            }
        }
    }
    None
}

/// BusyBox `ifconfig` block: `eth0  Link encap:Ethernet ...` then an indented
/// `inet addr:192.168.1.102  Bcast:...` line.
fn from_ifconfig(output: &str, interface: &str) -> Option<String> {
    let mut in_block = false;
    for line in output.lines() {
        let indented = line.starts_with(char::is_whitespace);
        if in_block && (line.trim().is_empty() || !indented) {
            in_block = false;
        }
        if !indented && line.starts_with(interface) && line.contains("Link encap:") {
            let after = &line[interface.len()..];
            in_block = after.starts_with(char::is_whitespace);
            continue;
        }
        if !in_block {
            continue;
        }
        if let Some((_, rest)) = line.split_once("inet addr:") {
            let addr: String = rest.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
            if is_ipv4(&addr) {
                return Some(addr);
            }
        }
    }
    None
}

pub fn parse_ip_address(output: &str, interface: &str) -> Option<String> {
    from_ip_addr(output, interface).or_else(|| from_ifconfig(output, interface))
}

/// Asks the target for its address on `interface`, trying `ip` then `ifconfig`.
pub fn target_ip<L: SerialLink + ?Sized>(
    link: &mut L,
    prompts: &[String],
    interface: &str,
    timeout: Duration,
) -> FoxResult<String> {
    for command in [format!("ip addr show {}", interface), format!("ifconfig {}", interface)] {
        match send_command(link, &command, prompts, timeout) {
            Ok(output) => {
                if let Some(ip) = parse_ip_address(&output, interface) {
                    info!("target ip on {} is {}", interface, ip);
                    return Ok(ip);
                }
                warn!("no address in output of {:?}", command);
            }
            Err(e) => warn!("{:?} failed: {}", command, e),
        }
    }
    Err(FoxError::Remote(format!("could not determine ip address of {}", interface)))
}
