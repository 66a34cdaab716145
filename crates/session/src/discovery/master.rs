use crate::net::NetAddress;
use crate::protocol::MAX_SERVERSPERPACKET;

const IPV4_MARKER: u8 = b'\\';
const IPV6_MARKER: u8 = b'/';

/// Parses the address list of a `getserversResponse` datagram.
///
/// Each entry is a marker byte followed by the raw address and a big-endian
/// port. `extended` responses may also carry IPv6 entries. Parsing stops at
/// the first byte that is not a marker, at a short entry, or at the packet cap.
pub fn parse_server_list(data: &[u8], extended: bool) -> Vec<NetAddress> {
    let is_marker = |b: u8| b == IPV4_MARKER || (extended && b == IPV6_MARKER);

    let mut pos = match data.iter().position(|&b| is_marker(b)) {
        Some(pos) => pos,
        None => return Vec::new(),
    };

    let mut servers = Vec::new();
    while pos + 1 < data.len() {
        let size = match data[pos] {
            IPV4_MARKER => 4,
            IPV6_MARKER if extended => 16,
            _ => break,
        };
        pos += 1;

        // Address, port and the following marker byte.
        if data.len() - pos < size + 3 {
            break;
        }
        let raw = &data[pos..pos + size];
        pos += size;
        let port = u16::from_be_bytes([data[pos], data[pos + 1]]);
        pos += 2;

        if data[pos] != IPV4_MARKER && data[pos] != IPV6_MARKER {
            break;
        }

        if let Some(address) = NetAddress::from_raw(raw, port) {
            servers.push(address);
        }
        if servers.len() >= MAX_SERVERSPERPACKET {
            break;
        }
    }

    servers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::out_of_band_data;

    fn entry(ip: [u8; 4], port: u16) -> Vec<u8> {
        let mut bytes = vec![IPV4_MARKER];
        bytes.extend_from_slice(&ip);
        bytes.extend_from_slice(&port.to_be_bytes());
        bytes
    }

    fn response(entries: &[Vec<u8>], tail: &[u8]) -> Vec<u8> {
        let mut payload = b"getserversResponse".to_vec();
        for e in entries {
            payload.extend_from_slice(e);
        }
        payload.extend_from_slice(tail);
        out_of_band_data(&payload)
    }

    #[test]
    fn parses_ipv4_entries() {
        let data = response(
            &[entry([10, 0, 0, 1], 27960), entry([10, 0, 0, 2], 27961)],
            b"\\EOT\0\0\0",
        );
        let servers = parse_server_list(&data, false);
        assert_eq!(
            servers,
            vec![
                NetAddress::Ip("10.0.0.1:27960".parse().unwrap()),
                NetAddress::Ip("10.0.0.2:27961".parse().unwrap()),
            ]
        );
    }

    #[test]
    fn truncated_trailing_entry_keeps_earlier_ones() {
        let data = response(&[entry([10, 0, 0, 1], 27960)], &[IPV4_MARKER, 10, 0, 0]);
        let servers = parse_server_list(&data, false);
        assert_eq!(servers, vec![NetAddress::Ip("10.0.0.1:27960".parse().unwrap())]);
    }

    #[test]
    fn entry_without_following_marker_is_dropped() {
        let mut data = response(&[entry([10, 0, 0, 1], 27960), entry([10, 0, 0, 2], 1)], b"");
        data.push(b'x');
        let servers = parse_server_list(&data, false);
        assert_eq!(servers.len(), 1);
    }

    #[test]
    fn ipv6_requires_extended_response() {
        let mut v6 = vec![IPV6_MARKER];
        v6.extend_from_slice(&"2001:db8::7".parse::<std::net::Ipv6Addr>().unwrap().octets());
        v6.extend_from_slice(&27960u16.to_be_bytes());
        let data = response(&[entry([10, 0, 0, 1], 27960), v6], b"\\EOT");

        assert_eq!(parse_server_list(&data, false).len(), 1);
        let extended = parse_server_list(&data, true);
        assert_eq!(extended.len(), 2);
        assert!(extended[1].is_ipv6());
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(parse_server_list(&out_of_band_data(b"getserversResponse"), false).is_empty());
    }
}
