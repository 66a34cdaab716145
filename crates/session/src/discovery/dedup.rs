use crate::net::NetAddress;
use crate::protocol::MAX_GLOBAL_SERVERS;

const HASH_BUCKETS: usize = 1024;

#[derive(Debug, Clone)]
struct DedupNode {
    address: NetAddress,
    next: Option<usize>,
}

/// Chained hash set of addresses already seen in the current sweep.
///
/// Nodes live in a fixed-capacity pool and buckets hold indices into it, so a
/// reset only clears the bucket heads and the pool length.
#[derive(Debug)]
pub struct AddressDedup {
    buckets: Vec<Option<usize>>,
    nodes: Vec<DedupNode>,
}

impl Default for AddressDedup {
    fn default() -> Self {
        Self {
            buckets: vec![None; HASH_BUCKETS],
            nodes: Vec::with_capacity(MAX_GLOBAL_SERVERS),
        }
    }
}

impl AddressDedup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, address: &NetAddress) -> bool {
        let mut cursor = self.buckets[bucket_of(address)];
        while let Some(index) = cursor {
            let node = &self.nodes[index];
            if node.address == *address {
                return true;
            }
            cursor = node.next;
        }
        false
    }

    /// Returns false once the node pool is exhausted.
    pub fn insert(&mut self, address: NetAddress) -> bool {
        if self.nodes.len() >= MAX_GLOBAL_SERVERS {
            return false;
        }
        let bucket = bucket_of(&address);
        self.nodes.push(DedupNode {
            address,
            next: self.buckets[bucket],
        });
        self.buckets[bucket] = Some(self.nodes.len() - 1);
        true
    }

    pub fn reset(&mut self) {
        self.buckets.fill(None);
        self.nodes.clear();
    }
}

/// Polynomial hash over the raw address bytes. IPv4 and IPv6 hash over 4 and
/// 16 bytes respectively; anything else lands in bucket 0.
fn bucket_of(address: &NetAddress) -> usize {
    let bytes = match address {
        NetAddress::Ip(_) => address.raw_bytes(),
        _ => Vec::new(),
    };
    let mut hash: u32 = 0;
    for byte in bytes {
        hash = hash.wrapping_mul(101).wrapping_add(byte as u32);
    }
    hash ^= hash >> 16;
    (hash as usize) & (HASH_BUCKETS - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(text: &str) -> NetAddress {
        NetAddress::Ip(text.parse().unwrap())
    }

    #[test]
    fn finds_inserted_addresses() {
        let mut dedup = AddressDedup::new();
        assert!(!dedup.contains(&addr("10.0.0.1:27960")));

        dedup.insert(addr("10.0.0.1:27960"));
        assert!(dedup.contains(&addr("10.0.0.1:27960")));
        assert!(!dedup.contains(&addr("10.0.0.1:27961")));
        assert!(!dedup.contains(&addr("10.0.0.2:27960")));
    }

    #[test]
    fn chained_entries_share_a_bucket() {
        let a = addr("10.0.0.1:27960");
        let b = addr("10.0.0.1:27961");
        assert_eq!(bucket_of(&a), bucket_of(&b));

        let mut dedup = AddressDedup::new();
        dedup.insert(a);
        dedup.insert(b);
        assert!(dedup.contains(&a));
        assert!(dedup.contains(&b));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn reset_forgets_everything() {
        let mut dedup = AddressDedup::new();
        dedup.insert(addr("[2001:db8::1]:27960"));
        dedup.reset();
        assert!(dedup.is_empty());
        assert!(!dedup.contains(&addr("[2001:db8::1]:27960")));
    }

    #[test]
    fn pool_is_bounded() {
        let mut dedup = AddressDedup::new();
        for i in 0..MAX_GLOBAL_SERVERS {
            let ip = std::net::Ipv4Addr::from(0x0a00_0000 + i as u32);
            assert!(dedup.insert(NetAddress::Ip((ip, 27960).into())));
        }
        assert!(!dedup.insert(addr("192.168.1.1:27960")));
        assert_eq!(dedup.len(), MAX_GLOBAL_SERVERS);
    }
}
