use bytes::Bytes;
use rtp::header::Header;

/// CachedPacket is a sent packet kept for retransmission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CachedPacket {
    pub(crate) header: Header,
    pub(crate) payload: Bytes,
}

/// PacketCache remembers the last `capacity` packets of a track, indexed by
/// sequence number.
#[derive(Debug)]
pub(crate) struct PacketCache {
    slots: Vec<Option<CachedPacket>>,
}

impl PacketCache {
    pub(crate) fn new(capacity: usize) -> Self {
        PacketCache {
            slots: vec![None; capacity.max(1)],
        }
    }

    #[inline]
    fn idx(&self, seq: u16) -> usize {
        (seq as usize) % self.slots.len()
    }

    pub(crate) fn put(&mut self, header: Header, payload: Bytes) {
        let idx = self.idx(header.sequence_number);
        self.slots[idx] = Some(CachedPacket { header, payload });
    }

    /// get returns the packet sent with `seq`, unless it was already evicted.
    pub(crate) fn get(&self, seq: u16) -> Option<&CachedPacket> {
        let cached = self.slots.get(self.idx(seq))?.as_ref()?;
        if cached.header.sequence_number != seq {
            // slot reused by a newer packet
            return None;
        }
        Some(cached)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn header(seq: u16) -> Header {
        Header {
            version: 2,
            sequence_number: seq,
            ..Default::default()
        }
    }

    #[test]
    fn test_packet_cache_get() {
        let mut cache = PacketCache::new(4);
        for seq in 0..6u16 {
            cache.put(header(seq), Bytes::from(vec![seq as u8]));
        }

        let tests = vec![
            (0u16, None),
            (1, None),
            (2, Some(vec![2u8])),
            (5, Some(vec![5u8])),
            (6, None),
        ];

        for (seq, expected) in tests {
            let got = cache.get(seq).map(|p| p.payload.to_vec());
            assert_eq!(got, expected, "seq {seq}");
        }
    }

    #[test]
    fn test_packet_cache_wraps_sequence_numbers() {
        let mut cache = PacketCache::new(128);
        cache.put(header(u16::MAX), Bytes::from_static(b"last"));
        cache.put(header(0), Bytes::from_static(b"first"));

        assert_eq!(cache.get(u16::MAX).map(|p| p.payload.clone()), Some(Bytes::from_static(b"last")));
        assert_eq!(cache.get(0).map(|p| p.payload.clone()), Some(Bytes::from_static(b"first")));
    }
}
