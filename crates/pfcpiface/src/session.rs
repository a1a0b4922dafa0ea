//! Session registry.
//!
//! Maps a local SEID to the rule set programmed for that session. The
//! registry is owned by the protocol engine and never shared; entries are
//! only created and removed through the methods below.

use std::collections::HashMap;

use upf_fwdplane::{Far, Pdr};

/// Rules of one session as last programmed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    /// SEID the peer assigned; used as the header SEID of replies.
    pub peer_seid: u64,
    pub pdrs: Vec<Pdr>,
    pub fars: Vec<Far>,
}

impl SessionRecord {
    pub fn new(peer_seid: u64, pdrs: Vec<Pdr>, fars: Vec<Far>) -> Self {
        Self {
            peer_seid,
            pdrs,
            fars,
        }
    }

    pub fn far(&self, far_id: u32) -> Option<&Far> {
        self.fars.iter().find(|far| far.far_id == far_id)
    }

    /// Replaces the stored FAR with the same id. Returns false if absent.
    pub fn replace_far(&mut self, far: Far) -> bool {
        match self.fars.iter_mut().find(|f| f.far_id == far.far_id) {
            Some(slot) => {
                *slot = far;
                true
            }
            None => false,
        }
    }
}

/// Active sessions keyed by local SEID.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    sessions: HashMap<u64, SessionRecord>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_sessions,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// True once `max_sessions` entries are held.
    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.max_sessions
    }

    pub fn contains(&self, seid: u64) -> bool {
        self.sessions.contains_key(&seid)
    }

    /// Stores a session, returning the record it replaced.
    pub fn put(&mut self, seid: u64, record: SessionRecord) -> Option<SessionRecord> {
        self.sessions.insert(seid, record)
    }

    pub fn get(&self, seid: u64) -> Option<&SessionRecord> {
        self.sessions.get(&seid)
    }

    pub fn get_mut(&mut self, seid: u64) -> Option<&mut SessionRecord> {
        self.sessions.get_mut(&seid)
    }

    pub fn delete(&mut self, seid: u64) -> Option<SessionRecord> {
        self.sessions.remove(&seid)
    }

    /// Visits every session in ascending SEID order.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(u64, &SessionRecord),
    {
        for seid in self.seids() {
            if let Some(record) = self.sessions.get(&seid) {
                f(seid, record);
            }
        }
    }

    /// Local SEIDs in ascending order.
    pub fn seids(&self) -> Vec<u64> {
        let mut seids: Vec<u64> = self.sessions.keys().copied().collect();
        seids.sort_unstable();
        seids
    }

    /// Removes and returns every session in ascending SEID order.
    pub fn drain(&mut self) -> Vec<(u64, SessionRecord)> {
        let mut drained: Vec<_> = self.sessions.drain().collect();
        drained.sort_unstable_by_key(|(seid, _)| *seid);
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;
    use upf_fwdplane::FarAction;

    fn far(far_id: u32, action: FarAction) -> Far {
        Far {
            far_id,
            session_seid: 0x40,
            tunnel_endpoint: Ipv4Addr::new(198, 18, 0, 1),
            action,
            destination: None,
            encapsulation: None,
        }
    }

    #[test]
    fn test_put_get_delete() {
        let mut registry = SessionRegistry::new(10);
        assert!(registry.get(0x40).is_none());

        assert!(registry.put(0x40, SessionRecord::new(0x10, vec![], vec![])).is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(0x40).map(|r| r.peer_seid), Some(0x10));

        assert!(registry.delete(0x40).is_some());
        assert!(registry.delete(0x40).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_lookup_never_creates_entries() {
        let mut registry = SessionRegistry::new(10);
        assert!(registry.get_mut(0x40).is_none());
        assert!(!registry.contains(0x40));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_full_at_capacity() {
        let mut registry = SessionRegistry::new(2);
        registry.put(1, SessionRecord::default());
        assert!(!registry.is_full());
        registry.put(2, SessionRecord::default());
        assert!(registry.is_full());
    }

    #[test]
    fn test_drain_is_ordered_and_empties() {
        let mut registry = SessionRegistry::new(10);
        for seid in [0x80, 0x40, 0xC0] {
            registry.put(seid, SessionRecord::default());
        }
        let mut visited = Vec::new();
        registry.for_each(|seid, _| visited.push(seid));
        assert_eq!(visited, vec![0x40, 0x80, 0xC0]);

        let drained: Vec<u64> = registry.drain().into_iter().map(|(s, _)| s).collect();
        assert_eq!(drained, vec![0x40, 0x80, 0xC0]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_replace_far() {
        let mut record = SessionRecord::new(0x10, vec![], vec![far(1, FarAction::Drop)]);
        assert!(record.replace_far(far(1, FarAction::Forward)));
        assert_eq!(record.far(1).map(|f| f.action), Some(FarAction::Forward));
        assert!(!record.replace_far(far(2, FarAction::Forward)));
        assert_eq!(record.fars.len(), 1);
    }
}
