//! Record of transactions submitted through the adapter, and of recently
//! finalized ones.
//!
//! Transactions are keyed by the engine's hash: SHA-256 of the raw bytes as
//! uppercase hex. Finalized transactions land in a cache of two rotating
//! buckets; when the active bucket fills up the other one is cleared and
//! becomes active, so between one and two buckets' worth of entries survive.

use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::listener::CometExecTxResult;

/// Entries per cache bucket unless configured otherwise
pub const DEFAULT_CACHE_SIZE: usize = 1_000_000;

/// Engine hash of `tx`
pub fn transaction_hash(tx: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(tx))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionCheck {
    pub success: bool,
    pub height: Option<u64>,
    pub code: Option<u32>,
}

/// Where a transaction was finalized and what executing it returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInclusion {
    pub height: u64,
    /// Position in the block
    pub index: usize,
    pub result: CometExecTxResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub id: u64,
    pub tx: Vec<u8>,
    /// `None` until the broadcast call returns
    pub sent: Option<bool>,
    /// Uppercase hex hash reported by the engine
    pub hash: Option<String>,
    pub check: Option<TransactionCheck>,
    /// Set once a finalized block carries the transaction
    pub included: Option<TransactionInclusion>,
}

struct Inner {
    next_id: u64,
    records: HashMap<u64, TransactionRecord>,
    by_hash: HashMap<String, u64>,
    /// Maximum entries per bucket, 0 disables the cache
    cache_size: usize,
    buckets: [HashMap<String, TransactionInclusion>; 2],
    active: usize,
}

impl Inner {
    /// Cache lookup, active bucket first
    fn cached(&self, hash: &str) -> Option<TransactionInclusion> {
        (0..2)
            .map(|i| &self.buckets[(self.active + i) % 2])
            .find_map(|bucket| bucket.get(hash).cloned())
    }
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            next_id: 0,
            records: HashMap::new(),
            by_hash: HashMap::new(),
            cache_size: DEFAULT_CACHE_SIZE,
            buckets: [HashMap::new(), HashMap::new()],
            active: 0,
        }
    }
}

/// Submitted transactions by id (starting at 1) and by hash
#[derive(Default)]
pub struct TransactionRegistry {
    inner: Mutex<Inner>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resize the finalized-transaction cache. A smaller size takes effect at
    /// the next bucket rotation; 0 empties and disables it.
    pub fn set_cache_size(&self, size: usize) {
        let mut inner = self.lock();
        inner.cache_size = size;
        if size == 0 {
            inner.buckets.iter_mut().for_each(HashMap::clear);
            inner.active = 0;
        }
    }

    pub fn cache_size(&self) -> usize {
        self.lock().cache_size
    }

    pub fn register(&self, tx: Vec<u8>) -> u64 {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.records.insert(
            id,
            TransactionRecord {
                id,
                tx,
                sent: None,
                hash: None,
                check: None,
                included: None,
            },
        );
        id
    }

    pub fn record_sent(&self, id: u64, success: bool, hash: Option<&str>) {
        let mut inner = self.lock();
        let hash = hash.map(str::to_uppercase);
        // the block carrying it may have been finalized before the reply
        let included = hash.as_deref().and_then(|hash| inner.cached(hash));
        if let Some(record) = inner.records.get_mut(&id) {
            record.sent = Some(success);
            record.hash = hash.clone();
            if record.included.is_none() {
                record.included = included;
            }
        }
        if let Some(hash) = hash {
            inner.by_hash.insert(hash, id);
        }
    }

    /// Attach a lookup result to the transaction with `hash`, if known
    pub fn record_check(&self, hash: &str, check: TransactionCheck) {
        let mut inner = self.lock();
        let Some(id) = inner.by_hash.get(&hash.to_uppercase()).copied() else {
            return;
        };
        if let Some(record) = inner.records.get_mut(&id) {
            record.check = Some(check);
        }
    }

    /// Note that the transaction with `hash` was finalized. Submitted
    /// transactions keep it on their record; every transaction goes through
    /// the cache.
    pub fn record_included(&self, hash: &str, inclusion: TransactionInclusion) {
        let mut inner = self.lock();
        let hash = hash.to_uppercase();
        if let Some(id) = inner.by_hash.get(&hash).copied() {
            if let Some(record) = inner.records.get_mut(&id) {
                record.included = Some(inclusion.clone());
            }
        }
        if inner.cache_size == 0 {
            return;
        }
        let active = inner.active;
        inner.buckets[1 - active].remove(&hash);
        inner.buckets[active].insert(hash, inclusion);
        if inner.buckets[active].len() >= inner.cache_size {
            inner.active = 1 - active;
            let next = inner.active;
            inner.buckets[next].clear();
        }
    }

    /// Inclusion of a recently finalized transaction
    pub fn included(&self, hash: &str) -> Option<TransactionInclusion> {
        let inner = self.lock();
        let hash = hash.to_uppercase();
        inner.cached(&hash).or_else(|| {
            let id = inner.by_hash.get(&hash)?;
            inner.records.get(id)?.included.clone()
        })
    }

    pub fn get(&self, id: u64) -> Option<TransactionRecord> {
        self.lock().records.get(&id).cloned()
    }

    pub fn find_by_hash(&self, hash: &str) -> Option<TransactionRecord> {
        let inner = self.lock();
        let id = inner.by_hash.get(&hash.to_uppercase())?;
        inner.records.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one() {
        let registry = TransactionRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.register(b"a".to_vec()), 1);
        assert_eq!(registry.register(b"b".to_vec()), 2);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(2).unwrap().tx, b"b".to_vec());
        assert!(registry.get(3).is_none());
    }

    #[test]
    fn test_hash_lookup_is_case_insensitive() {
        let registry = TransactionRegistry::new();
        let id = registry.register(b"tx".to_vec());
        registry.record_sent(id, true, Some("abcdef"));

        let record = registry.find_by_hash("ABCDEF").unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.sent, Some(true));
        assert_eq!(record.hash.as_deref(), Some("ABCDEF"));

        registry.record_check(
            "abcdef",
            TransactionCheck {
                success: true,
                height: Some(4),
                code: Some(0),
            },
        );
        assert_eq!(registry.get(id).unwrap().check.unwrap().height, Some(4));
    }

    fn inclusion(height: u64, index: usize) -> TransactionInclusion {
        TransactionInclusion {
            height,
            index,
            result: CometExecTxResult {
                code: 0,
                data: vec![index as u8],
                gas_wanted: 10,
                gas_used: 7,
            },
        }
    }

    #[test]
    fn test_transaction_hash_is_uppercase_sha256() {
        assert_eq!(
            transaction_hash(b"abc"),
            "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD"
        );
    }

    #[test]
    fn test_inclusion_reaches_submitted_record() {
        let registry = TransactionRegistry::new();
        let id = registry.register(b"tx".to_vec());
        let hash = transaction_hash(b"tx");
        registry.record_sent(id, true, Some(&hash.to_lowercase()));

        registry.record_included(&hash, inclusion(9, 2));
        let record = registry.find_by_hash(&hash).unwrap();
        assert_eq!(record.included, Some(inclusion(9, 2)));
        assert_eq!(registry.included(&hash.to_lowercase()), Some(inclusion(9, 2)));

        // unknown transactions are cached too
        let other = transaction_hash(b"other");
        registry.record_included(&other, inclusion(9, 3));
        assert_eq!(registry.included(&other).unwrap().index, 3);
        assert!(registry.find_by_hash(&other).is_none());
    }

    #[test]
    fn test_inclusion_before_broadcast_reply() {
        let registry = TransactionRegistry::new();
        let id = registry.register(b"fast".to_vec());
        let hash = transaction_hash(b"fast");
        registry.record_included(&hash, inclusion(3, 0));
        registry.record_sent(id, true, Some(&hash));
        assert_eq!(registry.get(id).unwrap().included, Some(inclusion(3, 0)));
    }

    #[test]
    fn test_cache_rotates_buckets() {
        let registry = TransactionRegistry::new();
        registry.set_cache_size(2);
        let hashes: Vec<String> = (0u8..5).map(|i| transaction_hash(&[i])).collect();

        for (index, hash) in hashes.iter().enumerate() {
            registry.record_included(hash, inclusion(1, index));
        }
        // 0 and 1 filled the first bucket, 2 and 3 the second, 4 cleared the first
        assert!(registry.included(&hashes[0]).is_none());
        assert!(registry.included(&hashes[1]).is_none());
        assert_eq!(registry.included(&hashes[2]).unwrap().index, 2);
        assert_eq!(registry.included(&hashes[3]).unwrap().index, 3);
        assert_eq!(registry.included(&hashes[4]).unwrap().index, 4);
    }

    #[test]
    fn test_zero_cache_size_disables_cache() {
        let registry = TransactionRegistry::new();
        assert_eq!(registry.cache_size(), DEFAULT_CACHE_SIZE);
        let hash = transaction_hash(b"tx");
        registry.record_included(&hash, inclusion(1, 0));
        assert!(registry.included(&hash).is_some());

        registry.set_cache_size(0);
        assert!(registry.included(&hash).is_none());
        registry.record_included(&hash, inclusion(2, 0));
        assert!(registry.included(&hash).is_none());

        // a submitted transaction still keeps its own inclusion
        let id = registry.register(b"tx".to_vec());
        registry.record_sent(id, true, Some(&hash));
        registry.record_included(&hash, inclusion(3, 0));
        assert_eq!(registry.included(&hash).unwrap().height, 3);
    }

    #[test]
    fn test_failed_send_has_no_hash() {
        let registry = TransactionRegistry::new();
        let id = registry.register(b"tx".to_vec());
        registry.record_sent(id, false, None);
        let record = registry.get(id).unwrap();
        assert_eq!(record.sent, Some(false));
        assert!(record.hash.is_none());
    }
}
