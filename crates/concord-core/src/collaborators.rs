//! Contracts for the five external collaborators the core consumes (§6).
//!
//! The core does not prescribe any collaborator's wire format; these traits
//! describe only the operations an engine is allowed to call. A deterministic
//! in-memory implementation of each trait lives in [`testing`] for use by the
//! engines' own unit tests and by the Hardening harness.

use futures::future::BoxFuture;

use crate::ids::{CellId, FederationTxId, MemberId};
use crate::Timestamp;

/// `is_active`/`public_key`/`verify` — member admission and signature
/// verification. Admission outcomes arrive as `Ledger::add_member` calls;
/// this trait never drives them directly.
pub trait Identity: Send + Sync {
    fn is_active(&self, member: &MemberId) -> bool;
    fn public_key(&self, member: &MemberId) -> Option<Vec<u8>>;
    fn verify(&self, member: &MemberId, message: &[u8], signature: &[u8]) -> bool;
}

/// `is_authorized` plus the source of limit-adjustment and
/// commitment-dispute-resolution proposals.
pub trait Governance: Send + Sync {
    fn is_authorized(&self, actor: &MemberId, action: &str) -> bool;
}

/// Monotonic wall-clock source, in milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Timestamp;
}

/// Opaque key-value storage. The core persists ledger state, transactions,
/// commitments, federation state, membership changes, and the event log
/// through this contract; see §6 for the namespaced key layout.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, crate::CoreError>;
    fn put(&self, key: &str, value: &[u8]) -> Result<(), crate::CoreError>;
    fn delete(&self, key: &str) -> Result<(), crate::CoreError>;
    /// Keys whose prefix matches `selector`, in storage order.
    fn find(&self, selector: &str) -> Result<Vec<(String, Vec<u8>)>, crate::CoreError>;
}

/// Request/response between cells for the target-remote leg of a federation
/// transfer (§4.4 step 2/4). Payloads are opaque signed bytes; the core does
/// not interpret them beyond the fields needed to run the protocol.
pub struct RemoteTransferRequest {
    pub tx_id: FederationTxId,
    pub source_cell: CellId,
    pub target_cell: CellId,
    pub payee: MemberId,
    pub amount: crate::Balance,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteTransferOutcome {
    Accepted,
    Rejected { reason: String },
}

/// Federation transport. The target-remote round trip is the protocol's only
/// genuine suspension point (§5), modeled as `async` with a bounded timeout
/// rather than a synchronous trust assumption.
pub trait FederationTransport: Send + Sync {
    fn validate_remote<'a>(
        &'a self,
        request: &'a RemoteTransferRequest,
    ) -> BoxFuture<'a, Result<RemoteTransferOutcome, crate::CoreError>>;

    fn execute_remote<'a>(
        &'a self,
        request: &'a RemoteTransferRequest,
    ) -> BoxFuture<'a, Result<RemoteTransferOutcome, crate::CoreError>>;

    fn rollback_remote<'a>(
        &'a self,
        tx_id: &'a FederationTxId,
    ) -> BoxFuture<'a, Result<(), crate::CoreError>>;
}

/// Deterministic in-memory collaborator implementations for tests and the
/// Hardening harness. Mirrors the reference stack's own test fixtures (a
/// throwaway temp `sled::Db`, an ephemeral keypair) rather than mocking
/// through a framework.
pub mod testing {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    use futures::future::BoxFuture;
    use futures::FutureExt;

    use super::*;

    /// Treats every listed member as Active and accepts any signature whose
    /// bytes equal `member id || message` — good enough to drive the engines'
    /// own validation logic without pulling in real key material.
    pub struct StubIdentity {
        members: HashMap<MemberId, Vec<u8>>,
    }

    impl StubIdentity {
        pub fn new() -> Self {
            Self {
                members: HashMap::new(),
            }
        }

        pub fn register(&mut self, member: MemberId, public_key: Vec<u8>) {
            self.members.insert(member, public_key);
        }
    }

    impl Default for StubIdentity {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Identity for StubIdentity {
        fn is_active(&self, member: &MemberId) -> bool {
            self.members.contains_key(member)
        }

        fn public_key(&self, member: &MemberId) -> Option<Vec<u8>> {
            self.members.get(member).cloned()
        }

        fn verify(&self, member: &MemberId, message: &[u8], signature: &[u8]) -> bool {
            let Some(expected) = self.public_key(member) else {
                return false;
            };
            let mut want = member.as_bytes().to_vec();
            want.extend_from_slice(message);
            want.extend_from_slice(&expected);
            blake3::hash(&want).as_bytes().to_vec() == signature
        }
    }

    /// Authorizes every action: a harmless default for tests that don't
    /// exercise governance-gated paths.
    pub struct PermissiveGovernance;

    impl Governance for PermissiveGovernance {
        fn is_authorized(&self, _actor: &MemberId, _action: &str) -> bool {
            true
        }
    }

    /// A clock driven entirely by the test: starts at zero, advances only
    /// when told to. Keeps Hardening's seeded runs reproducible — a real
    /// wall clock would make "identical seed ⇒ identical sequence" false.
    pub struct ManualClock {
        now_ms: Mutex<Timestamp>,
    }

    impl ManualClock {
        pub fn new(start_ms: Timestamp) -> Self {
            Self {
                now_ms: Mutex::new(start_ms),
            }
        }

        pub fn advance(&self, delta_ms: Timestamp) {
            *self.now_ms.lock().unwrap() += delta_ms;
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> Timestamp {
            *self.now_ms.lock().unwrap()
        }
    }

    /// A plain in-memory `BTreeMap`-backed store, for tests that want the
    /// `Storage` contract without paying for `sled`.
    pub struct MemoryStorage {
        data: Mutex<BTreeMap<String, Vec<u8>>>,
    }

    impl MemoryStorage {
        pub fn new() -> Self {
            Self {
                data: Mutex::new(BTreeMap::new()),
            }
        }
    }

    impl Default for MemoryStorage {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Storage for MemoryStorage {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, crate::CoreError> {
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        fn put(&self, key: &str, value: &[u8]) -> Result<(), crate::CoreError> {
            self.data
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }

        fn delete(&self, key: &str) -> Result<(), crate::CoreError> {
            self.data.lock().unwrap().remove(key);
            Ok(())
        }

        fn find(&self, selector: &str) -> Result<Vec<(String, Vec<u8>)>, crate::CoreError> {
            Ok(self
                .data
                .lock()
                .unwrap()
                .range(selector.to_string()..)
                .take_while(|(k, _)| k.starts_with(selector))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        }
    }

    /// Always accepts the remote leg — for tests of the happy path. Pair
    /// with [`RejectingTransport`] to exercise rollback.
    pub struct AcceptingTransport;

    impl FederationTransport for AcceptingTransport {
        fn validate_remote<'a>(
            &'a self,
            _request: &'a RemoteTransferRequest,
        ) -> BoxFuture<'a, Result<RemoteTransferOutcome, crate::CoreError>> {
            async { Ok(RemoteTransferOutcome::Accepted) }.boxed()
        }

        fn execute_remote<'a>(
            &'a self,
            _request: &'a RemoteTransferRequest,
        ) -> BoxFuture<'a, Result<RemoteTransferOutcome, crate::CoreError>> {
            async { Ok(RemoteTransferOutcome::Accepted) }.boxed()
        }

        fn rollback_remote<'a>(
            &'a self,
            _tx_id: &'a FederationTxId,
        ) -> BoxFuture<'a, Result<(), crate::CoreError>> {
            async { Ok(()) }.boxed()
        }
    }

    /// Always rejects the remote leg with the given reason — drives the
    /// compensating-rollback path deterministically.
    pub struct RejectingTransport {
        pub reason: String,
    }

    impl FederationTransport for RejectingTransport {
        fn validate_remote<'a>(
            &'a self,
            _request: &'a RemoteTransferRequest,
        ) -> BoxFuture<'a, Result<RemoteTransferOutcome, crate::CoreError>> {
            let reason = self.reason.clone();
            async move { Ok(RemoteTransferOutcome::Rejected { reason }) }.boxed()
        }

        fn execute_remote<'a>(
            &'a self,
            _request: &'a RemoteTransferRequest,
        ) -> BoxFuture<'a, Result<RemoteTransferOutcome, crate::CoreError>> {
            let reason = self.reason.clone();
            async move { Ok(RemoteTransferOutcome::Rejected { reason }) }.boxed()
        }

        fn rollback_remote<'a>(
            &'a self,
            _tx_id: &'a FederationTxId,
        ) -> BoxFuture<'a, Result<(), crate::CoreError>> {
            async { Ok(()) }.boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn stub_identity_verifies_matching_signature() {
        let mut identity = StubIdentity::new();
        let member = MemberId::from_bytes([3u8; 32]);
        identity.register(member, b"pubkey".to_vec());

        let message = b"hello";
        let mut want = member.as_bytes().to_vec();
        want.extend_from_slice(message);
        want.extend_from_slice(b"pubkey");
        let sig = blake3::hash(&want).as_bytes().to_vec();

        assert!(identity.verify(&member, message, &sig));
        assert!(!identity.verify(&member, message, b"garbage"));
    }

    #[test]
    fn memory_storage_find_is_prefix_scoped() {
        let storage = MemoryStorage::new();
        storage.put("member:a", b"1").unwrap();
        storage.put("member:b", b"2").unwrap();
        storage.put("transaction:a", b"3").unwrap();

        let found = storage.find("member:").unwrap();
        assert_eq!(found.len(), 2);
    }
}
