//! Inbound identity to broker session map
//!
//! Each identity owns at most one [`BrokerSession`]. Entries are per-identity
//! cells: the map lock only guards finding or inserting the cell, the dial
//! itself runs outside of it and at most once per cell. Callers that race on
//! the same identity wait on the same cell and share its outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::OnceCell;

use pulsar_proxy_net::NetError;
use pulsar_proxy_utils::Counter;

use crate::error::CreationError;
use crate::session::{BrokerConnector, BrokerSession};
use crate::types::{BrokerTarget, HashMap, InboundIdentity, SessionConfig};

type Slot = Arc<SessionSlot>;

#[derive(Default)]
struct SessionSlot {
    cell: OnceCell<Result<Arc<BrokerSession>, CreationError>>,
    //set while the session is counted in the stats
    counted: AtomicBool,
}

pub struct SessionRegistry {
    connector: Arc<dyn BrokerConnector>,
    sessions: RwLock<HashMap<InboundIdentity, Slot>>,
    stats: Counter,
}

impl SessionRegistry {
    pub fn new(connector: Arc<dyn BrokerConnector>) -> Self {
        SessionRegistry { connector, sessions: RwLock::new(HashMap::default()), stats: Counter::new() }
    }

    /// Established session of `identity`, never dials
    #[inline]
    pub fn get(&self, identity: &InboundIdentity) -> Option<Arc<BrokerSession>> {
        match self.sessions.read().get(identity).and_then(|slot| slot.cell.get()) {
            Some(Ok(s)) => Some(s.clone()),
            _ => None,
        }
    }

    /// Returns the session of `identity`, dialing `target` if there is none yet
    ///
    /// A failed dial leaves no entry behind, a later call dials again.
    pub async fn get_or_create(
        &self,
        identity: InboundIdentity,
        target: &BrokerTarget,
        cfg: &SessionConfig,
    ) -> Result<Arc<BrokerSession>, CreationError> {
        if let Some(s) = self.get(&identity) {
            return Ok(s);
        }

        let slot = {
            let mut sessions = self.sessions.write();
            let slot = sessions.entry(identity).or_default();
            //a failed cell that has not been evicted yet is not reused
            if matches!(slot.cell.get(), Some(Err(_))) {
                *slot = Slot::default();
            }
            slot.clone()
        };

        match slot.cell.get_or_init(|| self.create(identity, target, cfg)).await {
            Ok(s) => {
                if !self.adopt(&identity, &slot) {
                    log::debug!("{identity} broker session to {target} was removed while connecting");
                    s.close().await;
                    return Err(CreationError::Removed(target.clone()));
                }
                if s.target() != target {
                    log::debug!("{identity} reuses broker session to {}, requested {target}", s.target());
                }
                Ok(s.clone())
            }
            Err(e) => {
                self.evict(&identity, &slot);
                Err(e.clone())
            }
        }
    }

    async fn create(
        &self,
        identity: InboundIdentity,
        target: &BrokerTarget,
        cfg: &SessionConfig,
    ) -> Result<Arc<BrokerSession>, CreationError> {
        log::debug!("{identity} connecting to broker {target}");
        let connecting = self.connector.connect(target, cfg);
        let res = if cfg.connect_timeout.is_zero() {
            connecting.await
        } else {
            match tokio::time::timeout(cfg.connect_timeout, connecting).await {
                Ok(res) => res,
                Err(_) => return Err(CreationError::Timeout(target.clone(), cfg.connect_timeout)),
            }
        };

        match res {
            Ok(transport) => {
                log::debug!("{identity} connected to broker {target}");
                Ok(Arc::new(BrokerSession::new(identity, target.clone(), transport)))
            }
            Err(e) if matches!(e.downcast_ref::<NetError>(), Some(NetError::ConnectTimeout(_))) => {
                Err(CreationError::Timeout(target.clone(), cfg.connect_timeout))
            }
            Err(e) => Err(CreationError::Connect(target.clone(), Arc::new(e))),
        }
    }

    /// Counts the session of `slot` once, false if `slot` is no longer in the map
    fn adopt(&self, identity: &InboundIdentity, slot: &Slot) -> bool {
        let sessions = self.sessions.read();
        match sessions.get(identity) {
            Some(cur) if Arc::ptr_eq(cur, slot) => {
                if !slot.counted.swap(true, Ordering::SeqCst) {
                    self.stats.inc();
                }
                true
            }
            _ => false,
        }
    }

    fn evict(&self, identity: &InboundIdentity, slot: &Slot) {
        let mut sessions = self.sessions.write();
        if let Some(cur) = sessions.get(identity) {
            if Arc::ptr_eq(cur, slot) && !matches!(cur.cell.get(), Some(Ok(_))) {
                sessions.remove(identity);
            }
        }
    }

    /// Drops the entry of `identity`, the caller closes the returned session
    pub fn remove(&self, identity: &InboundIdentity) -> Option<Arc<BrokerSession>> {
        let slot = self.sessions.write().remove(identity)?;
        self.uncount(&slot);
        match slot.cell.get() {
            Some(Ok(s)) => Some(s.clone()),
            _ => None,
        }
    }

    /// Empties the registry, returning every established session
    pub fn drain(&self) -> Vec<Arc<BrokerSession>> {
        let slots = std::mem::take(&mut *self.sessions.write());
        slots
            .into_values()
            .filter_map(|slot| {
                self.uncount(&slot);
                match slot.cell.get() {
                    Some(Ok(s)) => Some(s.clone()),
                    _ => None,
                }
            })
            .collect()
    }

    #[inline]
    fn uncount(&self, slot: &Slot) {
        if slot.counted.swap(false, Ordering::SeqCst) {
            self.stats.dec();
        }
    }

    #[inline]
    pub fn contains(&self, identity: &InboundIdentity) -> bool {
        self.get(identity).is_some()
    }

    /// Number of established sessions
    #[inline]
    pub fn len(&self) -> usize {
        self.sessions.read().values().filter(|slot| matches!(slot.cell.get(), Some(Ok(_)))).count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn stats(&self) -> serde_json::Value {
        let connecting = self.sessions.read().values().filter(|slot| !slot.cell.initialized()).count();
        serde_json::json!({
            "sessions": self.stats.to_json(),
            "connecting": connecting,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnector;
    use std::time::Duration;

    fn id(s: &str) -> InboundIdentity {
        s.parse().unwrap()
    }

    fn broker1() -> BrokerTarget {
        BrokerTarget::new("broker1", 6650)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_handshakes_dial_once() {
        let connector = MockConnector::with_delay(Duration::from_millis(50));
        let registry = Arc::new(SessionRegistry::new(connector.clone()));
        let cfg = SessionConfig::default();

        let tasks = (0..16)
            .map(|_| {
                let registry = registry.clone();
                let cfg = cfg.clone();
                tokio::spawn(async move { registry.get_or_create(id("10.0.0.5:54321"), &broker1(), &cfg).await })
            })
            .collect::<Vec<_>>();

        let mut sessions = Vec::new();
        for t in tasks {
            sessions.push(t.await.unwrap().unwrap());
        }
        assert_eq!(connector.dials(), 1);
        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failure_shared() {
        let connector = MockConnector::with_delay(Duration::from_millis(200));
        connector.set_unreachable(true);
        let registry = Arc::new(SessionRegistry::new(connector.clone()));

        let tasks = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry.get_or_create(id("10.0.0.5:54321"), &broker1(), &SessionConfig::default()).await
                })
            })
            .collect::<Vec<_>>();
        for t in tasks {
            assert!(matches!(t.await.unwrap(), Err(CreationError::Connect(..))));
        }
        assert_eq!(connector.dials(), 1);
        assert!(registry.is_empty());
        assert!(registry.sessions.read().is_empty());
    }

    #[tokio::test]
    async fn test_failed_dial_leaves_no_entry() {
        let connector = MockConnector::new();
        let registry = SessionRegistry::new(connector.clone());
        let cfg = SessionConfig::default();
        let identity = id("10.0.0.5:54321");

        connector.set_unreachable(true);
        let err = registry.get_or_create(identity, &broker1(), &cfg).await.unwrap_err();
        assert!(matches!(err, CreationError::Connect(..)));
        assert!(!registry.contains(&identity));
        assert!(registry.get(&identity).is_none());

        connector.set_unreachable(false);
        registry.get_or_create(identity, &broker1(), &cfg).await.unwrap();
        assert_eq!(connector.dials(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_dial_timeout() {
        let connector = MockConnector::with_delay(Duration::from_millis(500));
        let registry = SessionRegistry::new(connector.clone());
        let cfg = SessionConfig { connect_timeout: Duration::from_millis(20), ..Default::default() };

        let err = registry.get_or_create(id("10.0.0.5:54321"), &broker1(), &cfg).await.unwrap_err();
        assert!(matches!(err, CreationError::Timeout(_, tm) if tm == Duration::from_millis(20)));
        assert!(registry.sessions.read().is_empty());
    }

    #[tokio::test]
    async fn test_identities_do_not_share_sessions() {
        let connector = MockConnector::new();
        let registry = SessionRegistry::new(connector.clone());
        let cfg = SessionConfig::default();

        let a = registry.get_or_create(id("10.0.0.5:54321"), &broker1(), &cfg).await.unwrap();
        let b = registry.get_or_create(id("10.0.0.6:54321"), &broker1(), &cfg).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(connector.dials(), 2);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_same_identity_reuses_session() {
        let connector = MockConnector::new();
        let registry = SessionRegistry::new(connector.clone());
        let cfg = SessionConfig::default();
        let identity = id("10.0.0.5:54321");
        assert!(registry.is_empty());

        let first = registry.get_or_create(identity, &broker1(), &cfg).await.unwrap();
        assert_eq!(first.identity(), identity);
        assert_eq!(registry.len(), 1);

        let same = registry.get_or_create(identity, &broker1(), &cfg).await.unwrap();
        let other = registry.get_or_create(identity, &BrokerTarget::new("broker2", 6650), &cfg).await.unwrap();
        assert!(Arc::ptr_eq(&first, &same));
        assert!(Arc::ptr_eq(&first, &other));
        assert_eq!(other.target(), &broker1());
        assert_eq!(connector.dials(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_and_drain() {
        let connector = MockConnector::new();
        let registry = SessionRegistry::new(connector.clone());
        let cfg = SessionConfig::default();

        for i in 0..3 {
            registry.get_or_create(id(&format!("10.0.0.5:{}", 50000 + i)), &broker1(), &cfg).await.unwrap();
        }
        assert_eq!(registry.stats()["sessions"]["count"], 3);

        let s = registry.remove(&id("10.0.0.5:50000")).unwrap();
        assert_eq!(s.identity(), id("10.0.0.5:50000"));
        assert!(registry.remove(&id("10.0.0.5:50000")).is_none());
        assert_eq!(registry.len(), 2);

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
        let stats = registry.stats();
        assert_eq!(stats["sessions"]["count"], 0);
        assert_eq!(stats["sessions"]["max"], 3);
        assert_eq!(stats["connecting"], 0);
    }

    #[tokio::test]
    async fn test_drain_during_dial() {
        let connector = MockConnector::with_delay(Duration::from_millis(200));
        let registry = Arc::new(SessionRegistry::new(connector.clone()));

        let dialing = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry.get_or_create(id("10.0.0.5:54321"), &broker1(), &SessionConfig::default()).await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(registry.stats()["connecting"], 1);
        assert!(registry.drain().is_empty());

        let err = dialing.await.unwrap().unwrap_err();
        assert!(matches!(err, CreationError::Removed(_)));
        assert_eq!(connector.dials(), 1);
        assert_eq!(connector.closes(), 1);
        assert!(registry.is_empty());
        let stats = registry.stats();
        assert_eq!(stats["sessions"]["count"], 0);
        assert_eq!(stats["sessions"]["max"], 0);
    }
}
