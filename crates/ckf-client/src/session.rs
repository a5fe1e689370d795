//! Authenticated session lifecycle.
//!
//! Owns the identity handle and the channel every remote call is bound to.
//! Exactly one live session per manager. Channels carry a monotonically
//! increasing epoch; any result observed under an epoch that is no longer
//! current belongs to a stale session and must be discarded, not applied.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use ckf_common::Principal;

use crate::error::ClientError;
use crate::rpc::IdentityService;

/// Session state machine.
///
/// `Disconnected → Connecting → Connected → Disconnecting → Disconnected`;
/// any failure during `Connecting` returns to `Disconnected` with the error
/// recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Channel binding a principal to a session epoch.
///
/// Cheap to clone; snapshot one before a remote call and compare its epoch
/// against [`SessionManager::epoch`] before applying the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub principal: Principal,
    pub epoch: u64,
}

struct SessionInner {
    state: SessionState,
    principal: Option<Principal>,
}

/// Owns the authenticated channel used by all remote calls.
pub struct SessionManager {
    identity: Arc<dyn IdentityService>,
    inner: RwLock<SessionInner>,
    epoch: AtomicU64,
    last_error: RwLock<Option<String>>,
}

impl SessionManager {
    pub fn new(identity: Arc<dyn IdentityService>) -> Self {
        Self {
            identity,
            inner: RwLock::new(SessionInner {
                state: SessionState::Disconnected,
                principal: None,
            }),
            epoch: AtomicU64::new(0),
            last_error: RwLock::new(None),
        }
    }

    /// Authenticate with the identity provider.
    ///
    /// Suspends while the provider resolves. On success the prior channel,
    /// if any, is discarded (epoch bump) and a fresh one is bound to the
    /// resolved principal. On failure the session stays unauthenticated.
    pub async fn connect(&self) -> Result<Channel, ClientError> {
        {
            let mut inner = self.inner.write();
            if inner.state == SessionState::Connecting {
                return Err(ClientError::validation("connect already in progress"));
            }
            inner.state = SessionState::Connecting;
        }
        *self.last_error.write() = None;

        match self.identity.login().await {
            Ok(principal) => {
                // Invalidate anything bound to the previous channel.
                let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                let mut inner = self.inner.write();
                inner.principal = Some(principal.clone());
                inner.state = SessionState::Connected;
                info!(principal = %principal, epoch, "Session connected");
                Ok(Channel { principal, epoch })
            }
            Err(err) => {
                let mut inner = self.inner.write();
                inner.state = SessionState::Disconnected;
                inner.principal = None;
                drop(inner);
                warn!(error = %err, "Login failed");
                *self.last_error.write() = Some(err.to_string());
                Err(ClientError::Auth(err))
            }
        }
    }

    /// Revoke the channel and clear the identity handle.
    ///
    /// Safe to call when already disconnected (no-op).
    pub async fn disconnect(&self) {
        {
            let mut inner = self.inner.write();
            if inner.state != SessionState::Connected {
                return;
            }
            inner.state = SessionState::Disconnecting;
        }

        if let Err(err) = self.identity.logout().await {
            // Logout failures still tear the local session down.
            warn!(error = %err, "Logout reported an error");
            *self.last_error.write() = Some(err.to_string());
        }

        self.epoch.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.write();
        inner.principal = None;
        inner.state = SessionState::Disconnected;
        debug!("Session disconnected");
    }

    pub fn state(&self) -> SessionState {
        self.inner.read().state
    }

    pub fn is_connected(&self) -> bool {
        self.inner.read().state == SessionState::Connected
    }

    /// Current identity handle; `None` when unauthenticated.
    pub fn principal(&self) -> Option<Principal> {
        let inner = self.inner.read();
        match inner.state {
            SessionState::Connected => inner.principal.clone(),
            _ => None,
        }
    }

    /// Current channel; `None` when unauthenticated.
    pub fn channel(&self) -> Option<Channel> {
        let inner = self.inner.read();
        match (&inner.state, &inner.principal) {
            (SessionState::Connected, Some(principal)) => Some(Channel {
                principal: principal.clone(),
                epoch: self.epoch.load(Ordering::SeqCst),
            }),
            _ => None,
        }
    }

    /// Current epoch. Increments on every connect and disconnect.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// True if the given channel is still the live one.
    pub fn is_current(&self, channel: &Channel) -> bool {
        self.is_connected() && channel.epoch == self.epoch()
    }

    /// Last auth error message, retained until the next attempt.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;

    use crate::rpc::AuthError;

    struct MockIdentity {
        fail: AtomicBool,
    }

    impl MockIdentity {
        fn new() -> Self {
            Self {
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl IdentityService for MockIdentity {
        async fn login(&self) -> Result<Principal, AuthError> {
            if self.fail.load(Ordering::SeqCst) {
                Err(AuthError::new("provider unavailable"))
            } else {
                Ok(Principal::new("alice"))
            }
        }

        async fn logout(&self) -> Result<(), AuthError> {
            Ok(())
        }

        async fn is_authenticated(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_connect_binds_channel() {
        let manager = SessionManager::new(Arc::new(MockIdentity::new()));
        assert_eq!(manager.state(), SessionState::Disconnected);
        assert!(manager.principal().is_none());
        assert!(manager.channel().is_none());

        let channel = manager.connect().await.unwrap();
        assert_eq!(manager.state(), SessionState::Connected);
        assert_eq!(channel.principal, Principal::new("alice"));
        assert!(manager.is_current(&channel));
        assert_eq!(manager.principal(), Some(Principal::new("alice")));
    }

    #[tokio::test]
    async fn test_connect_failure_stays_disconnected() {
        let identity = Arc::new(MockIdentity::new());
        identity.fail.store(true, Ordering::SeqCst);
        let manager = SessionManager::new(identity);

        let result = manager.connect().await;
        assert!(matches!(result, Err(ClientError::Auth(_))));
        assert_eq!(manager.state(), SessionState::Disconnected);
        assert!(manager.principal().is_none());
        assert!(manager.last_error().unwrap().contains("provider unavailable"));
    }

    #[tokio::test]
    async fn test_disconnect_invalidates_channel() {
        let manager = SessionManager::new(Arc::new(MockIdentity::new()));
        let channel = manager.connect().await.unwrap();

        manager.disconnect().await;
        assert_eq!(manager.state(), SessionState::Disconnected);
        assert!(manager.principal().is_none());
        assert!(!manager.is_current(&channel));
    }

    #[tokio::test]
    async fn test_disconnect_when_disconnected_is_noop() {
        let manager = SessionManager::new(Arc::new(MockIdentity::new()));
        let epoch = manager.epoch();
        manager.disconnect().await;
        assert_eq!(manager.epoch(), epoch);
        assert_eq!(manager.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_reconnect_discards_prior_channel() {
        let manager = SessionManager::new(Arc::new(MockIdentity::new()));
        let first = manager.connect().await.unwrap();
        let second = manager.connect().await.unwrap();

        assert!(second.epoch > first.epoch);
        assert!(!manager.is_current(&first));
        assert!(manager.is_current(&second));
    }
}
