use std::sync::Arc;

use tracing::{info, warn};

use crate::api::{ApiError, AuthApi, LoginRequest, RegisterRequest};

use super::{AuthError, Role, SessionHandle, SessionSnapshot};

/// The session's actions. Views call these; nothing else writes the session
/// except the request pipeline's rejection handling.
///
/// Two overlapping mutating actions (say, two logins) are last-writer-wins.
/// An identity is only ever stored for the credential it was fetched with.
#[derive(Clone)]
pub struct SessionStore {
    session: SessionHandle,
    api: Arc<dyn AuthApi>,
}

impl SessionStore {
    pub fn new(session: SessionHandle, api: Arc<dyn AuthApi>) -> Self {
        Self { session, api }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.session.has_role(role)
    }

    /// Authenticate, store the credential, then fetch the identity.
    ///
    /// A failed authentication leaves the session untouched. If the identity
    /// fetch fails afterwards, the credential stays (or is cleared, for a
    /// rejection) and the fetch error is returned.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let request = LoginRequest::new(username, password)?;

        let credential = match self.api.authenticate(&request).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(username = %request.username, error = %e, "Login failed");
                return Err(e.into());
            }
        };

        self.session.install_credential(credential);
        info!(username = %request.username, "Login succeeded");

        self.refresh_identity().await
    }

    /// Replace the identity with a fresh one from the server.
    ///
    /// If the session changes while the fetch is in flight (logout, another
    /// login), the result is dropped and `Ok` returned.
    pub async fn refresh_identity(&self) -> Result<(), AuthError> {
        let credential = self.session.credential().ok_or(AuthError::NoCredential)?;

        match self.api.fetch_identity().await {
            Ok(identity) => {
                let username = identity.username.clone();
                let role = identity.role;
                if self.session.install_identity(&credential, identity) {
                    info!(%username, %role, "Identity refreshed");
                } else {
                    warn!(%username, "Session changed during identity fetch, discarding result");
                }
                Ok(())
            }
            Err(ApiError::Unauthorized) => {
                if self.session.clear_if_current(Some(&credential)) {
                    info!("Credential rejected during identity fetch, session cleared");
                }
                Err(AuthError::Unauthorized)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create an account. The session is not touched.
    pub async fn register(&self, request: &RegisterRequest) -> Result<(), AuthError> {
        request.validate()?;
        let message = self.api.register(request).await?;
        info!(username = %request.username, message = ?message, "Registration accepted");
        Ok(())
    }

    /// Clear credential, identity and durable storage. Idempotent.
    pub fn logout(&self) {
        let was_authenticated = self.session.is_authenticated();
        self.session.clear();
        if was_authenticated {
            info!("Logged out");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::auth::{Credential, DurableStorage, Identity, MemoryStorage};

    /// Scripted stand-in for the server.
    ///
    /// Logins pop `tokens` in order. Identities are keyed by the credential
    /// the session holds when the fetch starts, like the real pipeline would
    /// send. `identity_gate`, when set, holds every identity fetch until
    /// notified.
    #[derive(Default)]
    struct FakeApi {
        session: Option<SessionHandle>,
        tokens: Mutex<VecDeque<Result<String, ApiError>>>,
        identities: Mutex<HashMap<String, Result<Identity, ApiError>>>,
        register_result: Mutex<Option<Result<Option<String>, ApiError>>>,
        identity_gate: Option<Arc<Notify>>,
        login_delays: Mutex<VecDeque<Duration>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn new(session: &SessionHandle) -> Self {
            Self {
                session: Some(session.clone()),
                ..Default::default()
            }
        }

        fn with_login(self, result: Result<&str, ApiError>) -> Self {
            self.tokens
                .lock()
                .unwrap()
                .push_back(result.map(str::to_string));
            self
        }

        fn with_identity(self, token: &str, result: Result<Identity, ApiError>) -> Self {
            self.identities
                .lock()
                .unwrap()
                .insert(token.to_string(), result);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AuthApi for FakeApi {
        async fn authenticate(&self, request: &LoginRequest) -> Result<Credential, ApiError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("authenticate:{}", request.username));
            let delay = self.login_delays.lock().unwrap().pop_front();
            let result = self
                .tokens
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ApiError::Unauthorized));
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result.map(|t| Credential::new(t).unwrap())
        }

        async fn register(&self, request: &RegisterRequest) -> Result<Option<String>, ApiError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("register:{}", request.username));
            self.register_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Ok(None))
        }

        async fn fetch_identity(&self) -> Result<Identity, ApiError> {
            let token = self
                .session
                .as_ref()
                .and_then(|s| s.credential())
                .map(|c| c.as_str().to_string())
                .unwrap_or_default();
            self.calls
                .lock()
                .unwrap()
                .push(format!("fetch_identity:{}", token));
            if let Some(gate) = &self.identity_gate {
                gate.notified().await;
            }
            self.identities
                .lock()
                .unwrap()
                .get(&token)
                .cloned()
                .unwrap_or(Err(ApiError::Unauthorized))
        }
    }

    fn store_with(session: &SessionHandle, api: FakeApi) -> (SessionStore, Arc<FakeApi>) {
        let api = Arc::new(api);
        (SessionStore::new(session.clone(), api.clone()), api)
    }

    fn assert_invariant(store: &SessionStore) {
        let snap = store.snapshot();
        assert!(
            snap.identity().is_none() || snap.credential().is_some(),
            "identity present without credential"
        );
    }

    #[tokio::test]
    async fn test_login_stores_credential_and_identity() {
        let session = SessionHandle::in_memory();
        let api = FakeApi::new(&session)
            .with_login(Ok("tok-alice"))
            .with_identity("tok-alice", Ok(Identity::new("alice", Role::Admin)));
        let (store, api) = store_with(&session, api);

        store.login("alice", "secret1").await.unwrap();

        assert!(store.is_authenticated());
        assert!(store.has_role(Role::Admin));
        assert!(!store.has_role(Role::Member));
        assert_eq!(api.calls(), vec!["authenticate:alice", "fetch_identity:tok-alice"]);
        assert_invariant(&store);
    }

    #[tokio::test]
    async fn test_failed_login_leaves_state_untouched() {
        let session = SessionHandle::in_memory();
        let existing = Credential::new("existing").unwrap();
        session.install_credential(existing.clone());
        session.install_identity(&existing, Identity::new("bob", Role::Member));
        let before = session.snapshot();

        for err in [
            ApiError::Unauthorized,
            ApiError::NetworkError("connection refused".into()),
            ApiError::InvalidResponse("missing field `token`".into()),
        ] {
            let api = FakeApi::new(&session).with_login(Err(err));
            let (store, _) = store_with(&session, api);
            assert!(store.login("bob", "wrong-password").await.is_err());
            assert_eq!(store.snapshot(), before);
        }
    }

    #[tokio::test]
    async fn test_login_error_taxonomy() {
        let session = SessionHandle::in_memory();
        let api = FakeApi::new(&session)
            .with_login(Err(ApiError::Unauthorized))
            .with_login(Err(ApiError::NetworkError("timed out".into())))
            .with_login(Err(ApiError::InvalidResponse("no token".into())));
        let (store, _) = store_with(&session, api);

        assert_eq!(store.login("a", "b").await, Err(AuthError::Unauthorized));
        assert_eq!(
            store.login("a", "b").await,
            Err(AuthError::NetworkFailure("timed out".into()))
        );
        assert_eq!(
            store.login("a", "b").await,
            Err(AuthError::MalformedResponse("no token".into()))
        );
    }

    #[tokio::test]
    async fn test_login_rejects_blank_input_without_io() {
        let session = SessionHandle::in_memory();
        let (store, api) = store_with(&session, FakeApi::new(&session));
        assert!(matches!(
            store.login("", "pw").await,
            Err(AuthError::InvalidInput(_))
        ));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_login_keeps_credential_when_identity_fetch_fails() {
        let session = SessionHandle::in_memory();
        let api = FakeApi::new(&session)
            .with_login(Ok("tok"))
            .with_identity("tok", Err(ApiError::ServerError("down".into())));
        let (store, _) = store_with(&session, api);

        assert_eq!(
            store.login("alice", "pw").await,
            Err(AuthError::Rejected("down".into()))
        );
        assert!(store.is_authenticated());
        assert!(store.session().identity().is_none());
    }

    #[tokio::test]
    async fn test_refresh_without_credential() {
        let session = SessionHandle::in_memory();
        let (store, api) = store_with(&session, FakeApi::new(&session));
        assert_eq!(store.refresh_identity().await, Err(AuthError::NoCredential));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_unauthorized_clears_session() {
        let storage = Arc::new(MemoryStorage::new());
        let session = SessionHandle::hydrate(storage.clone());
        let credential = Credential::new("expired").unwrap();
        session.install_credential(credential.clone());
        session.install_identity(&credential, Identity::new("carol", Role::Member));

        let api = FakeApi::new(&session).with_identity("expired", Err(ApiError::Unauthorized));
        let (store, _) = store_with(&session, api);
        assert!(store.is_authenticated());

        assert_eq!(store.refresh_identity().await, Err(AuthError::Unauthorized));
        assert!(!store.is_authenticated());
        assert!(store.session().identity().is_none());
        assert!(storage.get("token").is_none());
        assert!(storage.get("user_info").is_none());
    }

    #[tokio::test]
    async fn test_refresh_other_failure_keeps_state() {
        let session = SessionHandle::in_memory();
        let credential = Credential::new("tok").unwrap();
        session.install_credential(credential.clone());
        session.install_identity(&credential, Identity::new("dan", Role::Admin));
        let before = session.snapshot();

        let api = FakeApi::new(&session)
            .with_identity("tok", Err(ApiError::NetworkError("reset".into())));
        let (store, _) = store_with(&session, api);

        assert_eq!(
            store.refresh_identity().await,
            Err(AuthError::NetworkFailure("reset".into()))
        );
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_refresh_replaces_identity_wholesale() {
        let session = SessionHandle::in_memory();
        let credential = Credential::new("tok").unwrap();
        session.install_credential(credential.clone());
        let mut old = Identity::new("erin", Role::Member);
        old.email = Some("erin@old.example".into());
        session.install_identity(&credential, old);

        let api = FakeApi::new(&session).with_identity("tok", Ok(Identity::new("erin", Role::Admin)));
        let (store, _) = store_with(&session, api);

        store.refresh_identity().await.unwrap();
        let identity = store.session().identity().unwrap();
        assert_eq!(identity.role, Role::Admin);
        assert!(identity.email.is_none());
    }

    #[tokio::test]
    async fn test_logout_during_refresh_discards_identity() {
        let session = SessionHandle::in_memory();
        session.install_credential(Credential::new("tok").unwrap());
        let gate = Arc::new(Notify::new());
        let api = FakeApi {
            identity_gate: Some(gate.clone()),
            ..FakeApi::new(&session)
        }
        .with_identity("tok", Ok(Identity::new("frank", Role::Admin)));
        let (store, api) = store_with(&session, api);

        let refreshing = tokio::spawn({
            let store = store.clone();
            async move { store.refresh_identity().await }
        });
        while api.calls().is_empty() {
            tokio::task::yield_now().await;
        }

        store.logout();
        gate.notify_one();

        assert_eq!(refreshing.await.unwrap(), Ok(()));
        assert!(!store.is_authenticated());
        assert!(store.session().identity().is_none());
        assert_invariant(&store);
    }

    #[tokio::test]
    async fn test_concurrent_logins_last_writer_wins() {
        let session = SessionHandle::in_memory();
        let api = FakeApi::new(&session)
            .with_login(Ok("tok-slow"))
            .with_login(Ok("tok-fast"))
            .with_identity("tok-slow", Ok(Identity::new("slow", Role::Member)))
            .with_identity("tok-fast", Ok(Identity::new("fast", Role::Admin)));
        api.login_delays
            .lock()
            .unwrap()
            .extend([Duration::from_millis(50), Duration::from_millis(1)]);
        let (store, _) = store_with(&session, api);

        let (first, second) =
            futures::future::join(store.login("slow", "pw"), store.login("fast", "pw")).await;
        assert!(first.is_ok());
        assert!(second.is_ok());

        // The slow login resolved last, so its credential won; whatever
        // identity is stored belongs to that credential.
        let snap = store.snapshot();
        assert_eq!(snap.credential().unwrap().as_str(), "tok-slow");
        if let Some(identity) = snap.identity() {
            assert_eq!(identity.username, "slow");
        }
        assert_invariant(&store);
    }

    #[tokio::test]
    async fn test_register_does_not_touch_session() {
        let session = SessionHandle::in_memory();
        let api = FakeApi::new(&session);
        *api.register_result.lock().unwrap() = Some(Ok(Some("Registered".into())));
        let (store, api) = store_with(&session, api);

        let request = RegisterRequest {
            username: "newbie".into(),
            password: "longenough".into(),
            email: "newbie@example.org".into(),
            role: None,
        };
        store.register(&request).await.unwrap();
        assert!(!store.is_authenticated());
        assert_eq!(api.calls(), vec!["register:newbie"]);
    }

    #[tokio::test]
    async fn test_register_surfaces_reason_verbatim() {
        let session = SessionHandle::in_memory();
        let api = FakeApi::new(&session);
        *api.register_result.lock().unwrap() = Some(Err(ApiError::Rejected {
            status: 400,
            message: "Username already exists".into(),
        }));
        let (store, _) = store_with(&session, api);

        let request = RegisterRequest {
            username: "taken".into(),
            password: "longenough".into(),
            email: "taken@example.org".into(),
            role: None,
        };
        let err = store.register(&request).await.unwrap_err();
        assert_eq!(err.to_string(), "Username already exists");
    }

    #[tokio::test]
    async fn test_register_validation_happens_before_io() {
        let session = SessionHandle::in_memory();
        let (store, api) = store_with(&session, FakeApi::new(&session));
        let request = RegisterRequest {
            username: "x".into(),
            password: "longenough".into(),
            email: "x@example.org".into(),
            role: None,
        };
        assert!(matches!(
            store.register(&request).await,
            Err(AuthError::InvalidInput(_))
        ));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let session = SessionHandle::in_memory();
        let api = FakeApi::new(&session)
            .with_login(Ok("tok"))
            .with_identity("tok", Ok(Identity::new("gina", Role::Member)));
        let (store, _) = store_with(&session, api);
        store.login("gina", "pw").await.unwrap();

        store.logout();
        let once = store.snapshot();
        store.logout();
        assert_eq!(store.snapshot(), once);
        assert!(!store.is_authenticated());
        assert!(!store.has_role(Role::Member));
    }
}
