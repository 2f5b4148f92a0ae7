#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use tempfile::TempDir;

use headb::auth::HashParams;
use headb::config::Secrets;
use headb::error::{Error, Result};
use headb::identity::Identity;
use headb::oauth::{DeviceCode, DeviceFlowProvider, ProviderIdentity, TokenPoll};
use headb::store::{SqliteStore, Store};
use headb::types::{ApiKey, Database, Permission, User, UserStatus};

pub const TOKEN_KEY: &str = "0123456789abcdef0123456789abcdef";
pub const PROVIDER_TOKEN_KEY: &str = "fedcba9876543210";

pub fn secrets() -> Secrets {
    Secrets::from_values("test-client", TOKEN_KEY, PROVIDER_TOKEN_KEY).expect("valid secrets")
}

/// A provider that answers polls from a script. Once the script runs out
/// every poll is `authorization_pending`.
pub struct ScriptedProvider {
    device_code: Mutex<Option<Result<DeviceCode>>>,
    polls: Mutex<VecDeque<Result<TokenPoll>>>,
    identity: Mutex<Option<Result<ProviderIdentity>>>,
    poll_count: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            device_code: Mutex::new(Some(Ok(device_code(900, 5)))),
            polls: Mutex::new(VecDeque::new()),
            identity: Mutex::new(None),
            poll_count: AtomicUsize::new(0),
        }
    }

    pub fn with_device_code(self, code: Result<DeviceCode>) -> Self {
        *self.device_code.lock().unwrap() = Some(code);
        self
    }

    pub fn then(self, poll: TokenPoll) -> Self {
        self.polls.lock().unwrap().push_back(Ok(poll));
        self
    }

    pub fn then_network_error(self) -> Self {
        self.polls
            .lock()
            .unwrap()
            .push_back(Err(Error::Provider("connection reset by peer".into())));
        self
    }

    pub fn granting(self, access_token: &str, login: &str, node_id: &str) -> Self {
        *self.identity.lock().unwrap() = Some(Ok(ProviderIdentity {
            login: login.into(),
            node_id: node_id.into(),
        }));
        self.then(TokenPoll::Granted {
            access_token: access_token.into(),
        })
    }

    pub fn with_identity_error(self) -> Self {
        *self.identity.lock().unwrap() = Some(Err(Error::Provider("401 Unauthorized".into())));
        self
    }

    pub fn poll_count(&self) -> usize {
        self.poll_count.load(Ordering::SeqCst)
    }
}

pub fn device_code(expires_in: u64, interval: u64) -> DeviceCode {
    DeviceCode {
        device_code: "device-123".into(),
        user_code: "WDJB-MJHT".into(),
        verification_uri: "https://example.com/login/device".into(),
        expires_in,
        interval,
    }
}

#[async_trait]
impl DeviceFlowProvider for ScriptedProvider {
    async fn request_device_code(&self) -> Result<DeviceCode> {
        self.device_code
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(Error::Provider("device code already issued".into())))
    }

    async fn poll_access_token(&self, device_code: &str) -> Result<TokenPoll> {
        assert_eq!(device_code, "device-123");
        self.poll_count.fetch_add(1, Ordering::SeqCst);
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(TokenPoll::AuthorizationPending))
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<ProviderIdentity> {
        assert!(!access_token.is_empty());
        self.identity
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(Error::Provider("no identity scripted".into())))
    }
}

/// Which store call a [`FaultyStore`] breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `update_user` fails with an I/O error.
    UpdateUser,
    /// `transfer_api_keys` fails with an I/O error.
    TransferKeys,
    /// Just before the first user is accepted, another user claims the same
    /// external id, as a concurrent sign-in would.
    ConcurrentClaim,
}

/// Delegates to a real store, failing one kind of call.
pub struct FaultyStore {
    inner: Arc<SqliteStore>,
    fault: Fault,
    claimed: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: Arc<SqliteStore>, fault: Fault) -> Self {
        Self {
            inner,
            fault,
            claimed: AtomicBool::new(false),
        }
    }

    fn injected() -> Error {
        Error::Io(std::io::Error::other("injected failure"))
    }
}

impl Store for FaultyStore {
    fn initialize(&self) -> Result<()> {
        self.inner.initialize()
    }

    fn create_user(&self, user: &User) -> Result<()> {
        self.inner.create_user(user)
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.inner.get_user(id)
    }

    fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        self.inner.get_user_by_external_id(external_id)
    }

    fn update_user(&self, user: &User) -> Result<()> {
        match self.fault {
            Fault::UpdateUser => return Err(Self::injected()),
            Fault::ConcurrentClaim
                if user.status == UserStatus::Accepted && !self.claimed.swap(true, Ordering::SeqCst) =>
            {
                let mut rival = User::new_pending();
                rival.status = UserStatus::Accepted;
                rival.username = user.username.clone();
                rival.external_id = user.external_id.clone();
                self.inner.create_user(&rival)?;
            }
            _ => {}
        }
        self.inner.update_user(user)
    }

    fn delete_user(&self, id: &str) -> Result<bool> {
        self.inner.delete_user(id)
    }

    fn save_api_key(&self, key: &ApiKey) -> Result<()> {
        self.inner.save_api_key(key)
    }

    fn get_api_key(&self, id: &str) -> Result<Option<ApiKey>> {
        self.inner.get_api_key(id)
    }

    fn get_api_key_for_user(&self, id: &str, user_id: &str) -> Result<Option<ApiKey>> {
        self.inner.get_api_key_for_user(id, user_id)
    }

    fn list_user_api_keys(&self, user_id: &str) -> Result<Vec<ApiKey>> {
        self.inner.list_user_api_keys(user_id)
    }

    fn delete_api_key(&self, id: &str) -> Result<bool> {
        self.inner.delete_api_key(id)
    }

    fn transfer_api_keys(&self, from_user_id: &str, to_user_id: &str) -> Result<usize> {
        if self.fault == Fault::TransferKeys {
            return Err(Self::injected());
        }
        self.inner.transfer_api_keys(from_user_id, to_user_id)
    }

    fn create_permission(&self, permission: &Permission) -> Result<()> {
        self.inner.create_permission(permission)
    }

    fn get_permission(&self, id: &str) -> Result<Option<Permission>> {
        self.inner.get_permission(id)
    }

    fn find_permission(
        &self,
        key_id: &str,
        database_id: Option<&str>,
    ) -> Result<Option<Permission>> {
        self.inner.find_permission(key_id, database_id)
    }

    fn list_key_permissions(&self, key_id: &str) -> Result<Vec<Permission>> {
        self.inner.list_key_permissions(key_id)
    }

    fn delete_permission(&self, id: &str) -> Result<bool> {
        self.inner.delete_permission(id)
    }

    fn create_database(&self, database: &Database) -> Result<()> {
        self.inner.create_database(database)
    }

    fn get_database_for_user(&self, id: &str, user_id: &str) -> Result<Option<Database>> {
        self.inner.get_database_for_user(id, user_id)
    }
}

pub struct TestContext {
    pub temp_dir: TempDir,
    pub store: Arc<SqliteStore>,
    pub provider: Arc<ScriptedProvider>,
    pub identity: Identity,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_provider(ScriptedProvider::new())
    }

    pub fn with_provider(provider: ScriptedProvider) -> Self {
        Self::build(provider, HashParams::minimal())
    }

    pub fn build(provider: ScriptedProvider, hashing: HashParams) -> Self {
        Self::assemble(provider, hashing, None)
    }

    /// The identity sees the store through a [`FaultyStore`]; `store` stays
    /// the healthy handle for assertions.
    pub fn with_fault(provider: ScriptedProvider, fault: Fault) -> Self {
        Self::assemble(provider, HashParams::minimal(), Some(fault))
    }

    fn assemble(provider: ScriptedProvider, hashing: HashParams, fault: Option<Fault>) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let store = SqliteStore::new(temp_dir.path().join("headb.db")).expect("open store");
        store.initialize().expect("initialize store");
        let store = Arc::new(store);
        let provider = Arc::new(provider);

        let identity_store: Arc<dyn Store> = match fault {
            Some(fault) => Arc::new(FaultyStore::new(store.clone(), fault)),
            None => store.clone(),
        };

        let identity = Identity::new(
            identity_store,
            provider.clone(),
            &secrets(),
            hashing,
            Duration::days(30),
        )
        .expect("build identity");

        Self {
            temp_dir,
            store,
            provider,
            identity,
        }
    }

    pub fn accepted_user(&self, username: &str) -> User {
        let mut user = User::new_pending();
        user.status = UserStatus::Accepted;
        user.username = Some(username.into());
        user.external_id = Some(format!("node-{username}"));
        self.store.create_user(&user).expect("create user");
        user
    }

    pub fn count(&self, table: &str) -> i64 {
        self.store
            .connection()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .expect("count rows")
    }
}
