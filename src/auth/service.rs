use std::sync::Arc;

use crate::auth::error::AuthError;
use crate::auth::password;
use crate::auth::signer::{TokenPair, TokenSigner};
use crate::auth::store::{NewUser, StoreError, User, UserStore};

/// Bounded retries for the guarded session update before the conflict is
/// surfaced as a transient storage error.
const MAX_UPDATE_ATTEMPTS: u32 = 3;

pub trait Clock: Send + Sync {
    fn now_epoch(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch(&self) -> i64 {
        time::OffsetDateTime::now_utc().unix_timestamp()
    }
}

/// Plaintext profile input for signup and profile change. The password never
/// reaches the store; only its argon2 hash does.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Credential verification and the token-pair lifecycle.
///
/// All session state lives on the user record: `last_login` is both the
/// signing time of the live token pair and the start of its validity
/// windows. Every successful login, refresh and profile change advances it,
/// which re-keys both tokens and invalidates the previous pair.
pub struct AuthService {
    store: Arc<dyn UserStore>,
    signer: TokenSigner,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, signer: TokenSigner, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            signer,
            clock,
        }
    }

    pub async fn signup(&self, profile: NewProfile) -> Result<User, AuthError> {
        if self
            .store
            .find_by_username(&profile.username)
            .await?
            .is_some()
        {
            return Err(AuthError::DuplicateUser);
        }

        let password_hash = password::hash_password(&profile.password)?;
        let user = self
            .store
            .insert(NewUser {
                username: profile.username,
                email: profile.email,
                password_hash,
            })
            .await?;
        Ok(user)
    }

    /// Checks the plaintext password against the stored hash. Read-only; the
    /// session window only moves once token issuance succeeds.
    pub async fn verify_credentials(
        &self,
        username: &str,
        password_plain: &str,
    ) -> Result<User, AuthError> {
        let user = self
            .store
            .find_by_username(username)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !password::verify_password(password_plain, &user.password_hash)? {
            return Err(AuthError::InvalidPassword);
        }
        Ok(user)
    }

    pub async fn login(
        &self,
        username: &str,
        password_plain: &str,
    ) -> Result<TokenPair, AuthError> {
        let user = self.verify_credentials(username, password_plain).await?;
        let (_, pair) = self.rotate(user).await?;
        Ok(pair)
    }

    /// Rotates the pair when the submitted refresh token matches the one
    /// recomputed from the stored `last_login`. A successful rotation
    /// advances `last_login`, so the previous pair stops verifying.
    pub async fn refresh(&self, user_id: i64, submitted: &str) -> Result<TokenPair, AuthError> {
        let mut user = self.reload(user_id).await?;

        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let now = self.clock.now_epoch();
            if now >= user.expires_in {
                return Err(AuthError::RefreshExpired);
            }

            let expected = self.signer.sign_refresh(user.id, user.last_login)?;
            if !TokenSigner::matches(submitted, &expected) {
                return Err(AuthError::TokenMismatch);
            }

            let guard = user.last_login;
            user.last_login = now;
            user.expires_in = now + self.signer.refresh_window();
            if self.store.update(&user, guard).await? {
                return Ok(self.signer.pair_for(&user)?);
            }

            // Lost the race. A competing rotation moved last_login, so the
            // revalidation above will reject the now-stale token.
            user = self.reload(user_id).await?;
        }

        Err(AuthError::Storage(StoreError::Conflict))
    }

    /// Read-only token check: window first, then recompute-and-compare.
    pub async fn check_access(&self, user_id: i64, submitted: &str) -> Result<User, AuthError> {
        let user = self.reload(user_id).await?;
        self.validate_access(&user, submitted)?;
        Ok(user)
    }

    pub async fn change_profile(
        &self,
        user_id: i64,
        submitted: &str,
        change: NewProfile,
    ) -> Result<(User, TokenPair), AuthError> {
        let mut user = self.reload(user_id).await?;

        for _ in 0..MAX_UPDATE_ATTEMPTS {
            self.validate_access(&user, submitted)?;

            let now = self.clock.now_epoch();
            let guard = user.last_login;
            user.username = change.username.clone();
            user.email = change.email.clone();
            user.password_hash = password::hash_password(&change.password)?;
            user.last_login = now;
            user.expires_in = now + self.signer.refresh_window();

            if self.store.update(&user, guard).await? {
                // The fresh pair is bound to the new username and time.
                let pair = self.signer.pair_for(&user)?;
                return Ok((user, pair));
            }

            user = self.reload(user_id).await?;
        }

        Err(AuthError::Storage(StoreError::Conflict))
    }

    /// Advance the session window and sign a pair against the persisted
    /// value. Used by login, where a lost race only needs a plain retry.
    async fn rotate(&self, mut user: User) -> Result<(User, TokenPair), AuthError> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let now = self.clock.now_epoch();
            let guard = user.last_login;
            user.last_login = now;
            user.expires_in = now + self.signer.refresh_window();

            if self.store.update(&user, guard).await? {
                let pair = self.signer.pair_for(&user)?;
                return Ok((user, pair));
            }

            user = self.reload(user.id).await?;
        }

        Err(AuthError::Storage(StoreError::Conflict))
    }

    fn validate_access(&self, user: &User, submitted: &str) -> Result<(), AuthError> {
        let now = self.clock.now_epoch();
        if now >= user.last_login + self.signer.access_window() {
            return Err(AuthError::AccessExpired);
        }

        let expected = self.signer.sign_access(&user.username, user.last_login)?;
        if !TokenSigner::matches(submitted, &expected) {
            return Err(AuthError::TokenMismatch);
        }
        Ok(())
    }

    async fn reload(&self, user_id: i64) -> Result<User, AuthError> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::auth::store::testing::MemoryUserStore;
    use crate::config::TokenConfig;

    const ACCESS_WINDOW: i64 = 600;
    const REFRESH_WINDOW: i64 = 86_400;
    const T0: i64 = 1_700_000_000;

    struct ManualClock(AtomicI64);

    impl ManualClock {
        fn at(start: i64) -> Arc<Self> {
            Arc::new(Self(AtomicI64::new(start)))
        }

        fn advance(&self, secs: i64) {
            self.0.fetch_add(secs, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_epoch(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn signer() -> TokenSigner {
        TokenSigner::new(&TokenConfig {
            secret: "unit-test-secret".into(),
            algorithm: "HS256".into(),
            access_window_secs: ACCESS_WINDOW,
            refresh_window_secs: REFRESH_WINDOW,
        })
        .expect("signer")
    }

    fn service() -> (AuthService, Arc<ManualClock>, Arc<MemoryUserStore>) {
        let clock = ManualClock::at(T0);
        let store = Arc::new(MemoryUserStore::default());
        let service = AuthService::new(store.clone(), signer(), clock.clone());
        (service, clock, store)
    }

    fn profile(username: &str, password: &str) -> NewProfile {
        NewProfile {
            username: username.into(),
            email: format!("{username}@example.com"),
            password: password.into(),
        }
    }

    fn tamper(token: &str) -> String {
        let mut bytes = token.as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
        String::from_utf8(bytes).expect("ascii")
    }

    #[tokio::test]
    async fn signup_stores_inactive_user_with_zeroed_session() {
        let (service, _clock, _store) = service();
        let user = service
            .signup(profile("alice", "p1-secret"))
            .await
            .expect("signup");

        assert_eq!(user.username, "alice");
        assert_eq!(user.role, "user");
        assert!(!user.is_active);
        assert!(!user.is_superuser);
        assert_eq!(user.last_login, 0);
        assert_eq!(user.expires_in, 0);
        assert_ne!(user.password_hash, "p1-secret");
    }

    #[tokio::test]
    async fn signup_rejects_duplicate_username() {
        let (service, _clock, store) = service();
        service
            .signup(profile("alice", "p1-secret"))
            .await
            .expect("first signup");

        let err = service
            .signup(profile("alice", "other-pass"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateUser));

        // The first record is untouched.
        let kept = store
            .find_by_username("alice")
            .await
            .unwrap()
            .expect("alice exists");
        assert!(password::verify_password("p1-secret", &kept.password_hash).unwrap());
    }

    #[tokio::test]
    async fn login_then_check_access_roundtrip() {
        let (service, _clock, _store) = service();
        let user = service
            .signup(profile("alice", "p1-secret"))
            .await
            .expect("signup");

        let pair = service.login("alice", "p1-secret").await.expect("login");
        assert_eq!(pair.expires_in, T0 + ACCESS_WINDOW);

        let seen = service
            .check_access(user.id, &pair.access_token)
            .await
            .expect("access");
        assert_eq!(seen.username, "alice");
        assert_eq!(seen.last_login, T0);
        assert_eq!(seen.expires_in, T0 + REFRESH_WINDOW);
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials() {
        let (service, _clock, _store) = service();
        service
            .signup(profile("alice", "p1-secret"))
            .await
            .expect("signup");

        let err = service.login("nobody", "p1-secret").await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));

        let err = service.login("alice", "wrong-pass").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidPassword));
    }

    #[tokio::test]
    async fn fresh_user_holds_no_session() {
        let (service, _clock, _store) = service();
        let user = service
            .signup(profile("alice", "p1-secret"))
            .await
            .expect("signup");

        let err = service.check_access(user.id, "whatever").await.unwrap_err();
        assert!(matches!(err, AuthError::AccessExpired));

        let err = service.refresh(user.id, "whatever").await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshExpired));
    }

    #[tokio::test]
    async fn access_expires_at_window_edge() {
        let (service, clock, _store) = service();
        let user = service
            .signup(profile("alice", "p1-secret"))
            .await
            .expect("signup");
        let pair = service.login("alice", "p1-secret").await.expect("login");

        clock.advance(ACCESS_WINDOW - 1);
        service
            .check_access(user.id, &pair.access_token)
            .await
            .expect("still inside the window");

        clock.advance(1);
        let err = service
            .check_access(user.id, &pair.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccessExpired));
    }

    #[tokio::test]
    async fn tampered_tokens_are_rejected() {
        let (service, clock, _store) = service();
        let user = service
            .signup(profile("alice", "p1-secret"))
            .await
            .expect("signup");
        let pair = service.login("alice", "p1-secret").await.expect("login");
        clock.advance(1);

        let err = service
            .check_access(user.id, &tamper(&pair.access_token))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenMismatch));

        let err = service
            .refresh(user.id, &tamper(&pair.refresh_token))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenMismatch));
    }

    #[tokio::test]
    async fn unknown_user_fails_token_checks() {
        let (service, _clock, _store) = service();
        let err = service.check_access(42, "whatever").await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));

        let err = service.refresh(42, "whatever").await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn refresh_rotates_pair_and_invalidates_previous() {
        let (service, clock, _store) = service();
        let user = service
            .signup(profile("alice", "p1-secret"))
            .await
            .expect("signup");
        let first = service.login("alice", "p1-secret").await.expect("login");

        clock.advance(10);
        let second = service
            .refresh(user.id, &first.refresh_token)
            .await
            .expect("refresh");
        assert_ne!(second.access_token, first.access_token);
        assert_ne!(second.refresh_token, first.refresh_token);
        assert_eq!(second.expires_in, T0 + 10 + ACCESS_WINDOW);

        // Replaying the rotated-out pair fails both paths.
        let err = service
            .refresh(user.id, &first.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenMismatch));

        let err = service
            .check_access(user.id, &first.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenMismatch));

        service
            .check_access(user.id, &second.access_token)
            .await
            .expect("new access token works");
    }

    #[tokio::test]
    async fn refresh_rejected_after_deadline() {
        let (service, clock, _store) = service();
        let user = service
            .signup(profile("alice", "p1-secret"))
            .await
            .expect("signup");
        let pair = service.login("alice", "p1-secret").await.expect("login");

        clock.advance(REFRESH_WINDOW);
        let err = service
            .refresh(user.id, &pair.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RefreshExpired));
    }

    #[tokio::test]
    async fn change_profile_rekeys_tokens_to_new_identity() {
        let (service, clock, _store) = service();
        let user = service
            .signup(profile("alice", "p1-secret"))
            .await
            .expect("signup");
        let pair = service.login("alice", "p1-secret").await.expect("login");

        clock.advance(5);
        let (updated, fresh) = service
            .change_profile(user.id, &pair.access_token, profile("alice2", "p2-secret"))
            .await
            .expect("change profile");

        assert_eq!(updated.username, "alice2");
        assert_eq!(updated.email, "alice2@example.com");
        assert_eq!(updated.last_login, T0 + 5);

        // Old pair is dead, the fresh one is bound to the new username.
        let err = service
            .check_access(user.id, &pair.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenMismatch));
        let seen = service
            .check_access(user.id, &fresh.access_token)
            .await
            .expect("fresh access token");
        assert_eq!(seen.username, "alice2");

        // Credentials rolled over too.
        let err = service.login("alice2", "p1-secret").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidPassword));
        service
            .login("alice2", "p2-secret")
            .await
            .expect("login with the new password");
    }

    #[tokio::test]
    async fn change_profile_requires_live_access_token() {
        let (service, clock, _store) = service();
        let user = service
            .signup(profile("alice", "p1-secret"))
            .await
            .expect("signup");

        let err = service
            .change_profile(user.id, "whatever", profile("alice2", "p2-secret"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccessExpired));

        let pair = service.login("alice", "p1-secret").await.expect("login");
        clock.advance(1);
        let err = service
            .change_profile(
                user.id,
                &tamper(&pair.access_token),
                profile("alice2", "p2-secret"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenMismatch));
    }

    #[tokio::test]
    async fn change_profile_rejects_taken_username() {
        let (service, clock, _store) = service();
        service
            .signup(profile("alice", "p1-secret"))
            .await
            .expect("alice");
        let bob = service
            .signup(profile("bob", "p1-secret"))
            .await
            .expect("bob");

        let pair = service.login("bob", "p1-secret").await.expect("login");
        clock.advance(1);
        let err = service
            .change_profile(bob.id, &pair.access_token, profile("alice", "p2-secret"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateUser));
    }

    /// Store wrapper that reports one lost race before letting writes through.
    struct ContendedStore {
        inner: MemoryUserStore,
        spurious_conflicts: AtomicU32,
    }

    #[async_trait]
    impl UserStore for ContendedStore {
        async fn find_by_username(
            &self,
            username: &str,
        ) -> Result<Option<User>, crate::auth::store::StoreError> {
            self.inner.find_by_username(username).await
        }

        async fn find_by_id(&self, id: i64) -> Result<Option<User>, crate::auth::store::StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn insert(
            &self,
            new_user: NewUser,
        ) -> Result<User, crate::auth::store::StoreError> {
            self.inner.insert(new_user).await
        }

        async fn update(
            &self,
            user: &User,
            expected_last_login: i64,
        ) -> Result<bool, crate::auth::store::StoreError> {
            if self.spurious_conflicts.load(Ordering::SeqCst) > 0 {
                self.spurious_conflicts.fetch_sub(1, Ordering::SeqCst);
                return Ok(false);
            }
            self.inner.update(user, expected_last_login).await
        }
    }

    #[tokio::test]
    async fn login_retries_a_lost_update() {
        let clock = ManualClock::at(T0);
        let store = Arc::new(ContendedStore {
            inner: MemoryUserStore::default(),
            spurious_conflicts: AtomicU32::new(1),
        });
        let service = AuthService::new(store, signer(), clock.clone());

        let user = service
            .signup(profile("alice", "p1-secret"))
            .await
            .expect("signup");
        let pair = service.login("alice", "p1-secret").await.expect("login");

        clock.advance(1);
        service
            .check_access(user.id, &pair.access_token)
            .await
            .expect("pair signed against the persisted time");
    }

    #[tokio::test]
    async fn full_session_walkthrough() {
        let (service, clock, _store) = service();
        let user = service
            .signup(profile("alice", "p1-secret"))
            .await
            .expect("signup");

        let pair = service.login("alice", "p1-secret").await.expect("login");
        assert_eq!(pair.expires_in, T0 + ACCESS_WINDOW);

        clock.advance(1);
        service
            .check_access(user.id, &pair.access_token)
            .await
            .expect("access at t0+1");

        clock.advance(ACCESS_WINDOW);
        let err = service
            .check_access(user.id, &pair.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccessExpired));

        // Still inside the refresh window, so a rotation re-enters the
        // authenticated state with a distinct pair.
        let rotated = service
            .refresh(user.id, &pair.refresh_token)
            .await
            .expect("refresh");
        assert_ne!(rotated.access_token, pair.access_token);
        service
            .check_access(user.id, &rotated.access_token)
            .await
            .expect("rotated access token");
    }
}
