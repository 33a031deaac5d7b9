use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::client::services::api_client::TokenCache;
use crate::client::services::service_api::QuickAssistApi;
use crate::client::utils::jwt::decode_claims;
use crate::client::utils::session_store::TokenPersistence;
use crate::common::error::{ClientError, Result};
use crate::common::models::{RegisterForm, TokenPair, User};

/// The signed-in identity: the token pair every request carries and the
/// profile fetched with it. Cheap to clone, all clones share state.
#[derive(Clone)]
pub struct AuthSession {
    api: Arc<dyn QuickAssistApi>,
    tokens: TokenCache,
    user: Arc<RwLock<Option<User>>>,
    store: Arc<dyn TokenPersistence>,
}

impl AuthSession {
    pub fn new(api: Arc<dyn QuickAssistApi>, tokens: TokenCache, store: Arc<dyn TokenPersistence>) -> Self {
        Self { api, tokens, user: Arc::new(RwLock::new(None)), store }
    }

    pub async fn current_user(&self) -> Option<User> {
        self.user.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.tokens.get().await.is_some()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(ClientError::validation("Email and password are required."));
        }
        let response = self.api.login(email, password).await.map_err(|e| match e {
            // a 401 here means bad credentials, not an expired session
            ClientError::Unauthorized(message) => ClientError::validation(message),
            other => other,
        })?;
        info!("Login accepted");
        self.establish(response.tokens()).await
    }

    pub async fn register(&self, form: &RegisterForm) -> Result<User> {
        form.validate().map_err(ClientError::validation)?;
        let response = self.api.register(form).await?;
        info!("Registration accepted");
        self.establish(response.tokens()).await
    }

    /// Clears everything local first, then asks the server to revoke the
    /// refresh token with the captured pair. The server call may fail freely.
    pub async fn logout(&self) {
        let captured = self.tokens.get().await;
        self.tokens.set(None).await;
        *self.user.write().await = None;
        if let Err(e) = self.store.clear() {
            warn!("Could not clear stored session: {}", e);
        }
        info!("Logged out");

        if let Some(tokens) = captured {
            if let Err(e) = self.api.logout(&tokens).await {
                debug!("Server-side logout failed: {}", e);
            }
        }
    }

    /// Picks up a session persisted by an earlier run.
    pub async fn restore(&self) -> Option<User> {
        let tokens = self.store.load()?;
        match decode_claims(&tokens.access) {
            Ok(claims) if claims.is_expired_at(Utc::now()) => {
                info!("Stored session expired, discarding");
                let _ = self.store.clear();
                return None;
            }
            Ok(_) => {}
            Err(e) => debug!("Stored access token is opaque: {}", e),
        }
        self.tokens.set(Some(tokens)).await;
        match self.api.profile().await {
            Ok(user) => {
                info!("Session restored for user {}", user.id);
                *self.user.write().await = Some(user.clone());
                Some(user)
            }
            Err(e) => {
                warn!("Stored session rejected: {}", e);
                self.logout().await;
                None
            }
        }
    }

    async fn establish(&self, tokens: TokenPair) -> Result<User> {
        if let Err(e) = self.store.save(&tokens) {
            // the session still works for this run
            warn!("Session not persisted: {}", e);
        }
        self.tokens.set(Some(tokens)).await;
        match self.api.profile().await {
            Ok(user) => {
                *self.user.write().await = Some(user.clone());
                Ok(user)
            }
            Err(e) => {
                self.tokens.set(None).await;
                let _ = self.store.clear();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::services::realtime_message::ChannelGrant;
    use crate::client::utils::jwt::make_token;
    use crate::client::utils::session_store::MemoryStore;
    use crate::common::models::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeAuth {
        fail_profile: bool,
        seen_tokens: Mutex<Vec<Option<String>>>,
        logouts: Mutex<Vec<TokenPair>>,
        tokens: TokenCache,
    }

    fn user() -> User {
        User { id: 3, email: "c@example.com".into(), first_name: "Amina".into(), last_name: "W".into(), role: Role::Customer, profile: None }
    }

    fn unused<T>() -> Result<T> {
        Err(ClientError::Transient("not used".into()))
    }

    #[async_trait]
    impl QuickAssistApi for FakeAuth {
        async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
            if password == "secret123" && email == "c@example.com" {
                Ok(AuthResponse { access: make_token(3, 4_000_000_000), refresh: "r1".into(), user: None })
            } else {
                Err(ClientError::Unauthorized("No active account found with the given credentials".into()))
            }
        }
        async fn register(&self, _form: &RegisterForm) -> Result<AuthResponse> {
            Err(ClientError::validation("user with this email already exists."))
        }
        async fn profile(&self) -> Result<User> {
            let seen = self.tokens.access_token().await;
            self.seen_tokens.lock().unwrap().push(seen);
            if self.fail_profile { Err(ClientError::Unauthorized("expired".into())) } else { Ok(user()) }
        }
        async fn logout(&self, tokens: &TokenPair) -> Result<()> {
            self.logouts.lock().unwrap().push(tokens.clone());
            Err(ClientError::Transient("offline".into()))
        }
        async fn service_categories(&self) -> Result<Vec<ServiceCategory>> { unused() }
        async fn create_request(&self, _: &NewServiceRequest) -> Result<()> { unused() }
        async fn my_requests(&self) -> Result<Vec<ServiceRequest>> { unused() }
        async fn available_requests(&self) -> Result<Vec<AvailableRequest>> { unused() }
        async fn request_details(&self, _: JobId) -> Result<ServiceRequest> { unused() }
        async fn accept_request(&self, _: JobId) -> Result<ServiceRequest> { unused() }
        async fn decline_request(&self, _: JobId) -> Result<()> { unused() }
        async fn update_status(&self, _: JobId, _: JobStatus) -> Result<ServiceRequest> { unused() }
        async fn chat_messages(&self, _: JobId) -> Result<Vec<ChatMessage>> { unused() }
        async fn send_chat_message(&self, _: JobId, _: &str) -> Result<ChatMessage> { unused() }
        async fn authorize_channel(&self, _: &str, _: &str) -> Result<ChannelGrant> { unused() }
        async fn create_review(&self, _: JobId, _: u8, _: Option<&str>) -> Result<()> { unused() }
        async fn provider_reviews(&self, _: UserId) -> Result<ProviderReviews> { unused() }
        async fn initiate_payment(&self, _: JobId, _: &str, _: f64) -> Result<ActionReceipt> { unused() }
        async fn log_cash_payment(&self, _: JobId) -> Result<ActionReceipt> { unused() }
        async fn my_services(&self) -> Result<Vec<Service>> { unused() }
        async fn add_service(&self, _: ServiceId) -> Result<()> { unused() }
        async fn remove_service(&self, _: ServiceId) -> Result<()> { unused() }
        async fn update_location(&self, _: JobId, _: Coordinates) -> Result<Coordinates> { unused() }
    }

    fn session(fake: FakeAuth) -> (AuthSession, Arc<FakeAuth>, Arc<MemoryStore>) {
        let tokens = fake.tokens.clone();
        let fake = Arc::new(fake);
        let store = Arc::new(MemoryStore::default());
        (AuthSession::new(fake.clone(), tokens, store.clone()), fake, store)
    }

    #[tokio::test]
    async fn login_persists_and_fetches_profile_with_new_token() {
        let (session, fake, store) = session(FakeAuth::default());
        let user = session.login("c@example.com", "secret123").await.unwrap();
        assert_eq!(user.id, 3);
        assert!(store.load().is_some());
        assert!(fake.seen_tokens.lock().unwrap()[0].is_some());
        assert_eq!(session.current_user().await.map(|u| u.id), Some(3));
    }

    #[tokio::test]
    async fn bad_credentials_are_a_display_message() {
        let (session, _, store) = session(FakeAuth::default());
        let err = session.login("c@example.com", "nope").await.unwrap_err();
        assert!(matches!(err, ClientError::Validation { .. }));
        assert!(err.user_message().contains("No active account"));
        assert!(store.load().is_none());
        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn logout_clears_everything_even_when_server_fails() {
        let (session, fake, store) = session(FakeAuth::default());
        session.login("c@example.com", "secret123").await.unwrap();
        session.logout().await;
        assert!(session.current_user().await.is_none());
        assert!(!session.is_authenticated().await);
        assert!(store.load().is_none());
        assert_eq!(fake.logouts.lock().unwrap()[0].refresh, "r1");
    }

    #[tokio::test]
    async fn restore_drops_expired_token_without_calling_server() {
        let (session, fake, store) = session(FakeAuth::default());
        store.save(&TokenPair { access: make_token(3, 1_000), refresh: "r".into() }).unwrap();
        assert!(session.restore().await.is_none());
        assert!(store.load().is_none());
        assert!(fake.seen_tokens.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn restore_logs_out_when_profile_rejected() {
        let (session, _, store) = session(FakeAuth { fail_profile: true, ..Default::default() });
        store.save(&TokenPair { access: make_token(3, 4_000_000_000), refresh: "r".into() }).unwrap();
        assert!(session.restore().await.is_none());
        assert!(!session.is_authenticated().await);
        assert!(store.load().is_none());
    }

    #[tokio::test]
    async fn register_validates_before_calling_server() {
        let (session, _, _) = session(FakeAuth::default());
        let form = RegisterForm {
            email: "bad".into(),
            password: "longenough".into(),
            first_name: "A".into(),
            last_name: "B".into(),
            role: Role::Provider,
            phone_number: "254700000001".into(),
        };
        let err = session.register(&form).await.unwrap_err();
        assert!(err.user_message().contains("valid email"));
    }
}
