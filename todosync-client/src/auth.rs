//! Lightweight session tracking for the signed-in user.
//!
//! The actual credential exchange happens outside this crate; callers push
//! the resolved identity in here and everything downstream (engine, UI)
//! observes it through a watch channel.

use tokio::sync::watch;

use todosync_core::UserId;

/// The identity the auth provider resolved for this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl CurrentUser {
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            email: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Shared view of the sign-in state. `None` means signed out.
#[derive(Debug, Clone)]
pub struct AuthSession {
    tx: watch::Sender<Option<CurrentUser>>,
}

impl AuthSession {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn sign_in(&self, user: CurrentUser) {
        tracing::info!(user = %user.id, "signed in");
        self.tx.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        if let Some(user) = self.tx.send_replace(None) {
            tracing::info!(user = %user.id, "signed out");
        }
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.tx.borrow().clone()
    }

    /// The id the engine scopes its task set to, if signed in.
    pub fn owner_id(&self) -> Option<UserId> {
        self.tx.borrow().as_ref().map(|u| u.id.clone())
    }

    pub fn is_signed_in(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Subscribe to sign-in changes. The receiver sees the current value
    /// immediately and every replacement after that.
    pub fn watch(&self) -> watch::Receiver<Option<CurrentUser>> {
        self.tx.subscribe()
    }
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}
