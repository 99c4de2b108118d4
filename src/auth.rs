/// Single-user authorization gate
///
/// [`restrict_to_user`] wraps a [`Handler`] so it only ever sees events sent
/// by the configured user. Everything else is dropped without a reply.

use anyhow::Result;
use async_trait::async_trait;

use crate::handlers::Handler;
use crate::transport::Inbound;

pub struct Restricted<H> {
    authorized_user_id: String,
    inner: H,
}

/// Wrap `inner` so it runs only for events from `authorized_user_id`
pub fn restrict_to_user<H: Handler>(authorized_user_id: impl Into<String>, inner: H) -> Restricted<H> {
    Restricted {
        authorized_user_id: authorized_user_id.into(),
        inner,
    }
}

impl<H> Restricted<H> {
    pub fn is_authorized(&self, event: &Inbound) -> bool {
        event.sender_id.as_deref() == Some(self.authorized_user_id.as_str())
    }
}

#[async_trait]
impl<H: Handler> Handler for Restricted<H> {
    async fn handle(&self, event: Inbound) -> Result<()> {
        if self.is_authorized(&event) {
            return self.inner.handle(event).await;
        }
        match event.sender_id.as_deref() {
            Some(sender) => {
                log::warn!("Unauthorized access denied for user {} in chat {}", sender, event.chat_id)
            }
            None => log::debug!("Dropping message without sender in chat {}", event.chat_id),
        }
        Ok(())
    }
}
