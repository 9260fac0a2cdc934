use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use super::scoped_timer::ScopedTimer;
use super::ClientInner;
use crate::Error;
use crate::Result;

/// Handle to a member registered by this client.
///
/// Dropping the handle does not unregister the member; it stays registered
/// until [`unregister`](LocalMember::unregister) or the client is closed.
pub struct LocalMember {
    id: String,
    client: Arc<ClientInner>,
}

impl fmt::Debug for LocalMember {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("LocalMember").field("id", &self.id).finish()
    }
}

impl LocalMember {
    pub(super) fn new(
        id: String,
        client: Arc<ClientInner>,
    ) -> Self {
        Self { id, client }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Merges `delta` into the member's metadata.
    ///
    /// Keys in `delta` overwrite existing values; other keys are kept.
    ///
    /// # Errors
    /// - [`Error::Rejected`] if the registry refused the update. The local
    ///   copy is left unchanged.
    /// - [`Error::UnknownMember`] if the member was unregistered.
    /// - [`Error::Closed`] after the client was closed.
    pub async fn update_metadata<I, K, V>(
        &self,
        delta: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.client.ensure_open()?;
        if !self.client.registry.is_local(&self.id) {
            return Err(Error::UnknownMember(self.id.clone()));
        }

        let delta: HashMap<String, String> = delta.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        {
            let _timer = ScopedTimer::new("update_metadata", &self.id);
            let sent = self
                .client
                .session
                .transport()
                .update_metadata(self.id.clone(), delta.clone())
                .await;
            self.client.tolerate_unavailable("update_metadata", &self.id, sent)?;
        }

        if !self.client.registry.update_metadata_local(&self.id, &delta) {
            return Err(Error::UnknownMember(self.id.clone()));
        }
        Ok(())
    }

    /// Unregisters the member from the registry and the local replica.
    ///
    /// # Errors
    /// - [`Error::Rejected`] if the registry refused. The member stays
    ///   registered locally.
    /// - [`Error::UnknownMember`] if the member was already unregistered.
    /// - [`Error::Closed`] after the client was closed.
    pub async fn unregister(&self) -> Result<()> {
        self.client.ensure_open()?;
        if !self.client.registry.is_local(&self.id) {
            return Err(Error::UnknownMember(self.id.clone()));
        }

        {
            let _timer = ScopedTimer::new("unregister", &self.id);
            let sent = self.client.session.transport().unregister(self.id.clone()).await;
            self.client.tolerate_unavailable("unregister", &self.id, sent)?;
        }

        self.client.registry.unregister_local(&self.id);
        info!(member = %self.id, "unregistered local member");
        Ok(())
    }
}
