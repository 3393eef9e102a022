//! Scoped ownership of one toolkit session.

use tracing::warn;

use crate::error::{DeployError, DeployResult};
use crate::toolkit::ToolkitSession;

/// Owns a toolkit session and releases it exactly once.
///
/// [`SessionGuard::dispose`] takes the session out, so later calls are
/// no-ops. A guard dropped while still holding its session disposes it on
/// the current tokio runtime, if there is one.
pub struct SessionGuard {
    session: Option<Box<dyn ToolkitSession>>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn ToolkitSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn session(&self) -> DeployResult<&dyn ToolkitSession> {
        self.session.as_deref().ok_or(DeployError::SessionDisposed)
    }

    pub fn is_disposed(&self) -> bool {
        self.session.is_none()
    }

    /// Release the session. Returns `Ok(false)` if it was already released.
    pub async fn dispose(&mut self) -> DeployResult<bool> {
        match self.session.take() {
            Some(session) => {
                session.dispose().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.dispose().await {
                        warn!(error = %e, "toolkit dispose failed");
                    }
                });
            }
            Err(_) => warn!("toolkit session dropped outside a runtime; not disposed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeToolkit;
    use crate::toolkit::{SilentIoHost, ToolkitFactory};
    use std::sync::Arc;

    #[tokio::test]
    async fn dispose_runs_once() {
        let toolkit = FakeToolkit::new();
        let mut guard = SessionGuard::new(toolkit.open(Arc::new(SilentIoHost)).unwrap());

        assert!(guard.dispose().await.unwrap());
        assert!(!guard.dispose().await.unwrap());
        assert!(guard.is_disposed());
        assert!(matches!(guard.session(), Err(DeployError::SessionDisposed)));
        drop(guard);

        tokio::task::yield_now().await;
        assert_eq!(toolkit.disposed(), 1);
    }

    #[tokio::test]
    async fn drop_disposes_held_session() {
        let toolkit = FakeToolkit::new();
        let guard = SessionGuard::new(toolkit.open(Arc::new(SilentIoHost)).unwrap());
        drop(guard);

        tokio::task::yield_now().await;
        assert_eq!(toolkit.disposed(), 1);
    }
}
