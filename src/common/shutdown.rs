//! One-shot shutdown signal shared by background tasks.

use tokio::sync::watch;

/// Signals spawned loops to stop. Once triggered it stays triggered.
#[derive(Debug)]
pub struct Shutdown {
    sender: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender,
        }
    }

    /// trigger the shutdown
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    /// wait until the shutdown is triggered
    pub async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        let _ = receiver.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use super::Shutdown;

    #[tokio::test]
    async fn test_wait_returns_after_shutdown() {
        let shutdown = Arc::new(Shutdown::new());
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        shutdown.shutdown();
        waiter.await.unwrap();
        assert!(shutdown.is_shutdown());
        shutdown.wait().await;
    }
}
