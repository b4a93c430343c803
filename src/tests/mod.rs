mod integration_test;

pub(crate) mod support {
    use std::time::Duration;

    use crate::broker::{Registry, RegistryStatus};

    /// Polls the registry until `check` holds, panicking after ~2s.
    pub(crate) async fn wait_for_status<F>(registry: &Registry, mut check: F)
    where
        F: FnMut(&RegistryStatus) -> bool,
    {
        for _ in 0..200 {
            if check(&registry.status().await) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "registry never reached the expected state: {:?}",
            registry.status().await
        );
    }

    pub(crate) fn subscribers(status: &RegistryStatus, topic: &str) -> usize {
        status.subscribers.get(topic).copied().unwrap_or(0)
    }

    pub(crate) fn publishers(status: &RegistryStatus, topic: &str) -> usize {
        status.publishers.get(topic).copied().unwrap_or(0)
    }
}
