use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Init,
    Starting,
    Ready,
    Shutdown,
}

#[async_trait::async_trait]
pub trait LifecycleComponent {
    async fn on_init(&mut self) -> Result<()> {
        Ok(())
    }
    async fn on_start(&mut self) -> Result<()> {
        Ok(())
    }
    async fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

pub type SharedComponent = Arc<Mutex<dyn LifecycleComponent + Send + Sync>>;

#[derive(Default)]
pub struct LifecycleManager {
    state: Option<LifecycleState>,
    components: Vec<SharedComponent>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Option<LifecycleState> {
        self.state
    }

    pub fn attach(&mut self, component: SharedComponent) {
        self.components.push(component);
    }

    pub async fn start(&mut self) -> Result<()> {
        info!("Lifecycle Phase: Init");
        self.state = Some(LifecycleState::Init);
        for comp in &self.components {
            comp.lock().await.on_init().await?;
        }

        info!("Lifecycle Phase: Starting");
        self.state = Some(LifecycleState::Starting);
        for comp in &self.components {
            comp.lock().await.on_start().await?;
        }

        info!("Lifecycle Phase: Ready");
        self.state = Some(LifecycleState::Ready);
        Ok(())
    }

    /// Shuts components down in reverse attach order. Errors are logged, not
    /// propagated, so every component gets its turn.
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Lifecycle Phase: Shutdown");
        self.state = Some(LifecycleState::Shutdown);

        for comp in self.components.iter().rev() {
            if let Err(e) = comp.lock().await.on_shutdown().await {
                warn!("Component shutdown error: {}", e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        name: &'static str,
        log: Arc<std::sync::Mutex<Vec<String>>>,
        fail_shutdown: bool,
    }

    #[async_trait::async_trait]
    impl LifecycleComponent for Recorder {
        async fn on_init(&mut self) -> Result<()> {
            self.log.lock().unwrap().push(format!("init:{}", self.name));
            Ok(())
        }
        async fn on_start(&mut self) -> Result<()> {
            self.log.lock().unwrap().push(format!("start:{}", self.name));
            Ok(())
        }
        async fn on_shutdown(&mut self) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("shutdown:{}", self.name));
            if self.fail_shutdown {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn drives_phases_in_order_and_shuts_down_in_reverse() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut manager = LifecycleManager::new();
        for (name, fail_shutdown) in [("engine", true), ("api", false)] {
            manager.attach(Arc::new(Mutex::new(Recorder {
                name,
                log: log.clone(),
                fail_shutdown,
            })));
        }

        manager.start().await.unwrap();
        assert_eq!(manager.state(), Some(LifecycleState::Ready));
        manager.shutdown().await.unwrap();
        assert_eq!(manager.state(), Some(LifecycleState::Shutdown));

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "init:engine",
                "init:api",
                "start:engine",
                "start:api",
                "shutdown:api",
                "shutdown:engine",
            ]
        );
    }
}
