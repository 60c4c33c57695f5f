use std::sync::Arc;

use crew_core::config::Config;
use crew_core::script::ScriptComposer;
use crew_exec::{Dispatcher, ExecChannel, Poller, ProcessChannel};
use tracing::info;

use crate::lifecycle::{HookLifecycle, LifecycleProvider, StaticLifecycle};
use crate::locks::TargetLocks;
use crate::store::{InstanceStore, MemoryStore, PgStore};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn InstanceStore>,
    pub lifecycle: Arc<dyn LifecycleProvider>,
    pub dispatcher: Dispatcher,
    pub poller: Poller,
    pub composer: Arc<ScriptComposer>,
    pub locks: TargetLocks,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn InstanceStore>,
        lifecycle: Arc<dyn LifecycleProvider>,
        channel: Arc<dyn ExecChannel>,
    ) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&channel), &config.exec);
        let poller = Poller::new(channel, &config.exec);
        let composer = Arc::new(ScriptComposer::new(config.remote.clone()));
        Self {
            config: Arc::new(config),
            store,
            lifecycle,
            dispatcher,
            poller,
            composer,
            locks: TargetLocks::new(),
        }
    }

    /// Wire the production collaborators described by `config`.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn InstanceStore> = if config.database.url.is_some() {
            Arc::new(PgStore::connect(&config.database).await?)
        } else {
            info!("no database.url configured; instance records are kept in memory");
            Arc::new(MemoryStore::new())
        };

        let lifecycle: Arc<dyn LifecycleProvider> = if config.lifecycle.has_hooks() {
            Arc::new(HookLifecycle::new(config.lifecycle.clone()))
        } else {
            Arc::new(StaticLifecycle::new(config.targets.clone()))
        };

        let channel: Arc<dyn ExecChannel> = Arc::new(ProcessChannel::new(
            config.targets.clone(),
            config.exec.clone(),
        ));

        Ok(Self::new(config, store, lifecycle, channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_to_memory_store_and_static_lifecycle() {
        let state = AppState::from_config(Config::default()).await.unwrap();
        assert!(state.store.list("anyone").await.unwrap().is_empty());
        assert_eq!(state.dispatcher.max_command_chars(), 4000);
    }
}
