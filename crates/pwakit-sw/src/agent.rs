//! Lifecycle state and event dispatch.

use std::sync::Arc;

use pwakit_cache::CacheStorage;
use pwakit_common::Result;
use pwakit_net::{Fetcher, Request};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, info_span, Instrument};

use crate::background::BackgroundTasks;
use crate::config::AgentConfig;
use crate::fetch::{FetchInterceptor, FetchOutcome};
use crate::notify::{ClientAction, Notification, NotificationClick, Notifier, PushMessage};
use crate::shell::{ActivateReport, InstallReport, ShellCacheManager};
use crate::sync::{DeferredWriteQueue, SyncReport};

/// Agent lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceWorkerState {
    /// Constructed, nothing run yet.
    #[default]
    Parsed,
    Installing,
    /// Installed but not yet controlling traffic.
    Installed,
    Activating,
    /// Active and intercepting fetches.
    Activated,
    /// Superseded by a newer agent.
    Redundant,
}

/// A signal delivered by the host.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    Install,
    Activate,
    Fetch(Request),
    Sync { tag: String },
    Push(PushMessage),
    NotificationClick(NotificationClick),
}

/// Event kind, used for log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
    Sync,
    Push,
    NotificationClick,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Activate => "activate",
            Self::Fetch => "fetch",
            Self::Sync => "sync",
            Self::Push => "push",
            Self::NotificationClick => "notificationclick",
        }
    }
}

impl AgentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Install => EventKind::Install,
            Self::Activate => EventKind::Activate,
            Self::Fetch(_) => EventKind::Fetch,
            Self::Sync { .. } => EventKind::Sync,
            Self::Push(_) => EventKind::Push,
            Self::NotificationClick(_) => EventKind::NotificationClick,
        }
    }
}

/// The agent's answer to an event.
#[derive(Debug)]
pub enum EventResponse {
    Installed(InstallReport),
    Activated(ActivateReport),
    Fetch(FetchOutcome),
    /// `None` when the tag belongs to no queue.
    Sync(Option<SyncReport>),
    Notification(Notification),
    Client(ClientAction),
}

/// Offline support agent for one origin.
pub struct OfflineAgent {
    config: Arc<AgentConfig>,
    caches: CacheStorage,
    state: RwLock<ServiceWorkerState>,
    shell: ShellCacheManager,
    interceptor: FetchInterceptor,
    queue: DeferredWriteQueue,
    notifier: Notifier,
    tasks: BackgroundTasks,
}

impl OfflineAgent {
    /// Build an agent. Fails only on an unusable configuration.
    pub fn new(config: AgentConfig, caches: CacheStorage, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let tasks = BackgroundTasks::new();

        Ok(Self {
            shell: ShellCacheManager::new(config.clone(), caches.clone(), fetcher.clone()),
            interceptor: FetchInterceptor::new(
                &config,
                caches.clone(),
                fetcher.clone(),
                tasks.clone(),
            )?,
            queue: DeferredWriteQueue::new(&config, caches.clone(), fetcher),
            notifier: Notifier::new(&config)?,
            state: RwLock::new(ServiceWorkerState::Parsed),
            config,
            caches,
            tasks,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn caches(&self) -> &CacheStorage {
        &self.caches
    }

    pub fn queue(&self) -> &DeferredWriteQueue {
        &self.queue
    }

    pub async fn state(&self) -> ServiceWorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, state: ServiceWorkerState) {
        let mut current = self.state.write().await;
        debug!(from = ?*current, to = ?state, "State change");
        *current = state;
    }

    /// Resume a previously activated generation from durable storage.
    ///
    /// Only a generation whose activation was recorded starts out activated;
    /// an install alone is not enough.
    pub async fn restore(&self) -> Result<ServiceWorkerState> {
        if self.shell.is_activated().await? {
            self.set_state(ServiceWorkerState::Activated).await;
        }
        Ok(self.state().await)
    }

    /// Route an event to its handler.
    pub async fn dispatch(&self, event: AgentEvent) -> EventResponse {
        let span = info_span!("event", kind = event.kind().as_str());
        async move {
            match event {
                AgentEvent::Install => EventResponse::Installed(self.install().await),
                AgentEvent::Activate => EventResponse::Activated(self.activate().await),
                AgentEvent::Fetch(request) => EventResponse::Fetch(self.fetch(request).await),
                AgentEvent::Sync { tag } => EventResponse::Sync(self.sync(&tag).await),
                AgentEvent::Push(message) => EventResponse::Notification(self.push(&message)),
                AgentEvent::NotificationClick(click) => {
                    EventResponse::Client(self.notification_click(&click))
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Populate the shell cache. The agent moves on to `Installed` either way.
    pub async fn install(&self) -> InstallReport {
        self.set_state(ServiceWorkerState::Installing).await;
        let report = self.shell.install().await;
        self.set_state(ServiceWorkerState::Installed).await;
        report
    }

    /// Drop stale caches and start controlling traffic.
    pub async fn activate(&self) -> ActivateReport {
        self.set_state(ServiceWorkerState::Activating).await;
        let report = self.shell.activate().await;
        self.set_state(ServiceWorkerState::Activated).await;
        info!(cache = %self.config.shell_cache_name(), "Agent activated");
        report
    }

    /// Intercept a request once active.
    pub async fn fetch(&self, request: Request) -> FetchOutcome {
        if self.state().await != ServiceWorkerState::Activated {
            debug!(url = %request.url, "Agent not active, not intercepting");
            return FetchOutcome::Passthrough;
        }
        self.interceptor.handle(request).await
    }

    /// Handle a background sync signal.
    pub async fn sync(&self, tag: &str) -> Option<SyncReport> {
        if !self.queue.handles(tag) {
            debug!(tag, "Ignoring sync for unknown tag");
            return None;
        }
        Some(self.queue.drain().await)
    }

    pub fn push(&self, message: &PushMessage) -> Notification {
        self.notifier.on_push(message)
    }

    pub fn notification_click(&self, click: &NotificationClick) -> ClientAction {
        self.notifier.on_click(click)
    }

    /// Wait for detached cache writes to finish.
    pub async fn settle(&self) {
        self.tasks.settle().await;
    }
}
