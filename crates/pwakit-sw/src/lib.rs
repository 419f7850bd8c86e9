//! # PwaKit SW
//!
//! Offline support agent for a single web origin.
//!
//! ## Architecture
//!
//! ```text
//! OfflineAgent::dispatch(AgentEvent)
//!     ├── Install / Activate  → ShellCacheManager   ({app}-v{version})
//!     ├── Fetch               → FetchInterceptor    (network first, cache fallback)
//!     ├── Sync                → DeferredWriteQueue  ({app}-v{version}-data)
//!     └── Push / Click        → Notifier
//! ```
//!
//! Handlers never fail towards the host. Every failure is logged and folded
//! into the returned report.
//!
//! ## Example
//!
//! ```ignore
//! let agent = OfflineAgent::new(AgentConfig::default(), CacheStorage::in_memory(), fetcher)?;
//! agent.dispatch(AgentEvent::Install).await;
//! agent.dispatch(AgentEvent::Activate).await;
//! let outcome = agent.fetch(Request::navigate(url)).await;
//! ```

pub mod agent;
pub mod background;
pub mod config;
pub mod fetch;
pub mod notify;
pub mod shell;
pub mod sync;

pub use agent::{AgentEvent, EventKind, EventResponse, OfflineAgent, ServiceWorkerState};
pub use background::BackgroundTasks;
pub use config::{AgentConfig, NotificationConfig};
pub use fetch::{is_cacheable, FetchInterceptor, FetchOutcome};
pub use notify::{
    ClientAction, Notification, NotificationAction, NotificationClick, NotificationData, Notifier,
    PushMessage,
};
pub use shell::{ActivateReport, DeletionFailure, InstallReport, ShellCacheManager};
pub use sync::{DeferredWriteQueue, ReplayFailure, SyncReport};
