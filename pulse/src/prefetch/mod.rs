pub mod listeners;
pub mod orchestrator;
pub mod scheduler;

pub use listeners::{ListenerGuard, ListenerRegistry};
pub use orchestrator::{PrefetchOptions, PrefetchOrchestrator};
pub use scheduler::{AppLifecycle, PrefetchScheduler};
