pub mod notifier;
pub mod stream_service;
pub mod subscription_manager;
