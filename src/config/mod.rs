//! Configuration models for components, scheduler policies and identities.

pub mod component;

pub use component::{
    AuthorizationConfig, ComponentConfig, DuplicateLabelPolicy, IdentityConfig, InitiatorConfig,
    ListenerConfig, RegistryConfig, ResubmitPolicy, SchedulerSettings,
};
