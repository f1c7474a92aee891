pub mod color;
pub mod config;
pub mod topics;
pub mod types;

pub use config::{BrokerConfig, UiConfig};
pub use topics::*;
pub use types::{
    AssociationStatus, ColorField, LampState, LampStateDelta, NotificationKind,
    NotificationMessage, PayloadError, StateSnapshot,
};
