pub mod actor;
pub mod correlation;
pub mod event;
pub mod failure;
pub mod lastmodified;
pub mod message;
pub mod system;

pub use actor::{ModelActorCell, ModelDefinition, UnitOfWork};
pub use failure::{CommandFailure, ModelError};
pub use lastmodified::{ActorLastModified, LastModifiedRegistry};
pub use message::{
    ActorKind, EngineConfig, MessageEnvelope, MessageId, ModelResponse, ResponseOutcome,
};
pub use system::{AnyCommand, CaseSystem};
