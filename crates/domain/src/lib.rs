pub mod errors;
pub mod message;
pub mod principal;
pub mod room;
pub mod value_objects;

pub use errors::{DomainError, DomainResult, RepositoryError};
pub use message::{ContentType, Message};
pub use principal::{Principal, PrincipalKind};
pub use room::Room;
pub use value_objects::{ConnectionId, MessageBody, MessageId, PrincipalId, RoomId, Timestamp};
