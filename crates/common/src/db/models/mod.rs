//! SeaORM entity models
//!
//! Database entities for RecordFlow

mod department;
mod document;
mod enums;
mod notification;
mod user;

pub use enums::{ActionKind, Category, ProcessingState, Role, Status, UnknownVariant, Urgency};

pub use document::{
    Entity as DocumentEntity,
    Model as Document,
    ActiveModel as DocumentActiveModel,
    Column as DocumentColumn,
    ActionEntry,
    ActionHistory,
    NewDocument,
    RoutingState,
    StringList,
};

pub use notification::{
    Entity as NotificationEntity,
    Model as Notification,
    ActiveModel as NotificationActiveModel,
    Column as NotificationColumn,
};

pub use department::{
    Entity as DepartmentEntity,
    Model as Department,
    ActiveModel as DepartmentActiveModel,
    Column as DepartmentColumn,
};

pub use user::{
    Entity as UserEntity,
    Model as User,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
};

#[cfg(test)]
pub(crate) use document::fixtures;
