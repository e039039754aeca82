pub mod entity;
pub mod record;
pub mod status;

pub use entity::{Column, DetailTab, EntityDescriptor, EntityKind};
pub use record::{Record, RecordId};
pub use status::{Outcome, ReviewStatus};
