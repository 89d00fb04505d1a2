// Shoebox - local media library with capacity-triggered backend migration

pub mod category;
pub mod constants;
pub mod error;
pub mod hash;
pub mod library;
pub mod metadata;
pub mod migration;
pub mod model;
pub mod settings;
pub mod store;
pub mod watch;

pub use error::{Result, ShoeboxError};
pub use library::{FolderDelta, ImportOutcome, Library};
pub use model::{Category, MediaKind, MediaRecord};
pub use store::{Store, StoreMode};
