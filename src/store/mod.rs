pub mod media;
pub mod metadata;

pub use media::{FsMediaStore, MediaStore, SpilloverStore};
pub use metadata::MetadataStore;
