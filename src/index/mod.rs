//! Secondary indexing: definitions, the ordered index structure and the
//! catalog that owns them.

pub mod catalog;
pub mod definition;
#[allow(clippy::module_inception)]
pub mod index;

pub use catalog::{class_with_properties, ClassDescriptor, IndexCatalog, NoProgress, ProgressListener};
pub use definition::{CollectionIndexMode, IndexDefinition, IndexMetadata, NullPolicy};
pub use index::Index;
