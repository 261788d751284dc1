//! Group metadata: model, cache and upstream sources.

mod cache;
mod metadata;
mod source;

pub use cache::{FetchResult, GroupMetadataCache};
pub use metadata::{GroupMetadata, MetadataPatch, Participant, ParticipantAction, ParticipantUpdate};
pub use source::{MetadataSource, TelegramMetadataSource};
