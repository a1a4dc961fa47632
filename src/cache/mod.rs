//! Section caching
//!
//! `store` persists one JSON file per section, `pagination` slices record
//! batches into pages, and `section` ties both to a [`crate::data::NewsSource`]
//! to keep every section fresh.

mod pagination;
mod section;
mod store;

pub use pagination::{paginate, Page};
pub use section::{
    ApiStatus, CycleOutcome, ImportReport, PageRequest, RefreshSummary, ResponseMeta,
    SectionCacheEntry, SectionCacheStore, SectionResponse, NO_DATA_MESSAGE,
};
pub use store::{SectionStore, StoreError, StoredSection};
