//! API response types, pagination and in-memory listing.

pub mod listing;
pub mod pagination;
pub mod response;

pub use listing::{ListQuery, Listable, SortKey, SortOrder};
pub use pagination::{Paginated, PaginationMeta, PaginationParams};
pub use response::{Created, DataResponse, MessageResponse};
