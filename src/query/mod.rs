pub mod builder;
pub mod search;

pub use builder::QueryBuilder;
pub use search::{search, search_multi, OrderedIdSet, SearchColumns, SearchRelevance};
