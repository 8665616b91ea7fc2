//! Persistence backends for ragachat.
//!
//! Every backend implements both `ChatStore` and `KnowledgeStore`:
//! - [`InMemoryStore`] for tests and ephemeral runs
//! - [`SqliteStore`] (feature `sqlite`, default) with in-process cosine ranking
//! - [`PostgresStore`] (feature `postgres`) with pgvector similarity search

pub mod in_memory;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use vector::{cosine_similarity, rank_documents};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

/// SQL `LIMIT`/`OFFSET` for a zero-based page, or `None` when the page lies
/// beyond anything a database can address.
#[cfg_attr(not(any(feature = "sqlite", feature = "postgres")), allow(dead_code))]
pub(crate) fn page_window(page: usize, size: usize) -> Option<(i64, i64)> {
    let limit = i64::try_from(size).unwrap_or(i64::MAX);
    let offset = i64::try_from(page.checked_mul(size)?).ok()?;
    Some((limit, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_window_offsets_by_whole_pages() {
        assert_eq!(page_window(0, 10), Some((10, 0)));
        assert_eq!(page_window(3, 10), Some((10, 30)));
    }

    #[test]
    fn page_window_rejects_unaddressable_pages() {
        assert_eq!(page_window(usize::MAX / 2, 10), None);
        assert_eq!(page_window(usize::MAX, 2), None);
        assert_eq!(page_window(1, usize::MAX), None);
    }

    #[test]
    fn page_window_clamps_oversized_limits() {
        assert_eq!(page_window(0, usize::MAX), Some((i64::MAX, 0)));
    }
}
