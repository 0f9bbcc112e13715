pub mod interface;
#[cfg(any(test, feature = "testutils"))]
pub mod memory;
pub mod postgres;

pub use interface::{Error as RepositoryError, Repository};
#[cfg(any(test, feature = "testutils"))]
pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;
