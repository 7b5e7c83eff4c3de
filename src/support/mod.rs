// ============================================================================
// Support Layer
// ============================================================================
//
// Building blocks on top of `SessionTemplate`: DAO base, mapper binding and
// batch-job item readers/writers.
//
// ============================================================================

pub mod batch;
pub mod dao;
pub mod mapper;

pub use batch::{BatchItemWriter, CursorItemReader, PagingItemReader};
pub use dao::SessionDaoSupport;
pub use mapper::{Mapper, MapperFactory};
