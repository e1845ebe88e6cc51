//! SQLite Persistence - SQLite 数据库持久化实现

mod book_repo;
mod database;
mod volume_repo;

pub use book_repo::SqliteBookRepository;
pub use database::{create_pool, run_migrations, DatabaseConfig, DbPool};
pub use volume_repo::SqliteVolumeRepository;
