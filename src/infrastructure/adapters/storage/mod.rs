//! Storage Adapters - 文件存储适配器

mod file_storage;

pub use file_storage::LocalFileStorage;
