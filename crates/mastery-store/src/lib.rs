pub mod json_file;
pub mod schema;
pub mod store;

pub use json_file::{student_key, JsonFileStore};
pub use store::SqliteStore;
