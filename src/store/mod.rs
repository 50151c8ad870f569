mod sqlite;

pub use sqlite::{SqliteStore, DEFAULT_TAG_COLOR};
