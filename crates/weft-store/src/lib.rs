pub mod activity;
pub mod comments;
pub mod database;
pub mod error;
pub mod row_helpers;
pub mod schema;
pub mod threads;
pub mod users;

pub use database::Database;
pub use error::{StoreError, ThreadError};
