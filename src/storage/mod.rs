mod articles;
mod questions;
mod schema;
mod types;

pub use questions::PersistenceCoordinator;
pub use schema::Database;
pub use types::{
    frontend_category, ArticleStatus, DatabaseError, NewArticle, PersistenceResult, StoredArticle,
};
