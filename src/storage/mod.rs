mod articles;
mod schema;
mod types;

pub use schema::Database;
pub use types::{
    ArticleQuery, ArticleStats, DatabaseError, InsertOutcome, StoredArticle, UpdateOutcome,
};
