mod articles;
mod collections;
mod schema;
mod subscriptions;
mod types;

pub use schema::Database;
pub use types::{
    partition_key, Article, ArticleContent, CollectionStats, DatabaseError, Locale,
    StoredArticle, Subscription,
};
