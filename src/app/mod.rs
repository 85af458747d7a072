pub mod auth;
pub mod classifier;
pub mod comments;
pub mod posts;
