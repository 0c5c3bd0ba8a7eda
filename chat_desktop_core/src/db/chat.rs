pub use database::ChatDatabase;

pub mod database;

pub mod conversation;
pub mod emoji;
pub mod friend;
pub mod friend_verify;
pub mod group;
pub mod group_join_request;
pub mod group_member;
pub mod media_cache;
pub mod message;
pub mod notification;
pub mod sync_cursor;
pub mod user_conversation;
mod util;
