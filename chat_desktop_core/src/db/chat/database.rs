use std::path::Path;
use std::str::FromStr;

use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::db::chat::conversation::ConversationDao;
use crate::db::chat::emoji::{EmojiCollectDao, EmojiDao, EmojiPackageDao, PackageEmojiRelationDao};
use crate::db::chat::friend::FriendDao;
use crate::db::chat::friend_verify::FriendVerifyDao;
use crate::db::chat::group::GroupDao;
use crate::db::chat::group_join_request::GroupJoinRequestDao;
use crate::db::chat::group_member::GroupMemberDao;
use crate::db::chat::media_cache::MediaCacheDao;
use crate::db::chat::message::MessageDao;
use crate::db::chat::notification::NotificationDao;
use crate::db::chat::sync_cursor::SyncCursorDao;
use crate::db::chat::user_conversation::UserConversationDao;
use crate::db::Error;

pub const DATABASE_NAME: &str = "chat.db";

/// The single local store. One connection, WAL journal: every write in the
/// process goes through one writer.
pub struct ChatDatabase {
    pub(crate) pool: Pool<Sqlite>,
    pub sync_cursor_dao: SyncCursorDao,
    pub conversation_dao: ConversationDao,
    pub message_dao: MessageDao,
    pub user_conversation_dao: UserConversationDao,
    pub friend_dao: FriendDao,
    pub friend_verify_dao: FriendVerifyDao,
    pub group_dao: GroupDao,
    pub group_member_dao: GroupMemberDao,
    pub group_join_request_dao: GroupJoinRequestDao,
    pub emoji_dao: EmojiDao,
    pub emoji_package_dao: EmojiPackageDao,
    pub package_emoji_relation_dao: PackageEmojiRelationDao,
    pub emoji_collect_dao: EmojiCollectDao,
    pub notification_dao: NotificationDao,
    pub media_cache_dao: MediaCacheDao,
}

impl ChatDatabase {
    pub async fn connect(data_dir: &Path) -> Result<Self, Error> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(anyhow::Error::from)?;
        let path = data_dir.join(DATABASE_NAME);
        info!("open database {}", path.display());
        Self::open(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
        )
        .await
    }

    pub async fn in_memory() -> Result<Self, Error> {
        Self::open(SqliteConnectOptions::from_str("sqlite::memory:")?).await
    }

    async fn open(options: SqliteConnectOptions) -> Result<Self, Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(ChatDatabase {
            sync_cursor_dao: SyncCursorDao(pool.clone()),
            conversation_dao: ConversationDao(pool.clone()),
            message_dao: MessageDao(pool.clone()),
            user_conversation_dao: UserConversationDao(pool.clone()),
            friend_dao: FriendDao(pool.clone()),
            friend_verify_dao: FriendVerifyDao(pool.clone()),
            group_dao: GroupDao(pool.clone()),
            group_member_dao: GroupMemberDao(pool.clone()),
            group_join_request_dao: GroupJoinRequestDao(pool.clone()),
            emoji_dao: EmojiDao(pool.clone()),
            emoji_package_dao: EmojiPackageDao(pool.clone()),
            package_emoji_relation_dao: PackageEmojiRelationDao(pool.clone()),
            emoji_collect_dao: EmojiCollectDao(pool.clone()),
            notification_dao: NotificationDao(pool.clone()),
            media_cache_dao: MediaCacheDao(pool.clone()),
            pool,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("chat-db-{}", uuid::Uuid::new_v4()));
        {
            let db = ChatDatabase::connect(&dir).await.unwrap();
            db.sync_cursor_dao.upsert("friend", 12, 34).await.unwrap();
            db.close().await;
        }
        let db = ChatDatabase::connect(&dir).await.unwrap();
        let cursor = db.sync_cursor_dao.get("friend").await.unwrap().unwrap();
        assert_eq!(cursor.version, 12);
        db.close().await;
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
