pub use api::chat_api::{ChatApi, SendMessageRequest, SendMessageResponse};
pub use api::conversation_api::{
    ConversationApi, ConversationMeta, ConversationType, LastMessage, UserConversation,
};
pub use api::emoji_api::{Emoji, EmojiApi, EmojiCollect, EmojiPackage, PackageEmojiRelation};
pub use api::friend_api::{Friend, FriendApi, FriendVerify, VerifyStatus};
pub use api::group_api::{
    Group, GroupApi, GroupJoinRequest, GroupMember, JoinRequestStatus, MemberRole, MemberStatus,
};
pub use api::notification_api::{NotificationApi, NotificationEvent, NotificationInboxItem};
pub use api::{RowVersion, VersionDiff};
pub use client::{Client, HttpTransport, Transport};
pub use err::{ApiError, Error};
pub use message::*;
pub use push_frame::*;

#[macro_use]
mod macros;

pub mod api;
pub mod client;
pub mod err;
pub mod message;
pub mod push_frame;
