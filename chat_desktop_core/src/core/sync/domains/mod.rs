pub use conversation::{ConversationDomain, UserConversationDomain};
pub use emoji::{EmojiCollectDomain, EmojiDomain, EmojiPackageDomain, PackageEmojiRelationDomain};
pub use friend::{FriendDomain, FriendVerifyDomain};
pub use group::{GroupDomain, GroupJoinRequestDomain, GroupMemberDomain};
pub use notification::{NotificationEventDomain, NotificationInboxDomain};

mod conversation;
mod emoji;
mod friend;
mod group;
mod notification;
