//! Upstream sources of group metadata.

use anyhow::Context;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ChatMemberKind};
use tracing::debug;

use super::metadata::{GroupMetadata, Participant};

/// Something that can fetch the full metadata of a group.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_metadata(&self, group_id: &str) -> anyhow::Result<GroupMetadata>;
}

/// Fetches metadata from the Telegram Bot API.
///
/// Telegram only lists administrators, so `participants` holds the admins
/// and the owner. `size` is the full member count.
#[derive(Clone)]
pub struct TelegramMetadataSource {
    bot: Bot,
}

impl TelegramMetadataSource {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MetadataSource for TelegramMetadataSource {
    async fn fetch_metadata(&self, group_id: &str) -> anyhow::Result<GroupMetadata> {
        let chat_id = group_id
            .parse::<i64>()
            .map(ChatId)
            .with_context(|| format!("invalid chat id '{}'", group_id))?;

        let chat = self.bot.get_chat(chat_id).await?;
        let admins = self.bot.get_chat_administrators(chat_id).await?;
        let size = self.bot.get_chat_member_count(chat_id).await?;

        let mut owner = None;
        let participants: Vec<Participant> = admins
            .iter()
            .map(|member| {
                let id = member.user.id.to_string();
                let is_owner = matches!(member.kind, ChatMemberKind::Owner(_));
                if is_owner {
                    owner = Some(id.clone());
                }
                Participant {
                    id,
                    is_admin: true,
                    is_owner,
                }
            })
            .collect();

        debug!("Fetched metadata for chat {} ({} admins)", chat_id, admins.len());

        Ok(GroupMetadata {
            id: group_id.to_string(),
            subject: chat.title().map(str::to_string),
            owner,
            description: chat.description().map(str::to_string),
            size: Some(size),
            participants,
        })
    }
}
