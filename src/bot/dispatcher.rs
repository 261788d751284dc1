//! Update dispatcher setup.
//!
//! Keeps the group metadata cache in step with Telegram membership and title
//! updates.

use std::sync::Arc;

use teloxide::adaptors::Throttle;
use teloxide::dispatching::{DefaultKey, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::ChatMemberUpdated;
use tracing::{debug, info};

use crate::groups::{
    GroupMetadataCache, MetadataPatch, MetadataSource, ParticipantAction, ParticipantUpdate,
    TelegramMetadataSource,
};
use crate::store::Stores;

/// Bot type with Throttle adaptor for automatic rate limiting.
pub type ThrottledBot = Throttle<Bot>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Settings stores.
    pub stores: Stores,

    /// Group metadata cache.
    pub groups: GroupMetadataCache,

    /// Where uncached group metadata is fetched from.
    pub source: Arc<dyn MetadataSource>,
}

impl AppState {
    pub fn new(bot: &ThrottledBot, stores: Stores, groups: GroupMetadataCache) -> Self {
        // Metadata fetches go through the inner Bot, outside the send-rate throttle.
        let source: Arc<dyn MetadataSource> =
            Arc::new(TelegramMetadataSource::new(bot.inner().clone()));
        Self {
            stores,
            groups,
            source,
        }
    }
}

/// Build the dispatcher with all handlers.
pub fn build_dispatcher(
    bot: ThrottledBot,
    stores: Stores,
    groups: GroupMetadataCache,
) -> Dispatcher<ThrottledBot, anyhow::Error, DefaultKey> {
    let state = AppState::new(&bot, stores, groups);

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
}

/// Build the handler schema.
fn schema() -> UpdateHandler<anyhow::Error> {
    use teloxide::dispatching::UpdateFilterExt;

    let member_handler = Update::filter_chat_member().endpoint(track_roster);

    let bot_membership_handler = Update::filter_my_chat_member().endpoint(track_bot_membership);

    let title_handler = Update::filter_message()
        .filter_map(|msg: Message| msg.new_chat_title().map(str::to_string))
        .endpoint(track_title);

    dptree::entry()
        .branch(member_handler)
        .branch(bot_membership_handler)
        .branch(title_handler)
}

/// Roster change implied by a member's old and new status.
pub fn roster_action(
    was_present: bool,
    is_present: bool,
    was_admin: bool,
    is_admin: bool,
) -> Option<ParticipantAction> {
    match (was_present, is_present) {
        (false, true) => Some(ParticipantAction::Add),
        (true, false) => Some(ParticipantAction::Remove),
        (true, true) if !was_admin && is_admin => Some(ParticipantAction::Promote),
        (true, true) if was_admin && !is_admin => Some(ParticipantAction::Demote),
        _ => None,
    }
}

async fn track_roster(update: ChatMemberUpdated, state: AppState) -> anyhow::Result<()> {
    let old = &update.old_chat_member;
    let new = &update.new_chat_member;
    let Some(action) = roster_action(
        old.is_present(),
        new.is_present(),
        old.is_privileged(),
        new.is_privileged(),
    ) else {
        return Ok(());
    };

    let group_id = update.chat.id.to_string();
    let roster = ParticipantUpdate::new(action, [new.user.id.to_string()]);
    if let Err(e) = state.groups.apply_or_fetch(state.source.clone(), &group_id, &roster).await {
        debug!("Could not load metadata for {}: {}", group_id, e);
    }
    Ok(())
}

async fn track_bot_membership(update: ChatMemberUpdated, state: AppState) -> anyhow::Result<()> {
    if !update.new_chat_member.is_present() {
        let group_id = update.chat.id.to_string();
        info!("Bot left chat {}, dropping its metadata", group_id);
        state.groups.delete_cached(&group_id);
    }
    Ok(())
}

async fn track_title(msg: Message, title: String, state: AppState) -> anyhow::Result<()> {
    let group_id = msg.chat.id.to_string();
    debug!("Chat {} renamed to '{}'", group_id, title);
    let patch = MetadataPatch::subject(title);
    if let Err(e) = state.groups.patch_or_fetch(state.source.clone(), &group_id, patch).await {
        debug!("Could not load metadata for {}: {}", group_id, e);
    }
    Ok(())
}
