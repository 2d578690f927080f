use anyhow::Result;
use serenity::{
    builder::{CreateAttachment, CreateMessage, EditMessage},
    model::{
        channel::{Message, Reaction, ReactionType},
        id::{ChannelId, GuildId, MessageId, UserId},
        user::User,
        voice::VoiceState,
    },
    prelude::Context,
};
use tracing::{debug, error, info};

use super::{commands::Command, AkuBot};
use crate::{
    audio::{PlaybackRequest, VoiceTarget},
    catalog::normalize_asset_name,
    help::{HelpContent, HelpSession, Navigation, PAGINATION_REACTIONS},
    presence::VoicePresence,
    ui::embeds::help_page_embed,
};

/// Guild member fetch cap; larger guilds are only partially tracked.
pub const MEMBER_FETCH_LIMIT: u64 = 1000;

/// Platform-unique username, also the entry sound name.
pub fn unique_username(user: &User) -> String {
    user.tag()
}

/// Dispatches one parsed text command
pub async fn handle_command(
    ctx: &Context,
    message: &Message,
    command: Command,
    bot: &AkuBot,
) -> Result<()> {
    match command {
        Command::Play(name) => handle_play(message, name, bot).await,
        Command::AudioHelp(category) => send_audio_help(ctx, message.channel_id, category, bot).await,
        Command::Sticker(name) => send_sticker(ctx, message.channel_id, name, bot).await,
        Command::StickerHelp(pack) => send_sticker_help(ctx, message.channel_id, pack, bot).await,
    }
}

/// Plays a sound in the author's voice channel, if they are in one in this guild
async fn handle_play(message: &Message, name: String, bot: &AkuBot) -> Result<()> {
    let Some(guild_id) = message.guild_id else {
        return Ok(());
    };
    if bot.sequencer.is_busy() {
        debug!(sound = %name, "Skipping sound because another is being played");
        return Ok(());
    }
    let author = unique_username(&message.author);

    let Some(target) = bot.presence.voice_target(&author, guild_id) else {
        debug!(author = %author, guild = %guild_id, "Author not in voice in this guild");
        return Ok(());
    };
    let Some(source) = bot.audio.path_of(&name) else {
        debug!(sound = %name, "No such sound");
        return Ok(());
    };

    let outcome = bot
        .sequencer
        .play(PlaybackRequest {
            sound_name: name.clone(),
            source,
            target,
        })
        .await;
    debug!(sound = %name, ?outcome, "Sound command finished");
    Ok(())
}

async fn send_audio_help(
    ctx: &Context,
    channel_id: ChannelId,
    category: Option<String>,
    bot: &AkuBot,
) -> Result<()> {
    let content = match category {
        None => HelpContent::listing("Categories", bot.audio.category_names()),
        Some(category) => match bot.audio.category(&category) {
            Some(sounds) => HelpContent::listing(category, sounds),
            None => {
                info!(category = %category, "No such audio category");
                return Ok(());
            }
        },
    };

    send_help(ctx, channel_id, HelpSession::new(content), bot).await
}

async fn send_sticker(ctx: &Context, channel_id: ChannelId, name: String, bot: &AkuBot) -> Result<()> {
    let Some(stickers) = &bot.stickers else {
        return Ok(());
    };
    let Some(path) = stickers.catalog.path_of(&name) else {
        debug!(sticker = %name, "No such sticker");
        return Ok(());
    };

    let attachment = CreateAttachment::path(&path).await?;
    channel_id
        .send_message(&ctx.http, CreateMessage::new().add_file(attachment))
        .await?;
    Ok(())
}

async fn send_sticker_help(
    ctx: &Context,
    channel_id: ChannelId,
    pack: Option<String>,
    bot: &AkuBot,
) -> Result<()> {
    let Some(stickers) = &bot.stickers else {
        return Ok(());
    };

    let content = match pack {
        None => HelpContent::listing("Categories", stickers.catalog.category_names()),
        Some(pack) => match stickers.pages.help_content(&pack) {
            Some(content) => content,
            None => {
                info!(pack = %pack, "Cached sticker pack pages not found");
                return Ok(());
            }
        },
    };

    send_help(ctx, channel_id, HelpSession::new(content), bot).await
}

/// Sends the first page, registers the session, and adds the navigation reactions
async fn send_help(
    ctx: &Context,
    channel_id: ChannelId,
    session: HelpSession,
    bot: &AkuBot,
) -> Result<()> {
    let embed = help_page_embed(&session.render());
    let message = channel_id
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await?;

    let live = bot.help.insert(message.id, session);
    debug!(message = %message.id, live, "Registered help session");

    for emoji in PAGINATION_REACTIONS {
        if let Err(e) = message
            .react(&ctx.http, ReactionType::Unicode(emoji.to_string()))
            .await
        {
            error!(
                emoji,
                channel = %channel_id,
                message = %message.id,
                error = %e,
                "Error initializing reaction"
            );
        }
    }
    Ok(())
}

/// Tracks a voice state change and plays the user's entry sound when it qualifies
pub async fn handle_voice_state(ctx: &Context, new: VoiceState, bot: &AkuBot) -> Result<()> {
    if new.user_id == ctx.cache.current_user().id {
        return Ok(());
    }
    let Some(guild_id) = new.guild_id else {
        return Ok(());
    };

    let user = match &new.member {
        Some(member) => member.user.clone(),
        None => new.user_id.to_user(ctx).await?,
    };
    let username = unique_username(&user);

    let afk_channel = ctx
        .cache
        .guild(guild_id)
        .and_then(|guild| guild.afk_metadata.as_ref().map(|afk| afk.afk_channel_id));

    let presence = VoicePresence {
        channel: new.channel_id,
        guild: Some(guild_id),
    };
    if !bot.presence.observe(&username, presence, afk_channel) {
        return Ok(());
    }
    let Some(channel_id) = new.channel_id else {
        return Ok(());
    };

    let sound_name = normalize_asset_name(&username);
    let Some(source) = bot.audio.entry(&bot.config.entry_category, &sound_name) else {
        debug!(username = %username, "No entry sound for user");
        return Ok(());
    };

    info!(channel = %channel_id, guild = %guild_id, username = %username, "Playing entry sound");
    let outcome = bot
        .sequencer
        .play(PlaybackRequest {
            sound_name,
            source,
            target: VoiceTarget {
                guild_id,
                channel_id,
            },
        })
        .await;
    info!(
        channel = %channel_id,
        guild = %guild_id,
        username = %username,
        ?outcome,
        "Played entry sound"
    );
    Ok(())
}

/// Pages a help message on ⬅️/➡️ and strips every user reaction from it
pub async fn handle_reaction(ctx: &Context, reaction: Reaction, bot: &AkuBot) -> Result<()> {
    let bot_id = ctx.cache.current_user().id;
    if reaction.user_id == Some(bot_id) || !bot.help.contains(reaction.message_id) {
        return Ok(());
    }

    reset_reactions(ctx, reaction.channel_id, reaction.message_id, bot_id).await;

    let navigation = match &reaction.emoji {
        ReactionType::Unicode(name) => Navigation::from_emoji(name),
        _ => None,
    };
    let Some(navigation) = navigation else {
        if let Err(e) = reaction.delete(ctx).await {
            error!(message = %reaction.message_id, error = %e, "Error removing reaction");
        }
        return Ok(());
    };

    // Held until the edit lands so pages reach the chat in order
    let Some(mut session) = bot.help.lock(reaction.message_id).await else {
        return Ok(());
    };
    let from = session.page();
    if !session.navigate(navigation) {
        debug!(message = %reaction.message_id, page = from, ?navigation, "Help page out of range");
        return Ok(());
    }
    debug!(
        message = %reaction.message_id,
        from,
        to = session.page(),
        total = session.total_pages(),
        "Help page changed"
    );

    let page = session.render();
    reaction
        .channel_id
        .edit_message(
            &ctx.http,
            reaction.message_id,
            EditMessage::new().embed(help_page_embed(&page)),
        )
        .await?;
    Ok(())
}

/// Leaves only the bot's own navigation reactions on a help message
async fn reset_reactions(ctx: &Context, channel_id: ChannelId, message_id: MessageId, bot_id: UserId) {
    for emoji in PAGINATION_REACTIONS {
        let reaction_type = ReactionType::Unicode(emoji.to_string());
        let users = match channel_id
            .reaction_users(&ctx.http, message_id, reaction_type.clone(), Some(100), None::<UserId>)
            .await
        {
            Ok(users) => users,
            Err(e) => {
                error!(
                    emoji,
                    channel = %channel_id,
                    message = %message_id,
                    error = %e,
                    "Error getting reactions"
                );
                continue;
            }
        };

        for user in users.iter().filter(|u| u.id != bot_id) {
            if let Err(e) = channel_id
                .delete_reaction(&ctx.http, message_id, Some(user.id), reaction_type.clone())
                .await
            {
                error!(
                    emoji,
                    channel = %channel_id,
                    message = %message_id,
                    error = %e,
                    "Error removing reaction"
                );
            }
        }
    }
}

/// Rebuilds the presence table from every guild the bot is in
pub async fn populate_voice_state(ctx: &Context, guilds: Vec<GuildId>, bot: &AkuBot) {
    let mut tracked_guilds = 0;
    let mut tracked_users = 0;

    for guild_id in guilds {
        let members = match guild_id
            .members(&ctx.http, Some(MEMBER_FETCH_LIMIT), None::<UserId>)
            .await
        {
            Ok(members) => members,
            Err(e) => {
                error!(guild = %guild_id, error = %e, "Failed to fetch guild members");
                continue;
            }
        };
        let names: Vec<String> = members.iter().map(|m| unique_username(&m.user)).collect();

        // Voice states only cover users currently connected
        let connected: Vec<(UserId, ChannelId)> = ctx
            .cache
            .guild(guild_id)
            .map(|guild| {
                guild
                    .voice_states
                    .values()
                    .filter_map(|vs| vs.channel_id.map(|channel| (vs.user_id, channel)))
                    .collect()
            })
            .unwrap_or_default();

        let mut voice_states = Vec::with_capacity(connected.len());
        for (user_id, channel_id) in connected {
            match user_id.to_user(ctx).await {
                Ok(user) => voice_states.push((unique_username(&user), channel_id)),
                Err(e) => debug!(user = %user_id, error = %e, "Failed to resolve voice user"),
            }
        }

        info!(guild = %guild_id, members = names.len(), "Initialized guild");
        tracked_users += bot.presence.seed_guild(guild_id, names, voice_states);
        tracked_guilds += 1;
    }

    info!(
        tracked_users,
        tracked_guilds,
        known_users = bot.presence.len(),
        "👥 Loaded voice state data"
    );
}
