//! In-memory mirror of gateway state.
//!
//! [`StateCache`] attaches to an [`EventMux`] as a set of synchronous handlers.
//! Every write happens on the read loop under one lock, so an event is fully
//! applied before any handler for a later event starts.
//!
//! Users are held once in a top-level map; guild members refer to them by id.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::{ConsistencyFault, DiscordResult, EntityKind, FaultKind};
use crate::events::{
    EntityPatch, GuildCreate, GuildEmojisUpdate, GuildMemberAdd, GuildMemberRemove,
    GuildMemberUpdate, GuildMembersChunk, GuildRoleCreate, GuildRoleDelete, GuildRoleUpdate, Ready,
    UnavailableGuild, CHANNEL_CREATE, CHANNEL_DELETE, CHANNEL_UPDATE, GUILD_CREATE, GUILD_DELETE,
    GUILD_EMOJIS_UPDATE, GUILD_MEMBERS_CHUNK, GUILD_MEMBER_ADD, GUILD_MEMBER_REMOVE,
    GUILD_MEMBER_UPDATE, GUILD_ROLE_CREATE, GUILD_ROLE_DELETE, GUILD_ROLE_UPDATE, GUILD_UPDATE,
    READY, USER_UPDATE,
};
use crate::mux::EventMux;
use crate::types::{Channel, Emoji, Guild, Member, Role, User};

#[derive(Debug, Clone)]
struct CachedGuild {
    guild: Guild,
    channels: HashMap<String, Channel>,
    /// Keyed by user id; `user` is always `None`.
    members: HashMap<String, Member>,
    roles: HashMap<String, Role>,
    emojis: Vec<Emoji>,
}

impl CachedGuild {
    fn placeholder(id: String) -> Self {
        Self::new(Guild {
            id,
            name: String::new(),
            icon: None,
            owner_id: None,
            unavailable: true,
        })
    }

    fn new(guild: Guild) -> Self {
        Self {
            guild,
            channels: HashMap::new(),
            members: HashMap::new(),
            roles: HashMap::new(),
            emojis: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    self_user: Option<User>,
    users: HashMap<String, User>,
    private_channels: HashMap<String, Channel>,
    guilds: HashMap<String, CachedGuild>,
    /// Guild channel id to owning guild id.
    channel_index: HashMap<String, String>,
}

/// Entity counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub guilds: usize,
    pub channels: usize,
    pub private_channels: usize,
    pub users: usize,
    pub members: usize,
    pub roles: usize,
}

/// Read-only view of everything the gateway has told us. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct StateCache {
    inner: Arc<RwLock<CacheInner>>,
}

/// Apply only the fields present in `fields` to `current`.
fn merge<T>(current: &T, fields: &Map<String, Value>) -> DiscordResult<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut value = serde_json::to_value(current)?;
    if let Value::Object(object) = &mut value {
        for (key, field) in fields {
            object.insert(key.clone(), field.clone());
        }
    }
    Ok(serde_json::from_value(value)?)
}

fn detach_user(mut member: Member) -> (Option<User>, Member) {
    (member.user.take(), member)
}

impl StateCache {
    /// Empty cache, not yet attached to any mux.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the cache's handlers. Call before any user handler is added.
    pub fn attach(&self, mux: &EventMux) {
        macro_rules! bind {
            ($tag:expr, $method:ident) => {{
                let cache = self.clone();
                mux.on($tag, move |event| cache.$method(event));
            }};
        }

        bind!(READY, apply_ready);
        bind!(GUILD_CREATE, apply_guild_create);
        bind!(GUILD_UPDATE, apply_guild_update);
        bind!(GUILD_DELETE, apply_guild_delete);
        bind!(CHANNEL_CREATE, apply_channel_create);
        bind!(CHANNEL_UPDATE, apply_channel_update);
        bind!(CHANNEL_DELETE, apply_channel_delete);
        bind!(GUILD_MEMBER_ADD, apply_member_add);
        bind!(GUILD_MEMBER_UPDATE, apply_member_update);
        bind!(GUILD_MEMBER_REMOVE, apply_member_remove);
        bind!(GUILD_MEMBERS_CHUNK, apply_members_chunk);
        bind!(GUILD_ROLE_CREATE, apply_role_create);
        bind!(GUILD_ROLE_UPDATE, apply_role_update);
        bind!(GUILD_ROLE_DELETE, apply_role_delete);
        bind!(GUILD_EMOJIS_UPDATE, apply_emojis_update);
        bind!(USER_UPDATE, apply_user_update);
        debug!("State cache attached");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    fn apply_ready(&self, ready: Ready) -> DiscordResult<()> {
        let mut inner = self.inner.write();

        inner.users.insert(ready.user.id.clone(), ready.user.clone());
        inner.self_user = Some(ready.user);

        inner.private_channels.clear();
        for channel in ready.private_channels {
            for recipient in &channel.recipients {
                inner.users.insert(recipient.id.clone(), recipient.clone());
            }
            inner.private_channels.insert(channel.id.clone(), channel);
        }

        // A fresh session resends every guild.
        inner.guilds.clear();
        inner.channel_index.clear();
        for stub in ready.guilds {
            inner
                .guilds
                .insert(stub.id.clone(), CachedGuild::placeholder(stub.id));
        }

        debug!(
            guilds = inner.guilds.len(),
            private_channels = inner.private_channels.len(),
            "Cache reset from READY"
        );
        Ok(())
    }

    fn apply_guild_create(&self, event: GuildCreate) -> DiscordResult<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let guild_id = event.guild.id.clone();

        if let Some(previous) = inner.guilds.remove(&guild_id) {
            for channel_id in previous.channels.keys() {
                inner.channel_index.remove(channel_id);
            }
        }

        let mut cached = CachedGuild::new(event.guild);
        for mut channel in event.channels {
            channel.guild_id = Some(guild_id.clone());
            inner
                .channel_index
                .insert(channel.id.clone(), guild_id.clone());
            cached.channels.insert(channel.id.clone(), channel);
        }
        for role in event.roles {
            cached.roles.insert(role.id.clone(), role);
        }
        cached.emojis = event.emojis;
        for member in event.members {
            let (user, member) = detach_user(member);
            if let Some(user) = user {
                cached.members.insert(user.id.clone(), member);
                inner.users.insert(user.id.clone(), user);
            }
        }

        trace!(
            guild_id = %guild_id,
            channels = cached.channels.len(),
            members = cached.members.len(),
            "Guild cached"
        );
        inner.guilds.insert(guild_id, cached);
        Ok(())
    }

    fn apply_guild_update(&self, patch: EntityPatch) -> DiscordResult<()> {
        let mut inner = self.inner.write();
        let cached = inner
            .guilds
            .get_mut(&patch.id)
            .ok_or_else(|| ConsistencyFault::unknown_entity(EntityKind::Guild, &patch.id, None))?;
        cached.guild = merge(&cached.guild, &patch.fields)?;
        Ok(())
    }

    fn apply_guild_delete(&self, event: UnavailableGuild) -> DiscordResult<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        if event.unavailable {
            if let Some(cached) = inner.guilds.get_mut(&event.id) {
                cached.guild.unavailable = true;
            }
            return Ok(());
        }

        if let Some(removed) = inner.guilds.remove(&event.id) {
            for channel_id in removed.channels.keys() {
                inner.channel_index.remove(channel_id);
            }
        }
        Ok(())
    }

    fn apply_channel_create(&self, channel: Channel) -> DiscordResult<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        if channel.is_private() {
            for recipient in &channel.recipients {
                inner.users.insert(recipient.id.clone(), recipient.clone());
            }
            inner.private_channels.insert(channel.id.clone(), channel);
            return Ok(());
        }

        let Some(guild_id) = channel.guild_id.clone() else {
            return Err(ConsistencyFault {
                kind: FaultKind::UnknownParent,
                entity: EntityKind::Channel,
                id: channel.id,
                parent: None,
            }
            .into());
        };
        let cached = inner.guilds.get_mut(&guild_id).ok_or_else(|| {
            ConsistencyFault::unknown_parent(EntityKind::Channel, &channel.id, &guild_id)
        })?;

        inner.channel_index.insert(channel.id.clone(), guild_id);
        cached.channels.insert(channel.id.clone(), channel);
        Ok(())
    }

    fn apply_channel_update(&self, patch: EntityPatch) -> DiscordResult<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        if let Some(channel) = inner.private_channels.get_mut(&patch.id) {
            *channel = merge(channel, &patch.fields)?;
            return Ok(());
        }

        let guild_id = match (&patch.guild_id, inner.channel_index.get(&patch.id)) {
            (Some(guild_id), _) | (None, Some(guild_id)) => guild_id.clone(),
            (None, None) => {
                return Err(
                    ConsistencyFault::unknown_entity(EntityKind::Channel, &patch.id, None).into(),
                )
            }
        };
        let cached = inner.guilds.get_mut(&guild_id).ok_or_else(|| {
            ConsistencyFault::unknown_parent(EntityKind::Channel, &patch.id, &guild_id)
        })?;
        let channel = cached.channels.get_mut(&patch.id).ok_or_else(|| {
            ConsistencyFault::unknown_entity(EntityKind::Channel, &patch.id, Some(guild_id.clone()))
        })?;

        *channel = merge(channel, &patch.fields)?;
        Ok(())
    }

    fn apply_channel_delete(&self, patch: EntityPatch) -> DiscordResult<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        if inner.private_channels.remove(&patch.id).is_some() {
            return Ok(());
        }
        if let Some(guild_id) = inner.channel_index.remove(&patch.id) {
            if let Some(cached) = inner.guilds.get_mut(&guild_id) {
                cached.channels.remove(&patch.id);
            }
        }
        Ok(())
    }

    fn apply_member_add(&self, event: GuildMemberAdd) -> DiscordResult<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let cached = inner.guilds.get_mut(&event.guild_id).ok_or_else(|| {
            ConsistencyFault::unknown_parent(EntityKind::Member, &event.user.id, &event.guild_id)
        })?;

        cached.members.insert(event.user.id.clone(), event.member);
        inner.users.insert(event.user.id.clone(), event.user);
        Ok(())
    }

    fn apply_member_update(&self, event: GuildMemberUpdate) -> DiscordResult<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let user_id = event.user.id.clone();
        let cached = inner.guilds.get_mut(&event.guild_id).ok_or_else(|| {
            ConsistencyFault::unknown_parent(EntityKind::Member, &user_id, &event.guild_id)
        })?;
        let member = cached.members.get_mut(&user_id).ok_or_else(|| {
            ConsistencyFault::unknown_entity(
                EntityKind::Member,
                &user_id,
                Some(event.guild_id.clone()),
            )
        })?;

        *member = merge(member, &event.fields)?;
        member.user = None;
        inner.users.insert(user_id, event.user);
        Ok(())
    }

    fn apply_member_remove(&self, event: GuildMemberRemove) -> DiscordResult<()> {
        if let Some(cached) = self.inner.write().guilds.get_mut(&event.guild_id) {
            cached.members.remove(&event.user.id);
        }
        Ok(())
    }

    fn apply_members_chunk(&self, chunk: GuildMembersChunk) -> DiscordResult<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let cached = inner.guilds.get_mut(&chunk.guild_id).ok_or_else(|| {
            ConsistencyFault::unknown_parent(EntityKind::Member, "*", &chunk.guild_id)
        })?;

        let mut stored = 0_usize;
        for member in chunk.members {
            let (user, member) = detach_user(member);
            if let Some(user) = user {
                cached.members.insert(user.id.clone(), member);
                inner.users.insert(user.id.clone(), user);
                stored += 1;
            }
        }
        trace!(
            guild_id = %chunk.guild_id,
            chunk = chunk.chunk_index,
            of = chunk.chunk_count,
            stored,
            "Member chunk applied"
        );
        Ok(())
    }

    fn apply_role_create(&self, event: GuildRoleCreate) -> DiscordResult<()> {
        let mut inner = self.inner.write();
        let cached = inner.guilds.get_mut(&event.guild_id).ok_or_else(|| {
            ConsistencyFault::unknown_parent(EntityKind::Role, &event.role.id, &event.guild_id)
        })?;
        cached.roles.insert(event.role.id.clone(), event.role);
        Ok(())
    }

    fn apply_role_update(&self, event: GuildRoleUpdate) -> DiscordResult<()> {
        let mut inner = self.inner.write();
        let role_id = &event.role.id;
        let cached = inner.guilds.get_mut(&event.guild_id).ok_or_else(|| {
            ConsistencyFault::unknown_parent(EntityKind::Role, role_id, &event.guild_id)
        })?;
        let role = cached.roles.get_mut(role_id).ok_or_else(|| {
            ConsistencyFault::unknown_entity(EntityKind::Role, role_id, Some(event.guild_id.clone()))
        })?;
        *role = merge(role, &event.role.fields)?;
        Ok(())
    }

    fn apply_role_delete(&self, event: GuildRoleDelete) -> DiscordResult<()> {
        if let Some(cached) = self.inner.write().guilds.get_mut(&event.guild_id) {
            cached.roles.remove(&event.role_id);
        }
        Ok(())
    }

    fn apply_emojis_update(&self, event: GuildEmojisUpdate) -> DiscordResult<()> {
        let mut inner = self.inner.write();
        let cached = inner.guilds.get_mut(&event.guild_id).ok_or_else(|| {
            ConsistencyFault::unknown_parent(EntityKind::Emoji, "*", &event.guild_id)
        })?;
        cached.emojis = event.emojis;
        Ok(())
    }

    fn apply_user_update(&self, patch: EntityPatch) -> DiscordResult<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let current = inner
            .self_user
            .as_mut()
            .filter(|user| user.id == patch.id)
            .ok_or_else(|| ConsistencyFault::unknown_entity(EntityKind::User, &patch.id, None))?;

        *current = merge(current, &patch.fields)?;
        inner.users.insert(current.id.clone(), current.clone());
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// The connected account, from READY.
    #[must_use]
    pub fn self_user(&self) -> Option<User> {
        self.inner.read().self_user.clone()
    }

    #[must_use]
    pub fn user(&self, user_id: &str) -> Option<User> {
        self.inner.read().users.get(user_id).cloned()
    }

    #[must_use]
    pub fn guild(&self, guild_id: &str) -> Option<Guild> {
        self.inner
            .read()
            .guilds
            .get(guild_id)
            .map(|cached| cached.guild.clone())
    }

    /// Ids of every known guild, sorted.
    #[must_use]
    pub fn guild_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.read().guilds.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// A guild or private channel.
    #[must_use]
    pub fn channel(&self, channel_id: &str) -> Option<Channel> {
        let inner = self.inner.read();
        if let Some(channel) = inner.private_channels.get(channel_id) {
            return Some(channel.clone());
        }
        let guild_id = inner.channel_index.get(channel_id)?;
        inner.guilds.get(guild_id)?.channels.get(channel_id).cloned()
    }

    /// Channels of a guild ordered by position, then id.
    #[must_use]
    pub fn guild_channels(&self, guild_id: &str) -> Vec<Channel> {
        let inner = self.inner.read();
        let Some(cached) = inner.guilds.get(guild_id) else {
            return Vec::new();
        };
        let mut channels: Vec<Channel> = cached.channels.values().cloned().collect();
        channels.sort_by(|a, b| {
            a.position
                .unwrap_or_default()
                .cmp(&b.position.unwrap_or_default())
                .then_with(|| a.id.cmp(&b.id))
        });
        channels
    }

    /// Direct and group message channels.
    #[must_use]
    pub fn private_channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> =
            self.inner.read().private_channels.values().cloned().collect();
        channels.sort_by(|a, b| a.id.cmp(&b.id));
        channels
    }

    /// A member with its user attached.
    #[must_use]
    pub fn member(&self, guild_id: &str, user_id: &str) -> Option<Member> {
        let inner = self.inner.read();
        let mut member = inner.guilds.get(guild_id)?.members.get(user_id)?.clone();
        member.user = inner.users.get(user_id).cloned();
        Some(member)
    }

    #[must_use]
    pub fn role(&self, guild_id: &str, role_id: &str) -> Option<Role> {
        self.inner
            .read()
            .guilds
            .get(guild_id)?
            .roles
            .get(role_id)
            .cloned()
    }

    /// Roles of a guild ordered by position.
    #[must_use]
    pub fn guild_roles(&self, guild_id: &str) -> Vec<Role> {
        let inner = self.inner.read();
        let Some(cached) = inner.guilds.get(guild_id) else {
            return Vec::new();
        };
        let mut roles: Vec<Role> = cached.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
        roles
    }

    #[must_use]
    pub fn emojis(&self, guild_id: &str) -> Vec<Emoji> {
        self.inner
            .read()
            .guilds
            .get(guild_id)
            .map(|cached| cached.emojis.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        CacheStats {
            guilds: inner.guilds.len(),
            channels: inner.channel_index.len(),
            private_channels: inner.private_channels.len(),
            users: inner.users.len(),
            members: inner.guilds.values().map(|g| g.members.len()).sum(),
            roles: inner.guilds.values().map(|g| g.roles.len()).sum(),
        }
    }
}
