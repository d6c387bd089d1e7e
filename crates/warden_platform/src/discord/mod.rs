#![forbid(unsafe_code)]

mod client;


use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use warden_domain::{ChannelId, GuildId, MessageId, RoleId, StickyPayload, UserId};

use self::client::RestClient;
use crate::{
	ChannelSpec, GatewayError, GatewayResultExt, OverwriteTarget, PlatformGateway, Role, SecretString, VoiceOccupancy,
};

/// Default Discord REST base (API v10).
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10/";

/// Discord caps message listing and bulk deletes at 100 per request.
const MAX_MESSAGES_PER_REQUEST: usize = 100;

/// Discord REST configuration.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
	pub api_base: String,
	pub token: SecretString,
	pub user_agent: String,
}

impl DiscordConfig {
	pub fn new(token: SecretString) -> Self {
		Self {
			api_base: DEFAULT_API_BASE.to_string(),
			token,
			user_agent: format!("DiscordBot (warden, {})", env!("CARGO_PKG_VERSION")),
		}
	}

	pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
		self.api_base = base.into();
		self
	}
}

/// [`PlatformGateway`] backed by the Discord REST API.
///
/// Voice occupancy is not queryable over REST; it is answered from the
/// [`VoiceOccupancy`] tracker, which the event-delivery layer keeps current.
#[derive(Debug, Clone)]
pub struct DiscordGateway {
	rest: RestClient,
	occupancy: VoiceOccupancy,
}

impl DiscordGateway {
	pub fn new(cfg: &DiscordConfig, occupancy: VoiceOccupancy) -> Result<Self, GatewayError> {
		Ok(Self {
			rest: RestClient::new(cfg)?,
			occupancy,
		})
	}

	pub fn occupancy(&self) -> &VoiceOccupancy {
		&self.occupancy
	}

	async fn fetch_channel(&self, channel: ChannelId) -> Result<ChannelObject, GatewayError> {
		let url = self.rest.url(&format!("channels/{channel}"))?;
		self.rest.get_json(url, "GET /channels/{id}").await
	}

	async fn recent_message_ids(&self, channel: ChannelId, limit: usize) -> Result<Vec<MessageId>, GatewayError> {
		let mut url = self.rest.url(&format!("channels/{channel}/messages"))?;
		url.query_pairs_mut().append_pair("limit", &limit.to_string());
		let messages: Vec<MessageObject> = self.rest.get_json(url, "GET /channels/{id}/messages").await?;
		Ok(messages.into_iter().map(|m| m.id).collect())
	}

	async fn delete_each(&self, channel: ChannelId, ids: &[MessageId]) -> Result<(), GatewayError> {
		for id in ids {
			self.delete_message(channel, *id).await.tolerate_not_found()?;
		}
		Ok(())
	}
}

#[async_trait]
impl PlatformGateway for DiscordGateway {
	async fn create_channel(&self, spec: ChannelSpec) -> Result<ChannelId, GatewayError> {
		let url = self.rest.url(&format!("guilds/{}/channels", spec.guild))?;
		let body = CreateChannelBody {
			name: &spec.name,
			kind: spec.kind.discord_type(),
			parent_id: spec.category,
			permission_overwrites: spec.overwrites.iter().map(OverwriteBody::from).collect(),
		};
		let created: ChannelObject = self.rest.post_json(url, &body, "POST /guilds/{id}/channels").await?;
		debug!(guild = %spec.guild, channel = %created.id, name = %spec.name, "discord channel created");
		Ok(created.id)
	}

	async fn delete_channel(&self, channel: ChannelId) -> Result<(), GatewayError> {
		let url = self.rest.url(&format!("channels/{channel}"))?;
		let result = self.rest.delete(url, "DELETE /channels/{id}").await;
		if result.is_ok() || result.as_ref().is_err_and(GatewayError::is_not_found) {
			self.occupancy.forget_channel(channel);
		}
		result
	}

	async fn channel_occupant_count(&self, channel: ChannelId) -> Result<usize, GatewayError> {
		self.fetch_channel(channel).await?;
		Ok(self.occupancy.count(channel))
	}

	async fn last_message_id(&self, channel: ChannelId) -> Result<Option<MessageId>, GatewayError> {
		// The channel object's last_message_id is not rolled back on delete.
		Ok(self.recent_message_ids(channel, 1).await?.into_iter().next())
	}

	async fn post_message(&self, channel: ChannelId, payload: &StickyPayload) -> Result<MessageId, GatewayError> {
		let url = self.rest.url(&format!("channels/{channel}/messages"))?;
		let body = MessageBody::from(payload);
		let posted: MessageObject = self.rest.post_json(url, &body, "POST /channels/{id}/messages").await?;
		Ok(posted.id)
	}

	async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<(), GatewayError> {
		let url = self.rest.url(&format!("channels/{channel}/messages/{message}"))?;
		self.rest.delete(url, "DELETE /channels/{id}/messages/{id}").await
	}

	async fn get_role(&self, guild: GuildId, role: RoleId) -> Result<Option<Role>, GatewayError> {
		let url = self.rest.url(&format!("guilds/{guild}/roles"))?;
		let roles: Vec<RoleObject> = self.rest.get_json(url, "GET /guilds/{id}/roles").await?;
		Ok(roles.into_iter().find(|r| r.id == role).map(|r| Role {
			id: r.id,
			name: r.name,
			managed: r.managed,
		}))
	}

	async fn user_has_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<bool, GatewayError> {
		let url = self.rest.url(&format!("guilds/{guild}/members/{user}"))?;
		match self.rest.get_json::<MemberObject>(url, "GET /guilds/{id}/members/{id}").await {
			Ok(member) => Ok(role == guild.everyone_role() || member.roles.contains(&role)),
			Err(GatewayError::NotFound) => Ok(false),
			Err(e) => Err(e),
		}
	}

	async fn purge_messages(&self, channel: ChannelId, limit: usize) -> Result<usize, GatewayError> {
		let mut remaining = limit;
		let mut deleted = 0usize;

		while remaining > 0 {
			let batch = remaining.min(MAX_MESSAGES_PER_REQUEST);
			let ids = self.recent_message_ids(channel, batch).await?;
			if ids.is_empty() {
				break;
			}

			if ids.len() == 1 {
				self.delete_each(channel, &ids).await?;
			} else {
				let url = self.rest.url(&format!("channels/{channel}/messages/bulk-delete"))?;
				let body = BulkDeleteBody { messages: &ids };
				match self.rest.post_empty(url, &body, "POST /channels/{id}/messages/bulk-delete").await {
					Ok(()) => {}
					// Bulk delete refuses messages older than two weeks.
					Err(GatewayError::Http { status: 400, .. }) => self.delete_each(channel, &ids).await?,
					Err(e) => return Err(e),
				}
			}

			deleted += ids.len();
			remaining -= ids.len();
			if ids.len() < batch {
				break;
			}
		}

		Ok(deleted)
	}
}

#[derive(Debug, Deserialize)]
struct ChannelObject {
	id: ChannelId,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
	id: MessageId,
}

#[derive(Debug, Deserialize)]
struct RoleObject {
	id: RoleId,
	name: String,
	#[serde(default)]
	managed: bool,
}

#[derive(Debug, Deserialize)]
struct MemberObject {
	#[serde(default)]
	roles: Vec<RoleId>,
}

#[derive(Debug, Serialize)]
struct CreateChannelBody<'a> {
	name: &'a str,
	#[serde(rename = "type")]
	kind: u8,
	#[serde(skip_serializing_if = "Option::is_none")]
	parent_id: Option<ChannelId>,
	permission_overwrites: Vec<OverwriteBody>,
}

#[derive(Debug, Serialize)]
struct OverwriteBody {
	id: String,
	#[serde(rename = "type")]
	kind: u8,
	allow: String,
	deny: String,
}

impl From<&crate::PermissionOverwrite> for OverwriteBody {
	fn from(o: &crate::PermissionOverwrite) -> Self {
		let (id, kind) = match o.target {
			OverwriteTarget::Role(role) => (role.to_string(), 0),
			OverwriteTarget::Member(user) => (user.to_string(), 1),
		};
		Self {
			id,
			kind,
			allow: o.allow.bits().to_string(),
			deny: o.deny.bits().to_string(),
		}
	}
}

#[derive(Debug, Serialize)]
struct MessageBody<'a> {
	#[serde(skip_serializing_if = "Option::is_none")]
	content: Option<&'a str>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	embeds: Vec<EmbedBody<'a>>,
	allowed_mentions: AllowedMentions,
}

#[derive(Debug, Serialize)]
struct EmbedBody<'a> {
	title: &'a str,
	description: &'a str,
	color: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	image: Option<ImageBody<'a>>,
}

#[derive(Debug, Serialize)]
struct ImageBody<'a> {
	url: &'a str,
}

/// Reposts must not re-ping anyone mentioned in the sticky.
#[derive(Debug, Default, Serialize)]
struct AllowedMentions {
	parse: Vec<&'static str>,
}

impl<'a> From<&'a StickyPayload> for MessageBody<'a> {
	fn from(payload: &'a StickyPayload) -> Self {
		match payload {
			StickyPayload::Text { body } => Self {
				content: Some(body.as_str()),
				embeds: Vec::new(),
				allowed_mentions: AllowedMentions::default(),
			},
			StickyPayload::Embed {
				title,
				body,
				color,
				image_ref,
			} => Self {
				content: None,
				embeds: vec![EmbedBody {
					title,
					description: body,
					color: color.get(),
					image: image_ref.as_deref().map(|url| ImageBody { url }),
				}],
				allowed_mentions: AllowedMentions::default(),
			},
		}
	}
}

#[derive(Debug, Serialize)]
struct BulkDeleteBody<'a> {
	messages: &'a [MessageId],
}
