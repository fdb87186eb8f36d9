//! Voice-token minting.
//!
//! The engine's whole interface to the external media provider is one
//! RPC: mint a short-lived token scoped to a channel name. Access control
//! is enforced by refusing to mint for channels outside the player's
//! directive; the provider itself is never instructed to mute anyone.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::game::error::EngineError;
use crate::game::voice;
use crate::protocol::{SessionId, UserId, VoiceChannel};

use super::GameServer;

type HmacSha256 = Hmac<Sha256>;

/// A minted channel grant.
#[derive(Debug, Clone)]
pub struct VoiceGrant {
    pub channel: VoiceChannel,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Seam to the external voice-media provider.
#[async_trait]
pub trait VoiceTokenProvider: Send + Sync {
    /// Mint a short-lived token admitting `user_id` to `channel` within
    /// the session's voice room.
    async fn mint(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        channel: VoiceChannel,
    ) -> Result<VoiceGrant, EngineError>;
}

/// Default provider: self-contained HMAC-SHA256 tokens the media edge can
/// verify with the shared secret.
pub struct HmacVoiceTokenProvider {
    secret: Vec<u8>,
    ttl: chrono::Duration,
}

impl HmacVoiceTokenProvider {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl: chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(120)),
        }
    }

    fn sign(&self, payload: &str) -> Result<String, EngineError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| EngineError::Internal(format!("voice token key rejected: {e}")))?;
        mac.update(payload.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    /// Verify a token produced by [`Self::mint`]; used by tests and by a
    /// co-deployed media edge.
    pub fn verify(&self, token: &str) -> bool {
        let Some((payload_b64, signature)) = token.split_once('.') else {
            return false;
        };
        let Ok(payload) = URL_SAFE_NO_PAD.decode(payload_b64) else {
            return false;
        };
        let Ok(payload) = String::from_utf8(payload) else {
            return false;
        };
        let Some((_, expiry)) = payload.rsplit_once(':') else {
            return false;
        };
        let Ok(expiry) = expiry.parse::<i64>() else {
            return false;
        };
        if expiry < Utc::now().timestamp() {
            return false;
        }
        self.sign(&payload).is_ok_and(|expected| expected == signature)
    }
}

#[async_trait]
impl VoiceTokenProvider for HmacVoiceTokenProvider {
    async fn mint(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        channel: VoiceChannel,
    ) -> Result<VoiceGrant, EngineError> {
        let expires_at = Utc::now() + self.ttl;
        let payload = format!(
            "{session_id}:{user_id}:{channel}:{}",
            expires_at.timestamp()
        );
        let signature = self.sign(&payload)?;
        Ok(VoiceGrant {
            channel,
            token: format!("{}.{signature}", URL_SAFE_NO_PAD.encode(&payload)),
            expires_at,
        })
    }
}

impl GameServer {
    /// Mint a token for the viewer's entitled channel, or `NoChannel`
    /// when the current phase mutes them.
    pub async fn voice_token(
        self: &Arc<Self>,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<VoiceGrant, EngineError> {
        let snapshot = self.store.snapshot(session_id).await?;
        let player = snapshot
            .player_by_user(user_id)
            .ok_or(EngineError::Forbidden)?;
        let directive = voice::authorize(snapshot.session.phase, player.role, player.is_alive);
        let channel = directive.channel.ok_or(EngineError::NoChannel)?;
        self.voice.mint(session_id, user_id, channel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn provider() -> HmacVoiceTokenProvider {
        HmacVoiceTokenProvider::new(b"unit-test-secret-material".to_vec(), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_minted_token_verifies() {
        let provider = provider();
        let grant = provider
            .mint(&Uuid::new_v4(), &Uuid::new_v4(), VoiceChannel::Werewolf)
            .await
            .unwrap();
        assert_eq!(grant.channel, VoiceChannel::Werewolf);
        assert!(grant.expires_at > Utc::now());
        assert!(provider.verify(&grant.token));
    }

    #[tokio::test]
    async fn test_tampered_token_rejected() {
        let provider = provider();
        let grant = provider
            .mint(&Uuid::new_v4(), &Uuid::new_v4(), VoiceChannel::Main)
            .await
            .unwrap();
        let mut tampered = grant.token.clone();
        tampered.push('x');
        assert!(!provider.verify(&tampered));
        assert!(!provider.verify("not-a-token"));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let provider =
            HmacVoiceTokenProvider::new(b"unit-test-secret-material".to_vec(), Duration::ZERO);
        let grant = provider
            .mint(&Uuid::new_v4(), &Uuid::new_v4(), VoiceChannel::Main)
            .await
            .unwrap();
        // TTL zero: already at/past expiry
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(!provider.verify(&grant.token));
    }
}
