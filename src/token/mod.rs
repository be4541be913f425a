//! RTC / RTM token minting.
//!
//! Tokens are signed locally with the app certificate; no vendor API call is
//! made.  Callers receive short-lived credentials they hand to the client SDK
//! to join a channel or log in to messaging.

pub mod access_token;

use anyhow::Result;
use rand::Rng;
use serde::Deserialize;
use tracing::debug;

use self::access_token::{
    AccessToken, Service, PRIVILEGE_JOIN_CHANNEL, PRIVILEGE_LOGIN, PRIVILEGE_PUBLISH_AUDIO_STREAM,
    PRIVILEGE_PUBLISH_DATA_STREAM, PRIVILEGE_PUBLISH_VIDEO_STREAM,
};
use crate::config::TokenConfig;
use crate::metrics::{TokenKind, TokenLabels};

/// Channel role encoded into an RTC token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May join and publish audio, video and data streams.
    #[default]
    Publisher,
    /// May only join.
    Subscriber,
}

/// Credentials minted for one participant (the recorder bot or a client).
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub uid: u32,
    pub rtc: String,
    pub rtm: String,
}

/// Signs RTC and RTM tokens for a single vendor application.
#[derive(Clone)]
pub struct TokenIssuer {
    app_id: String,
    app_certificate: String,
    expire: u32,
    privilege_expire: u32,
    metrics: Option<crate::metrics::MetricsRegistry>,
}

impl TokenIssuer {
    pub fn new(app_id: &str, app_certificate: &str, config: &TokenConfig) -> Self {
        Self {
            app_id: app_id.to_string(),
            app_certificate: app_certificate.to_string(),
            expire: config.expire_secs,
            privilege_expire: config.privilege_expire_secs,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: crate::metrics::MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Mint an RTC token for `uid` in `channel`.
    pub fn rtc_token(&self, channel: &str, uid: u32, role: Role) -> Result<String> {
        let mut service = Service::rtc(channel, uid);
        service.add_privilege(PRIVILEGE_JOIN_CHANNEL, self.privilege_expire);
        if role == Role::Publisher {
            service.add_privilege(PRIVILEGE_PUBLISH_AUDIO_STREAM, self.privilege_expire);
            service.add_privilege(PRIVILEGE_PUBLISH_VIDEO_STREAM, self.privilege_expire);
            service.add_privilege(PRIVILEGE_PUBLISH_DATA_STREAM, self.privilege_expire);
        }

        let token = self.sign(service)?;
        debug!(%channel, uid, ?role, "rtc token issued");
        self.record(TokenKind::Rtc);
        Ok(token)
    }

    /// Mint an RTM login token for `user_id`.
    pub fn rtm_token(&self, user_id: &str) -> Result<String> {
        let mut service = Service::rtm(user_id);
        service.add_privilege(PRIVILEGE_LOGIN, self.expire);

        let token = self.sign(service)?;
        debug!(%user_id, "rtm token issued");
        self.record(TokenKind::Rtm);
        Ok(token)
    }

    /// Pick a random non-zero uid and mint a publisher RTC token plus an RTM
    /// token for it.
    pub fn user_credentials(&self, channel: &str) -> Result<UserCredentials> {
        let uid = random_uid();
        let rtc = self.rtc_token(channel, uid, Role::Publisher)?;
        let rtm = self.rtm_token(&uid.to_string())?;
        Ok(UserCredentials { uid, rtc, rtm })
    }

    fn sign(&self, service: Service) -> Result<String> {
        let mut token = AccessToken::new(&self.app_id, &self.app_certificate, self.expire);
        token.add_service(service);
        token.build()
    }

    fn record(&self, kind: TokenKind) {
        if let Some(m) = &self.metrics {
            m.metrics
                .tokens_issued
                .get_or_create(&TokenLabels { kind })
                .inc();
        }
    }
}

/// A random uid in `1..=u32::MAX`.  Zero means "any user" to the vendor and
/// is never handed out.
pub fn random_uid() -> u32 {
    rand::thread_rng().gen_range(1..=u32::MAX)
}
