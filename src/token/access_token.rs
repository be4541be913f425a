//! AccessToken2 (`007`) encoding.
//!
//! A token is a signed, zlib-compressed, base64-encoded binary blob:
//!
//! ```text
//! "007" + base64(zlib(
//!     string(signature)
//!     string(app_id) u32(issue_ts) u32(expire) u32(salt)
//!     u16(service_count) service...
//! ))
//! ```
//!
//! All integers are little-endian.  Strings are a `u16` byte length followed
//! by the bytes.  Privilege maps are a `u16` count followed by sorted
//! `(u16 privilege, u32 expire)` pairs.
//!
//! The signature is `HMAC-SHA256(signing_key, signing_info)` where the
//! signing key is derived from the app certificate in two HMAC rounds keyed
//! first by the issue timestamp and then by the salt.

use std::collections::BTreeMap;
use std::io::Write as _;

use anyhow::{Context, Result};
use base64::Engine as _;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const VERSION: &str = "007";

pub const SERVICE_RTC: u16 = 1;
pub const SERVICE_RTM: u16 = 2;

pub const PRIVILEGE_JOIN_CHANNEL: u16 = 1;
pub const PRIVILEGE_PUBLISH_AUDIO_STREAM: u16 = 2;
pub const PRIVILEGE_PUBLISH_VIDEO_STREAM: u16 = 3;
pub const PRIVILEGE_PUBLISH_DATA_STREAM: u16 = 4;

pub const PRIVILEGE_LOGIN: u16 = 1;

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Service {
    Rtc {
        privileges: BTreeMap<u16, u32>,
        channel_name: String,
        /// Decimal uid, or empty for uid 0 (any user).
        uid: String,
    },
    Rtm {
        privileges: BTreeMap<u16, u32>,
        user_id: String,
    },
}

impl Service {
    pub fn rtc(channel_name: &str, uid: u32) -> Self {
        Service::Rtc {
            privileges: BTreeMap::new(),
            channel_name: channel_name.to_string(),
            uid: if uid == 0 {
                String::new()
            } else {
                uid.to_string()
            },
        }
    }

    pub fn rtm(user_id: &str) -> Self {
        Service::Rtm {
            privileges: BTreeMap::new(),
            user_id: user_id.to_string(),
        }
    }

    pub fn service_type(&self) -> u16 {
        match self {
            Service::Rtc { .. } => SERVICE_RTC,
            Service::Rtm { .. } => SERVICE_RTM,
        }
    }

    pub fn add_privilege(&mut self, privilege: u16, expire: u32) {
        match self {
            Service::Rtc { privileges, .. } | Service::Rtm { privileges, .. } => {
                privileges.insert(privilege, expire);
            }
        }
    }

    fn pack(&self, buf: &mut Vec<u8>) -> Result<()> {
        pack_u16(buf, self.service_type());
        match self {
            Service::Rtc {
                privileges,
                channel_name,
                uid,
            } => {
                pack_map_u32(buf, privileges)?;
                pack_string(buf, channel_name.as_bytes())?;
                pack_string(buf, uid.as_bytes())?;
            }
            Service::Rtm {
                privileges,
                user_id,
            } => {
                pack_map_u32(buf, privileges)?;
                pack_string(buf, user_id.as_bytes())?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub app_id: String,
    pub app_certificate: String,
    pub issue_ts: u32,
    /// Token validity in seconds from `issue_ts`.
    pub expire: u32,
    pub salt: u32,
    pub services: BTreeMap<u16, Service>,
}

impl AccessToken {
    /// A token issued now with a random salt.
    pub fn new(app_id: &str, app_certificate: &str, expire: u32) -> Self {
        use rand::Rng;

        Self {
            app_id: app_id.to_string(),
            app_certificate: app_certificate.to_string(),
            issue_ts: chrono::Utc::now().timestamp() as u32,
            expire,
            salt: rand::thread_rng().gen_range(1..=99_999_999),
            services: BTreeMap::new(),
        }
    }

    /// Add (or replace) a service.  Services are packed in type order.
    pub fn add_service(&mut self, service: Service) {
        self.services.insert(service.service_type(), service);
    }

    /// Sign and encode the token.
    pub fn build(&self) -> Result<String> {
        anyhow::ensure!(is_uuid_hex(&self.app_id), "app id is not a 32-char hex string");
        anyhow::ensure!(
            is_uuid_hex(&self.app_certificate),
            "app certificate is not a 32-char hex string"
        );

        let signing_info = self.signing_info()?;
        let signature = hmac_sha256(&self.signing_key()?, &signing_info)?;

        let mut content = Vec::with_capacity(signature.len() + 2 + signing_info.len());
        pack_string(&mut content, &signature)?;
        content.extend_from_slice(&signing_info);

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&content).context("zlib compress token")?;
        let compressed = encoder.finish().context("zlib finish token")?;

        Ok(format!(
            "{VERSION}{}",
            base64::engine::general_purpose::STANDARD.encode(compressed)
        ))
    }

    fn signing_key(&self) -> Result<Vec<u8>> {
        let round1 = hmac_sha256(&self.issue_ts.to_le_bytes(), self.app_certificate.as_bytes())?;
        hmac_sha256(&self.salt.to_le_bytes(), &round1)
    }

    fn signing_info(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        pack_string(&mut buf, self.app_id.as_bytes())?;
        pack_u32(&mut buf, self.issue_ts);
        pack_u32(&mut buf, self.expire);
        pack_u32(&mut buf, self.salt);
        pack_u16(&mut buf, self.services.len() as u16);
        for service in self.services.values() {
            service.pack(&mut buf)?;
        }
        Ok(buf)
    }
}

// ---------------------------------------------------------------------------
// Packing helpers
// ---------------------------------------------------------------------------

fn pack_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn pack_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn pack_string(buf: &mut Vec<u8>, s: &[u8]) -> Result<()> {
    let len = u16::try_from(s.len()).context("string field longer than 65535 bytes")?;
    pack_u16(buf, len);
    buf.extend_from_slice(s);
    Ok(())
}

fn pack_map_u32(buf: &mut Vec<u8>, map: &BTreeMap<u16, u32>) -> Result<()> {
    let len = u16::try_from(map.len()).context("too many privileges")?;
    pack_u16(buf, len);
    for (k, v) in map {
        pack_u16(buf, *k);
        pack_u32(buf, *v);
    }
    Ok(())
}

fn hmac_sha256(key: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| anyhow::anyhow!("HMAC key error: {e}"))?;
    mac.update(msg);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn is_uuid_hex(s: &str) -> bool {
    s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Read as _;

    use flate2::read::ZlibDecoder;

    use super::*;

    pub(crate) const APP_ID: &str = "970CA35de60c44645bbae8a215061b33";
    pub(crate) const APP_CERT: &str = "5CFd2fd1755d40ecb72977518be15d3b";

    /// Minimal reader over the packed wire format.
    pub(crate) struct Unpacker<'a> {
        buf: &'a [u8],
    }

    impl<'a> Unpacker<'a> {
        pub(crate) fn u16(&mut self) -> u16 {
            let (head, rest) = self.buf.split_at(2);
            self.buf = rest;
            u16::from_le_bytes([head[0], head[1]])
        }

        pub(crate) fn u32(&mut self) -> u32 {
            let (head, rest) = self.buf.split_at(4);
            self.buf = rest;
            u32::from_le_bytes([head[0], head[1], head[2], head[3]])
        }

        pub(crate) fn bytes(&mut self) -> &'a [u8] {
            let len = self.u16() as usize;
            let (head, rest) = self.buf.split_at(len);
            self.buf = rest;
            head
        }

        pub(crate) fn string(&mut self) -> String {
            String::from_utf8(self.bytes().to_vec()).unwrap()
        }

        pub(crate) fn map(&mut self) -> BTreeMap<u16, u32> {
            let n = self.u16();
            (0..n).map(|_| (self.u16(), self.u32())).collect()
        }

        pub(crate) fn is_empty(&self) -> bool {
            self.buf.is_empty()
        }
    }

    /// Decode a token into `(signature, signing_info)`.
    pub(crate) fn decode(token: &str) -> (Vec<u8>, Vec<u8>) {
        let body = token.strip_prefix(VERSION).expect("version prefix");
        let compressed = base64::engine::general_purpose::STANDARD
            .decode(body)
            .unwrap();
        let mut content = Vec::new();
        ZlibDecoder::new(&compressed[..])
            .read_to_end(&mut content)
            .unwrap();
        let mut u = Unpacker { buf: &content };
        let signature = u.bytes().to_vec();
        (signature, u.buf.to_vec())
    }

    pub(crate) fn unpacker(buf: &[u8]) -> Unpacker<'_> {
        Unpacker { buf }
    }

    fn fixed_token() -> AccessToken {
        AccessToken {
            app_id: APP_ID.to_string(),
            app_certificate: APP_CERT.to_string(),
            issue_ts: 1_111_111,
            expire: 900,
            salt: 1,
            services: BTreeMap::new(),
        }
    }

    #[test]
    fn token_has_version_prefix() {
        let token = fixed_token().build().unwrap();
        assert!(token.starts_with("007"));
    }

    #[test]
    fn build_is_deterministic_for_fixed_inputs() {
        let mut a = fixed_token();
        a.add_service(Service::rtc("room", 42));
        let b = a.clone();
        assert_eq!(a.build().unwrap(), b.build().unwrap());
    }

    #[test]
    fn signature_verifies_against_signing_info() {
        let mut token = fixed_token();
        let mut rtc = Service::rtc("room", 2_882_341_273);
        rtc.add_privilege(PRIVILEGE_JOIN_CHANNEL, 900);
        token.add_service(rtc);

        let (signature, info) = decode(&token.build().unwrap());
        let expected = hmac_sha256(&token.signing_key().unwrap(), &info).unwrap();
        assert_eq!(signature, expected);
        assert_eq!(signature.len(), 32);
    }

    #[test]
    fn signing_info_layout() {
        let mut token = fixed_token();
        let mut rtm = Service::rtm("alice");
        rtm.add_privilege(PRIVILEGE_LOGIN, 600);
        token.add_service(rtm);
        let mut rtc = Service::rtc("room", 7);
        rtc.add_privilege(PRIVILEGE_PUBLISH_VIDEO_STREAM, 300);
        rtc.add_privilege(PRIVILEGE_JOIN_CHANNEL, 300);
        token.add_service(rtc);

        let (_, info) = decode(&token.build().unwrap());
        let mut u = unpacker(&info);
        assert_eq!(u.string(), APP_ID);
        assert_eq!(u.u32(), 1_111_111);
        assert_eq!(u.u32(), 900);
        assert_eq!(u.u32(), 1);
        assert_eq!(u.u16(), 2);

        // RTC (type 1) is packed before RTM (type 2) regardless of insertion order.
        assert_eq!(u.u16(), SERVICE_RTC);
        let privileges: Vec<_> = u.map().into_iter().collect();
        assert_eq!(
            privileges,
            vec![
                (PRIVILEGE_JOIN_CHANNEL, 300),
                (PRIVILEGE_PUBLISH_VIDEO_STREAM, 300)
            ]
        );
        assert_eq!(u.string(), "room");
        assert_eq!(u.string(), "7");

        assert_eq!(u.u16(), SERVICE_RTM);
        assert_eq!(u.map().get(&PRIVILEGE_LOGIN), Some(&600));
        assert_eq!(u.string(), "alice");
        assert!(u.is_empty());
    }

    #[test]
    fn rtc_uid_zero_packs_empty_string() {
        match Service::rtc("room", 0) {
            Service::Rtc { uid, .. } => assert!(uid.is_empty()),
            other => panic!("unexpected service {other:?}"),
        }
    }

    #[test]
    fn salt_changes_signature() {
        let a = fixed_token();
        let mut b = fixed_token();
        b.salt = 2;
        assert_ne!(a.build().unwrap(), b.build().unwrap());
    }

    #[test]
    fn rejects_malformed_app_id() {
        let mut token = fixed_token();
        token.app_id = "not-an-app-id".to_string();
        assert!(token.build().is_err());
    }

    #[test]
    fn rejects_malformed_certificate() {
        let mut token = fixed_token();
        token.app_certificate = "zz".repeat(16);
        assert!(token.build().is_err());
    }

    #[test]
    fn new_uses_salt_in_range() {
        let token = AccessToken::new(APP_ID, APP_CERT, 60);
        assert!((1..=99_999_999).contains(&token.salt));
        assert!(token.issue_ts > 0);
    }
}
