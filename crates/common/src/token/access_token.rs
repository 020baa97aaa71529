//! AccessToken2 container, signing and decoding.
//!
//! ```text
//! token   = "007" base64( zlib( bytes(signature) || body ) )
//! body    = string(app_id) u32(issue_ts) u32(expire) u32(salt) u16(count) service*
//! service = u16(type) map(privileges) fields
//! ```
//!
//! The signature is HMAC-SHA256 over `body`, keyed with a value derived from
//! the app certificate, the issue timestamp and the salt.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::Serialize;
use sha2::Sha256;

use super::packer::{Packer, Unpacker};
use super::TokenError;

type HmacSha256 = Hmac<Sha256>;

/// Version prefix of every token built here.
pub const VERSION: &str = "007";

const SALT_MAX: u32 = 99_999_999;

/// Services a token can carry privileges for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Rtc,
    Rtm,
    Chat,
}

impl ServiceType {
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::Rtc => 1,
            Self::Rtm => 2,
            Self::Chat => 5,
        }
    }

    /// # Errors
    ///
    /// Returns [`TokenError::UnknownService`] for codes this crate does not decode.
    pub fn from_code(code: u16) -> Result<Self, TokenError> {
        match code {
            1 => Ok(Self::Rtc),
            2 => Ok(Self::Rtm),
            5 => Ok(Self::Chat),
            other => Err(TokenError::UnknownService {
                service_type: other,
            }),
        }
    }
}

/// RTC privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcPrivilege {
    JoinChannel = 1,
    PublishAudioStream = 2,
    PublishVideoStream = 3,
    PublishDataStream = 4,
}

/// RTM privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtmPrivilege {
    Login = 1,
}

/// Chat privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPrivilege {
    User = 1,
    App = 2,
}

impl From<RtcPrivilege> for u16 {
    fn from(privilege: RtcPrivilege) -> Self {
        privilege as u16
    }
}

impl From<RtmPrivilege> for u16 {
    fn from(privilege: RtmPrivilege) -> Self {
        privilege as u16
    }
}

impl From<ChatPrivilege> for u16 {
    fn from(privilege: ChatPrivilege) -> Self {
        privilege as u16
    }
}

/// Service-specific fields packed after the privilege map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "service", rename_all = "lowercase")]
pub enum ServiceScope {
    Rtc { channel_name: String, uid: String },
    Rtm { user_id: String },
    Chat { user_id: String },
}

/// One service entry of a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    #[serde(flatten)]
    scope: ServiceScope,
    privileges: BTreeMap<u16, u32>,
}

impl Service {
    #[must_use]
    pub fn rtc(channel_name: &str, uid: &str) -> Self {
        Self::with_scope(ServiceScope::Rtc {
            channel_name: channel_name.to_string(),
            uid: uid.to_string(),
        })
    }

    #[must_use]
    pub fn rtm(user_id: &str) -> Self {
        Self::with_scope(ServiceScope::Rtm {
            user_id: user_id.to_string(),
        })
    }

    #[must_use]
    pub fn chat(user_id: &str) -> Self {
        Self::with_scope(ServiceScope::Chat {
            user_id: user_id.to_string(),
        })
    }

    fn with_scope(scope: ServiceScope) -> Self {
        Self {
            scope,
            privileges: BTreeMap::new(),
        }
    }

    /// Grants `privilege` until `expire`. Granting it again overwrites the expiry.
    pub fn add_privilege(&mut self, privilege: impl Into<u16>, expire: u32) -> &mut Self {
        self.privileges.insert(privilege.into(), expire);
        self
    }

    #[must_use]
    pub fn service_type(&self) -> ServiceType {
        match self.scope {
            ServiceScope::Rtc { .. } => ServiceType::Rtc,
            ServiceScope::Rtm { .. } => ServiceType::Rtm,
            ServiceScope::Chat { .. } => ServiceType::Chat,
        }
    }

    #[must_use]
    pub fn scope(&self) -> &ServiceScope {
        &self.scope
    }

    #[must_use]
    pub fn privileges(&self) -> &BTreeMap<u16, u32> {
        &self.privileges
    }

    #[must_use]
    pub fn privilege(&self, privilege: impl Into<u16>) -> Option<u32> {
        self.privileges.get(&privilege.into()).copied()
    }

    fn pack(&self, packer: &mut Packer) -> Result<(), TokenError> {
        packer.pack_u16(self.service_type().code());
        packer.pack_map_u32(&self.privileges)?;
        match &self.scope {
            ServiceScope::Rtc { channel_name, uid } => {
                packer.pack_string(channel_name)?.pack_string(uid)?;
            }
            ServiceScope::Rtm { user_id } | ServiceScope::Chat { user_id } => {
                packer.pack_string(user_id)?;
            }
        }
        Ok(())
    }

    fn unpack(reader: &mut Unpacker<'_>) -> Result<Self, TokenError> {
        let service_type = ServiceType::from_code(reader.read_u16()?)?;
        let privileges = reader.read_map_u32()?;
        let scope = match service_type {
            ServiceType::Rtc => ServiceScope::Rtc {
                channel_name: reader.read_string()?,
                uid: reader.read_string()?,
            },
            ServiceType::Rtm => ServiceScope::Rtm {
                user_id: reader.read_string()?,
            },
            ServiceType::Chat => ServiceScope::Chat {
                user_id: reader.read_string()?,
            },
        };
        Ok(Self { scope, privileges })
    }
}

/// A token being assembled for one app.
#[derive(Debug, Clone)]
pub struct AccessToken {
    app_id: String,
    app_certificate: String,
    issue_ts: u32,
    expire: u32,
    salt: u32,
    services: BTreeMap<ServiceType, Service>,
}

impl AccessToken {
    /// Starts a token issued now that stays valid for `expire` seconds.
    #[must_use]
    pub fn new(app_id: &str, app_certificate: &str, expire: u32) -> Self {
        let issue_ts = u32::try_from(chrono::Utc::now().timestamp()).unwrap_or(u32::MAX);
        let salt = rand::thread_rng().gen_range(1..=SALT_MAX);

        Self {
            app_id: app_id.to_string(),
            app_certificate: app_certificate.to_string(),
            issue_ts,
            expire,
            salt,
            services: BTreeMap::new(),
        }
    }

    /// Pins the issue timestamp and salt, making [`AccessToken::build`] deterministic.
    #[must_use]
    pub fn with_issue_ts_and_salt(mut self, issue_ts: u32, salt: u32) -> Self {
        self.issue_ts = issue_ts;
        self.salt = salt;
        self
    }

    /// Adds a service, replacing any earlier service of the same type.
    pub fn add_service(&mut self, service: Service) {
        self.services.insert(service.service_type(), service);
    }

    #[must_use]
    pub fn issue_ts(&self) -> u32 {
        self.issue_ts
    }

    #[must_use]
    pub fn salt(&self) -> u32 {
        self.salt
    }

    /// Signs and encodes the token.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidCredentials`] when the app id or certificate
    /// is not 32 hex characters, or a packing error if a field is oversized.
    pub fn build(&self) -> Result<String, TokenError> {
        if !is_valid_credential(&self.app_id) || !is_valid_credential(&self.app_certificate) {
            return Err(TokenError::InvalidCredentials);
        }

        let body = self.pack_body()?;
        let signing_key = signing_key(&self.app_certificate, self.issue_ts, self.salt);
        let signature = hmac_sha256(&signing_key, &body);

        seal(&signature, &body)
    }

    fn pack_body(&self) -> Result<Vec<u8>, TokenError> {
        let count = u16::try_from(self.services.len()).map_err(|_| TokenError::FieldTooLong {
            len: self.services.len(),
        })?;

        let mut packer = Packer::new();
        packer.pack_string(&self.app_id)?;
        packer
            .pack_u32(self.issue_ts)
            .pack_u32(self.expire)
            .pack_u32(self.salt)
            .pack_u16(count);
        for service in self.services.values() {
            service.pack(&mut packer)?;
        }
        Ok(packer.into_bytes())
    }
}

/// A token read back from its string form.
#[derive(Debug, Clone, Serialize)]
pub struct DecodedToken {
    #[serde(serialize_with = "serialize_hex")]
    pub signature: Vec<u8>,
    pub app_id: String,
    pub issue_ts: u32,
    pub expire: u32,
    pub salt: u32,
    pub services: Vec<Service>,
    #[serde(skip)]
    body: Vec<u8>,
}

impl DecodedToken {
    /// Decodes a `007` token without checking its signature.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::UnsupportedVersion`] for other prefixes and
    /// [`TokenError::Malformed`], [`TokenError::Truncated`] or
    /// [`TokenError::UnknownService`] when the payload cannot be read.
    pub fn parse(token: &str) -> Result<Self, TokenError> {
        let encoded = token
            .strip_prefix(VERSION)
            .ok_or_else(|| TokenError::UnsupportedVersion {
                found: token.chars().take(VERSION.len()).collect(),
            })?;

        let compressed = STANDARD.decode(encoded).map_err(|e| TokenError::Malformed {
            message: format!("invalid base64: {e}"),
        })?;

        let mut content = Vec::new();
        ZlibDecoder::new(compressed.as_slice())
            .read_to_end(&mut content)
            .map_err(|e| TokenError::Malformed {
                message: format!("invalid zlib stream: {e}"),
            })?;

        let mut envelope = Unpacker::new(&content);
        let signature = envelope.read_bytes()?.to_vec();
        let body = envelope.remaining().to_vec();

        let mut reader = Unpacker::new(&body);
        let app_id = reader.read_string()?;
        let issue_ts = reader.read_u32()?;
        let expire = reader.read_u32()?;
        let salt = reader.read_u32()?;
        let count = reader.read_u16()?;
        let mut services = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            services.push(Service::unpack(&mut reader)?);
        }
        if !reader.is_empty() {
            return Err(TokenError::Malformed {
                message: format!("{} trailing bytes", reader.remaining().len()),
            });
        }

        Ok(Self {
            signature,
            app_id,
            issue_ts,
            expire,
            salt,
            services,
            body,
        })
    }

    /// Checks the signature against `app_certificate` in constant time.
    #[must_use]
    pub fn verify(&self, app_certificate: &str) -> bool {
        let key = signing_key(app_certificate, self.issue_ts, self.salt);
        let mut mac = HmacSha256::new_from_slice(&key).expect("HMAC can take key of any size");
        mac.update(&self.body);
        mac.verify_slice(&self.signature).is_ok()
    }

    /// Unix time (seconds) at which the token stops being accepted.
    #[must_use]
    pub fn expires_at(&self) -> u64 {
        u64::from(self.issue_ts) + u64::from(self.expire)
    }

    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at() <= now
    }

    #[must_use]
    pub fn service(&self, service_type: ServiceType) -> Option<&Service> {
        self.services
            .iter()
            .find(|service| service.service_type() == service_type)
    }
}

fn serialize_hex<S: serde::Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

fn is_valid_credential(value: &str) -> bool {
    value.len() == 32 && value.chars().all(|c| c.is_ascii_hexdigit())
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

fn signing_key(app_certificate: &str, issue_ts: u32, salt: u32) -> Vec<u8> {
    let stamped = hmac_sha256(&issue_ts.to_le_bytes(), app_certificate.as_bytes());
    hmac_sha256(&salt.to_le_bytes(), &stamped)
}

fn seal(signature: &[u8], body: &[u8]) -> Result<String, TokenError> {
    let mut content = Packer::new();
    content.pack_bytes(signature)?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(content.as_bytes())
        .and_then(|()| encoder.write_all(body))
        .expect("writing to a Vec cannot fail");
    let compressed = encoder.finish().expect("writing to a Vec cannot fail");

    Ok(format!("{VERSION}{}", STANDARD.encode(compressed)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP_ID: &str = "970CA35de60c44645bbae8a215061b33";
    const APP_CERTIFICATE: &str = "5CFd2fd1755d40ecb72977518be15d3b";
    const CHANNEL: &str = "7d72365eb983485397e3e3f9d460bdda";

    fn fixed_token(expire: u32) -> AccessToken {
        AccessToken::new(APP_ID, APP_CERTIFICATE, expire).with_issue_ts_and_salt(1_111_111, 1)
    }

    #[test]
    fn built_token_starts_with_version() {
        let mut token = fixed_token(600);
        let mut rtm = Service::rtm("test_user");
        rtm.add_privilege(RtmPrivilege::Login, 600);
        token.add_service(rtm);

        let encoded = token.build().expect("should build token");
        assert!(encoded.starts_with("007"));
    }

    #[test]
    fn signature_matches_reference_vector() {
        let mut token = fixed_token(600);
        let mut rtc = Service::rtc(CHANNEL, "2882341273");
        rtc.add_privilege(RtcPrivilege::JoinChannel, 600);
        token.add_service(rtc);

        let decoded = DecodedToken::parse(&token.build().expect("should build token"))
            .expect("should parse token");

        assert_eq!(
            hex::encode(&decoded.signature),
            "16a0b84c5a5e82cbf74fb813d09f59c54bdac9c06120580539ac97578e958b1a"
        );
    }

    #[test]
    fn parse_recovers_token_fields() {
        let mut token = fixed_token(600);
        let mut chat = Service::chat("test_user");
        chat.add_privilege(ChatPrivilege::User, 600);
        token.add_service(chat);

        let decoded = DecodedToken::parse(&token.build().expect("should build token"))
            .expect("should parse token");

        assert_eq!(decoded.app_id, APP_ID);
        assert_eq!(decoded.issue_ts, 1_111_111);
        assert_eq!(decoded.expire, 600);
        assert_eq!(decoded.salt, 1);
        let chat = decoded
            .service(ServiceType::Chat)
            .expect("should carry chat service");
        assert_eq!(
            chat.scope(),
            &ServiceScope::Chat {
                user_id: "test_user".to_string()
            }
        );
        assert_eq!(chat.privilege(ChatPrivilege::User), Some(600));
    }

    #[test]
    fn services_are_packed_in_type_order() {
        let mut token = fixed_token(600);
        token.add_service(Service::chat("u"));
        token.add_service(Service::rtc(CHANNEL, "1"));
        token.add_service(Service::rtm("u"));

        let decoded = DecodedToken::parse(&token.build().expect("should build token"))
            .expect("should parse token");
        let types: Vec<ServiceType> = decoded
            .services
            .iter()
            .map(Service::service_type)
            .collect();

        assert_eq!(
            types,
            vec![ServiceType::Rtc, ServiceType::Rtm, ServiceType::Chat]
        );
    }

    #[test]
    fn adding_same_service_type_replaces_it() {
        let mut token = fixed_token(600);
        token.add_service(Service::rtm("first"));
        token.add_service(Service::rtm("second"));

        let decoded = DecodedToken::parse(&token.build().expect("should build token"))
            .expect("should parse token");

        assert_eq!(decoded.services.len(), 1);
        assert_eq!(
            decoded.services[0].scope(),
            &ServiceScope::Rtm {
                user_id: "second".to_string()
            }
        );
    }

    #[test]
    fn verify_accepts_right_certificate_only() {
        let mut token = fixed_token(600);
        token.add_service(Service::rtm("user"));
        let decoded = DecodedToken::parse(&token.build().expect("should build token"))
            .expect("should parse token");

        assert!(decoded.verify(APP_CERTIFICATE));
        assert!(!decoded.verify("00000000000000000000000000000000"));
    }

    #[test]
    fn salt_changes_the_token() {
        let build = |salt| {
            let mut token = AccessToken::new(APP_ID, APP_CERTIFICATE, 600)
                .with_issue_ts_and_salt(1_111_111, salt);
            token.add_service(Service::rtm("user"));
            token.build().expect("should build token")
        };

        assert_eq!(build(7), build(7));
        assert_ne!(build(7), build(8));
    }

    #[test]
    fn new_token_uses_random_salt_in_range() {
        let token = AccessToken::new(APP_ID, APP_CERTIFICATE, 600);
        assert!((1..=SALT_MAX).contains(&token.salt()));
        assert!(token.issue_ts() > 1_600_000_000);
    }

    #[test]
    fn build_rejects_invalid_credentials() {
        let short_id = AccessToken::new("abc", APP_CERTIFICATE, 600);
        assert_eq!(short_id.build(), Err(TokenError::InvalidCredentials));

        let non_hex_cert = AccessToken::new(APP_ID, "zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz", 600);
        assert_eq!(non_hex_cert.build(), Err(TokenError::InvalidCredentials));
    }

    #[test]
    fn parse_rejects_other_versions() {
        let err = DecodedToken::parse("006abcdef").expect_err("should reject version");
        assert_eq!(
            err,
            TokenError::UnsupportedVersion {
                found: "006".to_string()
            }
        );
    }

    #[test]
    fn parse_rejects_garbage_payload() {
        assert!(matches!(
            DecodedToken::parse("007not base64!"),
            Err(TokenError::Malformed { .. })
        ));
        let not_zlib = format!("007{}", STANDARD.encode(b"plain bytes"));
        assert!(matches!(
            DecodedToken::parse(&not_zlib),
            Err(TokenError::Malformed { .. })
        ));
    }

    #[test]
    fn parse_rejects_unknown_service_type() {
        let mut body = Packer::new();
        body.pack_string(APP_ID).expect("pack app id");
        body.pack_u32(1).pack_u32(600).pack_u32(1).pack_u16(1).pack_u16(9);
        body.pack_map_u32(&BTreeMap::new()).expect("pack map");

        let token = seal(&[0u8; 32], body.as_bytes()).expect("should seal");

        assert_eq!(
            DecodedToken::parse(&token).expect_err("should reject service"),
            TokenError::UnknownService { service_type: 9 }
        );
    }

    #[test]
    fn parse_rejects_truncated_body() {
        let mut body = Packer::new();
        body.pack_string(APP_ID).expect("pack app id");
        body.pack_u32(1);

        let token = seal(&[0u8; 32], body.as_bytes()).expect("should seal");

        assert_eq!(DecodedToken::parse(&token).err(), Some(TokenError::Truncated));
    }

    #[test]
    fn expiry_is_relative_to_issue_time() {
        let mut token = fixed_token(600);
        token.add_service(Service::rtm("user"));
        let decoded = DecodedToken::parse(&token.build().expect("should build token"))
            .expect("should parse token");

        assert_eq!(decoded.expires_at(), 1_111_711);
        assert!(!decoded.is_expired(1_111_710));
        assert!(decoded.is_expired(1_111_711));
    }
}
