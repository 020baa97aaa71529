//! Token builders for the RTC, RTM and Chat services.
//!
//! Every expiry is a number of seconds counted from the token's issue time.

use super::access_token::{AccessToken, ChatPrivilege, RtcPrivilege, RtmPrivilege, Service};
use super::TokenError;

/// Role of an RTC participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RtcRole {
    /// May join the channel and publish audio, video and data streams.
    Publisher = 1,
    /// May only join the channel.
    #[default]
    Subscriber = 2,
}

impl From<&str> for RtcRole {
    /// `"publisher"` maps to [`RtcRole::Publisher`]; anything else is a subscriber.
    fn from(role: &str) -> Self {
        if role.trim().eq_ignore_ascii_case("publisher") {
            Self::Publisher
        } else {
            Self::Subscriber
        }
    }
}

/// Separate expiries for each RTC privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RtcPrivilegeExpiry {
    pub join_channel: u32,
    pub publish_audio_stream: u32,
    pub publish_video_stream: u32,
    pub publish_data_stream: u32,
}

impl RtcPrivilegeExpiry {
    /// Same expiry for every privilege.
    #[must_use]
    pub fn uniform(expire: u32) -> Self {
        Self {
            join_channel: expire,
            publish_audio_stream: expire,
            publish_video_stream: expire,
            publish_data_stream: expire,
        }
    }
}

/// Builds an RTC token for a numeric uid. Uid `0` means "any user".
///
/// # Errors
///
/// Returns a [`TokenError`] if the credentials are invalid or a field is oversized.
pub fn build_rtc_token_with_uid(
    app_id: &str,
    app_certificate: &str,
    channel_name: &str,
    uid: u32,
    role: RtcRole,
    token_expire: u32,
    privilege_expire: u32,
) -> Result<String, TokenError> {
    build_rtc_token_with_account(
        app_id,
        app_certificate,
        channel_name,
        &uid_to_account(uid),
        role,
        token_expire,
        privilege_expire,
    )
}

/// Builds an RTC token for a string user account.
///
/// # Errors
///
/// Returns a [`TokenError`] if the credentials are invalid or a field is oversized.
pub fn build_rtc_token_with_account(
    app_id: &str,
    app_certificate: &str,
    channel_name: &str,
    account: &str,
    role: RtcRole,
    token_expire: u32,
    privilege_expire: u32,
) -> Result<String, TokenError> {
    rtc_token(
        app_id,
        app_certificate,
        channel_name,
        account,
        role,
        token_expire,
        privilege_expire,
    )
    .build()
}

/// Builds an RTC token granting every privilege with its own expiry.
///
/// # Errors
///
/// Returns a [`TokenError`] if the credentials are invalid or a field is oversized.
pub fn build_rtc_token_with_privileges(
    app_id: &str,
    app_certificate: &str,
    channel_name: &str,
    account: &str,
    token_expire: u32,
    expiry: RtcPrivilegeExpiry,
) -> Result<String, TokenError> {
    let mut service = Service::rtc(channel_name, account);
    service
        .add_privilege(RtcPrivilege::JoinChannel, expiry.join_channel)
        .add_privilege(RtcPrivilege::PublishAudioStream, expiry.publish_audio_stream)
        .add_privilege(RtcPrivilege::PublishVideoStream, expiry.publish_video_stream)
        .add_privilege(RtcPrivilege::PublishDataStream, expiry.publish_data_stream);

    let mut token = AccessToken::new(app_id, app_certificate, token_expire);
    token.add_service(service);
    token.build()
}

/// Builds an RTM login token.
///
/// # Errors
///
/// Returns a [`TokenError`] if the credentials are invalid or a field is oversized.
pub fn build_rtm_token(
    app_id: &str,
    app_certificate: &str,
    user_id: &str,
    expire: u32,
) -> Result<String, TokenError> {
    rtm_token(app_id, app_certificate, user_id, expire).build()
}

/// Builds a Chat token for one user.
///
/// # Errors
///
/// Returns a [`TokenError`] if the credentials are invalid or a field is oversized.
pub fn build_chat_user_token(
    app_id: &str,
    app_certificate: &str,
    user_id: &str,
    expire: u32,
) -> Result<String, TokenError> {
    chat_token(app_id, app_certificate, user_id, ChatPrivilege::User, expire).build()
}

/// Builds a Chat token for the app itself, used by app servers.
///
/// # Errors
///
/// Returns a [`TokenError`] if the credentials are invalid.
pub fn build_chat_app_token(
    app_id: &str,
    app_certificate: &str,
    expire: u32,
) -> Result<String, TokenError> {
    chat_token(app_id, app_certificate, "", ChatPrivilege::App, expire).build()
}

/// Numeric uid carried by `value`, when it is a plain decimal that fits a `u32`.
///
/// Signs, whitespace and other decorations make the value an account instead.
#[must_use]
pub fn parse_uid(value: &str) -> Option<u32> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

fn uid_to_account(uid: u32) -> String {
    if uid == 0 {
        String::new()
    } else {
        uid.to_string()
    }
}

fn rtc_token(
    app_id: &str,
    app_certificate: &str,
    channel_name: &str,
    account: &str,
    role: RtcRole,
    token_expire: u32,
    privilege_expire: u32,
) -> AccessToken {
    let mut service = Service::rtc(channel_name, account);
    service.add_privilege(RtcPrivilege::JoinChannel, privilege_expire);
    if role == RtcRole::Publisher {
        service
            .add_privilege(RtcPrivilege::PublishAudioStream, privilege_expire)
            .add_privilege(RtcPrivilege::PublishVideoStream, privilege_expire)
            .add_privilege(RtcPrivilege::PublishDataStream, privilege_expire);
    }

    let mut token = AccessToken::new(app_id, app_certificate, token_expire);
    token.add_service(service);
    token
}

fn rtm_token(app_id: &str, app_certificate: &str, user_id: &str, expire: u32) -> AccessToken {
    let mut service = Service::rtm(user_id);
    service.add_privilege(RtmPrivilege::Login, expire);

    let mut token = AccessToken::new(app_id, app_certificate, expire);
    token.add_service(service);
    token
}

fn chat_token(
    app_id: &str,
    app_certificate: &str,
    user_id: &str,
    privilege: ChatPrivilege,
    expire: u32,
) -> AccessToken {
    let mut service = Service::chat(user_id);
    service.add_privilege(privilege, expire);

    let mut token = AccessToken::new(app_id, app_certificate, expire);
    token.add_service(service);
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{DecodedToken, ServiceScope, ServiceType};

    const APP_ID: &str = "970CA35de60c44645bbae8a215061b33";
    const APP_CERTIFICATE: &str = "5CFd2fd1755d40ecb72977518be15d3b";
    const CHANNEL: &str = "7d72365eb983485397e3e3f9d460bdda";

    fn signature_of(token: AccessToken) -> String {
        let encoded = token
            .with_issue_ts_and_salt(1_111_111, 1)
            .build()
            .expect("should build token");
        let decoded = DecodedToken::parse(&encoded).expect("should parse token");
        hex::encode(decoded.signature)
    }

    #[test]
    fn role_parsing_defaults_to_subscriber() {
        assert_eq!(RtcRole::from("publisher"), RtcRole::Publisher);
        assert_eq!(RtcRole::from("Publisher"), RtcRole::Publisher);
        assert_eq!(RtcRole::from("subscriber"), RtcRole::Subscriber);
        assert_eq!(RtcRole::from("audience"), RtcRole::Subscriber);
        assert_eq!(RtcRole::from(""), RtcRole::Subscriber);
    }

    #[test]
    fn publisher_signature_matches_reference_vector() {
        let token = rtc_token(
            APP_ID,
            APP_CERTIFICATE,
            CHANNEL,
            "2882341273",
            RtcRole::Publisher,
            600,
            600,
        );

        assert_eq!(
            signature_of(token),
            "c731521be14613488eac3ef393d403a87ea96102529dc5d633e12faabcce540f"
        );
    }

    #[test]
    fn rtm_signature_matches_reference_vector() {
        let token = rtm_token(APP_ID, APP_CERTIFICATE, "test_user", 600);

        assert_eq!(
            signature_of(token),
            "0d9a1df8a4e60649a82d4a68fb1f49581fb4d227b8f0b65773b79f1c89e7eb7c"
        );
    }

    #[test]
    fn chat_signatures_match_reference_vectors() {
        let user = chat_token(
            APP_ID,
            APP_CERTIFICATE,
            "test_user",
            ChatPrivilege::User,
            600,
        );
        let app = chat_token(APP_ID, APP_CERTIFICATE, "", ChatPrivilege::App, 600);

        assert_eq!(
            signature_of(user),
            "4de4c47411c6fefa43a1593f2feae9eae9d62fde36e2cd68add77044bb5f3902"
        );
        assert_eq!(
            signature_of(app),
            "2d6e85c3436f1811bc2c43173bf34eaa047d5e896abd4ef54c654110c0fade50"
        );
    }

    #[test]
    fn subscriber_only_gets_join_privilege() {
        let encoded = build_rtc_token_with_uid(
            APP_ID,
            APP_CERTIFICATE,
            CHANNEL,
            42,
            RtcRole::Subscriber,
            3600,
            1800,
        )
        .expect("should build token");
        let decoded = DecodedToken::parse(&encoded).expect("should parse token");
        let rtc = decoded
            .service(ServiceType::Rtc)
            .expect("should carry rtc service");

        assert_eq!(decoded.expire, 3600);
        assert_eq!(rtc.privilege(RtcPrivilege::JoinChannel), Some(1800));
        assert_eq!(rtc.privilege(RtcPrivilege::PublishAudioStream), None);
        assert_eq!(rtc.privileges().len(), 1);
        assert!(decoded.verify(APP_CERTIFICATE));
    }

    #[test]
    fn uid_zero_is_encoded_as_empty_account() {
        let encoded = build_rtc_token_with_uid(
            APP_ID,
            APP_CERTIFICATE,
            CHANNEL,
            0,
            RtcRole::Publisher,
            600,
            600,
        )
        .expect("should build token");
        let decoded = DecodedToken::parse(&encoded).expect("should parse token");

        assert_eq!(
            decoded.services[0].scope(),
            &ServiceScope::Rtc {
                channel_name: CHANNEL.to_string(),
                uid: String::new()
            }
        );
    }

    #[test]
    fn account_token_keeps_account_string() {
        let encoded = build_rtc_token_with_account(
            APP_ID,
            APP_CERTIFICATE,
            CHANNEL,
            "alice",
            RtcRole::Publisher,
            600,
            600,
        )
        .expect("should build token");
        let decoded = DecodedToken::parse(&encoded).expect("should parse token");
        let rtc = decoded
            .service(ServiceType::Rtc)
            .expect("should carry rtc service");

        assert_eq!(
            rtc.scope(),
            &ServiceScope::Rtc {
                channel_name: CHANNEL.to_string(),
                uid: "alice".to_string()
            }
        );
        assert_eq!(rtc.privileges().len(), 4);
    }

    #[test]
    fn fine_grained_privileges_keep_their_own_expiry() {
        let expiry = RtcPrivilegeExpiry {
            join_channel: 100,
            publish_audio_stream: 200,
            publish_video_stream: 300,
            publish_data_stream: 400,
        };
        let encoded =
            build_rtc_token_with_privileges(APP_ID, APP_CERTIFICATE, CHANNEL, "7", 500, expiry)
                .expect("should build token");
        let decoded = DecodedToken::parse(&encoded).expect("should parse token");
        let rtc = decoded
            .service(ServiceType::Rtc)
            .expect("should carry rtc service");

        assert_eq!(rtc.privilege(RtcPrivilege::JoinChannel), Some(100));
        assert_eq!(rtc.privilege(RtcPrivilege::PublishAudioStream), Some(200));
        assert_eq!(rtc.privilege(RtcPrivilege::PublishVideoStream), Some(300));
        assert_eq!(rtc.privilege(RtcPrivilege::PublishDataStream), Some(400));
    }

    #[test]
    fn uniform_expiry_sets_every_privilege() {
        assert_eq!(
            RtcPrivilegeExpiry::uniform(60),
            RtcPrivilegeExpiry {
                join_channel: 60,
                publish_audio_stream: 60,
                publish_video_stream: 60,
                publish_data_stream: 60,
            }
        );
    }

    #[test]
    fn chat_app_token_has_no_user() {
        let encoded =
            build_chat_app_token(APP_ID, APP_CERTIFICATE, 900).expect("should build token");
        let decoded = DecodedToken::parse(&encoded).expect("should parse token");
        let chat = decoded
            .service(ServiceType::Chat)
            .expect("should carry chat service");

        assert_eq!(
            chat.scope(),
            &ServiceScope::Chat {
                user_id: String::new()
            }
        );
        assert_eq!(chat.privilege(ChatPrivilege::App), Some(900));
        assert_eq!(chat.privilege(ChatPrivilege::User), None);
    }

    #[test]
    fn builders_reject_bad_credentials() {
        assert_eq!(
            build_rtm_token("not-an-app-id", APP_CERTIFICATE, "user", 60),
            Err(TokenError::InvalidCredentials)
        );
        assert_eq!(
            build_chat_user_token(APP_ID, "", "user", 60),
            Err(TokenError::InvalidCredentials)
        );
    }

    #[test]
    fn parse_uid_accepts_only_plain_decimals() {
        assert_eq!(parse_uid("42"), Some(42));
        assert_eq!(parse_uid("0"), Some(0));
        assert_eq!(parse_uid("4294967295"), Some(u32::MAX));

        assert_eq!(parse_uid("4294967296"), None);
        assert_eq!(parse_uid("+42"), None);
        assert_eq!(parse_uid(" 42"), None);
        assert_eq!(parse_uid("42 "), None);
        assert_eq!(parse_uid("-1"), None);
        assert_eq!(parse_uid(""), None);
        assert_eq!(parse_uid("alice"), None);
    }
}
