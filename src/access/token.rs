//! Signed direct-download links.
//!
//! A link carries an HS256 JWT `{sub: file_id, exp, iat, typ: "direct_link"}`.
//! Nothing is persisted; a link stays valid until `exp` and is never
//! extended.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{HangarError, Result};

/// Token type marker.
pub const DIRECT_LINK_TYPE: &str = "direct_link";

/// Fixed lifetime of a direct link.
pub const DIRECT_LINK_TTL_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
struct DirectLinkClaims {
    sub: String,
    exp: i64,
    iat: i64,
    typ: String,
}

/// A verified token: signature and type checked, expiry not yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkGrant {
    pub file_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Issued link returned to the owner.
#[derive(Debug, Clone, Serialize)]
pub struct DirectLink {
    pub token: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies direct-link tokens.
#[derive(Clone)]
pub struct DirectLinkSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    base_url: Url,
}

impl DirectLinkSigner {
    /// `base_url` is where `/api/files/{id}/download` is served.
    pub fn new(secret: &str, base_url: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(HangarError::Config("link secret is empty".to_string()));
        }
        let base_url = Url::parse(base_url)
            .map_err(|e| HangarError::Config(format!("invalid base URL: {e}")))?;
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            base_url,
        })
    }

    /// Sign a link for `file_id` valid for 24 hours from `now`.
    pub fn issue(&self, file_id: &str, now: DateTime<Utc>) -> Result<DirectLink> {
        let expires_at = now + Duration::hours(DIRECT_LINK_TTL_HOURS);
        let claims = DirectLinkClaims {
            sub: file_id.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            typ: DIRECT_LINK_TYPE.to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| HangarError::Config(format!("failed to sign link: {e}")))?;
        let url = self.download_url(file_id, &token)?;

        Ok(DirectLink {
            token,
            url,
            // whole seconds, as carried in the token
            expires_at: seconds(claims.exp)?,
        })
    }

    /// Check signature and type. Expiry is left to the access decision.
    ///
    /// A malformed, forged or wrongly typed token yields `Forbidden`.
    pub fn verify(&self, token: &str) -> Result<LinkGrant> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "exp"]);

        let data = decode::<DirectLinkClaims>(token, &self.decoding, &validation)
            .map_err(|e| HangarError::Forbidden(format!("invalid direct link: {e}")))?;
        let claims = data.claims;

        if claims.typ != DIRECT_LINK_TYPE {
            return Err(HangarError::Forbidden(
                "token is not a direct link".to_string(),
            ));
        }

        Ok(LinkGrant {
            file_id: claims.sub,
            expires_at: seconds(claims.exp)
                .map_err(|_| HangarError::Forbidden("invalid link expiry".to_string()))?,
        })
    }

    fn download_url(&self, file_id: &str, token: &str) -> Result<String> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| HangarError::Config("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["api", "files", file_id, "download"]);
        url.query_pairs_mut().append_pair("token", token);
        Ok(url.into())
    }
}

impl std::fmt::Debug for DirectLinkSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectLinkSigner")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

fn seconds(ts: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .ok_or_else(|| HangarError::Validation(format!("timestamp out of range: {ts}")))
}

/// Random secret for deployments that configure none: 32 bytes, hex.
pub fn generate_secret() -> String {
    use rand_core::{OsRng, RngCore};

    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> DirectLinkSigner {
        DirectLinkSigner::new("test-secret", "http://localhost:3000").unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let signer = signer();
        let link = signer.issue("file-1", now()).unwrap();

        assert_eq!(link.expires_at, now() + Duration::hours(24));
        assert!(link
            .url
            .starts_with("http://localhost:3000/api/files/file-1/download?token="));
        assert!(link.url.ends_with(&link.token));

        let grant = signer.verify(&link.token).unwrap();
        assert_eq!(grant.file_id, "file-1");
        assert_eq!(grant.expires_at, link.expires_at);
    }

    #[test]
    fn test_verify_ignores_expiry() {
        let signer = signer();
        let long_ago = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
        let link = signer.issue("file-1", long_ago).unwrap();

        let grant = signer.verify(&link.token).unwrap();
        assert!(grant.expires_at < Utc::now());
    }

    #[test]
    fn test_forged_token_forbidden() {
        let link = signer().issue("file-1", now()).unwrap();
        let other = DirectLinkSigner::new("other-secret", "http://localhost:3000").unwrap();

        assert!(matches!(
            other.verify(&link.token),
            Err(HangarError::Forbidden(_))
        ));
        assert!(matches!(
            signer().verify("not.a.token"),
            Err(HangarError::Forbidden(_))
        ));
    }

    #[test]
    fn test_wrong_type_forbidden() {
        let claims = DirectLinkClaims {
            sub: "file-1".to_string(),
            exp: now().timestamp() + 60,
            iat: now().timestamp(),
            typ: "access".to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(matches!(
            signer().verify(&token),
            Err(HangarError::Forbidden(_))
        ));
    }

    #[test]
    fn test_base_url_with_path() {
        let signer = DirectLinkSigner::new("s", "https://example.com/hangar/").unwrap();
        let link = signer.issue("abc", now()).unwrap();
        assert!(link
            .url
            .starts_with("https://example.com/hangar/api/files/abc/download?token="));
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(DirectLinkSigner::new("", "http://localhost").is_err());
        assert!(DirectLinkSigner::new("s", "not a url").is_err());
    }

    #[test]
    fn test_generate_secret() {
        let a = generate_secret();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, generate_secret());
    }
}
