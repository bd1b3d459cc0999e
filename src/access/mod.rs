//! File access decisions.
//!
//! [`authorize`] is a pure function of the file record, the requester and
//! the caller-supplied clock, so every concurrent request sees the same
//! answer for the same inputs.

mod token;

pub use token::{
    generate_secret, DirectLink, DirectLinkSigner, LinkGrant, DIRECT_LINK_TTL_HOURS,
    DIRECT_LINK_TYPE,
};

use chrono::{DateTime, Utc};

use crate::db::Principal;
use crate::file::FileRecord;

/// Who is asking for a file.
#[derive(Debug, Clone, Default)]
pub struct Requester {
    /// Logged-in identity, if any.
    pub principal: Option<Principal>,
    /// Verified direct-link grant, if the request carried one.
    pub link: Option<LinkGrant>,
}

impl Requester {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn principal(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
            link: None,
        }
    }

    pub fn with_link(mut self, grant: LinkGrant) -> Self {
        self.link = Some(grant);
        self
    }
}

/// Why access was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPath {
    Public,
    Owner,
    Admin,
    DirectLink,
}

/// Why access was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Anonymous,
    NotOwner,
    LinkExpired,
    LinkForOtherFile,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Anonymous => "authentication required",
            DenyReason::NotOwner => "not the owner of this file",
            DenyReason::LinkExpired => "direct link has expired",
            DenyReason::LinkForOtherFile => "direct link is for another file",
        }
    }
}

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow(AccessPath),
    Deny(DenyReason),
    /// The file itself is past its expiry.
    Gone,
}

/// Decide whether `requester` may read `record` at `now`.
///
/// Checked in order: file expiry, public flag, ownership, admin role,
/// direct-link grant.
pub fn authorize(record: &FileRecord, requester: &Requester, now: DateTime<Utc>) -> Access {
    if record.is_expired_at(now) {
        return Access::Gone;
    }
    if record.is_public {
        return Access::Allow(AccessPath::Public);
    }

    if let Some(principal) = &requester.principal {
        if principal.id == record.user_id {
            return Access::Allow(AccessPath::Owner);
        }
        if principal.is_admin() {
            return Access::Allow(AccessPath::Admin);
        }
    }

    match &requester.link {
        Some(grant) if grant.file_id != record.id => Access::Deny(DenyReason::LinkForOtherFile),
        Some(grant) if now >= grant.expires_at => Access::Deny(DenyReason::LinkExpired),
        Some(_) => Access::Allow(AccessPath::DirectLink),
        None if requester.principal.is_some() => Access::Deny(DenyReason::NotOwner),
        None => Access::Deny(DenyReason::Anonymous),
    }
}
