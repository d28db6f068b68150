use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    /// Mixed-case field names some engines hand back folded to lower case
    static ref CANONICAL_FIELD_NAMES: HashMap<String, &'static str> = [
        "emailVerified",
        "createdAt",
        "updatedAt",
        "expiresAt",
        "userId",
        "accountId",
        "providerId",
        "ipAddress",
        "userAgent",
        "accessToken",
        "refreshToken",
        "idToken",
        "accessTokenExpiresAt",
        "refreshTokenExpiresAt",
        "twoFactorEnabled",
        "isAnonymous",
        "banReason",
        "banExpires",
        "impersonatedBy",
        "activeOrganizationId",
    ]
    .into_iter()
    .map(|canonical| (canonical.to_ascii_lowercase(), canonical))
    .collect();
}

/// Canonical spelling for `key`, or `None` when it is already canonical or unknown
pub fn canonical_field_name(key: &str) -> Option<&'static str> {
    CANONICAL_FIELD_NAMES
        .get(key)
        .copied()
        .filter(|canonical| *canonical != key)
}
