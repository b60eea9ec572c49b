//! Authorize-flow session data model.
//!
//! A [`SessionData`] binds the original authorization request
//! ([`OAuthParameters`]) to the outcome of the authentication step
//! ([`Authentication`]). It is created when the authorization endpoint is hit
//! and destroyed when the final response is issued or the session expires.
//!
//! # Lifecycle
//!
//! 1. Session created with only the request parameters
//! 2. User authenticates (authentication attached exactly once)
//! 3. User provides consent
//! 4. Code or token is issued and the session is consumed

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Scopes defined by OpenID Connect Core rather than by a resource server.
pub const STANDARD_SCOPES: &[&str] = &[
    "openid",
    "profile",
    "email",
    "address",
    "phone",
    "offline_access",
];

// =============================================================================
// Response Type
// =============================================================================

/// OAuth 2.0 / OIDC response type.
///
/// A non-empty combination of `code`, `token` and `id_token`. The order of the
/// space-separated components is not significant, so `"id_token code"` and
/// `"code id_token"` compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResponseType {
    code: bool,
    token: bool,
    id_token: bool,
}

/// A single component of a [`ResponseType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseTypeComponent {
    Code,
    Token,
    IdToken,
}

impl ResponseType {
    /// The plain authorization code flow.
    pub const CODE: Self = Self {
        code: true,
        token: false,
        id_token: false,
    };

    /// Returns `true` if the response type includes the given component.
    #[must_use]
    pub fn contains(&self, component: ResponseTypeComponent) -> bool {
        match component {
            ResponseTypeComponent::Code => self.code,
            ResponseTypeComponent::Token => self.token,
            ResponseTypeComponent::IdToken => self.id_token,
        }
    }

    /// Returns `true` for the OIDC hybrid flow (`code` plus a front-channel token).
    #[must_use]
    pub fn is_hybrid(&self) -> bool {
        self.code && (self.token || self.id_token)
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [
            (self.code, "code"),
            (self.token, "token"),
            (self.id_token, "id_token"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect();
        f.write_str(&parts.join(" "))
    }
}

/// Error returned when a response type string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseTypeError {
    #[error("response_type is empty")]
    Empty,

    #[error("Unknown response_type component: {0}")]
    Unknown(String),
}

impl FromStr for ResponseType {
    type Err = ResponseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut response_type = Self {
            code: false,
            token: false,
            id_token: false,
        };
        let mut any = false;
        for part in s.split_whitespace() {
            match part {
                "code" => response_type.code = true,
                "token" => response_type.token = true,
                "id_token" => response_type.id_token = true,
                other => return Err(ResponseTypeError::Unknown(other.to_string())),
            }
            any = true;
        }
        if !any {
            return Err(ResponseTypeError::Empty);
        }
        Ok(response_type)
    }
}

impl TryFrom<String> for ResponseType {
    type Error = ResponseTypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResponseType> for String {
    fn from(value: ResponseType) -> Self {
        value.to_string()
    }
}

// =============================================================================
// PKCE
// =============================================================================

/// PKCE code challenge method (RFC 7636).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PkceChallengeMethod {
    /// SHA-256 of the verifier, base64url encoded.
    S256,
    /// The verifier itself.
    #[serde(rename = "plain")]
    Plain,
}

impl PkceChallengeMethod {
    /// Returns the method as it appears in `code_challenge_method`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
            Self::Plain => "plain",
        }
    }
}

/// PKCE challenge captured from the authorization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PkceChallenge {
    /// The `code_challenge` value.
    pub challenge: String,

    /// The `code_challenge_method` value.
    pub method: PkceChallengeMethod,
}

// =============================================================================
// OAuth Parameters
// =============================================================================

/// Parameters of the original authorization request.
///
/// Parsed and validated upstream. Once stored in a session they are never
/// replaced, so later legs (for example the token exchange) can check the
/// redirect URI and PKCE challenge against what the client first sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthParameters {
    /// Client identifier issued during registration.
    pub client_id: String,

    /// Redirect URI where the final response will be sent.
    pub redirect_uri: String,

    /// Requested response type.
    pub response_type: ResponseType,

    /// Requested scopes.
    #[serde(default)]
    pub scopes: BTreeSet<String>,

    /// Client-supplied state, echoed back on the final redirect.
    #[serde(default)]
    pub state: String,

    /// OpenID Connect nonce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// PKCE challenge, when the client sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkce: Option<PkceChallenge>,

    /// Resource indicator (RFC 8707).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl OAuthParameters {
    /// Creates parameters for a `code` request with no scopes or state.
    #[must_use]
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            response_type: ResponseType::CODE,
            scopes: BTreeSet::new(),
            state: String::new(),
            nonce: None,
            pkce: None,
            resource: None,
        }
    }

    /// Sets the requested scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the response type.
    #[must_use]
    pub fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Sets the state parameter.
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    /// Sets the OIDC nonce.
    #[must_use]
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Sets the PKCE challenge.
    #[must_use]
    pub fn with_pkce(mut self, challenge: impl Into<String>, method: PkceChallengeMethod) -> Self {
        self.pkce = Some(PkceChallenge {
            challenge: challenge.into(),
            method,
        });
        self
    }

    /// Sets the resource indicator.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Returns `true` if this is an OpenID Connect request.
    #[must_use]
    pub fn is_openid(&self) -> bool {
        self.scopes.contains("openid")
    }

    /// Returns the requested OIDC standard scopes.
    pub fn standard_scopes(&self) -> impl Iterator<Item = &str> {
        self.scopes
            .iter()
            .map(String::as_str)
            .filter(|s| STANDARD_SCOPES.contains(s))
    }

    /// Returns the requested scopes that are not OIDC standard scopes.
    pub fn permission_scopes(&self) -> impl Iterator<Item = &str> {
        self.scopes
            .iter()
            .map(String::as_str)
            .filter(|s| !STANDARD_SCOPES.contains(s))
    }
}

// =============================================================================
// Authenticated User
// =============================================================================

/// Outcome of the authentication leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    /// Subject identifier.
    pub subject: String,

    /// Authentication context class reference (`acr`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acr: Option<String>,

    /// Authentication method references (`amr`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amr: Vec<String>,

    /// User type, when the identity store distinguishes several.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,

    /// Organization unit the user belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_unit: Option<String>,

    /// User attributes released by the authentication subsystem.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl AuthenticatedUser {
    /// Creates a user with only a subject identifier.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            acr: None,
            amr: Vec::new(),
            user_type: None,
            organization_unit: None,
            attributes: HashMap::new(),
        }
    }

    /// Sets the authentication context class reference.
    #[must_use]
    pub fn with_acr(mut self, acr: impl Into<String>) -> Self {
        self.acr = Some(acr.into());
        self
    }

    /// Appends an authentication method reference.
    #[must_use]
    pub fn with_amr(mut self, method: impl Into<String>) -> Self {
        self.amr.push(method.into());
        self
    }

    /// Sets a single attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

/// An authenticated user together with the instant authentication succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authentication {
    /// The authenticated user.
    pub user: AuthenticatedUser,

    /// When authentication succeeded (`auth_time` claim).
    #[serde(with = "time::serde::rfc3339")]
    pub auth_time: OffsetDateTime,
}

// =============================================================================
// Session Data
// =============================================================================

/// State of one in-progress authorization flow.
///
/// The user and the auth time live in a single optional [`Authentication`],
/// so a session is either unauthenticated or carries both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    oauth_parameters: OAuthParameters,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    authentication: Option<Authentication>,
}

impl SessionData {
    /// Creates an unauthenticated session for an authorization request.
    #[must_use]
    pub fn new(oauth_parameters: OAuthParameters) -> Self {
        Self {
            oauth_parameters,
            authentication: None,
        }
    }

    /// Returns the original authorization request parameters.
    #[must_use]
    pub fn oauth_parameters(&self) -> &OAuthParameters {
        &self.oauth_parameters
    }

    /// Returns the authentication outcome, if any.
    #[must_use]
    pub fn authentication(&self) -> Option<&Authentication> {
        self.authentication.as_ref()
    }

    /// Returns the authenticated user, if any.
    #[must_use]
    pub fn authenticated_user(&self) -> Option<&AuthenticatedUser> {
        self.authentication.as_ref().map(|a| &a.user)
    }

    /// Returns when authentication succeeded, if it has.
    #[must_use]
    pub fn auth_time(&self) -> Option<OffsetDateTime> {
        self.authentication.as_ref().map(|a| a.auth_time)
    }

    /// Checks if the user has authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authentication.is_some()
    }

    /// Attaches the authentication outcome.
    ///
    /// Returns `false` and leaves the session untouched if it is already
    /// authenticated.
    pub fn attach(&mut self, authentication: Authentication) -> bool {
        if self.authentication.is_some() {
            return false;
        }
        self.authentication = Some(authentication);
        true
    }
}

/// A session as held by a backend, with its fixed lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// The session state.
    pub data: SessionData,

    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the session stops being visible.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl SessionRecord {
    /// Creates a record that expires `ttl` after `now`.
    ///
    /// Returns `None` if the deadline is not representable.
    #[must_use]
    pub fn new(data: SessionData, now: OffsetDateTime, ttl: time::Duration) -> Option<Self> {
        Some(Self {
            data,
            created_at: now,
            expires_at: now.checked_add(ttl)?,
        })
    }

    /// Checks if the session has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}
