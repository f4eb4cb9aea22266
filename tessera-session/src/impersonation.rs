//! Inbound impersonation
//!
//! Only the designated [`ImpersonationAuthority`] may swap the credentials of
//! an existing session. It proves this with an [`ImpersonationToken`], which
//! cannot be constructed outside this module.

use crate::properties::IMPERSONATION_TARGET;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use tessera_core::{ErrorContext, TesseraError, TesseraResult, UserCredentials};
use tracing::info;
use uuid::Uuid;

/// Wildcard matching any principal
pub const ANY_PRINCIPAL: &str = "*";

/// Identifies one impersonation authority instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuthorityId(Uuid);

/// Capability proving the caller is a given impersonation authority
#[derive(Debug)]
pub struct ImpersonationToken {
    authority: AuthorityId,
}

impl ImpersonationToken {
    pub fn authority(&self) -> AuthorityId {
        self.authority
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principals {
    #[serde(default)]
    pub users: Vec<String>,
}

impl Principals {
    fn matches(&self, user: &str) -> bool {
        self.users
            .iter()
            .any(|candidate| candidate == ANY_PRINCIPAL || candidate == user)
    }
}

/// `proxy_principals` may impersonate `target_principals`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpersonationPolicy {
    pub proxy_principals: Principals,
    pub target_principals: Principals,
}

pub struct ImpersonationAuthority {
    token: ImpersonationToken,
    policies: Vec<ImpersonationPolicy>,
}

impl ImpersonationAuthority {
    pub fn new(policies: Vec<ImpersonationPolicy>) -> Self {
        Self {
            token: ImpersonationToken {
                authority: AuthorityId(Uuid::new_v4()),
            },
            policies,
        }
    }

    /// Parse policies from their JSON form:
    /// `[{"proxy_principals": {"users": [..]}, "target_principals": {"users": [..]}}]`
    pub fn from_json(policies: &str) -> TesseraResult<Self> {
        let policies: Vec<ImpersonationPolicy> = serde_json::from_str(policies)?;
        Ok(Self::new(policies))
    }

    pub fn id(&self) -> AuthorityId {
        self.token.authority
    }

    pub fn token(&self) -> &ImpersonationToken {
        &self.token
    }

    pub fn can_impersonate(&self, proxy_user: &str, target_user: &str) -> bool {
        self.policies.iter().any(|policy| {
            policy.proxy_principals.matches(proxy_user)
                && policy.target_principals.matches(target_user)
        })
    }

    /// Switch `session` to the user named by its `impersonation_target`
    /// property, if the current principal is allowed to.
    ///
    /// No-op when the property is unset.
    pub fn replace_session_user(&self, session: &Session) -> TesseraResult<()> {
        let target = match session.target_user_name() {
            Some(target) if !target.is_empty() => target,
            _ => return Ok(()),
        };

        let proxy = session.credentials().user_name;
        if !self.can_impersonate(&proxy, &target) {
            return Err(TesseraError::UnauthorizedOperation {
                message: format!("{} is not authorized to impersonate {}", proxy, target),
                context: ErrorContext::new("impersonation")
                    .with_operation("replace_session_user")
                    .with_metadata("property", IMPERSONATION_TARGET),
            });
        }

        session.replace_credentials(&self.token, UserCredentials::new(&target))?;
        info!(proxy = %proxy, target = %target, session_id = %session.id(), "Session user impersonated");
        Ok(())
    }
}
