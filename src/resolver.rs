use crate::Result;
use crate::caveat::{Caveat, ConditionKind};
use crate::checker::USERNAME_ATTRIBUTE;
use crate::config::UnknownConditionPolicy;
use crate::credentials::CredentialStore;
use crate::error::{Error, Interaction};
use crate::login::{DischargeToken, FORM_TOKEN_KIND};
use crate::session::SessionRegistry;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides whether the identity service discharges a third-party caveat
/// and which restrictions the discharge carries
#[derive(Debug, Clone)]
pub struct ThirdPartyResolver {
    store: Arc<CredentialStore>,
    sessions: Arc<SessionRegistry>,
    form_url: String,
    auth_validity: Duration,
    unknown_conditions: UnknownConditionPolicy,
}

impl ThirdPartyResolver {
    pub fn new(
        store: Arc<CredentialStore>,
        sessions: Arc<SessionRegistry>,
        form_url: impl Into<String>,
        auth_validity: Duration,
    ) -> Self {
        Self {
            store,
            sessions,
            form_url: form_url.into(),
            auth_validity,
            unknown_conditions: UnknownConditionPolicy::default(),
        }
    }

    pub fn with_unknown_conditions(mut self, policy: UnknownConditionPolicy) -> Self {
        self.unknown_conditions = policy;
        self
    }

    /// Resolves `condition` for the user behind `token`.
    ///
    /// Without a token the caller is sent to the login form first.
    pub fn resolve(&self, condition: &str, token: Option<&DischargeToken>) -> Result<Vec<Caveat>> {
        let Some(token) = token else {
            return Err(Error::InteractionRequired(Interaction {
                kind: FORM_TOKEN_KIND.to_string(),
                url: self.form_url.clone(),
            }));
        };

        let username = if token.kind == FORM_TOKEN_KIND {
            self.sessions.resolve(&token.value)
        } else {
            None
        };
        let Some(username) = username else {
            debug!(kind = %token.kind, "discharge token rejected");
            return Err(Error::InvalidToken);
        };

        match ConditionKind::parse(condition)? {
            ConditionKind::IsAuthenticatedUser => Ok(vec![
                Caveat::time_before(Utc::now() + self.auth_validity),
                Caveat::declared(USERNAME_ATTRIBUTE, &username),
            ]),
            ConditionKind::IsMemberOf(groups) => {
                if self.store.user_in_any_group(&username, &groups) {
                    debug!(user = %username, ?groups, "group membership confirmed");
                    Ok(Vec::new())
                } else {
                    debug!(user = %username, ?groups, "user not in required groups");
                    Err(Error::GroupMembership)
                }
            }
            // The discharge expires with the requested deadline
            ConditionKind::TimeBefore(deadline) => Ok(vec![Caveat::time_before(deadline)]),
            ConditionKind::Declared { key, .. } => {
                debug!(user = %username, %key, "refusing to discharge a declaration");
                Err(Error::Forbidden(
                    "declarations cannot be discharged by a third party".to_string(),
                ))
            }
            ConditionKind::Unknown { name, .. } => match self.unknown_conditions {
                UnknownConditionPolicy::Allow => {
                    warn!(
                        %condition,
                        %name,
                        user = %username,
                        "discharging unrecognized condition"
                    );
                    Ok(Vec::new())
                }
                UnknownConditionPolicy::Deny => {
                    Err(Error::Forbidden("caveat not recognized".to_string()))
                }
            },
        }
    }
}
