use crate::Result;
use crate::error::Error;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace of the standard conditions understood by every service
pub const STD_NAMESPACE: &str = "std";

pub const COND_IS_AUTHENTICATED_USER: &str = "is-authenticated-user";
pub const COND_IS_MEMBER_OF: &str = "is-member-of";
pub const COND_TIME_BEFORE: &str = "time-before";
pub const COND_DECLARED: &str = "declared";

/// A caveat represents a restriction on the authorization granted by a macaroon.
///
/// Caveats without a location are first-party (checked by whoever verifies
/// the macaroon); caveats with a location must be discharged by the
/// third party found there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caveat {
    /// Location of the third party that must discharge this caveat
    pub location: Option<String>,

    /// Space-delimited `name arg...` condition
    pub condition: String,

    /// Optional namespace prefixed to the condition when encoded
    pub namespace: Option<String>,
}

impl Caveat {
    /// Creates a new first-party caveat
    pub fn first_party(condition: impl Into<String>) -> Self {
        Self {
            location: None,
            condition: condition.into(),
            namespace: None,
        }
    }

    /// Creates a new third-party caveat
    pub fn third_party(location: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            location: Some(location.into()),
            condition: condition.into(),
            namespace: None,
        }
    }

    /// Caveat that expires at `deadline`
    pub fn time_before(deadline: DateTime<Utc>) -> Self {
        Self::first_party(format!(
            "{COND_TIME_BEFORE} {}",
            deadline.to_rfc3339_opts(SecondsFormat::Nanos, true)
        ))
    }

    /// Caveat declaring an attribute (e.g. `username`) of the bearer
    pub fn declared(key: &str, value: &str) -> Self {
        Self::first_party(format!("{COND_DECLARED} {key} {value}"))
    }

    /// Third-party caveat asking `location` to check group membership
    pub fn is_member_of(location: impl Into<String>, groups: &[String]) -> Self {
        Self::third_party(location, format!("{COND_IS_MEMBER_OF} {}", groups.join(" ")))
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Returns true if this is a first-party caveat
    pub fn is_first_party(&self) -> bool {
        self.location.as_deref().is_none_or(str::is_empty)
    }

    /// Returns true if this is a third-party caveat
    pub fn is_third_party(&self) -> bool {
        !self.is_first_party()
    }

    /// The condition as stored inside a macaroon
    pub fn encoded(&self) -> String {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => format!("{ns}:{}", self.condition),
            _ => self.condition.clone(),
        }
    }
}

impl fmt::Display for Caveat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) if !location.is_empty() => {
                write!(f, "{} @ {location}", self.encoded())
            }
            _ => f.write_str(&self.encoded()),
        }
    }
}

/// Splits a condition into its name and argument.
///
/// The argument is everything after the first space and may be empty.
pub fn parse_caveat(condition: &str) -> Result<(&str, &str)> {
    let malformed = |reason: &str| Error::MalformedCaveat {
        condition: condition.to_string(),
        reason: reason.to_string(),
    };

    if condition.trim().is_empty() {
        return Err(malformed("empty caveat"));
    }
    if condition.starts_with(' ') {
        return Err(malformed("caveat starts with space character"));
    }

    Ok(condition.split_once(' ').unwrap_or((condition, "")))
}

/// A parsed condition.
///
/// Unknown conditions are kept as their own variant so that callers decide
/// explicitly what an unrecognized restriction means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionKind {
    IsAuthenticatedUser,
    IsMemberOf(Vec<String>),
    TimeBefore(DateTime<Utc>),
    Declared { key: String, value: String },
    Unknown { name: String, arg: String },
}

impl ConditionKind {
    pub fn parse(condition: &str) -> Result<Self> {
        let malformed = |reason: String| Error::MalformedCaveat {
            condition: condition.to_string(),
            reason,
        };

        let (name, arg) = parse_caveat(condition)?;
        let bare = name
            .strip_prefix(STD_NAMESPACE)
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(name);

        match bare {
            COND_IS_AUTHENTICATED_USER => Ok(ConditionKind::IsAuthenticatedUser),
            COND_IS_MEMBER_OF => {
                let groups: Vec<String> = arg
                    .split(' ')
                    .filter(|g| !g.is_empty())
                    .map(str::to_string)
                    .collect();
                if groups.is_empty() {
                    return Err(malformed("no groups specified".to_string()));
                }
                Ok(ConditionKind::IsMemberOf(groups))
            }
            COND_TIME_BEFORE => DateTime::parse_from_rfc3339(arg.trim())
                .map(|t| ConditionKind::TimeBefore(t.with_timezone(&Utc)))
                .map_err(|e| malformed(format!("invalid deadline: {e}"))),
            COND_DECLARED => match arg.split_once(' ') {
                Some((key, value)) if !key.is_empty() && !value.is_empty() => {
                    Ok(ConditionKind::Declared {
                        key: key.to_string(),
                        value: value.to_string(),
                    })
                }
                _ => Err(malformed("declared caveat needs a key and a value".to_string())),
            },
            _ => Ok(ConditionKind::Unknown {
                name: name.to_string(),
                arg: arg.to_string(),
            }),
        }
    }
}
