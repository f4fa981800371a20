use crate::caveat::Caveat;
use crate::op::Op;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The authenticated principal a verified bundle speaks for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
}

impl Identity {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

/// Decides operations not already granted by a presented macaroon.
///
/// Returning `false` with caveats means "allowed once these are
/// discharged"; `false` without caveats is a plain denial.
pub trait Authorizer: Send + Sync {
    fn decide(&self, identity: Option<&Identity>, op: &Op) -> (bool, Vec<Caveat>);
}

/// Defers anonymous requests to a third party.
///
/// With required groups the third party must check membership of any of
/// them; otherwise it only has to authenticate the user. Group membership
/// is checked once, at discharge time, so a known identity is allowed.
#[derive(Debug, Clone)]
pub struct ThirdPartyAuthorizer {
    location: String,
    required_groups: Vec<String>,
}

impl ThirdPartyAuthorizer {
    pub fn new(location: impl Into<String>, required_groups: Vec<String>) -> Self {
        Self {
            location: location.into(),
            required_groups,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn caveat(&self) -> Caveat {
        if self.required_groups.is_empty() {
            Caveat::third_party(&self.location, crate::caveat::COND_IS_AUTHENTICATED_USER)
        } else {
            Caveat::is_member_of(&self.location, &self.required_groups)
        }
    }
}

impl Authorizer for ThirdPartyAuthorizer {
    fn decide(&self, identity: Option<&Identity>, _op: &Op) -> (bool, Vec<Caveat>) {
        match identity {
            Some(_) => (true, Vec::new()),
            None => (false, vec![self.caveat()]),
        }
    }
}

/// Allows every operation for everyone
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowEveryone;

impl Authorizer for AllowEveryone {
    fn decide(&self, _identity: Option<&Identity>, _op: &Op) -> (bool, Vec<Caveat>) {
        (true, Vec::new())
    }
}

/// A function-based authorizer for custom policies
pub struct FnAuthorizer<F>
where
    F: Fn(Option<&Identity>, &Op) -> (bool, Vec<Caveat>) + Send + Sync,
{
    func: F,
}

impl<F> FnAuthorizer<F>
where
    F: Fn(Option<&Identity>, &Op) -> (bool, Vec<Caveat>) + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Authorizer for FnAuthorizer<F>
where
    F: Fn(Option<&Identity>, &Op) -> (bool, Vec<Caveat>) + Send + Sync,
{
    fn decide(&self, identity: Option<&Identity>, op: &Op) -> (bool, Vec<Caveat>) {
        (self.func)(identity, op)
    }
}
