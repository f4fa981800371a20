use crate::caveat::{COND_DECLARED, ConditionKind};
use crate::error::TokenError;
use crate::macaroon::Macaroon;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Declared attribute naming the authenticated user
pub const USERNAME_ATTRIBUTE: &str = "username";

/// A checker decides whether first-party caveat conditions hold
///
/// Implement this trait to provide custom caveat checking logic.
pub trait Checker {
    /// Checks a single first-party condition
    ///
    /// # Returns
    /// * `Ok(())` if the condition is satisfied
    /// * `Err(TokenError::CaveatViolation)` if it is not
    fn check(&self, condition: &str) -> Result<(), TokenError>;
}

/// A checker that accepts all conditions
///
/// Useful for testing or when you only care about signature verification
pub struct AcceptAll;

impl Checker for AcceptAll {
    fn check(&self, _condition: &str) -> Result<(), TokenError> {
        Ok(())
    }
}

/// A checker that rejects all conditions
pub struct RejectAll;

impl Checker for RejectAll {
    fn check(&self, condition: &str) -> Result<(), TokenError> {
        Err(TokenError::CaveatViolation(condition.to_string()))
    }
}

/// A function-based checker for simple use cases
///
/// # Example
/// ```
/// use macaroon_identity::checker::{Checker, FnChecker};
/// use macaroon_identity::TokenError;
///
/// let checker = FnChecker::new(|condition| {
///     if condition == "declared username alice" {
///         Ok(())
///     } else {
///         Err(TokenError::CaveatViolation("user mismatch".to_string()))
///     }
/// });
///
/// assert!(checker.check("declared username alice").is_ok());
/// assert!(checker.check("declared username bob").is_err());
/// ```
pub struct FnChecker<F>
where
    F: Fn(&str) -> Result<(), TokenError>,
{
    func: F,
}

impl<F> FnChecker<F>
where
    F: Fn(&str) -> Result<(), TokenError>,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Checker for FnChecker<F>
where
    F: Fn(&str) -> Result<(), TokenError>,
{
    fn check(&self, condition: &str) -> Result<(), TokenError> {
        (self.func)(condition)
    }
}

/// Checks the standard first-party conditions against a fixed clock.
///
/// `time-before` holds while `now` is strictly earlier than the deadline.
/// `declared` always holds here; conflicting declarations are caught by
/// [`declared_attributes`]. Anything else is rejected.
#[derive(Debug, Clone, Copy)]
pub struct StandardChecker {
    now: DateTime<Utc>,
}

impl StandardChecker {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Checker evaluating time conditions as of `now`
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

impl Default for StandardChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl Checker for StandardChecker {
    fn check(&self, condition: &str) -> Result<(), TokenError> {
        let kind = ConditionKind::parse(condition)
            .map_err(|e| TokenError::CaveatViolation(e.to_string()))?;

        match kind {
            ConditionKind::TimeBefore(deadline) if self.now < deadline => Ok(()),
            ConditionKind::TimeBefore(_) => Err(TokenError::CaveatViolation(
                "macaroon has expired".to_string(),
            )),
            ConditionKind::Declared { .. } => Ok(()),
            _ => Err(TokenError::CaveatViolation(format!(
                "caveat {condition:?} not satisfied: caveat not recognized"
            ))),
        }
    }
}

/// Collects every `declared key value` condition across a bundle.
///
/// The same key declared with two different values invalidates the bundle.
pub fn declared_attributes(bundle: &[Macaroon]) -> Result<BTreeMap<String, String>, TokenError> {
    let mut declared = BTreeMap::new();

    for condition in bundle.iter().flat_map(Macaroon::first_party_conditions) {
        if !condition.starts_with(COND_DECLARED) {
            continue;
        }
        let Ok(ConditionKind::Declared { key, value }) = ConditionKind::parse(&condition) else {
            continue;
        };
        match declared.get(&key) {
            Some(existing) if existing != &value => {
                return Err(TokenError::CaveatViolation(format!(
                    "conflicting declarations for {key:?}"
                )));
            }
            Some(_) => {}
            None => {
                declared.insert(key, value);
            }
        }
    }

    Ok(declared)
}

/// The user a verified bundle speaks for, if any
pub fn infer_identity(bundle: &[Macaroon]) -> Result<Option<String>, TokenError> {
    Ok(declared_attributes(bundle)?.remove(USERNAME_ATTRIBUTE))
}
