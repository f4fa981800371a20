use crate::Result;
use crate::authorizer::Authorizer;
use crate::caveat::Caveat;
use crate::engine::{AuthInfo, CredentialEngine, Decision};
use crate::error::{DischargeRequired, Error};
use crate::macaroon::Macaroon;
use crate::op::ops_for_request;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-request authorization for the resource service.
///
/// Requests without sufficient macaroons get a freshly minted, short-lived
/// macaroon carrying the caveats the authorizer asked for.
#[derive(Clone)]
pub struct DischargeOrchestrator {
    engine: Arc<dyn CredentialEngine>,
    authorizer: Arc<dyn Authorizer>,
    token_validity: Duration,
}

impl DischargeOrchestrator {
    pub fn new(
        engine: Arc<dyn CredentialEngine>,
        authorizer: Arc<dyn Authorizer>,
        token_validity: Duration,
    ) -> Self {
        Self {
            engine,
            authorizer,
            token_validity,
        }
    }

    pub fn authorize(&self, method: &str, path: &str, bundles: &[Vec<Macaroon>]) -> Result<AuthInfo> {
        let ops = ops_for_request(method, path)?;

        let decision = match self.engine.verify(bundles, &ops, self.authorizer.as_ref()) {
            Ok(decision) => decision,
            Err(Error::Forbidden(reason)) => return Err(Error::Forbidden(reason)),
            Err(e) => {
                warn!(error = %e, "verification failed");
                return Err(Error::Forbidden(e.to_string()));
            }
        };

        match decision {
            Decision::Allowed(info) => {
                debug!(%method, %path, identity = ?info.identity, "request authorized");
                Ok(info)
            }
            Decision::DischargeRequired(required) => {
                let mut caveats = required.caveats.clone();
                caveats.push(Caveat::time_before(Utc::now() + self.token_validity));

                let macaroon = self
                    .engine
                    .mint(&required.ops, &caveats)
                    .map_err(|e| Error::Forbidden(e.to_string()))?;

                debug!(%method, %path, caveats = required.caveats.len(), "discharge required");
                Err(Error::DischargeRequired(Box::new(DischargeRequired {
                    macaroon: Some(macaroon),
                    ..required
                })))
            }
        }
    }
}
