//! Temporal validation of response and assertion timestamps.

use crate::config::BindingConfig;
use crate::error::ResponseError;
use crate::model::Response;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// Validates response and assertion issue instants plus assertion
/// notBefore/notOnOrAfter windows against the current time, with a
/// symmetric clock-skew tolerance.
///
/// Validation is fail-fast: the first violation is returned and carries the
/// full offending response. When disabled, [`verify`](Self::verify) returns
/// success without running any check.
#[derive(Debug, Clone)]
pub struct TimeConditionValidator {
    clock_skew: Duration,
    enabled: bool,
}

impl TimeConditionValidator {
    /// Create a validator with an explicit skew tolerance.
    pub fn new(clock_skew: Duration, enabled: bool) -> Self {
        Self {
            clock_skew,
            enabled,
        }
    }

    /// Create a validator from a binding configuration.
    pub fn from_config(config: &BindingConfig) -> Self {
        Self::new(config.clock_skew(), config.verify_time_conditions)
    }

    /// Verify all time conditions in `response` against `now`.
    pub fn verify(&self, response: &Response, now: DateTime<Utc>) -> Result<(), ResponseError> {
        if !self.enabled {
            debug!("skipping verification of response time conditions");
            return Ok(());
        }

        let upper_bound = now + self.clock_skew;
        let lower_bound = now - self.clock_skew;

        if response.issue_instant > upper_bound {
            return Err(ResponseError::ResponseIssueInstantInvalid {
                issue_instant: response.issue_instant,
                skewed_now: upper_bound,
                response: Box::new(response.clone()),
            });
        }

        for assertion in &response.assertions {
            let issue_instant = match assertion.issue_instant {
                Some(instant) => instant,
                None => {
                    return Err(ResponseError::AssertionIssueInstantInvalid {
                        issue_instant: None,
                        skewed_now: upper_bound,
                        response: Box::new(response.clone()),
                    });
                }
            };

            if upper_bound < issue_instant {
                return Err(ResponseError::AssertionIssueInstantInvalid {
                    issue_instant: Some(issue_instant),
                    skewed_now: upper_bound,
                    response: Box::new(response.clone()),
                });
            }

            if let Some(conditions) = &assertion.conditions {
                if let Some(not_before) = conditions.not_before {
                    if upper_bound < not_before {
                        return Err(ResponseError::AssertionConditionNotBeforeInvalid {
                            not_before,
                            skewed_now: upper_bound,
                            response: Box::new(response.clone()),
                        });
                    }
                }

                if let Some(not_on_or_after) = conditions.not_on_or_after {
                    if lower_bound >= not_on_or_after {
                        return Err(ResponseError::AssertionConditionNotOnOrAfterInvalid {
                            not_on_or_after,
                            skewed_now: lower_bound,
                            response: Box::new(response.clone()),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}
