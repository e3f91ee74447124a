// src/services/reconcile.rs

use serde::Deserialize;
use sha2::{Digest, Sha256};
use validator::Validate;

use crate::error::AppError;
use crate::models::account::Account;

/// A verified identity claim from the external identity provider.
/// Transport-level token verification happens before this core is
/// reached; the claim is treated as already authenticated.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifiedClaim {
    #[validate(email(message = "Invalid email address."))]
    pub email: String,
    #[validate(length(min = 1, max = 255))]
    pub external_subject: String,
    #[validate(length(max = 100))]
    pub display_name: Option<String>,
}

/// What the reconciler decided to do with a claim. Executing the action
/// (and racing other executions) is the storage layer's problem; the
/// decision itself is a pure function of the claim and the two lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// The subject is already bound to this account.
    Login { account_id: i64 },
    /// A locally-registered account shares the email and has no bound
    /// subject: bind the subject and rewrite the username to a stable
    /// subject-derived form. One-time, idempotent merge.
    BindEmailMatch { account_id: i64, username: String },
    /// Nothing matches: create a pending account for the subject.
    CreateAccount { username: String },
}

/// Stable username derived from the external subject.
pub fn derived_username(subject: &str) -> String {
    let digest = Sha256::digest(subject.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("fed_{}", &hex[..16])
}

/// Resolves a verified claim against the accounts matched by subject
/// and by email.
///
/// Branch order follows the reconciliation algorithm: subject match
/// wins, then email merge, then account creation. An email match whose
/// account is already bound to a different subject is a conflict, never
/// a silent rebind.
pub fn decide(
    claim: &VerifiedClaim,
    by_subject: Option<&Account>,
    by_email: Option<&Account>,
) -> Result<ReconcileAction, AppError> {
    if let Some(account) = by_subject {
        return Ok(ReconcileAction::Login {
            account_id: account.id,
        });
    }

    if let Some(account) = by_email {
        return match account.external_subject.as_deref() {
            None => Ok(ReconcileAction::BindEmailMatch {
                account_id: account.id,
                username: derived_username(&claim.external_subject),
            }),
            Some(bound) if bound == claim.external_subject => Ok(ReconcileAction::Login {
                account_id: account.id,
            }),
            Some(_) => Err(AppError::ConflictingSubject(
                "Email is already linked to a different federated identity".to_string(),
            )),
        };
    }

    Ok(ReconcileAction::CreateAccount {
        username: derived_username(&claim.external_subject),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(email: &str, subject: &str) -> VerifiedClaim {
        VerifiedClaim {
            email: email.to_string(),
            external_subject: subject.to_string(),
            display_name: None,
        }
    }

    fn account(id: i64, email: &str, subject: Option<&str>) -> Account {
        Account {
            id,
            username: format!("user{}", id),
            password: Some("hash".to_string()),
            email: Some(email.to_string()),
            external_subject: subject.map(|s| s.to_string()),
            display_name: None,
            role: "student".to_string(),
            is_verified: false,
            verified_at: None,
            profile_complete: true,
            created_at: None,
        }
    }

    #[test]
    fn subject_match_wins() {
        let c = claim("a@x.com", "sub1");
        let bound = account(1, "other@x.com", Some("sub1"));
        let action = decide(&c, Some(&bound), None).unwrap();
        assert_eq!(action, ReconcileAction::Login { account_id: 1 });
    }

    #[test]
    fn email_match_without_subject_binds() {
        let c = claim("a@x.com", "sub1");
        let local = account(2, "a@x.com", None);
        let action = decide(&c, None, Some(&local)).unwrap();
        assert_eq!(
            action,
            ReconcileAction::BindEmailMatch {
                account_id: 2,
                username: derived_username("sub1"),
            }
        );
    }

    #[test]
    fn email_match_with_same_subject_is_a_login() {
        // the merge already happened; reconciling again is idempotent
        let c = claim("a@x.com", "sub1");
        let merged = account(2, "a@x.com", Some("sub1"));
        let action = decide(&c, None, Some(&merged)).unwrap();
        assert_eq!(action, ReconcileAction::Login { account_id: 2 });
    }

    #[test]
    fn email_match_with_other_subject_conflicts() {
        let c = claim("a@x.com", "sub2");
        let taken = account(2, "a@x.com", Some("sub1"));
        let result = decide(&c, None, Some(&taken));
        assert!(matches!(result, Err(AppError::ConflictingSubject(_))));
    }

    #[test]
    fn no_match_creates_a_pending_account() {
        let c = claim("new@x.com", "sub9");
        let action = decide(&c, None, None).unwrap();
        assert_eq!(
            action,
            ReconcileAction::CreateAccount {
                username: derived_username("sub9"),
            }
        );
    }

    #[test]
    fn derived_username_is_stable_and_distinct() {
        assert_eq!(derived_username("sub1"), derived_username("sub1"));
        assert_ne!(derived_username("sub1"), derived_username("sub2"));
        assert!(derived_username("sub1").starts_with("fed_"));
        assert_eq!(derived_username("sub1").len(), 20);
    }

    #[test]
    fn deciding_twice_gives_the_same_action() {
        let c = claim("a@x.com", "sub1");
        let local = account(2, "a@x.com", None);
        let first = decide(&c, None, Some(&local)).unwrap();
        let second = decide(&c, None, Some(&local)).unwrap();
        assert_eq!(first, second);
    }
}
