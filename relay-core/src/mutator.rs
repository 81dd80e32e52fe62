//! Pure functions backing the cluster record admission webhook. The webhook
//! server itself (TLS listener, `AdmissionReview` decode/patch) lives
//! outside this crate; these are the two handlers it calls into.

use crate::cluster::{default_cluster_token, validate_cluster_token, ClusterRecord};

/// Defaults a cluster record's token in place. A no-op when the token is
/// already set, so applying it more than once changes nothing further.
pub fn mutate(record: &mut ClusterRecord) {
    default_cluster_token(&mut record.token);
}

/// Rejects a cluster record whose token is empty.
pub fn validate(record: &ClusterRecord) -> Result<(), String> {
    validate_cluster_token(&record.token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterKey;

    fn record(token: &str) -> ClusterRecord {
        ClusterRecord {
            key: ClusterKey::new("default", "alpha"),
            token: token.to_string(),
        }
    }

    #[test]
    fn mutate_fills_empty_token() {
        let mut r = record("");
        mutate(&mut r);
        assert!(!r.token.is_empty());
        assert!(validate(&r).is_ok());
    }

    #[test]
    fn mutate_is_idempotent_on_non_empty_token() {
        let mut r = record("preset-token");
        mutate(&mut r);
        assert_eq!(r.token, "preset-token");
        mutate(&mut r);
        assert_eq!(r.token, "preset-token");
    }

    #[test]
    fn validate_rejects_empty_token() {
        let r = record("");
        assert!(validate(&r).is_err());
    }
}
