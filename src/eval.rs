//! Optional external policy-evaluator extension point.
//!
//! The decision engine can consult a general-purpose evaluator as an
//! additional gate between the static route tables and the compliance and
//! ownership branches. Nothing is wired in by default; the gate's verdict
//! logic does not depend on one being present.

/// Judges whether `subject` may perform `action` on `object`.
///
/// `subject` is the caller's raw credential (empty when the header is
/// absent), `object` the normalized request path, `action` the HTTP method.
pub trait AccessEvaluator: Send + Sync {
    fn evaluate(&self, subject: &str, object: &str, action: &str) -> bool;
}

impl<F> AccessEvaluator for F
where
    F: Fn(&str, &str, &str) -> bool + Send + Sync,
{
    fn evaluate(&self, subject: &str, object: &str, action: &str) -> bool {
        self(subject, object, action)
    }
}
