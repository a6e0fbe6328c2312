//! Expiry/threshold monitoring
//!
//! Turns a point-in-time value (a certificate's `notAfter`) into an ordered
//! [`Severity`] and, at the two strictest levels, attempts best-effort
//! remediation. The computed severity always describes the state observed
//! before remediation ran.

pub mod certificate;
pub mod expiry;
pub mod severity;

pub use certificate::{parse_openssl_enddate, CertificateSource, OpensslCertificateSource};
pub use expiry::{
    classify, evaluate, CommandRemediator, Evaluation, ExpiryCheck, ExpiryMonitor,
    RemediationOutcome, Remediator,
};
pub use severity::Severity;
