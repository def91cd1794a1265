//! Driver smoke tests.
//!
//! Each case runs a transcoding command and verifies its output against a
//! reference: an exact MD5 digest, or a PSNR value the output may not fall
//! more than 5% below.

pub mod case;
pub mod compare;
pub mod runner;

pub use case::{Feature, SmokeCase, SmokeSuite};
pub use compare::{Reference, Verdict};
pub use runner::{CaseResult, SmokeRunner, SmokeSummary};
