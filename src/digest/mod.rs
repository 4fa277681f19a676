// Regression digest: from detector output to a deduplicated email body
//
// Stages, in pipeline order:
// - summarize: flatten the nested detector batch into ChangeRecords, resolving
//   commit provenance once per run date
// - classify/select: keep changes in the degrading direction whose magnitude
//   is strictly above the threshold (or every regression in legacy mode)
// - reconcile: drop changes reported twice in one batch, then anything the
//   ledger already holds; order the rest by ChangeKey
// - compose: insert the new sentences into the email template
//
// Nothing here performs network I/O. The ledger is the only file touched.

mod classify;
mod compose;
mod error;
mod ledger;
mod record;
mod summarize;

pub use classify::{classify, classify_kind, is_significant, select, ChangeClass, SelectionMode};
pub use compose::{default_template, DigestComposer, TEMPLATE_MARKER};
pub use error::{DigestError, Result};
pub use ledger::{reconcile, LedgerEntry, NotificationLedger, Reconciliation};
pub use record::{ChangeKey, ChangeRecord, RenderLabels, RunTimestamp};
pub use summarize::{summarize, RejectedChange, Summary};

#[cfg(test)]
mod tests;
