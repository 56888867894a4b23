//! Transaction application
//!
//! [`DataTree::apply_transaction`] is the single entry point used by both live
//! processing and log replay. It is deterministic: the same header and body
//! applied to the same tree always produce the same tree and the same
//! [`TxnResult`].

use crate::tree::DataTree;
use keeperlog_core::{
    CreateTxn, OpCode, Outcome, SessionId, Txn, TxnHeader, Zxid,
};
use tracing::debug;

/// Result of applying one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnResult {
    /// Issuing session
    pub client_id: SessionId,
    /// Client sequence number
    pub cxid: i32,
    /// Transaction id
    pub zxid: Zxid,
    /// Op code of the applied body
    pub op: OpCode,
    /// Outcome of the operation; for a multi, the first failing sub-outcome
    pub outcome: Outcome,
    /// Path the operation targeted, if any
    pub path: Option<String>,
    /// Per sub-transaction results of a multi, empty otherwise
    pub multi: Vec<TxnResult>,
}

impl TxnResult {
    fn new(header: &TxnHeader, op: OpCode, outcome: Outcome, path: Option<String>) -> Self {
        TxnResult {
            client_id: header.client_id,
            cxid: header.cxid,
            zxid: header.zxid,
            op,
            outcome,
            path,
            multi: Vec::new(),
        }
    }
}

impl DataTree {
    /// Apply one logged transaction.
    ///
    /// Returns `None` without touching the tree when `header.zxid` is at or
    /// below the watermark. Otherwise the body is applied, the watermark is
    /// raised to `header.zxid`, and the outcome is returned. Transaction-level
    /// failures (`NoNode`, `NodeExists`, ...) are outcomes, not errors.
    pub fn apply_transaction(&mut self, header: &TxnHeader, txn: &Txn) -> Option<TxnResult> {
        if header.zxid <= self.last_processed_zxid {
            debug!(
                zxid = header.zxid,
                watermark = self.last_processed_zxid,
                "Skipping already applied transaction"
            );
            return None;
        }

        let result = self.apply_body(header, txn);
        if !result.outcome.is_ok() {
            debug!(
                zxid = header.zxid,
                op = %result.op,
                path = result.path.as_deref().unwrap_or(""),
                outcome = %result.outcome,
                "Transaction applied with failure outcome"
            );
        }
        self.last_processed_zxid = header.zxid;
        Some(result)
    }

    fn apply_body(&mut self, header: &TxnHeader, txn: &Txn) -> TxnResult {
        let zxid = header.zxid;
        let op = txn.op_code();
        let path = txn.path().map(str::to_string);

        if let Some(p) = path.as_deref() {
            if let Err(e) = keeperlog_core::path::validate(p) {
                debug!(zxid, op = %op, error = %e, "Rejecting transaction with invalid path");
                return TxnResult::new(header, op, Outcome::BadArguments, path);
            }
        }

        let outcome = match txn {
            Txn::Create(create) => self.apply_create(header, create),
            Txn::Delete(delete) => self.delete_node(&delete.path, zxid),
            Txn::SetData(set) => {
                self.set_data(&set.path, set.data.clone(), set.version, zxid, header.time)
            }
            Txn::SetAcl(set) => self.set_acl(&set.path, &set.acl, set.version),
            Txn::Check(check) => {
                if self.node(&check.path).is_some() {
                    Outcome::Ok
                } else {
                    Outcome::NoNode
                }
            }
            Txn::Error(err) => Outcome::from_code(err.err),
            Txn::CreateSession(session) => {
                self.add_session(header.client_id, session.timeout);
                Outcome::Ok
            }
            Txn::CloseSession => {
                self.kill_session(header.client_id, zxid);
                Outcome::Ok
            }
            Txn::Multi(multi) => return self.apply_multi(header, &multi.txns),
        };
        TxnResult::new(header, op, outcome, path)
    }

    fn apply_create(&mut self, header: &TxnHeader, create: &CreateTxn) -> Outcome {
        let owner = if create.ephemeral { header.client_id } else { 0 };
        self.create_node(
            &create.path,
            create.data.clone(),
            &create.acl,
            owner,
            create.parent_cversion,
            header.zxid,
            header.time,
        )
    }

    /// Apply a multi under the top-level zxid.
    ///
    /// An `Error` sub-transaction marks a multi that was rolled back before it
    /// was logged. None of its sub-transactions are applied: those before the
    /// first failure report `Ok`, error entries report their own code, and
    /// everything after reports `RuntimeInconsistency`.
    fn apply_multi(&mut self, header: &TxnHeader, txns: &[Txn]) -> TxnResult {
        let rolled_back = txns.iter().any(|t| matches!(t, Txn::Error(_)));

        let mut subs = Vec::with_capacity(txns.len());
        let mut post_failed = false;
        for sub in txns {
            let sub_header = header.with_op(sub.op_code());
            let result = if rolled_back {
                let outcome = match sub {
                    Txn::Error(err) => Outcome::from_code(err.err),
                    _ if post_failed => Outcome::RuntimeInconsistency,
                    _ => Outcome::Ok,
                };
                TxnResult::new(&sub_header, OpCode::Error, outcome, sub.path().map(str::to_string))
            } else {
                self.apply_body(&sub_header, sub)
            };
            if !result.outcome.is_ok() {
                post_failed = true;
            }
            subs.push(result);
        }

        let outcome = subs
            .iter()
            .map(|r| r.outcome)
            .find(|o| !o.is_ok())
            .unwrap_or(Outcome::Ok);
        let mut result = TxnResult::new(header, OpCode::Multi, outcome, None);
        result.multi = subs;
        result
    }
}
