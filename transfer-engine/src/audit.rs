//! Integrity audit
//!
//! Read-only batch job over the ledger store. Takes no locks and
//! tolerates snapshot inconsistency from its own multi-query scan of an
//! actively-mutating store: it is detective, never corrective, and a
//! failing report is advisory for operators.

use crate::config::AuditConfig;
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use ledger_core::types::TxType;
use ledger_core::Ledger;
use risk_engine::LimitPolicy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One named check with its outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCheck {
    /// Check name
    pub name: String,

    /// Whether the check passed
    pub passed: bool,

    /// Human-readable detail
    pub detail: String,
}

impl AuditCheck {
    fn pass(name: &str, detail: String) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            detail,
        }
    }

    fn fail(name: &str, detail: String) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            detail,
        }
    }
}

/// Full audit report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    /// When the audit ran
    pub ran_at: DateTime<Utc>,

    /// Individual check results
    pub checks: Vec<AuditCheck>,

    /// True iff every check passed
    pub all_passed: bool,
}

/// Out-of-band verifier of the global ledger invariants
pub struct IntegrityAuditor {
    ledger: Arc<Ledger>,
    policy: LimitPolicy,
    config: AuditConfig,
}

impl std::fmt::Debug for IntegrityAuditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityAuditor").field("config", &self.config).finish_non_exhaustive()
    }
}

impl IntegrityAuditor {
    /// Create an auditor over the given store
    pub fn new(ledger: Arc<Ledger>, policy: LimitPolicy, config: AuditConfig) -> Self {
        Self {
            ledger,
            policy,
            config,
        }
    }

    /// Run every check and assemble the report. Mutates nothing; running
    /// twice against an unchanged store yields identical check results.
    pub fn run(&self) -> Result<AuditReport> {
        let checks = vec![
            self.check_balance_conservation()?,
            self.check_negative_balances()?,
            self.check_transaction_reconciliation()?,
            self.check_orphaned_pending()?,
            self.check_daily_limit_violations()?,
            self.check_dead_letter_backlog()?,
        ];

        let all_passed = checks.iter().all(|c| c.passed);
        for check in &checks {
            if check.passed {
                tracing::info!(check = %check.name, "Audit check passed");
            } else {
                tracing::error!(check = %check.name, detail = %check.detail, "Audit check FAILED");
            }
        }

        Ok(AuditReport {
            ran_at: Utc::now(),
            checks,
            all_passed,
        })
    }

    /// Σ(balance) == total_minted − total_burned, within epsilon
    fn check_balance_conservation(&self) -> Result<AuditCheck> {
        const NAME: &str = "balance_conservation";

        let total = self.ledger.sum_balances()?;
        let expected = self.ledger.total_minted()? - self.ledger.total_burned()?;
        let discrepancy = (total - expected).abs();

        if discrepancy <= self.config.epsilon {
            Ok(AuditCheck::pass(
                NAME,
                format!("sum(balance)={} expected={} discrepancy={}", total, expected, discrepancy),
            ))
        } else {
            Ok(AuditCheck::fail(
                NAME,
                format!("sum(balance)={} expected={} discrepancy={}", total, expected, discrepancy),
            ))
        }
    }

    /// No account balance may be negative
    fn check_negative_balances(&self) -> Result<AuditCheck> {
        const NAME: &str = "no_negative_balances";

        let negative: Vec<String> = self
            .ledger
            .accounts()?
            .into_iter()
            .filter(|a| a.balance < rust_decimal::Decimal::ZERO)
            .map(|a| format!("{}={}", a.address, a.balance))
            .collect();

        if negative.is_empty() {
            Ok(AuditCheck::pass(NAME, "no negative balances".to_string()))
        } else {
            Ok(AuditCheck::fail(
                NAME,
                format!("{} negative balances: {}", negative.len(), negative.join(", ")),
            ))
        }
    }

    /// Recompute before/after fields for a recent window of confirmed
    /// transactions. Genesis mints and burns follow different equations
    /// and are skipped.
    fn check_transaction_reconciliation(&self) -> Result<AuditCheck> {
        const NAME: &str = "transaction_reconciliation";

        let records = self.ledger.recent_transactions(self.config.recent_window)?;
        let mut mismatches = Vec::new();
        let mut checked = 0usize;

        for record in &records {
            if !record.status.is_terminal() || record.confirmed_at.is_none() {
                continue;
            }
            match record.tx_type {
                TxType::Genesis => continue,
                TxType::Burn => {
                    checked += 1;
                    let expected = record.balance_before_from - record.amount;
                    if record.balance_after_from != expected {
                        mismatches.push(record.tx_id.clone());
                    }
                }
                TxType::Transfer | TxType::Reward | TxType::Game => {
                    checked += 1;
                    if !record.reconciles() {
                        mismatches.push(record.tx_id.clone());
                    }
                }
            }
        }

        if mismatches.is_empty() {
            Ok(AuditCheck::pass(NAME, format!("{} transactions reconciled", checked)))
        } else {
            Ok(AuditCheck::fail(
                NAME,
                format!("{} mismatched transactions: {}", mismatches.len(), mismatches.join(", ")),
            ))
        }
    }

    /// Pending transactions older than the orphan threshold are flagged,
    /// never silently resolved.
    fn check_orphaned_pending(&self) -> Result<AuditCheck> {
        const NAME: &str = "orphaned_pending";

        let cutoff = Utc::now() - Duration::hours(self.config.orphan_threshold_hours);
        let orphans = self.ledger.pending_older_than(cutoff)?;

        if orphans.is_empty() {
            Ok(AuditCheck::pass(NAME, "no orphaned pending transactions".to_string()))
        } else {
            let ids: Vec<String> = orphans.iter().map(|t| t.tx_id.clone()).collect();
            Ok(AuditCheck::fail(
                NAME,
                format!("{} pending older than {}h: {}", ids.len(), self.config.orphan_threshold_hours, ids.join(", ")),
            ))
        }
    }

    /// Detective twin of the proactive tracker: flag any persisted daily
    /// record whose counters exceed the configured caps.
    fn check_daily_limit_violations(&self) -> Result<AuditCheck> {
        const NAME: &str = "daily_limit_violations";

        let mut violations = Vec::new();
        for record in self.ledger.daily_limit_records()? {
            if record.game_spent > self.policy.game_daily_cap {
                violations.push(format!("{} {} game_spent={}", record.address, record.date, record.game_spent));
            }
            if record.game_won > self.policy.game_win_daily_cap {
                violations.push(format!("{} {} game_won={}", record.address, record.date, record.game_won));
            }
            if record.transfer_sent > self.policy.transfer_daily_max {
                violations.push(format!("{} {} transfer_sent={}", record.address, record.date, record.transfer_sent));
            }
        }

        if violations.is_empty() {
            Ok(AuditCheck::pass(NAME, "no limit violations".to_string()))
        } else {
            Ok(AuditCheck::fail(
                NAME,
                format!("{} violations: {}", violations.len(), violations.join("; ")),
            ))
        }
    }

    /// Dead letters awaiting manual inspection
    fn check_dead_letter_backlog(&self) -> Result<AuditCheck> {
        const NAME: &str = "dead_letter_backlog";

        let letters = self.ledger.dead_letters()?;
        if letters.is_empty() {
            Ok(AuditCheck::pass(NAME, "dead-letter log empty".to_string()))
        } else {
            Ok(AuditCheck::fail(
                NAME,
                format!("{} dead letters awaiting inspection", letters.len()),
            ))
        }
    }
}
