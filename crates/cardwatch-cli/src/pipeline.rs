//! Reconciliation pipeline: select → evidence → propose → validate → patch → report.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use cardwatch_ai::{validate, ChangeProposer, ParsedResponse, ProposalInput, ProposerError};
use cardwatch_core::{
    select, values_equal, AppliedChangeSet, ChangeProposal, CoveragePool, FieldPath, Record,
    Selection,
};
use cardwatch_search::{EvidenceRetriever, SearchProvider};
use cardwatch_store::RecordStore;
use serde_json::Value;
use tracing::{info, warn};

use crate::report::{summarize, write_report};

/// Inputs for one run, already resolved from config and flags.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub day_index: i64,
    pub active_quota: usize,
    pub total_quota: usize,
    pub proposer_timeout: Duration,
    pub report_path: PathBuf,
    /// Patch in memory only: no card or report is written or removed.
    pub dry_run: bool,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunStats {
    pub selected: usize,
    pub evidence_failures: usize,
    pub proposals: usize,
    pub malformed: usize,
    pub unknown_record: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub stale: usize,
    pub applied: usize,
    pub skipped: usize,
    pub files_written: usize,
    pub elapsed_secs: f64,
}

impl RunStats {
    pub fn log(&self) {
        info!(
            selected = self.selected,
            evidence_failures = self.evidence_failures,
            proposals = self.proposals,
            malformed = self.malformed,
            unknown_record = self.unknown_record,
            accepted = self.accepted,
            rejected = self.rejected,
            stale = self.stale,
            applied = self.applied,
            skipped = self.skipped,
            files_written = self.files_written,
            elapsed_secs = format!("{:.1}", self.elapsed_secs),
            "run complete"
        );
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub stats: RunStats,
    pub report: Option<String>,
}

/// Every card in the store, keyed by id. One unreadable card fails the load.
pub fn load_records(store: &RecordStore) -> anyhow::Result<BTreeMap<String, Record>> {
    let records = store
        .load_all()
        .with_context(|| format!("loading cards from {}", store.dir().display()))?;
    Ok(records.into_iter().map(|r| (r.id.clone(), r)).collect())
}

pub fn coverage_pool(records: &BTreeMap<String, Record>) -> CoveragePool {
    CoveragePool::from_membership(records.values().map(|r| (r.id.clone(), r.is_active())))
}

pub fn selection(records: &BTreeMap<String, Record>, opts: &RunOptions) -> Selection {
    let pool = coverage_pool(records);
    let selection = select(
        &pool.active,
        &pool.inactive,
        opts.day_index,
        opts.active_quota,
        opts.total_quota,
    );
    info!(
        day_index = selection.day_index,
        active_pool = pool.active.len(),
        inactive_pool = pool.inactive.len(),
        chosen = selection.chosen_ids.len(),
        "selected cards"
    );
    selection
}

/// Run the full pipeline against `store`.
///
/// Evidence failures degrade a single card, but a run where every lookup
/// failed aborts before the proposer is called. A proposer failure or timeout
/// also aborts the run before anything is written.
pub async fn run_pipeline<S, P>(
    store: &RecordStore,
    retriever: &EvidenceRetriever<S>,
    proposer: &P,
    opts: &RunOptions,
) -> anyhow::Result<RunOutcome>
where
    S: SearchProvider,
    P: ChangeProposer,
{
    let start = Instant::now();
    let mut stats = RunStats::default();

    // 1. Select today's cards.
    let mut records = load_records(store)?;
    let selection = selection(&records, opts);
    let selected: Vec<Record> = selection
        .chosen_ids
        .iter()
        .filter_map(|id| records.remove(id))
        .collect();
    stats.selected = selected.len();

    if selected.is_empty() {
        info!("nothing selected");
        let report = finish(&[], opts)?;
        stats.elapsed_secs = start.elapsed().as_secs_f64();
        return Ok(RunOutcome { stats, report });
    }

    // 2. Evidence, one throttled lookup per card.
    let retrieval = retriever.fetch_all(&selected).await;
    stats.evidence_failures = retrieval.failures;
    if retrieval.failures == selected.len() {
        anyhow::bail!(
            "all {} evidence lookups failed, aborting run",
            retrieval.failures
        );
    }

    // 3. One batched proposer call.
    let batch: Vec<ProposalInput> = selected
        .iter()
        .zip(retrieval.evidence)
        .map(|(record, evidence)| ProposalInput {
            record_id: record.id.clone(),
            name: record.display_name().to_string(),
            fields: record.fields.clone(),
            evidence,
        })
        .collect();

    let parsed = tokio::time::timeout(opts.proposer_timeout, proposer.propose(&batch))
        .await
        .unwrap_or(Err(ProposerError::Timeout(opts.proposer_timeout.as_secs())))
        .context("change proposer failed, aborting run")?;

    // 4-6. Validate, patch, write.
    let in_scope: BTreeMap<String, Record> =
        selected.into_iter().map(|r| (r.id.clone(), r)).collect();
    let applied = apply_proposals(store, &in_scope, parsed, opts.dry_run, &mut stats)?;

    // 7. Report.
    let report = finish(&applied, opts)?;
    stats.elapsed_secs = start.elapsed().as_secs_f64();
    Ok(RunOutcome { stats, report })
}

/// Validate proposals against `in_scope` cards, patch them and write the
/// dirty ones back. Returns what was applied, grouped per card.
pub fn apply_proposals(
    store: &RecordStore,
    in_scope: &BTreeMap<String, Record>,
    parsed: ParsedResponse,
    dry_run: bool,
    stats: &mut RunStats,
) -> anyhow::Result<Vec<AppliedChangeSet>> {
    stats.proposals += parsed.proposals.len() + parsed.malformed;
    stats.malformed += parsed.malformed;

    let known: Vec<ChangeProposal> = parsed
        .proposals
        .into_iter()
        .filter(|p| {
            let known = in_scope.contains_key(&p.record_id);
            if !known {
                warn!(
                    record_id = %p.record_id,
                    field = %p.field_path,
                    "proposal for a card outside this run, skipping"
                );
                stats.unknown_record += 1;
            }
            known
        })
        .collect();

    let validation = validate(known);
    stats.rejected += validation.rejected.len();
    stats.accepted += validation.accepted_count();
    if validation.is_empty() {
        info!("no proposals survived validation");
        return Ok(Vec::new());
    }

    let mut applied_sets = Vec::new();
    for group in validation.accepted {
        let Some(record) = in_scope.get(&group.record_id) else {
            continue;
        };
        let current: Vec<ChangeProposal> = group
            .changes
            .into_iter()
            .filter(|c| {
                let fresh = matches_current(record, c);
                if !fresh {
                    warn!(
                        record_id = %record.id,
                        field = %c.field_path,
                        old_value = %c.old_value,
                        "proposal's old value does not match the card, skipping"
                    );
                    stats.stale += 1;
                }
                fresh
            })
            .collect();
        if current.is_empty() {
            continue;
        }

        let outcome = cardwatch_store::apply(record, &current);
        stats.skipped += outcome.skipped.len();
        if !outcome.is_dirty() {
            continue;
        }
        stats.applied += outcome.applied.len();

        if dry_run {
            info!(record_id = %record.id, changes = outcome.applied.len(), "dry run, not writing");
        } else {
            store
                .write(&record.id, &outcome.text)
                .with_context(|| format!("writing {}", record.location.display()))?;
            stats.files_written += 1;
            info!(record_id = %record.id, changes = outcome.applied.len(), "card updated");
        }

        applied_sets.push(AppliedChangeSet {
            record_id: record.id.clone(),
            record_name: record.display_name().to_string(),
            changes: outcome.applied,
        });
    }
    Ok(applied_sets)
}

/// The proposer must have been looking at the card as it is on disk now.
fn matches_current(record: &Record, change: &ChangeProposal) -> bool {
    let Some(path) = FieldPath::parse(&change.field_path) else {
        return false;
    };
    let current = record.value_at(&path).unwrap_or(&Value::Null);
    values_equal(current, &change.old_value)
}

/// Render the report and write it, or clear a stale one. Dry runs touch nothing.
pub fn finish(applied: &[AppliedChangeSet], opts: &RunOptions) -> anyhow::Result<Option<String>> {
    let report = summarize(applied);
    if opts.dry_run {
        return Ok(report);
    }
    let written = write_report(&opts.report_path, report.as_deref())
        .with_context(|| format!("updating report {}", opts.report_path.display()))?;
    if written {
        info!(path = %opts.report_path.display(), "report written");
    }
    Ok(report)
}
