#![forbid(unsafe_code)]

//! Sequential application of a directive batch.
//!
//! Directives run strictly in submission order against one per-batch
//! [`IdResolver`]. Each directive is one structural unit: an `IMMEDIATE`
//! transaction in isolated mode, a savepoint inside the batch transaction in
//! all-or-nothing mode. A bad directive never stops the batch.

use super::nodes::NodeRepo;
use super::reference::{LayerRepo, PeriodRepo, SourceRepo, TypeRepo};
use super::repo::{ApplyContext, apply_with};
use super::shapes::ShapeRepo;
use super::ways::WayRepo;
use super::{DirectiveOutcome, StoreError};
use crate::BatchMode;
use cm_core::{
    Directive, DirectiveRecord, DirectiveSpec, DirectiveState, EntityId, IdResolver, Normalized,
    Normalizer, ObjectKind, Target,
};
use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info, instrument, warn};

/// Audit records and outcomes, one per submitted directive, in order.
#[derive(Debug, Default)]
pub(crate) struct BatchRun {
    pub records: Vec<DirectiveRecord>,
    pub outcomes: Vec<DirectiveOutcome>,
}

impl BatchRun {
    fn push(&mut self, normalized: Normalized, state: DirectiveState, reasons: Vec<String>) {
        let mut record = normalized.record;
        record.state = Some(state);
        record.reasons.clone_from(&reasons);
        self.outcomes.push(DirectiveOutcome {
            index: normalized.index,
            action: record.directive.action_text().and_then(cm_core::Action::parse),
            object: record.directive.object_text().and_then(ObjectKind::parse),
            object_id: record.object_id_text(),
            state,
            reasons,
        });
        self.records.push(record);
    }

    fn has_rejections(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o.state, DirectiveState::Skipped | DirectiveState::Failed))
    }

    fn roll_back_applied(&mut self) {
        for outcome in &mut self.outcomes {
            if outcome.state == DirectiveState::Applied {
                outcome.state = DirectiveState::RolledBack;
            }
        }
        for record in &mut self.records {
            if record.state == Some(DirectiveState::Applied) {
                record.state = Some(DirectiveState::RolledBack);
            }
        }
    }
}

/// Dispatches one normalized directive to its repository.
fn apply_directive(conn: &Connection, cx: &ApplyContext<'_>, directive: &Directive) -> Result<EntityId, StoreError> {
    let existing = directive.target.existing();
    let (action, payload) = (directive.action, &directive.payload);
    match directive.object {
        ObjectKind::Node => apply_with::<NodeRepo>(conn, cx, action, existing, payload),
        ObjectKind::Way => apply_with::<WayRepo>(conn, cx, action, existing, payload),
        ObjectKind::Shape => apply_with::<ShapeRepo>(conn, cx, action, existing, payload),
        ObjectKind::Layer => apply_with::<LayerRepo>(conn, cx, action, existing, payload),
        ObjectKind::Type => apply_with::<TypeRepo>(conn, cx, action, existing, payload),
        ObjectKind::Period => apply_with::<PeriodRepo>(conn, cx, action, existing, payload),
        ObjectKind::Source => apply_with::<SourceRepo>(conn, cx, action, existing, payload),
    }
}

/// Normalizes and applies `specs` in order. `unit` runs one directive as an
/// atomic structural unit and returns the entity id.
fn process<F>(specs: &[DirectiveSpec], cx: &ApplyContext<'_>, mut unit: F) -> BatchRun
where
    F: FnMut(&ApplyContext<'_>, &Directive) -> Result<EntityId, StoreError>,
{
    let mut resolver = IdResolver::new();
    let mut run = BatchRun::default();
    for (index, spec) in specs.iter().enumerate() {
        let mut normalized = Normalizer::new(&resolver).normalize(index, spec);
        let Some(directive) = normalized.directive.take() else {
            let reasons = normalized.reasons();
            warn!(index, reasons = %reasons.join("; "), "directive skipped");
            run.push(normalized, DirectiveState::Skipped, reasons);
            continue;
        };
        debug!(index, action = %directive.action.as_str(), object = %directive.object, "directive validated");

        match unit(cx, &directive) {
            Ok(id) => {
                if let Target::New(Some(temp)) = directive.target
                    && let Err(err) = resolver.register(temp, id)
                {
                    warn!(index, %err, "temporary id not registered");
                }
                normalized.record.set_object_id(id);
                debug!(index, id, "directive applied");
                run.push(normalized, DirectiveState::Applied, Vec::new());
            }
            Err(err) => {
                let state = if err.is_validation() {
                    DirectiveState::Skipped
                } else {
                    DirectiveState::Failed
                };
                warn!(index, state = state.as_str(), %err, "directive not applied");
                run.push(normalized, state, vec![err.to_string()]);
            }
        }
    }
    run
}

#[instrument(skip(conn, specs, now_ms), fields(directives = specs.len()))]
pub(crate) fn run_batch(
    conn: &mut Connection,
    changeset_id: &str,
    specs: &[DirectiveSpec],
    mode: BatchMode,
    now_ms: i64,
) -> Result<BatchRun, StoreError> {
    let cx = ApplyContext {
        changeset_id: Some(changeset_id),
        now_ms,
    };
    debug!(mode = mode.as_str(), "batch processing");
    let run = match mode {
        BatchMode::Isolated => process(specs, &cx, |cx, directive| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let id = apply_directive(&tx, cx, directive)?;
            tx.commit()?;
            Ok(id)
        }),
        BatchMode::AllOrNothing => {
            let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut run = process(specs, &cx, |cx, directive| {
                let sp = tx.savepoint()?;
                let id = apply_directive(&sp, cx, directive)?;
                sp.commit()?;
                Ok(id)
            });
            if run.has_rejections() {
                tx.rollback()?;
                run.roll_back_applied();
                warn!("batch rolled back");
            } else {
                tx.commit()?;
            }
            run
        }
    };
    let applied = run.outcomes.iter().filter(|o| o.is_applied()).count();
    info!(
        applied,
        total = run.outcomes.len(),
        "batch committed"
    );
    Ok(run)
}

/// Audit-only pass for a resubmitted changeset: nothing is written, temporary
/// references that cannot resolve stay as submitted.
pub(crate) fn record_only(specs: &[DirectiveSpec]) -> BatchRun {
    let resolver = IdResolver::new();
    let normalizer = Normalizer::new(&resolver);
    let mut run = BatchRun::default();
    for (index, spec) in specs.iter().enumerate() {
        let normalized = normalizer.normalize(index, spec);
        let reasons = normalized
            .issues
            .iter()
            .filter(|issue| !issue.is_reference())
            .map(ToString::to_string)
            .collect();
        run.push(normalized, DirectiveState::Recorded, reasons);
    }
    run
}
