//! One entity-type pass: read, transform, write, one row at a time.

use serde::Serialize;
use tracing::{debug, info};

use crate::core::traits::RemoteReader;
use crate::core::{EntityType, LocalId, RemoteId, Row};
use crate::error::Result;
use crate::instrument::{Deadline, Stopwatch};
use crate::migrator::MigrationPlan;

use super::context::ImportContext;

/// Lifecycle of a single source row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowState {
    NotStarted,
    Reading,
    Transforming,
    Writing,
    Succeeded,
    Failed,
    Done,
}

impl RowState {
    pub fn can_transition_to(self, next: RowState) -> bool {
        use RowState::*;
        matches!(
            (self, next),
            (NotStarted, Reading)
                | (Reading, Transforming)
                | (Reading, Failed)
                | (Reading, Done)
                | (Transforming, Writing)
                | (Transforming, Failed)
                | (Transforming, Done)
                | (Writing, Succeeded)
                | (Writing, Failed)
                | (Succeeded, Done)
                | (Failed, Done)
        )
    }

    fn advance(&mut self, next: RowState) {
        debug_assert!(
            self.can_transition_to(next),
            "invalid row transition {:?} -> {:?}",
            self,
            next
        );
        *self = next;
    }
}

/// Counters for one pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassStats {
    pub entity: EntityType,
    pub read: u64,
    pub written: u64,
    /// Rows the plan chose not to import.
    pub skipped: u64,
    /// Rows that left a validation error behind, whether the writer of the
    /// row itself or of a record needed to build it rejected it.
    pub invalid: u64,
    /// Rows whose transform or write raised an error.
    pub failed: u64,
    pub timed_out: bool,
    pub duration_seconds: f64,
}

impl PassStats {
    pub fn new(entity: EntityType) -> Self {
        Self {
            entity,
            read: 0,
            written: 0,
            skipped: 0,
            invalid: 0,
            failed: 0,
            timed_out: false,
            duration_seconds: 0.0,
        }
    }
}

enum RowOutcome {
    Written(LocalId),
    Skipped,
    Invalid,
}

/// Import every row of one entity type.
///
/// A failing row is logged, the local connection is reset and the pass
/// moves on; nothing short of the run budget ends a pass early. The budget
/// is checked before each row.
pub async fn run_pass(
    plan: &dyn MigrationPlan,
    entity: EntityType,
    reader: &dyn RemoteReader,
    ctx: &mut ImportContext,
    deadline: &Deadline,
) -> PassStats {
    let watch = Stopwatch::start(entity.as_str());
    let mut stats = PassStats::new(entity);
    info!("Importing {}", entity);
    ctx.debug_line(format!("Importing {}...", entity));

    let mut cursor = match plan.rows(entity, reader).await {
        Ok(cursor) => cursor,
        Err(e) => {
            ctx.record_failure(entity, None, &e).await;
            stats.failed += 1;
            stats.duration_seconds = watch.elapsed_secs();
            return stats;
        }
    };

    loop {
        if deadline.is_expired() {
            ctx.record_timeout(entity, deadline.budget());
            stats.timed_out = true;
            break;
        }

        let mut state = RowState::NotStarted;
        state.advance(RowState::Reading);
        let row = match cursor.next().await {
            None => break,
            Some(Ok(row)) => row,
            Some(Err(e)) => {
                state.advance(RowState::Failed);
                ctx.record_failure(entity, None, &e).await;
                stats.failed += 1;
                break;
            }
        };
        stats.read += 1;

        let remote_id = plan.remote_id(entity, &row);
        ctx.begin_row(entity, remote_id.clone());
        match process_row(plan, entity, &row, remote_id.as_deref(), ctx, &mut state).await {
            Ok(RowOutcome::Written(local_id)) => {
                stats.written += 1;
                debug!("{} #{} -> {}", entity, label(&remote_id), local_id);
                ctx.debug_line(format!(
                    "{} #{} imported as {}",
                    entity,
                    label(&remote_id),
                    local_id
                ));
            }
            Ok(RowOutcome::Skipped) => {
                stats.skipped += 1;
                debug!("{} #{} skipped", entity, label(&remote_id));
            }
            Ok(RowOutcome::Invalid) => stats.invalid += 1,
            Err(e) => {
                state.advance(RowState::Failed);
                ctx.record_failure(entity, remote_id.as_deref(), &e).await;
                stats.failed += 1;
            }
        }
        state.advance(RowState::Done);
        ctx.end_row();
    }

    stats.duration_seconds = watch.elapsed_secs();
    info!(
        "{}: {} read, {} written, {} skipped, {} invalid, {} failed in {}",
        entity, stats.read, stats.written, stats.skipped, stats.invalid, stats.failed, watch
    );
    ctx.debug_line(format!(
        "{}: {} of {} rows imported",
        entity, stats.written, stats.read
    ));
    stats
}

async fn process_row(
    plan: &dyn MigrationPlan,
    entity: EntityType,
    row: &Row,
    remote_id: Option<&str>,
    ctx: &mut ImportContext,
    state: &mut RowState,
) -> Result<RowOutcome> {
    let errors_before = ctx.errors().len();

    state.advance(RowState::Transforming);
    let Some(record) = plan.transform(entity, row, ctx).await? else {
        if ctx.errors().len() > errors_before {
            state.advance(RowState::Failed);
            return Ok(RowOutcome::Invalid);
        }
        return Ok(RowOutcome::Skipped);
    };

    state.advance(RowState::Writing);
    let Some(local_id) = plan.write(entity, row, record, remote_id, ctx).await? else {
        state.advance(RowState::Failed);
        return Ok(if ctx.errors().len() > errors_before {
            RowOutcome::Invalid
        } else {
            RowOutcome::Skipped
        });
    };
    plan.after_write(entity, row, local_id, ctx).await?;
    state.advance(RowState::Succeeded);
    Ok(RowOutcome::Written(local_id))
}

fn label(remote_id: &Option<RemoteId>) -> &str {
    remote_id.as_deref().unwrap_or("-")
}
