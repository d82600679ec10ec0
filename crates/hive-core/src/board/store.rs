//! Board membership and the legal transitions between boards.
//!
//! Design:
//! - Each board is one `RecordStore` document; a task id must be on
//!   exactly one board at every instant a reader can observe.
//! - There is no cross-document transaction on a filesystem, so every
//!   move writes the destination board first and removes from the source
//!   second. A crash between the two leaves a duplicate, never a lost
//!   task; `reconcile` repairs duplicates deterministically.
//! - The Working board is the arbiter for claims: whoever inserts the id
//!   there first, under the Working lock, owns the task. Competing
//!   claimers see the insertion and report a lost race.
//! - ロックのネストはしない。各フェーズは自分のロックだけを持つ。

use std::sync::Arc;

use tracing::{debug, warn};

use super::{Board, BoardDoc, Repair};
use crate::config::CoreConfig;
use crate::domain::{
    AgentId, CompletionOutcome, CoreError, DomainEvent, TaskId, TaskRecord, TaskStatus,
    WorkingUpdate,
};
use crate::ports::{Clock, EventSink, emit};
use crate::store::{RecordStore, run_blocking};

#[derive(Clone)]
pub struct TaskBoardStore {
    ready: RecordStore<BoardDoc>,
    working: RecordStore<BoardDoc>,
    completed: RecordStore<BoardDoc>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
}

impl TaskBoardStore {
    pub fn open(config: &CoreConfig, clock: Arc<dyn Clock>, events: Arc<dyn EventSink>) -> Self {
        let dir = config.boards_dir();
        Self {
            ready: RecordStore::open(&dir, Board::Ready.file_stem(), config.lock_timeout),
            working: RecordStore::open(&dir, Board::Working.file_stem(), config.lock_timeout),
            completed: RecordStore::open(&dir, Board::Completed.file_stem(), config.lock_timeout),
            clock,
            events,
        }
    }

    fn store_for(&self, board: Board) -> &RecordStore<BoardDoc> {
        match board {
            Board::Ready => &self.ready,
            Board::Working => &self.working,
            Board::Completed => &self.completed,
        }
    }

    /// Insert a new task into Ready. The id must not exist on any board.
    pub async fn enqueue(&self, task: TaskRecord) -> Result<TaskRecord, CoreError> {
        let store = self.clone();
        let stored = run_blocking(move || store.enqueue_blocking(task)).await?;
        emit(
            self.events.as_ref(),
            &DomainEvent::TaskEnqueued {
                task: stored.clone(),
            },
        )
        .await;
        Ok(stored)
    }

    /// Unordered snapshot of one board; the caller sorts.
    pub async fn list(
        &self,
        board: Board,
        status_filter: Option<TaskStatus>,
    ) -> Result<Vec<TaskRecord>, CoreError> {
        let store = self.clone();
        run_blocking(move || {
            let doc = store.store_for(board).load()?;
            Ok(doc
                .tasks
                .into_values()
                .filter(|task| status_filter.is_none_or(|status| task.status == status))
                .collect())
        })
        .await
    }

    /// Which board currently holds this id, if any.
    pub async fn find_board(&self, task_id: &TaskId) -> Result<Option<Board>, CoreError> {
        let store = self.clone();
        let task_id = task_id.clone();
        run_blocking(move || {
            for board in [Board::Ready, Board::Working, Board::Completed] {
                if store.store_for(board).load()?.tasks.contains_key(&task_id) {
                    return Ok(Some(board));
                }
            }
            Ok(None)
        })
        .await
    }

    /// Atomic claim: Ready -> Working, owned by `agent_id`.
    ///
    /// Returns false when the task is no longer claimable: missing, not
    /// PENDING, or lost to a competing claimer.
    pub async fn claim(&self, task_id: &TaskId, agent_id: &AgentId) -> Result<bool, CoreError> {
        Ok(self.claim_record(task_id, agent_id).await?.is_some())
    }

    /// Claim, returning the claimed record for the caller that needs it.
    pub async fn claim_record(
        &self,
        task_id: &TaskId,
        agent_id: &AgentId,
    ) -> Result<Option<TaskRecord>, CoreError> {
        let store = self.clone();
        let id = task_id.clone();
        let agent = agent_id.clone();
        let claimed = run_blocking(move || store.claim_blocking(&id, &agent)).await?;
        if let Some(task) = &claimed {
            emit(
                self.events.as_ref(),
                &DomainEvent::TaskClaimed { task: task.clone() },
            )
            .await;
        }
        Ok(claimed)
    }

    /// Partial update of a task on the Working board.
    pub async fn update_working(
        &self,
        task_id: &TaskId,
        update: WorkingUpdate,
    ) -> Result<TaskRecord, CoreError> {
        let store = self.clone();
        let id = task_id.clone();
        run_blocking(move || store.update_working_blocking(&id, update)).await
    }

    /// Atomic Working -> Completed, the terminal counterpart to `claim`.
    pub async fn move_to_completed(
        &self,
        task_id: &TaskId,
        outcome: CompletionOutcome,
    ) -> Result<bool, CoreError> {
        let store = self.clone();
        let id = task_id.clone();
        let finished = run_blocking(move || store.complete_blocking(&id, outcome)).await?;
        if let Some(task) = finished {
            emit(self.events.as_ref(), &DomainEvent::TaskCompleted { task }).await;
            return Ok(true);
        }
        Ok(false)
    }

    /// Atomic Working -> Ready: ownership cleared, status back to PENDING,
    /// reason appended to the audit trail.
    pub async fn release_to_ready(
        &self,
        task_id: &TaskId,
        reason: &str,
    ) -> Result<bool, CoreError> {
        let store = self.clone();
        let id = task_id.clone();
        let reason_owned = reason.to_string();
        let released = run_blocking(move || store.release_blocking(&id, &reason_owned)).await?;
        if let Some(task) = released {
            emit(
                self.events.as_ref(),
                &DomainEvent::TaskReleased {
                    task,
                    reason: reason.to_string(),
                },
            )
            .await;
            return Ok(true);
        }
        Ok(false)
    }

    /// Explicit cancellation of any non-terminal task, from Ready or
    /// Working, onto Completed with status CANCELLED.
    pub async fn cancel(&self, task_id: &TaskId, reason: &str) -> Result<bool, CoreError> {
        let store = self.clone();
        let id = task_id.clone();
        let reason_owned = reason.to_string();
        let cancelled = run_blocking(move || store.cancel_blocking(&id, &reason_owned)).await?;
        if let Some(task) = cancelled {
            emit(
                self.events.as_ref(),
                &DomainEvent::TaskCancelled {
                    task,
                    reason: reason.to_string(),
                },
            )
            .await;
            return Ok(true);
        }
        Ok(false)
    }

    /// Consistency scan: find ids present on two boards and repair
    /// deterministically. Runs on a periodic timer, independent of any
    /// worker's lifecycle.
    pub async fn reconcile(&self) -> Result<Vec<Repair>, CoreError> {
        let store = self.clone();
        run_blocking(move || store.reconcile_blocking()).await
    }

    // ---- blocking bodies -------------------------------------------------

    fn enqueue_blocking(&self, task: TaskRecord) -> Result<TaskRecord, CoreError> {
        // Working / Completed は snapshot で検査、Ready は自ロック内で再検証。
        if self.working.load()?.tasks.contains_key(&task.task_id)
            || self.completed.load()?.tasks.contains_key(&task.task_id)
        {
            return Err(CoreError::DuplicateTask(task.task_id));
        }
        self.ready.update(move |ready| {
            if ready.tasks.contains_key(&task.task_id) {
                return Err(CoreError::DuplicateTask(task.task_id.clone()));
            }
            let mut task = task;
            task.status = TaskStatus::Pending;
            task.assigned_agent = None;
            ready.tasks.insert(task.task_id.clone(), task.clone());
            Ok(task)
        })
    }

    fn claim_blocking(
        &self,
        task_id: &TaskId,
        agent_id: &AgentId,
    ) -> Result<Option<TaskRecord>, CoreError> {
        let now = self.clock.now();
        // Phase 1: insert into Working. The Working lock is the claim's
        // arbitration point; the Ready snapshot read below is stable for
        // this decision because no claimer can win without this lock.
        let claimed = self.working.update(|working| {
            if working.tasks.contains_key(task_id) {
                return Ok(None); // lost the race, or an interrupted claim holds it
            }
            let ready = self.ready.load()?;
            let Some(task) = ready.tasks.get(task_id) else {
                return Ok(None);
            };
            if !task.status.is_claimable() {
                return Ok(None);
            }
            let mut task = task.clone();
            task.begin_work(agent_id.clone(), now);
            working.tasks.insert(task_id.clone(), task.clone());
            Ok(Some(task))
        })?;
        let Some(claimed) = claimed else {
            return Ok(None);
        };
        // Phase 2: remove from Ready. The claim is already committed; a
        // failure here leaves a duplicate for the consistency scan.
        if let Err(err) = self.ready.update(|ready| {
            ready.tasks.remove(task_id);
            Ok(())
        }) {
            warn!(task_id = %task_id, error = %err, "claimed task still on ready board, leaving to reconcile");
        }
        Ok(Some(claimed))
    }

    fn update_working_blocking(
        &self,
        task_id: &TaskId,
        update: WorkingUpdate,
    ) -> Result<TaskRecord, CoreError> {
        let now = self.clock.now();
        self.working.update(move |working| {
            let Some(task) = working.tasks.get_mut(task_id) else {
                return Err(CoreError::TaskNotFound(task_id.clone()));
            };
            task.apply_update(update, now);
            Ok(task.clone())
        })
    }

    fn complete_blocking(
        &self,
        task_id: &TaskId,
        outcome: CompletionOutcome,
    ) -> Result<Option<TaskRecord>, CoreError> {
        let now = self.clock.now();
        let finished = self.completed.update(|completed| {
            let working = self.working.load()?;
            let Some(task) = working.tasks.get(task_id) else {
                return Ok(None);
            };
            let mut task = task.clone();
            task.finish(outcome, now);
            completed.tasks.insert(task_id.clone(), task.clone());
            Ok(Some(task))
        })?;
        let Some(finished) = finished else {
            return Ok(None);
        };
        if let Err(err) = self.working.update(|working| {
            working.tasks.remove(task_id);
            Ok(())
        }) {
            warn!(task_id = %task_id, error = %err, "completed task still on working board, leaving to reconcile");
        }
        Ok(Some(finished))
    }

    fn release_blocking(
        &self,
        task_id: &TaskId,
        reason: &str,
    ) -> Result<Option<TaskRecord>, CoreError> {
        let now = self.clock.now();
        let released = self.ready.update(|ready| {
            let working = self.working.load()?;
            let Some(task) = working.tasks.get(task_id) else {
                return Ok(None);
            };
            if task.status.is_terminal() {
                return Ok(None);
            }
            let mut task = task.clone();
            task.release(reason, now);
            ready.tasks.insert(task_id.clone(), task.clone());
            Ok(Some(task))
        })?;
        let Some(released) = released else {
            return Ok(None);
        };
        if let Err(err) = self.working.update(|working| {
            working.tasks.remove(task_id);
            Ok(())
        }) {
            warn!(task_id = %task_id, error = %err, "released task still on working board, leaving to reconcile");
        }
        Ok(Some(released))
    }

    fn cancel_blocking(
        &self,
        task_id: &TaskId,
        reason: &str,
    ) -> Result<Option<TaskRecord>, CoreError> {
        let now = self.clock.now();
        let cancelled = self.completed.update(|completed| {
            if completed.tasks.contains_key(task_id) {
                return Ok(None); // already terminal
            }
            let ready = self.ready.load()?;
            if let Some(task) = ready.tasks.get(task_id) {
                let mut task = task.clone();
                task.mark_cancelled(reason, now);
                completed.tasks.insert(task_id.clone(), task.clone());
                return Ok(Some((Board::Ready, task)));
            }
            let working = self.working.load()?;
            if let Some(task) = working.tasks.get(task_id)
                && !task.status.is_terminal()
            {
                let mut task = task.clone();
                task.mark_cancelled(reason, now);
                completed.tasks.insert(task_id.clone(), task.clone());
                return Ok(Some((Board::Working, task)));
            }
            Ok(None)
        })?;
        let Some((source, cancelled)) = cancelled else {
            return Ok(None);
        };
        if let Err(err) = self.store_for(source).update(|doc| {
            doc.tasks.remove(task_id);
            Ok(())
        }) {
            warn!(task_id = %task_id, error = %err, "cancelled task still on source board, leaving to reconcile");
        }
        Ok(Some(cancelled))
    }

    fn reconcile_blocking(&self) -> Result<Vec<Repair>, CoreError> {
        let mut repairs = Vec::new();

        let ready = self.ready.load()?;
        let working = self.working.load()?;
        let completed = self.completed.load()?;

        // Ready ∩ Working: the claim's Working insertion committed, so the
        // Ready copy is the leftover.
        let ready_dups: Vec<TaskId> = ready
            .tasks
            .keys()
            .filter(|id| working.tasks.contains_key(*id))
            .cloned()
            .collect();
        if !ready_dups.is_empty() {
            self.ready.update(|ready| {
                let working_now = self.working.load()?;
                for id in &ready_dups {
                    // Re-verify under the lock: the duplicate may have been
                    // resolved since the snapshot.
                    if working_now.tasks.contains_key(id) && ready.tasks.remove(id).is_some() {
                        repairs.push(Repair::DroppedReadyCopy(id.clone()));
                    }
                }
                Ok(())
            })?;
        }

        // Working ∩ Completed: a terminal Completed copy means the move
        // committed and only the Working cleanup was lost; finish it.
        // A non-terminal Completed copy is garbage and loses to Working.
        let mut finish_move: Vec<TaskId> = Vec::new();
        let mut drop_completed: Vec<TaskId> = Vec::new();
        for (id, task) in &completed.tasks {
            if working.tasks.contains_key(id) {
                if task.status.is_terminal() {
                    finish_move.push(id.clone());
                } else {
                    drop_completed.push(id.clone());
                }
            }
        }
        if !finish_move.is_empty() {
            self.working.update(|working| {
                let completed_now = self.completed.load()?;
                for id in &finish_move {
                    let still_terminal = completed_now
                        .tasks
                        .get(id)
                        .is_some_and(|task| task.status.is_terminal());
                    if still_terminal && working.tasks.remove(id).is_some() {
                        repairs.push(Repair::DroppedWorkingCopy(id.clone()));
                    }
                }
                Ok(())
            })?;
        }

        // Ready ∩ Completed: same rule as above, a terminal Completed copy
        // wins (interrupted cancellation), anything else is dropped.
        for (id, task) in &completed.tasks {
            if ready.tasks.contains_key(id) {
                if task.status.is_terminal() {
                    self.ready.update(|ready| {
                        if ready.tasks.remove(id).is_some() {
                            repairs.push(Repair::DroppedReadyCopy(id.clone()));
                        }
                        Ok(())
                    })?;
                } else {
                    drop_completed.push(id.clone());
                }
            }
        }
        if !drop_completed.is_empty() {
            self.completed.update(|completed| {
                for id in &drop_completed {
                    if completed.tasks.remove(id).is_some() {
                        repairs.push(Repair::DroppedCompletedCopy(id.clone()));
                    }
                }
                Ok(())
            })?;
        }

        if !repairs.is_empty() {
            debug!(count = repairs.len(), "consistency scan repaired duplicates");
        }
        Ok(repairs)
    }
}
