use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task lifecycle states defining the progression of work.
///
/// Tasks move through a defined state machine with validated transitions.
/// The typical flow is: Pending → InProgress → Review → Completed, with
/// Blocked as a temporary side state and a Completed → Review reopen path
/// for corrections.
///
/// # State Transitions
///
/// - `Pending` → `InProgress`, `Blocked`
/// - `InProgress` → `Review`, `Completed`, `Blocked`
/// - `Review` → `InProgress`, `Completed`
/// - `Completed` → `Review` (reopen)
/// - `Blocked` → `Pending`, `InProgress`
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Newly created task, not yet started
    Pending,
    /// Task is actively being worked on
    InProgress,
    /// Task is awaiting approval
    Review,
    /// Task has been completed
    Completed,
    /// Task is blocked and cannot proceed
    Blocked,
}

impl TaskStatus {
    /// Check whether a transition from `self` to `next` is allowed.
    ///
    /// Transitioning to the same state is never allowed.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;

        match (self, next) {
            (current, new) if current == new => false,

            (Pending, InProgress | Blocked) => true,
            (InProgress, Review | Completed | Blocked) => true,
            (Review, InProgress | Completed) => true,
            // Reopen for corrections; completed_at is preserved
            (Completed, Review) => true,
            (Blocked, Pending | InProgress) => true,

            _ => false,
        }
    }

    /// The set of states reachable from `self`, for error messages.
    pub fn valid_next(self) -> &'static [TaskStatus] {
        use TaskStatus::*;
        match self {
            Pending => &[InProgress, Blocked],
            InProgress => &[Review, Completed, Blocked],
            Review => &[InProgress, Completed],
            Completed => &[Review],
            Blocked => &[Pending, InProgress],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<TaskStatus> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "review" => Some(TaskStatus::Review),
            "completed" => Some(TaskStatus::Completed),
            "blocked" => Some(TaskStatus::Blocked),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority levels.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<TaskPriority> {
        match s {
            "low" => Some(TaskPriority::Low),
            "medium" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            "critical" => Some(TaskPriority::Critical),
            _ => None,
        }
    }

    /// Sort rank: critical first.
    pub fn rank(self) -> i32 {
        match self {
            TaskPriority::Critical => 0,
            TaskPriority::High => 1,
            TaskPriority::Medium => 2,
            TaskPriority::Low => 3,
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of actor behind a Worker row.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    Human,
    Agent,
}

impl WorkerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerKind::Human => "human",
            WorkerKind::Agent => "agent",
        }
    }

    pub fn parse(s: &str) -> Option<WorkerKind> {
        match s {
            "human" => Some(WorkerKind::Human),
            "agent" => Some(WorkerKind::Agent),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Family tag for agent workers.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentFamily {
    Claude,
    Qwen,
    Gemini,
    Custom,
}

impl AgentFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentFamily::Claude => "claude",
            AgentFamily::Qwen => "qwen",
            AgentFamily::Gemini => "gemini",
            AgentFamily::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<AgentFamily> {
        match s {
            "claude" => Some(AgentFamily::Claude),
            "qwen" => Some(AgentFamily::Qwen),
            "gemini" => Some(AgentFamily::Gemini),
            "custom" => Some(AgentFamily::Custom),
            _ => None,
        }
    }
}

/// Role of a worker within a project.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Member,
}

impl MemberRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<MemberRole> {
        match s {
            "owner" => Some(MemberRole::Owner),
            "member" => Some(MemberRole::Member),
            _ => None,
        }
    }
}

/// When a recurring task spawns its next occurrence.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceTrigger {
    /// Spawn when the current occurrence completes
    OnComplete,
    /// Spawn when the due date arrives, via the scheduler
    OnDueDate,
    /// Both of the above; the idempotence flag makes the spawn happen once
    Both,
}

impl RecurrenceTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            RecurrenceTrigger::OnComplete => "on_complete",
            RecurrenceTrigger::OnDueDate => "on_due_date",
            RecurrenceTrigger::Both => "both",
        }
    }

    pub fn parse(s: &str) -> Option<RecurrenceTrigger> {
        match s {
            "on_complete" => Some(RecurrenceTrigger::OnComplete),
            "on_due_date" => Some(RecurrenceTrigger::OnDueDate),
            "both" => Some(RecurrenceTrigger::Both),
            _ => None,
        }
    }

    /// True when a one-shot spawn job should be registered at the due date.
    pub fn schedules_spawn(self) -> bool {
        matches!(self, RecurrenceTrigger::OnDueDate | RecurrenceTrigger::Both)
    }
}

impl Default for RecurrenceTrigger {
    fn default() -> Self {
        RecurrenceTrigger::OnComplete
    }
}

/// An actor that can create, own, or be assigned tasks.
///
/// Humans are materialized lazily on first authenticated contact; agents are
/// registered explicitly. Agents carry a family tag and capability strings,
/// humans carry the external identity link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Worker {
    /// Auto-increment primary key
    pub id: i64,
    /// Unique `@`-prefixed handle (e.g., "@sarah", "@claude-code")
    pub handle: String,
    /// Display name
    pub name: String,
    /// Human or agent
    pub kind: WorkerKind,
    /// External identity id for human workers
    pub user_id: Option<String>,
    /// Family tag, required for agents
    pub agent_family: Option<AgentFamily>,
    /// Capability strings for agents
    pub capabilities: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Worker {
    /// The identifier used as an event recipient: the external identity for
    /// humans, the handle for agents.
    pub fn recipient_id(&self) -> String {
        self.user_id.clone().unwrap_or_else(|| self.handle.clone())
    }
}

/// A bounded workspace for tasks, scoped to a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: i64,
    /// Tenant the project belongs to; all queries are scoped by this
    pub tenant_id: String,
    /// Unique within the tenant, `^[a-z0-9-]+$`
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    /// External identity of the owner, not a worker id
    pub owner_id: String,
    /// True for the auto-created personal workspace; not deletable
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Link between a Worker and a Project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectMember {
    pub id: i64,
    pub project_id: i64,
    pub worker_id: i64,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

/// The primary unit of work.
///
/// Tasks form a tree via `parent_task_id` (acyclic, same project) and a
/// recurrence chain via `recurring_root_id` (null on the root itself).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    /// Completion percentage, 0-100; forced to 100 on completion
    pub progress_percent: i32,
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,

    pub project_id: i64,
    pub assignee_id: Option<i64>,
    pub parent_task_id: Option<i64>,
    pub created_by_id: i64,

    // Recurrence
    pub is_recurring: bool,
    /// Pattern string; unknown patterns fall back to daily at computation time
    pub recurrence_pattern: Option<String>,
    pub max_occurrences: Option<i64>,
    /// Root of the recurrence chain; None when this task is the root
    pub recurring_root_id: Option<i64>,
    pub recurrence_trigger: RecurrenceTrigger,
    pub clone_subtasks_on_recur: bool,
    /// Guard against duplicate successor creation
    pub has_spawned_next: bool,
    /// Guard against duplicate reminder emission
    pub reminder_sent: bool,

    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Id of the recurrence chain root: the root's own id if this task is the
    /// root, otherwise the stored pointer.
    pub fn recurrence_root(&self) -> i64 {
        self.recurring_root_id.unwrap_or(self.id)
    }
}

/// Derived parent progress: arithmetic mean of the direct subtasks'
/// `progress_percent`, truncated to integer. Zero when there are no subtasks.
/// Never stored; always computed at read time.
pub fn rollup_progress(subtask_progress: &[i32]) -> i32 {
    if subtask_progress.is_empty() {
        return 0;
    }
    let sum: i64 = subtask_progress.iter().map(|&p| p as i64).sum();
    (sum / subtask_progress.len() as i64) as i32
}

/// Entity kind recorded in the audit trail.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Task,
    Project,
    Worker,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Task => "task",
            EntityType::Project => "project",
            EntityType::Worker => "worker",
        }
    }

    pub fn parse(s: &str) -> Option<EntityType> {
        match s {
            "task" => Some(EntityType::Task),
            "project" => Some(EntityType::Project),
            "worker" => Some(EntityType::Worker),
            _ => None,
        }
    }
}

/// Immutable record of a state-changing action.
///
/// Inserted in the same transaction as the action it records; never updated
/// or deleted afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub id: i64,
    pub entity_type: EntityType,
    pub entity_id: i64,
    /// Action name, e.g. "created", "status_changed", "spawned_recurring"
    pub action: String,
    pub actor_id: i64,
    pub actor_kind: WorkerKind,
    /// Free-form context, typically before/after values
    pub details: serde_json::Value,
    /// OAuth client id when the action came through an agent tool
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Data transfer object for creating tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: TaskPriority,
    #[serde(default)]
    pub assignee_id: Option<i64>,
    #[serde(default)]
    pub parent_task_id: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub recurrence_pattern: Option<String>,
    #[serde(default)]
    pub max_occurrences: Option<i64>,
    #[serde(default)]
    pub recurrence_trigger: RecurrenceTrigger,
    #[serde(default)]
    pub clone_subtasks_on_recur: bool,
}

fn default_priority() -> TaskPriority {
    TaskPriority::Medium
}

/// Data transfer object for updating tasks; only present fields are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TaskPriority>,
    pub tags: Option<Vec<String>>,
    pub due_date: Option<DateTime<Utc>>,
    pub parent_task_id: Option<i64>,
    pub is_recurring: Option<bool>,
    pub recurrence_pattern: Option<String>,
    pub max_occurrences: Option<i64>,
}

/// Sort keys accepted by the task listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskSort {
    CreatedAt,
    DueDate,
    Priority,
    Title,
}

impl Default for TaskSort {
    fn default() -> Self {
        TaskSort::CreatedAt
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Desc
    }
}

/// Filter criteria for listing tasks within a project.
///
/// All fields are optional; specified fields combine with AND logic. Tags
/// also combine with AND: a task must carry every requested tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<i64>,
    pub priority: Option<TaskPriority>,
    /// Case-insensitive substring match against the title
    pub search: Option<String>,
    pub tags: Vec<String>,
    pub has_due_date: Option<bool>,
    pub sort_by: TaskSort,
    pub sort_order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

impl TaskFilter {
    /// Listing page size cap.
    pub const MAX_LIMIT: i64 = 100;
}

/// Data transfer object for creating projects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProject {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Data transfer object for updating projects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_status_transitions() {
        use TaskStatus::*;

        assert!(Pending.can_transition_to(InProgress));
        assert!(Pending.can_transition_to(Blocked));
        assert!(!Pending.can_transition_to(Review));
        assert!(!Pending.can_transition_to(Completed));

        assert!(InProgress.can_transition_to(Review));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Blocked));
        assert!(!InProgress.can_transition_to(Pending));

        assert!(Review.can_transition_to(InProgress));
        assert!(Review.can_transition_to(Completed));
        assert!(!Review.can_transition_to(Blocked));
        assert!(!Review.can_transition_to(Pending));

        assert!(Completed.can_transition_to(Review));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Blocked));

        assert!(Blocked.can_transition_to(Pending));
        assert!(Blocked.can_transition_to(InProgress));
        assert!(!Blocked.can_transition_to(Review));
        assert!(!Blocked.can_transition_to(Completed));
    }

    #[test]
    fn test_no_same_state_transition() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Review,
            TaskStatus::Completed,
            TaskStatus::Blocked,
        ] {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Review,
            TaskStatus::Completed,
            TaskStatus::Blocked,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("archived"), None);
    }

    #[test]
    fn test_priority_rank_orders_critical_first() {
        assert!(TaskPriority::Critical.rank() < TaskPriority::High.rank());
        assert!(TaskPriority::High.rank() < TaskPriority::Medium.rank());
        assert!(TaskPriority::Medium.rank() < TaskPriority::Low.rank());
    }

    #[test]
    fn test_rollup_progress() {
        assert_eq!(rollup_progress(&[]), 0);
        assert_eq!(rollup_progress(&[100]), 100);
        assert_eq!(rollup_progress(&[0, 100]), 50);
        // Truncation, not rounding
        assert_eq!(rollup_progress(&[0, 0, 100]), 33);
        assert_eq!(rollup_progress(&[50, 50, 99]), 66);
    }

    #[test]
    fn test_recurrence_root() {
        let mut task = sample_task();
        assert_eq!(task.recurrence_root(), task.id);
        task.recurring_root_id = Some(7);
        assert_eq!(task.recurrence_root(), 7);
    }

    #[test]
    fn test_worker_recipient_id() {
        let human = Worker {
            id: 1,
            handle: "@sarah".to_string(),
            name: "Sarah".to_string(),
            kind: WorkerKind::Human,
            user_id: Some("user-abc".to_string()),
            agent_family: None,
            capabilities: vec![],
            created_at: Utc::now(),
        };
        assert_eq!(human.recipient_id(), "user-abc");

        let agent = Worker {
            id: 2,
            handle: "@claude-code".to_string(),
            name: "Claude Code".to_string(),
            kind: WorkerKind::Agent,
            user_id: None,
            agent_family: Some(AgentFamily::Claude),
            capabilities: vec!["code".to_string()],
            created_at: Utc::now(),
        };
        assert_eq!(agent.recipient_id(), "@claude-code");
    }

    fn sample_task() -> Task {
        Task {
            id: 42,
            title: "Write release notes".to_string(),
            description: None,
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            progress_percent: 0,
            tags: vec![],
            due_date: None,
            project_id: 1,
            assignee_id: None,
            parent_task_id: None,
            created_by_id: 1,
            is_recurring: false,
            recurrence_pattern: None,
            max_occurrences: None,
            recurring_root_id: None,
            recurrence_trigger: RecurrenceTrigger::OnComplete,
            clone_subtasks_on_recur: false,
            has_spawned_next: false,
            reminder_sent: false,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
