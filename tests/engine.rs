use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use caseflow::case::definition::{
    CaseDefinition, CaseFileItemDefinition, CriterionDefinition, ItemBody, ItemDefinition,
    OnPartDefinition, StageDefinition,
};
use caseflow::case::events::CaseTeamMember;
use caseflow::case::planitem::Transition;
use caseflow::case::sentry::LiteralConditionEvaluator;
use caseflow::case::CaseCommand;
use caseflow::journal::RetryConfig;
use caseflow::process::{EchoProcessExecutor, FailingProcessExecutor, ProcessExecutor};
use caseflow::tenant::TenantCommand;
use caseflow::{
    ActorLastModified, AnyCommand, CaseSystem, EngineConfig, MemoryJournal, MessageEnvelope,
    ModelError, ModelResponse, UserIdentity, Value, ValuePath,
};

// ============================================================================
// End-to-end engine tests: the properties the runtime must guarantee.
// ============================================================================

fn user(name: &str) -> UserIdentity {
    UserIdentity::new(name).unwrap()
}

fn envelope(actor_id: &str, name: &str) -> MessageEnvelope {
    MessageEnvelope::new(actor_id, user(name)).unwrap()
}

fn system_with(journal: Arc<MemoryJournal>) -> CaseSystem {
    CaseSystem::new(journal)
}

fn system_with_executor(
    journal: Arc<MemoryJournal>,
    executor: Arc<dyn ProcessExecutor>,
) -> CaseSystem {
    CaseSystem::with_collaborators(
        journal,
        EngineConfig::default(),
        RetryConfig::none(),
        executor,
        Arc::new(LiteralConditionEvaluator),
    )
}

/// One human task plus a milestone whose entry criterion waits for the task.
fn review_definition() -> CaseDefinition {
    CaseDefinition {
        name: "Claim".to_string(),
        plan: StageDefinition {
            id: "plan".to_string(),
            name: "Claim".to_string(),
            auto_complete: false,
            items: vec![
                human_task("review", "Review"),
                ItemDefinition {
                    id: "approved".to_string(),
                    name: "Approved".to_string(),
                    discretionary: false,
                    body: ItemBody::Milestone,
                    entry_criteria: vec![CriterionDefinition {
                        on_parts: vec![OnPartDefinition::PlanItem {
                            item: "review".to_string(),
                            transition: Transition::Complete,
                        }],
                        if_part: None,
                    }],
                    exit_criteria: vec![],
                },
            ],
        },
        case_file: vec![CaseFileItemDefinition {
            name: "Claim".to_string(),
            children: vec![],
        }],
    }
}

fn human_task(id: &str, name: &str) -> ItemDefinition {
    ItemDefinition {
        id: id.to_string(),
        name: name.to_string(),
        discretionary: false,
        body: ItemBody::HumanTask,
        entry_criteria: vec![],
        exit_criteria: vec![],
    }
}

async fn start_case(system: &CaseSystem, case_id: &str, definition: CaseDefinition) -> ModelResponse {
    system
        .request(
            envelope(case_id, "alice").with_tenant("acme"),
            AnyCommand::Case(CaseCommand::StartCase {
                case_name: "Claim".to_string(),
                definition,
                team: vec![CaseTeamMember::owner("alice"), CaseTeamMember::member("bob")],
                file: Value::Null,
            }),
        )
        .await
}

async fn get_state(system: &CaseSystem, case_id: &str) -> Value {
    system
        .request(envelope(case_id, "alice"), AnyCommand::Case(CaseCommand::GetCase))
        .await
        .into_result()
        .expect("GetCase should succeed")
}

fn plan_item_state(state: &Value, plan_item_id: &str) -> Option<String> {
    let Value::List(items) = state.field("planItems")? else {
        return None;
    };
    items
        .iter()
        .find(|i| i.field("id").and_then(|v| v.as_text()) == Some(plan_item_id))
        .and_then(|i| i.field("state"))
        .and_then(|v| v.as_text())
        .map(str::to_string)
}

/// Poll the case until `pred` holds or a timeout hits.
async fn wait_for_state(
    system: &CaseSystem,
    case_id: &str,
    pred: impl Fn(&Value) -> bool,
) -> Value {
    for _ in 0..100 {
        let state = get_state(system, case_id).await;
        if pred(&state) {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within timeout");
}

fn count_events(journal: &MemoryJournal, actor_id: &str, event_type: &str) -> usize {
    journal
        .records(actor_id)
        .iter()
        .filter(|r| r.event_type == event_type)
        .count()
}

// ============================================================================
// Lifecycle & state machine
// ============================================================================

#[tokio::test]
async fn case_start_activates_plan() {
    let journal = Arc::new(MemoryJournal::new());
    let system = system_with(journal.clone());

    let response = start_case(&system, "case-1", review_definition()).await;
    assert!(response.is_success(), "{:?}", response);
    assert!(response.last_modified.is_some());

    let state = get_state(&system, "case-1").await;
    assert_eq!(plan_item_state(&state, "plan.0").as_deref(), Some("Active"));
    assert_eq!(plan_item_state(&state, "review.0").as_deref(), Some("Active"));
    assert_eq!(
        plan_item_state(&state, "approved.0").as_deref(),
        Some("Available")
    );
}

#[tokio::test]
async fn sentry_fires_milestone_and_completes_case() {
    let journal = Arc::new(MemoryJournal::new());
    let system = system_with(journal.clone());
    start_case(&system, "case-1", review_definition()).await;

    let response = system
        .request(
            envelope("case-1", "alice"),
            AnyCommand::Case(CaseCommand::MakePlanItemTransition {
                plan_item_id: "review.0".to_string(),
                transition: Transition::Complete,
            }),
        )
        .await;
    assert!(response.is_success(), "{:?}", response);

    let state = get_state(&system, "case-1").await;
    assert_eq!(
        plan_item_state(&state, "review.0").as_deref(),
        Some("Completed")
    );
    // The milestone occurred off the sentry, within the same unit of work.
    assert_eq!(
        plan_item_state(&state, "approved.0").as_deref(),
        Some("Completed")
    );
    // Every child settled, so the case plan completed too.
    assert_eq!(plan_item_state(&state, "plan.0").as_deref(), Some("Completed"));
}

#[tokio::test]
async fn sentry_with_two_on_parts_needs_both_in_either_order() {
    for (first, second) in [("a", "b"), ("b", "a")] {
        let journal = Arc::new(MemoryJournal::new());
        let system = system_with(journal.clone());

        let definition = CaseDefinition {
            name: "TwoParts".to_string(),
            plan: StageDefinition {
                id: "plan".to_string(),
                name: "TwoParts".to_string(),
                auto_complete: false,
                items: vec![
                    human_task("a", "Task A"),
                    human_task("b", "Task B"),
                    ItemDefinition {
                        id: "done".to_string(),
                        name: "Done".to_string(),
                        discretionary: false,
                        body: ItemBody::Milestone,
                        entry_criteria: vec![CriterionDefinition {
                            on_parts: vec![
                                OnPartDefinition::PlanItem {
                                    item: "a".to_string(),
                                    transition: Transition::Complete,
                                },
                                OnPartDefinition::PlanItem {
                                    item: "b".to_string(),
                                    transition: Transition::Complete,
                                },
                            ],
                            if_part: None,
                        }],
                        exit_criteria: vec![],
                    },
                ],
            },
            case_file: vec![],
        };
        start_case(&system, "case-1", definition).await;

        let complete = |task: &str| {
            AnyCommand::Case(CaseCommand::MakePlanItemTransition {
                plan_item_id: format!("{}.0", task),
                transition: Transition::Complete,
            })
        };

        system.request(envelope("case-1", "alice"), complete(first)).await;
        let state = get_state(&system, "case-1").await;
        assert_eq!(
            plan_item_state(&state, "done.0").as_deref(),
            Some("Available"),
            "one on-part must not fire the milestone"
        );

        system.request(envelope("case-1", "alice"), complete(second)).await;
        let state = get_state(&system, "case-1").await;
        assert_eq!(plan_item_state(&state, "done.0").as_deref(), Some("Completed"));

        // Fired exactly once.
        let occurs = journal
            .records("case-1")
            .iter()
            .filter(|r| {
                r.event_type == "PlanItemTransitioned"
                    && r.payload["data"]["data"]["plan_item_id"] == "done.0"
                    && r.payload["data"]["data"]["transition"] == "Occur"
            })
            .count();
        assert_eq!(occurs, 1);
    }
}

#[tokio::test]
async fn illegal_transition_is_denied() {
    let journal = Arc::new(MemoryJournal::new());
    let system = system_with(journal.clone());
    start_case(&system, "case-1", review_definition()).await;

    // The milestone is Available; Complete is not a legal occur-machine move.
    let response = system
        .request(
            envelope("case-1", "alice"),
            AnyCommand::Case(CaseCommand::MakePlanItemTransition {
                plan_item_id: "approved.0".to_string(),
                transition: Transition::Complete,
            }),
        )
        .await;
    let failure = response.failure().expect("must fail");
    assert!(matches!(failure.error, ModelError::TransitionDenied { .. }));
}

#[tokio::test]
async fn non_member_is_rejected() {
    let journal = Arc::new(MemoryJournal::new());
    let system = system_with(journal.clone());
    start_case(&system, "case-1", review_definition()).await;

    let response = system
        .request(envelope("case-1", "mallory"), AnyCommand::Case(CaseCommand::GetCase))
        .await;
    let failure = response.failure().expect("must fail");
    assert!(matches!(failure.error, ModelError::Unauthorized(_)));
}

#[tokio::test]
async fn commands_before_bootstrap_fail_with_actor_not_found() {
    let journal = Arc::new(MemoryJournal::new());
    let system = system_with(journal.clone());

    let response = system
        .request(envelope("nope", "alice"), AnyCommand::Case(CaseCommand::GetCase))
        .await;
    let failure = response.failure().expect("must fail");
    assert!(matches!(failure.error, ModelError::ActorNotFound(_)));
}

#[tokio::test]
async fn family_mismatch_is_rejected() {
    let journal = Arc::new(MemoryJournal::new());
    let system = system_with(journal.clone());
    start_case(&system, "case-1", review_definition()).await;

    let response = system
        .request(
            envelope("case-1", "alice"),
            AnyCommand::Tenant(TenantCommand::GetTenant),
        )
        .await;
    let failure = response.failure().expect("must fail");
    assert!(matches!(failure.error, ModelError::InvalidCommand(_)));
}

// ============================================================================
// Validation purity & commit pairing
// ============================================================================

#[tokio::test]
async fn failed_validation_persists_nothing_and_keeps_last_modified() {
    let journal = Arc::new(MemoryJournal::new());
    let system = system_with(journal.clone());
    let started = start_case(&system, "case-1", review_definition()).await;
    let token_before = started.last_modified.clone().unwrap();
    let events_before = journal.stream_len("case-1");

    let response = system
        .request(
            envelope("case-1", "alice"),
            AnyCommand::Case(CaseCommand::MakePlanItemTransition {
                plan_item_id: "approved.0".to_string(),
                transition: Transition::Complete,
            }),
        )
        .await;
    assert!(!response.is_success());

    assert_eq!(journal.stream_len("case-1"), events_before);
    assert_eq!(response.last_modified.unwrap(), token_before);
}

#[tokio::test]
async fn every_mutating_cycle_carries_exactly_one_commit_event() {
    let journal = Arc::new(MemoryJournal::new());
    let system = system_with(journal.clone());

    let started = start_case(&system, "case-1", review_definition()).await;
    assert_eq!(count_events(&journal, "case-1", "Modified"), 1);

    // A query adds nothing.
    get_state(&system, "case-1").await;
    assert_eq!(count_events(&journal, "case-1", "Modified"), 1);

    let mut claim = Value::empty_map();
    claim.set_field("amount", Value::Long(10));
    system
        .request(
            envelope("case-1", "alice"),
            AnyCommand::Case(CaseCommand::CreateFileItem {
                path: ValuePath::parse("Claim").unwrap(),
                value: claim,
            }),
        )
        .await;
    assert_eq!(count_events(&journal, "case-1", "Modified"), 2);

    // The commit event's timestamp is the response token's timestamp.
    let records = journal.records("case-1");
    let last_commit = records
        .iter()
        .rev()
        .find(|r| r.event_type == "Modified")
        .unwrap();
    let commit_ts = last_commit.payload["data"]["timestamp"].as_str().unwrap();
    let started_ts = started.last_modified.unwrap().timestamp;
    assert!(
        chrono::DateTime::parse_from_rfc3339(commit_ts).unwrap().with_timezone(&chrono::Utc)
            > started_ts
    );
}

// ============================================================================
// Replay determinism & recovery
// ============================================================================

#[tokio::test]
async fn recovered_state_is_identical_to_live_state() {
    let journal = Arc::new(MemoryJournal::new());
    let system = system_with(journal.clone());
    start_case(&system, "case-1", review_definition()).await;

    let mut claim = Value::empty_map();
    claim.set_field("amount", Value::Long(10));
    system
        .request(
            envelope("case-1", "alice"),
            AnyCommand::Case(CaseCommand::CreateFileItem {
                path: ValuePath::parse("Claim").unwrap(),
                value: claim,
            }),
        )
        .await;
    system
        .request(
            envelope("case-1", "alice"),
            AnyCommand::Case(CaseCommand::MakePlanItemTransition {
                plan_item_id: "review.0".to_string(),
                transition: Transition::Complete,
            }),
        )
        .await;

    let live = get_state(&system, "case-1").await;
    let events_before = journal.stream_len("case-1");

    // Crash: unload the actor; the next query recovers purely from the
    // journal.
    system.terminate("case-1");
    let recovered = get_state(&system, "case-1").await;

    assert_eq!(live, recovered);
    // Recovery replays; it never writes.
    assert_eq!(journal.stream_len("case-1"), events_before);
}

#[tokio::test]
async fn corrupt_stream_makes_the_actor_refuse_commands() {
    use caseflow::actormodel::MessageId;
    use caseflow::journal::{Journal, PersistedEvent};

    let journal = Arc::new(MemoryJournal::new());
    // A record no case event decoder understands.
    journal
        .append(
            "case-1",
            vec![PersistedEvent {
                sequence: 0,
                event_type: "Mystery".to_string(),
                payload: serde_json::json!({"type": "Mystery", "data": {}}),
                actor_id: "case-1".to_string(),
                tenant: "acme".to_string(),
                message_id: MessageId::fresh(),
                user: user("alice"),
                timestamp: chrono::Utc::now(),
            }],
        )
        .await
        .unwrap();

    let system = system_with(journal.clone());
    let response = system
        .request(envelope("case-1", "alice"), AnyCommand::Case(CaseCommand::GetCase))
        .await;
    let failure = response.failure().expect("must fail");
    assert!(matches!(failure.error, ModelError::EngineFault(_)));
}

// ============================================================================
// Engine faults
// ============================================================================

#[tokio::test]
async fn persistence_failure_is_an_engine_fault_and_state_survives_restart() {
    let journal = Arc::new(MemoryJournal::new());
    let system = system_with_executor(journal.clone(), Arc::new(EchoProcessExecutor));
    start_case(&system, "case-1", review_definition()).await;
    let events_before = journal.stream_len("case-1");

    journal.set_fail_appends(true);
    let response = system
        .request(
            envelope("case-1", "alice"),
            AnyCommand::Case(CaseCommand::MakePlanItemTransition {
                plan_item_id: "review.0".to_string(),
                transition: Transition::Complete,
            }),
        )
        .await;
    let failure = response.failure().expect("must fail");
    assert!(
        matches!(failure.error, ModelError::EngineFault(_)),
        "persistence failures surface as engine faults, not domain failures"
    );
    assert_eq!(journal.stream_len("case-1"), events_before);

    // The journal heals; the evicted actor recovers and the command works.
    journal.set_fail_appends(false);
    let response = system
        .request(
            envelope("case-1", "alice"),
            AnyCommand::Case(CaseCommand::MakePlanItemTransition {
                plan_item_id: "review.0".to_string(),
                transition: Transition::Complete,
            }),
        )
        .await;
    assert!(response.is_success(), "{:?}", response);
    let state = get_state(&system, "case-1").await;
    assert_eq!(plan_item_state(&state, "review.0").as_deref(), Some("Completed"));
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commands_for_one_actor_serialize() {
    let journal = Arc::new(MemoryJournal::new());
    let system = system_with(journal.clone());

    let mut definition = review_definition();
    definition.case_file = vec![CaseFileItemDefinition {
        name: "Claim".to_string(),
        children: vec![],
    }];
    start_case(&system, "case-1", definition).await;
    system
        .request(
            envelope("case-1", "alice"),
            AnyCommand::Case(CaseCommand::CreateFileItem {
                path: ValuePath::parse("Claim").unwrap(),
                value: Value::empty_map(),
            }),
        )
        .await
        .into_result()
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let system = system.clone();
        handles.push(tokio::spawn(async move {
            let mut update = Value::empty_map();
            update.set_field("n", Value::Long(i));
            system
                .request(
                    envelope("case-1", "alice"),
                    AnyCommand::Case(CaseCommand::UpdateFileItem {
                        path: ValuePath::parse("Claim").unwrap(),
                        value: update,
                    }),
                )
                .await
        }));
    }
    for handle in handles {
        let response = handle.await.unwrap();
        // If two cycles ever interleaved, the journal's sequence check
        // would reject one of them.
        assert!(response.is_success(), "{:?}", response);
    }
}

// ============================================================================
// Read-your-writes
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn query_blocks_until_the_awaited_write_is_observed() {
    let journal = Arc::new(MemoryJournal::new());
    let system = system_with(journal.clone());
    let started = start_case(&system, "case-1", review_definition()).await;
    let start_token = started.last_modified.unwrap();

    // A token just past the last write: satisfied only by the next commit.
    let future_token = ActorLastModified::new(
        "case-1",
        start_token.timestamp + chrono::Duration::milliseconds(1),
    );

    let writer = {
        let system = system.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            system
                .request(
                    envelope("case-1", "alice"),
                    AnyCommand::Case(CaseCommand::MakePlanItemTransition {
                        plan_item_id: "review.0".to_string(),
                        transition: Transition::Complete,
                    }),
                )
                .await
        })
    };

    let state = system
        .request_when(
            &future_token,
            envelope("case-1", "alice"),
            AnyCommand::Case(CaseCommand::GetCase),
        )
        .await
        .into_result()
        .unwrap();
    // The blocked query observed the write it waited for.
    assert_eq!(plan_item_state(&state, "review.0").as_deref(), Some("Completed"));
    writer.await.unwrap();
}

#[tokio::test]
async fn malformed_tokens_are_rejected() {
    assert!(matches!(
        ActorLastModified::parse("garbage"),
        Err(ModelError::InvalidLastModified(_))
    ));
    let round = ActorLastModified::new("case-1", chrono::Utc::now());
    let parsed = ActorLastModified::parse(&round.to_string()).unwrap();
    assert_eq!(parsed.actor_id, "case-1");
}

// ============================================================================
// Cross-actor ask protocol
// ============================================================================

fn process_case_definition() -> CaseDefinition {
    CaseDefinition {
        name: "WithProcess".to_string(),
        plan: StageDefinition {
            id: "plan".to_string(),
            name: "WithProcess".to_string(),
            auto_complete: false,
            items: vec![ItemDefinition {
                id: "calc".to_string(),
                name: "Calculate".to_string(),
                discretionary: false,
                body: ItemBody::ProcessTask {
                    input: Value::Long(42),
                },
                entry_criteria: vec![],
                exit_criteria: vec![],
            }],
        },
        case_file: vec![],
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn process_task_completes_through_ask_protocol() {
    let journal = Arc::new(MemoryJournal::new());
    let system = system_with_executor(journal.clone(), Arc::new(EchoProcessExecutor));
    start_case(&system, "case-1", process_case_definition()).await;

    let state = wait_for_state(&system, "case-1", |s| {
        plan_item_state(s, "calc.0").as_deref() == Some("Completed")
    })
    .await;
    assert_eq!(plan_item_state(&state, "plan.0").as_deref(), Some("Completed"));

    // The case persisted the request and its conclusion; the task actor has
    // its own stream.
    assert_eq!(count_events(&journal, "case-1", "RequestDispatched"), 1);
    assert_eq!(count_events(&journal, "case-1", "RequestConcluded"), 1);
    assert_eq!(count_events(&journal, "case-1/calc.0", "ProcessStarted"), 1);
    assert_eq!(count_events(&journal, "case-1/calc.0", "ProcessCompleted"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn process_task_failure_faults_the_plan_item() {
    let journal = Arc::new(MemoryJournal::new());
    let system = system_with_executor(
        journal.clone(),
        Arc::new(FailingProcessExecutor {
            reason: "backend down".to_string(),
        }),
    );
    start_case(&system, "case-1", process_case_definition()).await;

    let state = wait_for_state(&system, "case-1", |s| {
        plan_item_state(s, "calc.0").as_deref() == Some("Failed")
    })
    .await;
    // The failure arrived through the registered failure callback, not as a
    // hang.
    assert_eq!(plan_item_state(&state, "calc.0").as_deref(), Some("Failed"));
    assert_eq!(count_events(&journal, "case-1/calc.0", "ProcessFaulted"), 1);
}

/// Executor that holds the process actor mid-command until released, so the
/// test can crash the asking case while the answer is still outstanding.
struct GatedExecutor {
    released: Arc<AtomicBool>,
}

impl ProcessExecutor for GatedExecutor {
    fn execute(&self, _name: &str, input: &Value) -> Result<Value, String> {
        while !self.released.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(input.clone())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ask_survives_a_crash_of_the_asker_without_resending() {
    let journal = Arc::new(MemoryJournal::new());
    let released = Arc::new(AtomicBool::new(false));
    let system = system_with_executor(
        journal.clone(),
        Arc::new(GatedExecutor {
            released: released.clone(),
        }),
    );

    // Starting the case persists the request marker and dispatches the ask;
    // the process actor then blocks in its executor.
    start_case(&system, "case-1", process_case_definition()).await;
    assert_eq!(count_events(&journal, "case-1", "RequestDispatched"), 1);

    // Crash the case while the answer is outstanding.
    system.terminate("case-1");

    // Recovery rebuilds the pending-request table from the stream. It must
    // not dispatch the command a second time.
    let state = get_state(&system, "case-1").await;
    assert_eq!(plan_item_state(&state, "calc.0").as_deref(), Some("Active"));

    // Let the process finish; its response must match the recovered
    // correlation entry.
    released.store(true, Ordering::SeqCst);
    wait_for_state(&system, "case-1", |s| {
        plan_item_state(s, "calc.0").as_deref() == Some("Completed")
    })
    .await;

    assert_eq!(
        count_events(&journal, "case-1/calc.0", "ProcessStarted"),
        1,
        "recovery must not re-send the request"
    );
    assert_eq!(count_events(&journal, "case-1", "RequestDispatched"), 1);
    assert_eq!(count_events(&journal, "case-1", "RequestConcluded"), 1);
}

// ============================================================================
// Timers
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn timer_event_listener_occurs_when_the_timer_fires() {
    let journal = Arc::new(MemoryJournal::new());
    let system = system_with(journal.clone());

    let definition = CaseDefinition {
        name: "Timed".to_string(),
        plan: StageDefinition {
            id: "plan".to_string(),
            name: "Timed".to_string(),
            auto_complete: false,
            items: vec![ItemDefinition {
                id: "deadline".to_string(),
                name: "Deadline".to_string(),
                discretionary: false,
                body: ItemBody::TimerEvent { delay_ms: 50 },
                entry_criteria: vec![],
                exit_criteria: vec![],
            }],
        },
        case_file: vec![],
    };
    start_case(&system, "case-1", definition).await;

    wait_for_state(&system, "case-1", |s| {
        plan_item_state(s, "deadline.0").as_deref() == Some("Completed")
    })
    .await;
    assert_eq!(count_events(&journal, "caseflow-timer-service", "TimerSet"), 1);
    assert_eq!(count_events(&journal, "caseflow-timer-service", "TimerFired"), 1);
}

// ============================================================================
// Debug mode
// ============================================================================

#[tokio::test]
async fn debug_mode_is_persisted_and_captures_without_committing() {
    let journal = Arc::new(MemoryJournal::new());
    let system = system_with(journal.clone());
    start_case(&system, "case-1", review_definition()).await;

    let response = system.set_debug_mode("case-1", user("alice"), true).await;
    assert!(response.is_success(), "{:?}", response);
    assert_eq!(count_events(&journal, "case-1", "DebugModeChanged"), 1);
    let commits_before = count_events(&journal, "case-1", "Modified");

    // A query under debug mode persists a capture but no commit event.
    get_state(&system, "case-1").await;
    assert!(count_events(&journal, "case-1", "DebugInfo") >= 1);
    assert_eq!(count_events(&journal, "case-1", "Modified"), commits_before);

    // The flag survives recovery.
    system.terminate("case-1");
    let debug_events = count_events(&journal, "case-1", "DebugInfo");
    get_state(&system, "case-1").await;
    assert!(count_events(&journal, "case-1", "DebugInfo") > debug_events);
}

// ============================================================================
// Tenants
// ============================================================================

#[tokio::test]
async fn tenant_lifecycle_and_last_owner_rule() {
    use caseflow::identity::Member;

    let journal = Arc::new(MemoryJournal::new());
    let system = system_with(journal.clone());

    let response = system
        .request(
            envelope("acme", "alice"),
            AnyCommand::Tenant(TenantCommand::CreateTenant {
                name: "acme".to_string(),
                users: vec![Member::new("alice", true), Member::new("bob", false)],
            }),
        )
        .await;
    assert!(response.is_success(), "{:?}", response);

    let response = system
        .request(
            envelope("acme", "alice"),
            AnyCommand::Tenant(TenantCommand::RemoveUser {
                user_id: "alice".to_string(),
            }),
        )
        .await;
    let failure = response.failure().expect("must fail");
    assert!(matches!(failure.error, ModelError::InvalidCommand(_)));

    // Promote bob, then removing alice is fine.
    system
        .request(
            envelope("acme", "alice"),
            AnyCommand::Tenant(TenantCommand::SetUser {
                user: Member::new("bob", true),
            }),
        )
        .await
        .into_result()
        .unwrap();
    let response = system
        .request(
            envelope("acme", "bob"),
            AnyCommand::Tenant(TenantCommand::RemoveUser {
                user_id: "alice".to_string(),
            }),
        )
        .await;
    assert!(response.is_success(), "{:?}", response);
}
