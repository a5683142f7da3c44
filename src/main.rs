use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use caseflow::case::definition::{
    CaseDefinition, CaseFileItemDefinition, CriterionDefinition, ItemBody, ItemDefinition,
    OnPartDefinition, StageDefinition,
};
use caseflow::case::events::CaseTeamMember;
use caseflow::case::planitem::Transition;
use caseflow::case::CaseCommand;
use caseflow::{AnyCommand, CaseSystem, MemoryJournal, MessageEnvelope, UserIdentity, Value};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging with environment-based filtering; override with
    // RUST_LOG, e.g. RUST_LOG=caseflow=trace cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,caseflow=debug")),
        )
        .init();

    tracing::info!("Starting caseflow demo: claim case lifecycle");

    let journal = Arc::new(MemoryJournal::new());
    let system = CaseSystem::new(journal.clone());

    let alice = UserIdentity::new("alice")?.with_roles(["Handler"]);

    // === 1. Start a case: one human task, a milestone behind a sentry ===
    let definition = claim_definition();
    let case_id = "claim-2024-001";
    let start = system
        .request(
            MessageEnvelope::new(case_id, alice.clone())?.with_tenant("acme"),
            AnyCommand::Case(CaseCommand::StartCase {
                case_name: "Claim".to_string(),
                definition,
                team: vec![CaseTeamMember::owner("alice")],
                file: Value::Null,
            }),
        )
        .await;
    let token = start
        .last_modified
        .clone()
        .ok_or_else(|| anyhow::anyhow!("start produced no consistency token"))?;
    tracing::info!(case_id = case_id, token = %token, "Case started");

    // === 2. Put the claim into the case file ===
    let mut claim = Value::empty_map();
    claim.set_field("amount", Value::Long(1200));
    system
        .request(
            MessageEnvelope::new(case_id, alice.clone())?,
            AnyCommand::Case(CaseCommand::CreateFileItem {
                path: caseflow::ValuePath::parse("Claim")?,
                value: claim,
            }),
        )
        .await
        .into_result()
        .map_err(|e| anyhow::anyhow!("create file item failed: {}", e))?;

    // === 3. Complete the review task; the sentry fires the milestone ===
    system
        .request(
            MessageEnvelope::new(case_id, alice.clone())?,
            AnyCommand::Case(CaseCommand::MakePlanItemTransition {
                plan_item_id: "review.0".to_string(),
                transition: Transition::Complete,
            }),
        )
        .await
        .into_result()
        .map_err(|e| anyhow::anyhow!("complete review failed: {}", e))?;
    tracing::info!("Review completed");

    // === 4. Read back with read-your-writes consistency ===
    let state = system
        .request_when(
            &token,
            MessageEnvelope::new(case_id, alice.clone())?,
            AnyCommand::Case(CaseCommand::GetCase),
        )
        .await
        .into_result()
        .map_err(|e| anyhow::anyhow!("query failed: {}", e))?;

    tracing::info!(
        state = %serde_json::to_string_pretty(&state)?,
        "Final case state"
    );
    tracing::info!(
        persisted_events = journal.stream_len(case_id),
        "Demo complete"
    );

    Ok(())
}

fn claim_definition() -> CaseDefinition {
    CaseDefinition {
        name: "Claim".to_string(),
        plan: StageDefinition {
            id: "claim-plan".to_string(),
            name: "Claim".to_string(),
            auto_complete: false,
            items: vec![
                ItemDefinition {
                    id: "review".to_string(),
                    name: "Review claim".to_string(),
                    discretionary: false,
                    body: ItemBody::HumanTask,
                    entry_criteria: vec![],
                    exit_criteria: vec![],
                },
                ItemDefinition {
                    id: "approved".to_string(),
                    name: "Claim approved".to_string(),
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
