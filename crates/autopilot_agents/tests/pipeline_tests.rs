//! Full-run tests over in-memory collaborators.

use std::sync::Arc;

use autopilot_agents::mock::{InMemoryTracker, RecordingReporter, ScriptedClassifier, TrackerCall};
use autopilot_agents::{
    AgentHandler, AgentRole, DevMonitorAgent, FieldUpdate, Orchestrator, QaReleaseAgent,
    RunContext, ScrumMasterAgent, TicketQuery, TriageAgent,
};
use autopilot_core::{
    parse_timestamp, Comment, DeveloperProfile, KnowledgeStore, MessageBroker, Priority,
    Specialization, SprintInfo, Ticket, TicketStatus,
};

fn pipeline(
    tracker: Arc<InMemoryTracker>,
    classifier: Arc<ScriptedClassifier>,
    reporter: Arc<RecordingReporter>,
) -> Orchestrator {
    let now = parse_timestamp("2024-01-06T00:00:00Z").unwrap();
    let stages: Vec<Arc<dyn AgentHandler>> = vec![
        Arc::new(TriageAgent::new(tracker.clone(), classifier.clone())),
        Arc::new(DevMonitorAgent::new(tracker.clone(), classifier)),
        Arc::new(QaReleaseAgent::new(tracker.clone())),
        Arc::new(ScrumMasterAgent::new(tracker).at(now)),
    ];
    Orchestrator::new(stages).unwrap().with_reporter(reporter)
}

fn sprint() -> SprintInfo {
    SprintInfo::new(12, "Sprint 12").with_dates("2024-01-01T00:00:00.000Z", "2024-01-11T00:00:00.000Z")
}

#[tokio::test]
async fn test_frontend_ticket_falls_back_to_fullstack() {
    let store = KnowledgeStore::open_in_memory().unwrap();
    store
        .seed_profiles(&[DeveloperProfile::new("fs-1", "Fay", Specialization::FullStack)])
        .unwrap();
    let broker = MessageBroker::new();
    let sprint = sprint();

    let tracker = Arc::new(InMemoryTracker::new().with_tickets(
        TicketQuery::Untriaged,
        vec![Ticket::new("SM-1", "Navbar overlaps logo", TicketStatus::ToDo)],
    ));
    let classifier = Arc::new(ScriptedClassifier::new().with_triage(
        "Navbar overlaps logo",
        r#"{"issue_type": "Bug", "priority": "High", "specialization": "Frontend"}"#,
    ));
    let reporter = Arc::new(RecordingReporter::new());

    let run = pipeline(tracker.clone(), classifier, reporter.clone())
        .run(&RunContext::new(&store, &broker, &sprint))
        .await;

    assert_eq!(store.profile("fs-1").unwrap().unwrap().current_workload, 1);
    assert!(tracker.calls().contains(&TrackerCall::Assign {
        key: "SM-1".into(),
        developer_id: "fs-1".into(),
    }));
    assert!(tracker.calls().contains(&TrackerCall::UpdateFields {
        key: "SM-1".into(),
        update: FieldUpdate::priority(Priority::High).with_labels(vec!["Frontend".into()]),
    }));

    let triage = run.report_for(AgentRole::Triage).unwrap().render();
    assert!(triage.contains("SM-1"));
    assert!(triage.contains("priority **High**"));
    assert!(triage.contains("assigned to **Fay**"));

    assert!(run.all_succeeded());
    assert_eq!(run.reports.len(), 4);
    assert_eq!(reporter.sent().len(), 1);
}

#[tokio::test]
async fn test_blocker_flows_from_monitor_to_escalation() {
    let store = KnowledgeStore::open_in_memory().unwrap();
    let broker = MessageBroker::new();
    let sprint = sprint();

    let tracker = Arc::new(
        InMemoryTracker::new()
            .with_tickets(
                TicketQuery::AssignedOpen,
                vec![Ticket::new("SM-4", "Payment webhook", TicketStatus::InProgress)],
            )
            .with_comments("SM-4", vec![Comment::new("Stuck until ops opens the firewall")]),
    );
    let classifier = Arc::new(ScriptedClassifier::new().with_sentiment(
        "Stuck until ops opens the firewall",
        "**Blocked:** yes\n**Sentiment:** negative",
    ));
    let reporter = Arc::new(RecordingReporter::new());

    let run = pipeline(tracker.clone(), classifier, reporter)
        .run(&RunContext::new(&store, &broker, &sprint))
        .await;

    assert!(run.undelivered.is_empty());
    assert!(broker.is_empty());
    assert!(tracker.calls().contains(&TrackerCall::UpdateFields {
        key: "SM-4".into(),
        update: FieldUpdate::priority(Priority::Highest),
    }));
    assert_eq!(tracker.comments_on("SM-4").len(), 1);

    let markdown = run.render_markdown();
    assert!(markdown.contains("## Scrum Master Agent"));
    assert!(markdown.contains("blocker escalated"));
}

#[tokio::test]
async fn test_run_completes_when_delivery_fails() {
    let store = KnowledgeStore::open_in_memory().unwrap();
    let broker = MessageBroker::new();
    let sprint = sprint();
    let tracker = Arc::new(InMemoryTracker::new());
    let reporter = Arc::new(RecordingReporter::failing());

    let run = pipeline(tracker, Arc::new(ScriptedClassifier::new()), reporter.clone())
        .run(&RunContext::new(&store, &broker, &sprint))
        .await;

    assert_eq!(run.reports.len(), 4);
    assert_eq!(reporter.sent().len(), 1);
    assert!(store.snapshot(12).unwrap().is_some());
}
