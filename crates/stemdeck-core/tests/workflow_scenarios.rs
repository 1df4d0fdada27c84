mod support;

use std::sync::Arc;

use stemdeck_core::{
    Action, DragPayload, GenerationError, Orchestrator, OrchestratorConfig, SessionPolicy,
    SignalLevel, Stage, Stem, StemFilter, StemType, UploadError, WorkflowError,
};
use support::{FakeService, wav_upload};
use tokio::sync::Notify;

async fn separated(service: FakeService) -> Orchestrator<FakeService> {
    let orchestrator = Orchestrator::new(service, OrchestratorConfig::default());
    orchestrator
        .upload(wav_upload("song.wav"))
        .await
        .expect("upload should succeed");
    orchestrator
        .separate()
        .await
        .expect("separation should succeed");
    orchestrator
}

fn assign_first(orchestrator: &Orchestrator<FakeService>) {
    let view = orchestrator.stem_view(StemFilter::All);
    let item = view.items.first().expect("at least one stem should be listed");
    orchestrator.drop_payload(item.drag_payload.as_str());
}

#[tokio::test]
async fn separation_uses_server_assigned_name_and_keeps_response_order() {
    let orchestrator = separated(FakeService::default()).await;

    assert_eq!(orchestrator.service().uploads.lock().as_slice(), ["song.wav"]);
    assert_eq!(
        orchestrator.service().separations.lock().as_slice(),
        ["song_1699.wav"]
    );

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.stage, Stage::Separated);
    assert!(!snapshot.processing);
    let kinds: Vec<StemType> = snapshot.stems.all().iter().map(Stem::kind).collect();
    assert_eq!(kinds, vec![StemType::Drums, StemType::Vocals]);
    assert!(snapshot.affordances.replace);
    assert!(!snapshot.affordances.generate);
}

#[tokio::test]
async fn generate_stays_disabled_until_stem_and_style_are_present() {
    let orchestrator = separated(FakeService::default()).await;

    assert_eq!(
        orchestrator.generate().await,
        Err(WorkflowError::GenerateDisabled)
    );
    assert!(orchestrator.toggle_style("jazz"));
    assert!(!orchestrator.can_generate());

    assign_first(&orchestrator);
    assert!(orchestrator.can_generate());
    assert!(orchestrator.affordances().generate);

    assert!(!orchestrator.remove_assignment());
    assert!(!orchestrator.affordances().generate);
}

#[tokio::test]
async fn successful_generation_appends_new_stem() {
    let service = FakeService::default().with_generations([Ok(Stem::new(
        "drums_jazz_generated.wav",
        "/files/drums_jazz_generated.wav",
    ))]);
    let orchestrator = separated(service).await;
    assign_first(&orchestrator);
    orchestrator.toggle_style("jazz");
    orchestrator.toggle_style("lofi");

    let generated = orchestrator
        .generate()
        .await
        .expect("generation should succeed");
    assert_eq!(generated.kind(), StemType::Drums);

    let requests = orchestrator.service().generate_requests.lock().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].stem.path(), "/files/drums.wav");
    assert_eq!(requests[0].styles, vec!["jazz", "lofi"]);

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.stage, Stage::Separated);
    assert_eq!(snapshot.stems.len(), 3);
    assert_eq!(
        snapshot.stems.all().last().map(Stem::name),
        Some("drums_jazz_generated.wav")
    );
    assert_eq!(snapshot.assigned.as_ref().map(Stem::path), Some("/files/drums.wav"));
}

#[tokio::test]
async fn failed_generation_leaves_collection_and_stage_unchanged() {
    let service = FakeService {
        separation: Ok(vec![
            ("drums.wav".to_string(), "/files/drums.wav".to_string()),
            ("vocals.wav".to_string(), "/files/vocals.wav".to_string()),
            ("bass.wav".to_string(), "/files/bass.wav".to_string()),
        ]),
        ..FakeService::default()
    }
    .with_generations([Err(GenerationError::Unsuccessful(
        "model unavailable".to_string(),
    ))]);
    let orchestrator = separated(service).await;
    let mut signals = orchestrator.subscribe();
    assign_first(&orchestrator);
    orchestrator.toggle_style("rock");

    let error = orchestrator
        .generate()
        .await
        .expect_err("generation should fail");
    assert!(matches!(
        error,
        WorkflowError::Generation(GenerationError::Unsuccessful(_))
    ));

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.stage, Stage::Separated);
    assert_eq!(snapshot.stems.len(), 3);
    assert!(snapshot.affordances.generate);

    let mut levels = Vec::new();
    while let Ok(signal) = signals.try_recv() {
        levels.push(signal.level);
        if signal.level == SignalLevel::Error {
            assert_eq!(signal.action, Some(Action::Generate));
            assert!(signal.message.contains("model unavailable"));
        }
    }
    assert_eq!(levels, vec![SignalLevel::Info, SignalLevel::Error]);
}

#[tokio::test]
async fn generated_stem_with_existing_path_is_rejected() {
    let service = FakeService::default()
        .with_generations([Ok(Stem::new("drums.wav", "/files/drums.wav"))]);
    let orchestrator = separated(service).await;
    assign_first(&orchestrator);
    orchestrator.toggle_style("funk");

    let error = orchestrator
        .generate()
        .await
        .expect_err("duplicate path should fail");
    assert!(matches!(error, WorkflowError::Generation(GenerationError::Repository(_))));
    assert_eq!(orchestrator.stage(), Stage::Separated);
    assert_eq!(orchestrator.snapshot().stems.len(), 2);
}

#[tokio::test]
async fn rejected_upload_returns_to_idle_and_reports_error() {
    let service = FakeService {
        upload_error: Some(UploadError::Rejected {
            status: 400,
            message: "no file".to_string(),
        }),
        ..FakeService::default()
    };
    let orchestrator = Orchestrator::new(service, OrchestratorConfig::default());
    let mut signals = orchestrator.subscribe();

    let error = orchestrator
        .upload(wav_upload("song.wav"))
        .await
        .expect_err("upload should fail");
    assert!(matches!(error, WorkflowError::Upload(UploadError::Rejected { .. })));
    assert_eq!(orchestrator.stage(), Stage::Idle);
    assert!(orchestrator.snapshot().source.is_none());

    let last = std::iter::from_fn(|| signals.try_recv().ok())
        .last()
        .expect("a signal should be emitted");
    assert_eq!(last.level, SignalLevel::Error);
}

#[tokio::test]
async fn unsupported_upload_never_reaches_the_server() {
    let orchestrator = Orchestrator::new(FakeService::default(), OrchestratorConfig::default());

    let error = orchestrator
        .upload(wav_upload("notes.txt"))
        .await
        .expect_err("text file should be refused");
    assert!(matches!(
        error,
        WorkflowError::Upload(UploadError::UnsupportedFormat { .. })
    ));
    assert!(orchestrator.service().uploads.lock().is_empty());
    assert_eq!(orchestrator.stage(), Stage::Idle);
}

#[tokio::test]
async fn restored_upload_skips_separation() {
    let service = FakeService {
        restored: vec![
            Stem::new("bass.wav", "/files/bass.wav"),
            Stem::new("bass.wav", "/files/bass.wav"),
            Stem::new("other.wav", "/files/other.wav"),
        ],
        ..FakeService::default()
    };
    let orchestrator = Orchestrator::new(service, OrchestratorConfig::default());

    let stage = orchestrator
        .upload(wav_upload("song.wav"))
        .await
        .expect("upload should succeed");
    assert_eq!(stage, Stage::Separated);
    assert_eq!(orchestrator.snapshot().stems.len(), 2);
    assert!(orchestrator.service().separations.lock().is_empty());
}

#[tokio::test]
async fn second_separate_while_outstanding_is_busy() {
    let gate = Arc::new(Notify::new());
    let service = FakeService {
        separate_gate: Some(Arc::clone(&gate)),
        ..FakeService::default()
    };
    let orchestrator = Orchestrator::new(service, OrchestratorConfig::default());
    orchestrator
        .upload(wav_upload("song.wav"))
        .await
        .expect("upload should succeed");

    let (first, second) = tokio::join!(orchestrator.separate(), async {
        let second = orchestrator.separate().await;
        assert_eq!(orchestrator.stage(), Stage::Separating);
        assert!(orchestrator.snapshot().processing);
        assert!(orchestrator.toggle_style("ambient"));
        gate.notify_one();
        second
    });

    assert_eq!(first, Ok(Stage::Separated));
    assert_eq!(second, Err(WorkflowError::Busy(Action::Separate)));
    assert_eq!(orchestrator.service().separations.lock().len(), 1);
    assert_eq!(orchestrator.snapshot().styles.as_slice(), ["ambient"]);
}

#[tokio::test]
async fn replace_during_separation_discards_late_result() {
    let gate = Arc::new(Notify::new());
    let service = FakeService {
        separate_gate: Some(Arc::clone(&gate)),
        ..FakeService::default()
    };
    let orchestrator = Orchestrator::new(service, OrchestratorConfig::default());
    orchestrator
        .upload(wav_upload("song.wav"))
        .await
        .expect("upload should succeed");

    let (outcome, ()) = tokio::join!(orchestrator.separate(), async {
        orchestrator.replace();
        gate.notify_one();
    });

    assert_eq!(outcome, Err(WorkflowError::Superseded(Action::Separate)));
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.stage, Stage::Idle);
    assert!(snapshot.stems.is_empty());
    assert!(snapshot.source.is_none());
}

#[tokio::test]
async fn replace_clears_everything_unless_styles_are_kept() {
    let config = OrchestratorConfig {
        session: SessionPolicy {
            clear_styles_on_replace: false,
        },
        ..OrchestratorConfig::default()
    };
    let orchestrator = Orchestrator::new(FakeService::default(), config);
    orchestrator
        .upload(wav_upload("song.wav"))
        .await
        .expect("upload should succeed");
    orchestrator
        .separate()
        .await
        .expect("separation should succeed");
    assign_first(&orchestrator);
    orchestrator.toggle_style("jazz");

    orchestrator.replace();

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.stage, Stage::Idle);
    assert!(snapshot.assigned.is_none());
    assert!(snapshot.stems.is_empty());
    assert_eq!(snapshot.styles.as_slice(), ["jazz"]);
    assert!(snapshot.affordances.upload);
    assert!(!snapshot.affordances.separate);
}

#[tokio::test]
async fn reseparation_replaces_collection_wholesale() {
    let service = FakeService::default()
        .with_generations([Ok(Stem::new("bass_gen.wav", "/files/bass_gen.wav"))]);
    let orchestrator = separated(service).await;
    assign_first(&orchestrator);
    orchestrator.toggle_style("jazz");
    orchestrator.generate().await.expect("generation should succeed");
    assert_eq!(orchestrator.snapshot().stems.len(), 3);

    orchestrator
        .separate()
        .await
        .expect("re-separation should succeed");
    assert_eq!(orchestrator.snapshot().stems.len(), 2);
    assert_eq!(orchestrator.service().separations.lock().len(), 2);
}

#[tokio::test]
async fn out_of_order_actions_are_invalid_transitions() {
    let orchestrator = Orchestrator::new(FakeService::default(), OrchestratorConfig::default());
    assert_eq!(
        orchestrator.separate().await,
        Err(WorkflowError::InvalidTransition {
            action: Action::Separate,
            stage: Stage::Idle,
        })
    );

    orchestrator
        .upload(wav_upload("song.wav"))
        .await
        .expect("upload should succeed");
    assert_eq!(
        orchestrator.upload(wav_upload("again.wav")).await,
        Err(WorkflowError::InvalidTransition {
            action: Action::Upload,
            stage: Stage::Uploaded,
        })
    );
}

#[tokio::test]
async fn filter_is_idempotent_and_ids_change_per_pass() {
    let orchestrator = separated(FakeService::default()).await;

    let first = orchestrator.stem_view(StemFilter::All);
    let second = orchestrator.stem_view(StemFilter::All);
    let names = |view: &stemdeck_core::StemView| {
        view.items
            .iter()
            .map(|item| item.stem.name().to_string())
            .collect::<Vec<_>>()
    };
    assert_eq!(names(&first), names(&second));
    assert_ne!(first.items[0].id, second.items[0].id);

    let vocals = orchestrator.stem_view(StemFilter::Only(StemType::Vocals));
    assert_eq!(names(&vocals), vec!["vocals.wav"]);
    let bass = orchestrator.stem_view(StemFilter::Only(StemType::Bass));
    assert!(bass.is_empty());
}

#[tokio::test]
async fn malformed_drop_keeps_previous_assignment() {
    let orchestrator = separated(FakeService::default()).await;
    assign_first(&orchestrator);

    orchestrator.drop_payload("{not json");
    assert_eq!(
        orchestrator.snapshot().assigned.as_ref().map(Stem::name),
        Some("drums.wav")
    );

    let vocals = Stem::new("vocals.wav", "/files/vocals.wav");
    orchestrator.drop_payload(DragPayload::from_stem(&vocals).as_str());
    assert_eq!(orchestrator.snapshot().assigned, Some(vocals));
}
