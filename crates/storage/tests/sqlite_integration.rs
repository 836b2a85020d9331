use chrono::Duration;
use pylearn_core::model::{
    KnowledgeLevel, LearnerId, Lesson, Module, Position, StudyPlan, Understanding,
};
use pylearn_core::time::fixed_now;
use pylearn_core::{Advancement, ResetRequest};
use storage::repository::{LearnerRepository, NewLearnerRecord, StorageError};
use storage::sqlite::SqliteRepository;

fn plan() -> StudyPlan {
    StudyPlan::new(
        "Python Fundamentals",
        vec![
            Module::new(
                "Basics",
                vec![Lesson::new("Variables", "x = 1"), Lesson::new("Types", "int, str")],
            ),
            Module::new("Flow", vec![Lesson::new("If", "if x:")]),
        ],
    )
}

fn record() -> NewLearnerRecord {
    NewLearnerRecord {
        language: "Python".into(),
        knowledge_level: KnowledgeLevel::Intermediate,
        plan: plan(),
        created_at: fixed_now(),
    }
}

async fn connect(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_roundtrip_persists_progress() {
    let repo = connect("memdb_learner_roundtrip").await;
    let id = repo.insert_learner(record()).await.unwrap();

    let mut state = repo.load_learner_state(id).await.unwrap().expect("learner");
    assert_eq!(state.position(), Position::start());
    assert_eq!(state.knowledge_level(), KnowledgeLevel::Intermediate);
    assert_eq!(state.plan(), &plan());

    state
        .complete_current_lesson(Understanding::Good, fixed_now())
        .unwrap();
    state
        .complete_current_lesson(Understanding::Excellent, fixed_now() + Duration::minutes(5))
        .unwrap();
    let revision = repo.save_learner_state(&state).await.unwrap();
    assert_eq!(revision, 1);

    let fetched = repo.load_learner_state(id).await.unwrap().expect("learner");
    assert_eq!(fetched.position(), Position::new(2, 1).unwrap());
    assert_eq!(fetched.revision(), 1);
    let order: Vec<Position> = fetched.completed().iter().map(|r| r.position).collect();
    assert_eq!(
        order,
        vec![Position::new(1, 1).unwrap(), Position::new(1, 2).unwrap()]
    );
    assert_eq!(
        fetched
            .completed()
            .get(Position::new(1, 2).unwrap())
            .unwrap()
            .understanding,
        Understanding::Excellent
    );
    assert_eq!(fetched.snapshot(), state.snapshot());
}

#[tokio::test]
async fn sqlite_rejects_stale_revision() {
    let repo = connect("memdb_learner_conflict").await;
    let id = repo.insert_learner(record()).await.unwrap();

    let mut first = repo.load_learner_state(id).await.unwrap().unwrap();
    let mut second = first.clone();

    first
        .complete_current_lesson(Understanding::Good, fixed_now())
        .unwrap();
    repo.save_learner_state(&first).await.unwrap();

    assert!(matches!(
        second.move_to_next_lesson(fixed_now()),
        Ok(Advancement::Next { .. })
    ));
    let err = repo.save_learner_state(&second).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Conflict {
            expected: 0,
            found: 1
        }
    ));

    let stored = repo.load_learner_state(id).await.unwrap().unwrap();
    assert_eq!(stored.completed().len(), 1);
}

#[tokio::test]
async fn sqlite_course_completion_and_reset() {
    let repo = connect("memdb_learner_reset").await;
    let id = repo.insert_learner(record()).await.unwrap();

    let mut state = repo.load_learner_state(id).await.unwrap().unwrap();
    for _ in 0..3 {
        state
            .complete_current_lesson(Understanding::Fair, fixed_now())
            .unwrap();
    }
    assert!(state.is_course_complete());
    let rev = repo.save_learner_state(&state).await.unwrap();
    state.set_revision(rev);

    let loaded = repo.load_learner_state(id).await.unwrap().unwrap();
    assert_eq!(loaded.course_completed_at(), Some(fixed_now()));

    state
        .reset(
            ResetRequest {
                clear_completed: true,
                ..ResetRequest::default()
            },
            fixed_now() + Duration::days(1),
        )
        .unwrap();
    repo.save_learner_state(&state).await.unwrap();

    let reset = repo.load_learner_state(id).await.unwrap().unwrap();
    assert!(reset.completed().is_empty());
    assert!(!reset.is_course_complete());
    assert_eq!(reset.position(), Position::start());
}

#[tokio::test]
async fn sqlite_missing_learner() {
    let repo = connect("memdb_learner_missing").await;
    assert!(
        repo.load_learner_state(LearnerId::new(42))
            .await
            .unwrap()
            .is_none()
    );
    let ghost = record().into_state(LearnerId::new(42)).unwrap();
    let err = repo.save_learner_state(&ghost).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound));

    repo.insert_learner(record()).await.unwrap();
    repo.insert_learner(record()).await.unwrap();
    assert_eq!(repo.list_learners(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn sqlite_rejects_blank_language_before_insert() {
    let repo = connect("memdb_learner_blank").await;
    let err = repo
        .insert_learner(NewLearnerRecord {
            language: "   ".into(),
            ..record()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidRecord(_)));
    assert!(repo.list_learners(10).await.unwrap().is_empty());

    let id = repo.insert_learner(record()).await.unwrap();
    assert!(repo.load_learner_state(id).await.unwrap().is_some());
}
