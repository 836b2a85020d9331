use pylearn_core::model::{KnowledgeLevel, Lesson, Module, Position, StudyPlan, Understanding};
use pylearn_core::time::fixed_now;
use pylearn_core::{Advancement, CompletionOutcome, ResetRequest};
use services::{AppServices, Clock, LessonLookup, ProgressServiceError, TutorService};
use storage::repository::{LearnerRepository, Storage};

fn plan() -> StudyPlan {
    let lessons = |names: &[&str]| names.iter().map(|n| Lesson::new(*n, "")).collect();
    StudyPlan::new(
        "Python Fundamentals",
        vec![
            Module::new("Basics", lessons(&["Variables", "Types"])),
            Module::new("Empty", Vec::new()),
            Module::new("Flow", lessons(&["If", "Loops"])),
        ],
    )
}

fn pos(m: u32, l: u32) -> Position {
    Position::new(m, l).unwrap()
}

#[tokio::test]
async fn walks_a_course_in_memory() {
    let services = AppServices::in_memory(Clock::fixed(fixed_now()));
    let progress = services.progress();
    let id = progress
        .enroll("Python", KnowledgeLevel::Beginner, plan())
        .await
        .unwrap();

    let status = progress.get_progress(id).await.unwrap();
    assert_eq!(status.progress.total_lessons, 4);
    assert_eq!(status.progress.progress_percentage, 0);

    progress.complete_lesson(id, Understanding::Good).await.unwrap();
    let rollover = progress.complete_lesson(id, Understanding::Fair).await.unwrap();
    assert_eq!(
        rollover,
        CompletionOutcome::Completed {
            position: pos(1, 2),
            advancement: Advancement::Next {
                position: pos(3, 1),
                is_module_complete: true,
            },
        }
    );

    let LessonLookup::Found(ctx) = progress.current_context(id).await.unwrap() else {
        panic!("expected a lesson");
    };
    assert_eq!(ctx.module_name, "Flow");
    assert_eq!(ctx.lesson_name, "If");
    assert_eq!(ctx.previous_lessons, vec!["Basics - Variables", "Basics - Types"]);
    assert_eq!(ctx.progress.progress_percentage, 50);

    progress.complete_lesson(id, Understanding::Good).await.unwrap();
    let last = progress.complete_lesson(id, Understanding::Excellent).await.unwrap();
    assert!(matches!(
        last,
        CompletionOutcome::Completed {
            advancement: Advancement::CourseComplete,
            ..
        }
    ));

    let done = progress.get_progress(id).await.unwrap();
    assert_eq!(done.progress.progress_percentage, 100);
    assert!(done.progress.is_course_finished());
    assert_eq!(done.position, pos(3, 2));
}

#[tokio::test]
async fn sqlite_reset_then_fix() {
    let storage = Storage::sqlite("sqlite:file:memdb_progress_flow?mode=memory&cache=shared")
        .await
        .expect("sqlite");
    let services =
        AppServices::from_storage(&storage, Clock::fixed(fixed_now()), TutorService::disabled());
    let progress = services.progress();
    let id = progress
        .enroll("Python", KnowledgeLevel::Intermediate, plan())
        .await
        .unwrap();

    let status = progress
        .reset_progress(
            id,
            ResetRequest {
                position: pos(3, 2),
                clear_completed: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(status.position, pos(3, 2));
    assert_eq!(status.progress.total_completed_lessons, 3);

    let report = progress.fix_progress(id, Understanding::Fair).await.unwrap();
    assert_eq!(report.added, vec![pos(1, 1), pos(1, 2), pos(3, 1)]);

    let reloaded = storage.learners.load_learner_state(id).await.unwrap().unwrap();
    assert_eq!(reloaded.completed().len(), 3);
    assert_eq!(reloaded.revision(), 2);

    let lookup = progress.current_context(id).await.unwrap();
    let ctx = lookup.context().expect("lesson");
    assert_eq!(ctx.lesson_name, "Loops");

    let tutor = services.tutor();
    assert!(!tutor.enabled());
    assert!(tutor.brief_for(ctx).await.is_err());
}

#[tokio::test]
async fn sqlite_enroll_rejects_blank_language() {
    let storage = Storage::sqlite("sqlite:file:memdb_progress_blank?mode=memory&cache=shared")
        .await
        .expect("sqlite");
    let services =
        AppServices::from_storage(&storage, Clock::fixed(fixed_now()), TutorService::disabled());
    let progress = services.progress();

    let err = progress
        .enroll("  ", KnowledgeLevel::Beginner, plan())
        .await
        .unwrap_err();
    assert!(matches!(err, ProgressServiceError::InvalidLearner(_)));
    assert!(storage.learners.list_learners(10).await.unwrap().is_empty());

    let id = progress
        .enroll(" Python ", KnowledgeLevel::Beginner, plan())
        .await
        .unwrap();
    assert_eq!(progress.get_progress(id).await.unwrap().language, "Python");
}
