use chrono::Duration;
use storage::{InMemorySessionStore, SessionRepository, StorageError};
use study_core::Clock;
use study_core::model::{DocumentOutline, Mode, SessionId};
use study_core::retrieval::KeywordIndex;
use study_core::time::{fixed_clock, fixed_now};

#[tokio::test]
async fn sessions_are_isolated() {
    let store = InMemorySessionStore::new(fixed_clock());
    let a = store.create().await;
    let b = store.create().await;

    {
        let handle = store.get(a).await.unwrap();
        let mut session = handle.lock().await;
        session.switch_mode(Mode::Practice);
        session.replace_documents(
            Box::new(KeywordIndex::build(["optics notes"])),
            DocumentOutline::default(),
        );
        session.set_current_topic("Optics");
    }

    let handle = store.get(b).await.unwrap();
    let other = handle.lock().await;
    assert_eq!(other.mode(), Mode::Teach);
    assert!(!other.has_documents());
    assert!(other.current_topic().is_none());
    assert!(other.weak_topics().is_empty());
}

#[tokio::test]
async fn reset_twice_yields_default_sessions() {
    let store = InMemorySessionStore::new(fixed_clock());
    let id = store.create().await;
    {
        let handle = store.get(id).await.unwrap();
        let mut session = handle.lock().await;
        session.switch_mode(Mode::Practice);
        session.set_current_topic("Optics");
    }

    let first = store.reset(id).await;
    let second = store.reset(first).await;

    let handle = store.get(second).await.unwrap();
    let session = handle.lock().await;
    assert_eq!(session.mode(), Mode::Teach);
    assert!(session.score().is_none());
    assert!(session.weak_topics().is_empty());
    assert!(session.current_topic().is_none());
    drop(session);

    assert!(matches!(store.get(first).await, Err(StorageError::NotFound(_))));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn reset_of_unknown_id_starts_fresh() {
    let store = InMemorySessionStore::new(fixed_clock());
    let fresh = store.reset(SessionId::generate()).await;
    assert!(store.get(fresh).await.is_ok());
}

#[tokio::test]
async fn purge_drops_idle_sessions_only() {
    let store = InMemorySessionStore::new(fixed_clock());
    let idle = store.create().await;

    let later = store
        .clone()
        .with_clock(Clock::fixed(fixed_now() + Duration::hours(5)));
    let active = later.create().await;

    let much_later = store
        .clone()
        .with_clock(Clock::fixed(fixed_now() + Duration::hours(7)));
    let purged = much_later.purge_expired(Duration::hours(6)).await;

    assert_eq!(purged, vec![idle]);
    assert!(store.get(idle).await.is_err());
    assert!(store.get(active).await.is_ok());
}

#[tokio::test]
async fn get_refreshes_idle_timer() {
    let store = InMemorySessionStore::new(fixed_clock());
    let id = store.create().await;

    let later = store
        .clone()
        .with_clock(Clock::fixed(fixed_now() + Duration::hours(4)));
    later.get(id).await.unwrap();

    let much_later = store
        .clone()
        .with_clock(Clock::fixed(fixed_now() + Duration::hours(7)));
    assert!(much_later.purge_expired(Duration::hours(6)).await.is_empty());
}

#[tokio::test]
async fn concurrent_requests_on_one_session_are_serialized() {
    let store = InMemorySessionStore::new(fixed_clock());
    let id = store.create().await;

    let mut tasks = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let handle = store.get(id).await.unwrap();
            let mut session = handle.lock().await;
            let before = session.current_topic().map(str::to_string);
            tokio::task::yield_now().await;
            assert_eq!(session.current_topic().map(str::to_string), before);
            session.set_current_topic(format!("topic {i}"));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let handle = store.get(id).await.unwrap();
    assert!(handle.lock().await.current_topic().is_some());
}
