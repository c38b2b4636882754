//! Request review and materialization, driven through the services.

use chrono::{Duration, Utc};

use knowledge_share_core::{RequestStatus, Role, Visibility};
use knowledge_share_integration_tests::{Harness, draft};
use knowledge_share_server::db::{SessionQuery, Store};
use knowledge_share_server::error::AppError;
use knowledge_share_server::services::SubmitRequest;

/// Store latency long enough for two callers' reads to overlap.
const OVERLAP: std::time::Duration = std::time::Duration::from_millis(20);

fn proposal(title: &str) -> SubmitRequest {
    SubmitRequest {
        title: title.to_owned(),
        description: "Half an hour, with questions".to_owned(),
        requested_datetime: Utc::now() + Duration::days(7),
        visibility: Visibility::Public,
    }
}

#[tokio::test]
async fn test_rejection_needs_a_reason() {
    let h = Harness::new();
    let alice = h.member("Alice", Role::Basic).await;
    let paula = h.member("Paula", Role::Planner).await;

    let submitted = h
        .state
        .requests()
        .submit(&alice, proposal("Intro to tracing"))
        .await
        .unwrap();
    let id = submitted.request.id;
    assert_eq!(submitted.request.status, RequestStatus::Pending);
    assert_eq!(submitted.requester.display_name, "Alice");

    let err = h.state.requests().reject(&paula, id, "   ").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let still_pending = h.state.requests().get(&alice, id).await.unwrap();
    assert_eq!(still_pending.request.status, RequestStatus::Pending);

    let rejected = h
        .state
        .requests()
        .reject(&paula, id, "duplicate topic")
        .await
        .unwrap();
    assert_eq!(rejected.request.status, RequestStatus::Rejected);
    assert_eq!(
        rejected.request.rejection_reason.as_deref(),
        Some("duplicate topic")
    );
    assert_eq!(rejected.reviewer.unwrap().id, paula.id);

    // A decided request cannot be decided again
    let err = h.state.requests().approve(&paula, id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_basic_user_cannot_review() {
    let h = Harness::new();
    let alice = h.member("Alice", Role::Basic).await;
    let bob = h.member("Bob", Role::Basic).await;

    let id = h
        .state
        .requests()
        .submit(&alice, proposal("Borrow checker clinic"))
        .await
        .unwrap()
        .request
        .id;

    let err = h.state.requests().approve(&bob, id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    let err = h.state.requests().approve(&alice, id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_approved_request_is_materialized_once() {
    let h = Harness::new();
    let alice = h.member("Alice", Role::Basic).await;
    let admin = h.member("Ada", Role::Admin).await;

    let id = h
        .state
        .requests()
        .submit(&alice, proposal("Async in practice"))
        .await
        .unwrap()
        .request
        .id;

    // Not yet approved
    let at = Utc::now() + Duration::days(7);
    let err = h
        .state
        .requests()
        .materialize(&admin, id, draft("Async in practice", at))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let approved = h.state.requests().approve(&admin, id).await.unwrap();
    assert_eq!(approved.request.status, RequestStatus::Approved);
    assert!(approved.request.linked_session_id.is_none());

    // The requester promotes their own approved request, scheduling by date and time
    let mut input = draft("Async in practice", at);
    input.datetime = None;
    input.date = Some(at.format("%Y-%m-%d").to_string());
    input.time = Some("16:00".to_owned());
    let session = h
        .state
        .requests()
        .materialize(&alice, id, input)
        .await
        .unwrap();
    assert_eq!(session.owner.id, alice.id);
    assert_eq!(session.session.datetime.format("%H:%M").to_string(), "16:00");
    assert!(!session.is_past);

    let linked = h.state.requests().get(&alice, id).await.unwrap();
    assert_eq!(linked.request.linked_session_id, Some(session.session.id));

    let err = h
        .state
        .requests()
        .materialize(&admin, id, draft("Async in practice", at))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_other_basic_user_cannot_materialize() {
    let h = Harness::new();
    let alice = h.member("Alice", Role::Basic).await;
    let bob = h.member("Bob", Role::Basic).await;
    let paula = h.member("Paula", Role::Planner).await;

    let id = h
        .state
        .requests()
        .submit(&alice, proposal("Macros by example"))
        .await
        .unwrap()
        .request
        .id;
    h.state.requests().approve(&paula, id).await.unwrap();

    let at = Utc::now() + Duration::days(3);
    let err = h
        .state
        .requests()
        .materialize(&bob, id, draft("Macros by example", at))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_request_listing_is_scoped_by_role() {
    let h = Harness::new();
    let alice = h.member("Alice", Role::Basic).await;
    let bob = h.member("Bob", Role::Basic).await;
    let paula = h.member("Paula", Role::Planner).await;

    let requests = h.state.requests();
    let mine = requests.submit(&alice, proposal("One")).await.unwrap();
    requests.submit(&bob, proposal("Two")).await.unwrap();

    let alice_sees = requests.list(&alice, None).await.unwrap();
    assert_eq!(alice_sees.len(), 1);
    assert_eq!(alice_sees.first().unwrap().request.id, mine.request.id);

    assert_eq!(requests.list(&paula, None).await.unwrap().len(), 2);

    let err = requests.get(&bob, mine.request.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    requests.approve(&paula, mine.request.id).await.unwrap();
    let approved = requests
        .list(&paula, Some(RequestStatus::Approved))
        .await
        .unwrap();
    assert_eq!(approved.len(), 1);
}

#[tokio::test]
async fn test_deleted_session_does_not_free_its_request() {
    let h = Harness::new();
    let alice = h.member("Alice", Role::Basic).await;
    let paula = h.member("Paula", Role::Planner).await;

    let requests = h.state.requests();
    let id = requests
        .submit(&alice, proposal("Lifetimes explained"))
        .await
        .unwrap()
        .request
        .id;
    requests.approve(&paula, id).await.unwrap();

    let at = Utc::now() + Duration::days(5);
    let first = requests
        .materialize(&alice, id, draft("Lifetimes explained", at))
        .await
        .unwrap();
    h.state
        .sessions()
        .delete(&alice, first.session.id)
        .await
        .unwrap();

    let err = requests
        .materialize(&alice, id, draft("Lifetimes explained", at))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let request = requests.get(&alice, id).await.unwrap().request;
    assert_eq!(request.status, RequestStatus::Approved);
    assert_eq!(request.linked_session_id, Some(first.session.id));
    assert!(
        h.store
            .list_sessions(&SessionQuery::default())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_concurrent_reviews_have_one_winner() {
    let h = Harness::new();
    let alice = h.member("Alice", Role::Basic).await;
    let paula = h.member("Paula", Role::Planner).await;
    let ada = h.member("Ada", Role::Admin).await;

    let requests = h.state.requests();
    let id = requests
        .submit(&alice, proposal("Error handling"))
        .await
        .unwrap()
        .request
        .id;

    h.store.set_latency(OVERLAP);
    let (approved, rejected) = tokio::join!(
        requests.approve(&paula, id),
        requests.reject(&ada, id, "covered last month"),
    );
    h.store.set_latency(std::time::Duration::ZERO);

    let (winner, lost) = match (approved, rejected) {
        (Ok(view), Err(e)) | (Err(e), Ok(view)) => (view, e),
        (a, r) => panic!(
            "expected one winner, got approve ok={} reject ok={}",
            a.is_ok(),
            r.is_ok()
        ),
    };
    assert!(matches!(lost, AppError::Conflict(_)));

    let stored = requests.get(&alice, id).await.unwrap().request;
    assert_eq!(stored.status, winner.request.status);
    assert_eq!(stored.reviewer_id, winner.request.reviewer_id);
}

#[tokio::test]
async fn test_concurrent_materializations_create_one_session() {
    let h = Harness::new();
    let alice = h.member("Alice", Role::Basic).await;
    let paula = h.member("Paula", Role::Planner).await;

    let requests = h.state.requests();
    let id = requests
        .submit(&alice, proposal("Unsafe, carefully"))
        .await
        .unwrap()
        .request
        .id;
    requests.approve(&paula, id).await.unwrap();

    let at = Utc::now() + Duration::days(4);
    h.store.set_latency(OVERLAP);
    let (by_requester, by_planner) = tokio::join!(
        requests.materialize(&alice, id, draft("Unsafe, carefully", at)),
        requests.materialize(&paula, id, draft("Unsafe, carefully", at)),
    );
    h.store.set_latency(std::time::Duration::ZERO);

    let (winner, lost) = match (by_requester, by_planner) {
        (Ok(view), Err(e)) | (Err(e), Ok(view)) => (view, e),
        (a, b) => panic!(
            "expected one winner, got requester ok={} planner ok={}",
            a.is_ok(),
            b.is_ok()
        ),
    };
    assert!(matches!(lost, AppError::Conflict(_)));

    let sessions = h.store.list_sessions(&SessionQuery::default()).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions.first().unwrap().id, winner.session.id);

    let linked = requests.get(&alice, id).await.unwrap().request;
    assert_eq!(linked.linked_session_id, Some(winner.session.id));
}
