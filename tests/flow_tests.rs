use futures::future::join_all;
use pkce_handshake::api::mock::MockAuthServer;
use pkce_handshake::flow::FlowStore;
use pkce_handshake::pkce::PkceEngine;
use pkce_handshake::random::OsRandomSource;
use pkce_handshake::PkceError;
use std::sync::Arc;
use std::time::Duration;

fn new_store(server: Arc<MockAuthServer>, ttl: Duration) -> FlowStore {
    let engine = PkceEngine::with_default_length(Arc::new(OsRandomSource::new()));
    FlowStore::new(engine, server, ttl).expect("flow store")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_attempts_completed_in_reverse_order_use_own_verifier() {
    let server = Arc::new(MockAuthServer::new());
    let store = new_store(server.clone(), Duration::from_secs(600));

    let (s1, s2) = (store.clone(), store.clone());
    let (a, b) = tokio::join!(
        tokio::spawn(async move { s1.begin_authorization() }),
        tokio::spawn(async move { s2.begin_authorization() }),
    );
    let (token_a, challenge_a) = a.expect("join").expect("begin a");
    let (token_b, challenge_b) = b.expect("join").expect("begin b");
    assert_ne!(challenge_a, challenge_b);

    let code_a = server.authorize(&challenge_a);
    let code_b = server.authorize(&challenge_b);

    // the mock server rejects any verifier that does not hash to the captured challenge
    let tb = store
        .complete_authorization(token_b.as_str(), &code_b)
        .await
        .expect("complete b");
    let ta = store
        .complete_authorization(token_a.as_str(), &code_a)
        .await
        .expect("complete a");
    assert_eq!(tb.access_token, format!("mock-access-{}", code_b));
    assert_eq!(ta.access_token, format!("mock-access-{}", code_a));
    assert_eq!(store.pending_count(), 0);
    assert_eq!(server.outstanding(), 0);
}

#[tokio::test]
async fn swapped_tokens_are_rejected_by_exchange() {
    let server = Arc::new(MockAuthServer::new());
    let store = new_store(server.clone(), Duration::from_secs(600));
    let (token_a, _challenge_a) = store.begin_authorization().expect("begin a");
    let (_token_b, challenge_b) = store.begin_authorization().expect("begin b");
    let code_b = server.authorize(&challenge_b);

    let res = store.complete_authorization(token_a.as_str(), &code_b).await;
    assert!(matches!(res, Err(PkceError::ExchangeRejected(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_parallel_handshakes_all_succeed() {
    let server = Arc::new(MockAuthServer::new());
    let store = new_store(server.clone(), Duration::from_secs(600));

    let tasks = (0..64).map(|_| {
        let store = store.clone();
        let server = server.clone();
        tokio::spawn(async move {
            let (token, challenge) = store.begin_authorization().expect("begin");
            tokio::task::yield_now().await;
            let code = server.authorize(&challenge);
            store.complete_authorization(token.as_str(), &code).await
        })
    });
    for res in join_all(tasks).await {
        res.expect("join").expect("handshake");
    }
    assert_eq!(store.pending_count(), 0);
}

#[tokio::test]
async fn expired_attempt_is_unknown_even_with_valid_code() {
    let server = Arc::new(MockAuthServer::new());
    let store = new_store(server.clone(), Duration::from_millis(50));
    let (token, challenge) = store.begin_authorization().expect("begin");
    let code = server.authorize(&challenge);

    tokio::time::sleep(Duration::from_millis(120)).await;

    let res = store.complete_authorization(token.as_str(), &code).await;
    assert!(matches!(res, Err(PkceError::UnknownAttempt(_))));
    assert_eq!(store.pending_count(), 0);
}

#[tokio::test]
async fn forged_token_is_unknown() {
    let store = new_store(Arc::new(MockAuthServer::new()), Duration::from_secs(600));
    store.begin_authorization().expect("begin");
    match store.complete_authorization("not-a-real-attempt", "code").await {
        Err(PkceError::UnknownAttempt(t)) => assert_eq!(t, "not-a-real-attempt"),
        other => panic!("expected UnknownAttempt, got {:?}", other),
    }
    assert_eq!(store.pending_count(), 1);
}

#[tokio::test]
async fn background_sweeper_reclaims_abandoned_attempts() {
    let store = new_store(Arc::new(MockAuthServer::new()), Duration::from_millis(30));
    for _ in 0..5 {
        store.begin_authorization().expect("begin");
    }
    assert_eq!(store.pending_count(), 5);

    let sweeper = store.spawn_sweeper(Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(150)).await;
    sweeper.abort();

    assert_eq!(store.pending_count(), 0);
}
