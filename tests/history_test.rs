use graphrag_chat::history::{ChatStore, HistoryError, MemoryChatStore, Role};

async fn seeded() -> MemoryChatStore {
    let store = MemoryChatStore::new();
    for (user, session) in [("u1", "s1"), ("u1", "s2"), ("u2", "s3")] {
        store.add_user_message(session, &format!("question in {}", session)).await.unwrap();
        store
            .add_ai_message(session, &format!("answer in {}", session), Some("reasoning"))
            .await
            .unwrap();
        store.link_session_to_user(session, user).await.unwrap();
    }
    store
}

#[tokio::test]
async fn test_delete_user_cascades() {
    let store = seeded().await;

    store.delete_user("u1").await.unwrap();

    assert_eq!(store.list_users().await.unwrap(), vec!["u2".to_string()]);
    assert!(store.list_sessions(Some("u1")).await.unwrap().is_empty());

    let remaining: Vec<String> = store
        .list_sessions(None)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.session_id)
        .collect();
    assert_eq!(remaining, vec!["s3".to_string()]);

    assert!(store.get_messages("s1").await.unwrap().is_empty());
    assert!(store.get_messages("s2").await.unwrap().is_empty());
    assert_eq!(store.get_messages("s3").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_delete_session_keeps_user() {
    let store = seeded().await;

    store.delete_session("s1").await.unwrap();

    let sessions = store.list_sessions(Some("u1")).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id, "s2");
    assert_eq!(sessions[0].last_message.as_deref(), Some("answer in s2"));
    assert!(store.list_users().await.unwrap().contains(&"u1".to_string()));
}

#[tokio::test]
async fn test_messages_are_chronological_with_thoughts_on_answers() {
    let store = seeded().await;
    let messages = store.get_messages("s2").await.unwrap();

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].thought, None);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].thought.as_deref(), Some("reasoning"));
    assert!(messages[0].created_at <= messages[1].created_at);
}

#[tokio::test]
async fn test_deleting_unknown_ids_is_a_no_op() {
    let store = seeded().await;
    store.delete_user("nobody").await.unwrap();
    store.delete_session("missing").await.unwrap();
    assert_eq!(store.list_users().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_blank_ids_are_rejected() {
    let store = MemoryChatStore::new();
    assert!(matches!(store.add_user_message(" ", "hi").await, Err(HistoryError::InvalidInput(_))));
    assert!(matches!(store.delete_user("").await, Err(HistoryError::InvalidInput(_))));
}
