use super::*;

fn request(alias: &str, password: &str) -> NewAccountRequest {
    NewAccountRequest {
        kind: AccountKind::Ring,
        alias: alias.to_string(),
        archive_path: None,
        password: password.to_string(),
        pin: None,
    }
}

#[tokio::test]
async fn create_and_remove_account_emit_lifecycle_events() {
    let engine = LoopbackEngine::new();
    let mut events = engine.subscribe_events();

    let account_id = engine
        .create_account(request("Alice", ""))
        .await
        .expect("create");
    assert_eq!(
        events.recv().await.expect("added"),
        AccountEvent::AccountAdded {
            account_id: account_id.clone()
        }
    );
    assert_eq!(engine.list_accounts().await.expect("list"), vec![account_id.clone()]);

    engine.remove_account(&account_id).await.expect("remove");
    assert_eq!(
        events.recv().await.expect("removed"),
        AccountEvent::AccountRemoved {
            account_id: account_id.clone()
        }
    );
    assert!(engine.list_accounts().await.expect("list").is_empty());

    let err = engine
        .account_info(&account_id)
        .await
        .expect_err("account should be gone");
    assert!(err.is_not_found());
}

#[tokio::test]
async fn register_name_reports_status_through_events() {
    let engine = LoopbackEngine::new();
    let account_id = engine
        .create_account(request("Alice", "secret"))
        .await
        .expect("create");
    let mut events = engine.subscribe_events();

    engine
        .register_name(&account_id, "wrong", "alice")
        .await
        .expect("request");
    engine
        .register_name(&account_id, "secret", "a!")
        .await
        .expect("request");
    engine
        .register_name(&account_id, "secret", "alice")
        .await
        .expect("request");

    let statuses: Vec<RegisterNameStatus> = (0..3)
        .map(|_| match events.try_recv().expect("event") {
            AccountEvent::NameRegistrationEnded { status, .. } => status,
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            RegisterNameStatus::WrongPassword,
            RegisterNameStatus::InvalidName,
            RegisterNameStatus::Success,
        ]
    );

    let info = engine.account_info(&account_id).await.expect("info");
    assert_eq!(info.display_identifier(), "alice");
}

#[tokio::test]
async fn accept_only_succeeds_for_ringing_calls() {
    let engine = LoopbackEngine::new();
    let account_id = engine.seed_account("Alice", "").await;
    let calls = engine.call_model(&account_id).await.expect("calls");
    let mut events = calls.subscribe_events();

    let call_id = CallId::new("c1");
    calls
        .ring_incoming(&call_id, &ContactUri::new("ring:bob"))
        .await;
    calls.accept(&call_id).await.expect("accept ringing call");
    let err = calls
        .accept(&call_id)
        .await
        .expect_err("second accept is rejected");
    assert_eq!(err.code, ErrorCode::Rejected);

    assert!(matches!(
        events.try_recv().expect("incoming"),
        CallEvent::NewIncomingCall { .. }
    ));
    assert_eq!(
        events.try_recv().expect("started"),
        CallEvent::CallStarted {
            call_id: call_id.clone()
        }
    );
    assert_eq!(calls.accept_requests().await, vec![call_id.clone(), call_id]);
}

#[tokio::test]
async fn send_message_requires_known_conversation() {
    let engine = LoopbackEngine::new();
    let account_id = engine.seed_account("Alice", "").await;
    let conversations = engine
        .conversation_model(&account_id)
        .await
        .expect("conversations");
    let uid = ConversationUid::new("conv-1");
    conversations
        .add_conversation(ConversationInfo {
            uid: uid.clone(),
            participants: vec![ContactUri::new("bob")],
            last_interaction: None,
        })
        .await;

    conversations
        .send_message(&uid, "hello")
        .await
        .expect("send");
    let err = conversations
        .send_message(&ConversationUid::new("missing"), "hello")
        .await
        .expect_err("unknown conversation");
    assert!(err.is_not_found());

    assert_eq!(
        conversations.sent_messages().await,
        vec![(uid.clone(), "hello".to_string())]
    );
    let stored = conversations
        .conversation_for_uid(&uid)
        .await
        .expect("lookup")
        .expect("conversation");
    assert_eq!(
        stored.last_interaction.map(|interaction| interaction.body),
        Some("hello".to_string())
    );
}
