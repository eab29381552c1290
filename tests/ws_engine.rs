//! Integration tests per il motore real-time (presenza, stanze, messaggi)
//!
//! Le connessioni sono simulate con canali: i comandi passano dal dispatcher
//! esattamente come arriverebbero da un frame di testo.

mod common;

#[cfg(test)]
mod engine_tests {
    use super::common::*;
    use market_chat_server::dtos::ClientCommand;
    use market_chat_server::entities::{MessageStatus, RoleSet, room_key};
    use market_chat_server::repositories::{MessageStore, RoomStore, UserDirectory, load_page};
    use market_chat_server::ws::broadcast::{broadcast_to_room, send_to_user};
    use market_chat_server::ws::event_handlers::{process_command, process_text};
    use market_chat_server::ws::presence;
    use market_chat_server::dtos::ServerEvent;
    use serde_json::json;

    fn join_with(contact: &str) -> String {
        json!({"type": "join_room", "roomId": null, "contactId": contact}).to_string()
    }

    fn send(room: &str, content: &str) -> String {
        json!({"type": "send_message", "roomId": room, "content": content}).to_string()
    }

    // ============================================================
    // Connessione e presenza
    // ============================================================

    #[tokio::test]
    async fn test_connect_sends_connection_event_and_marks_online() {
        let (state, store) = create_test_state();
        let (_c1, mut rx) = connect_user(&state, "c1").await;

        let events = drain_events(&mut rx);
        assert_eq!(events, vec![json!({"type": "connection", "status": "connected", "userId": "c1"})]);
        assert!(state.users_online.is_user_online("c1"));
        assert!(store.user("c1").unwrap().is_online);
    }

    #[tokio::test]
    async fn test_staff_presence_reaches_each_customer_once() {
        let (state, store) = create_test_state();
        let (_c1, mut c1_rx) = connect_user(&state, "c1").await;
        let (_c2, mut c2_rx) = connect_user(&state, "c2").await;
        let (_d1, mut d1_rx) = connect_user(&state, "d1").await;
        // l'annuncio del fattorino arriva ai clienti: svuotiamo prima di misurare
        drain_events(&mut c1_rx);
        drain_events(&mut c2_rx);
        drain_events(&mut d1_rx);

        // FASE 1: il venditore si connette
        let (v1, mut v1_rx) = connect_user(&state, "v1").await;
        for rx in [&mut c1_rx, &mut c2_rx] {
            let events = drain_events(rx);
            let online = of_type(&events, "user_online");
            assert_eq!(online.len(), 1);
            assert_eq!(online[0]["user"]["id"], "v1");
            assert_eq!(online[0]["user"]["roles"], json!(["vendor"]));
            assert_eq!(online[0]["user"]["isOnline"], true);
        }
        assert!(of_type(&drain_events(&mut d1_rx), "user_online").is_empty());
        assert!(of_type(&drain_events(&mut v1_rx), "user_online").is_empty());

        // FASE 2: il venditore si disconnette
        assert!(presence::disconnect(&state, &v1).await);
        for rx in [&mut c1_rx, &mut c2_rx] {
            let events = drain_events(rx);
            let offline = of_type(&events, "user_offline");
            assert_eq!(offline.len(), 1);
            assert_eq!(offline[0]["user"]["id"], "v1");
            assert_eq!(offline[0]["user"]["isOnline"], false);
        }
        assert!(drain_events(&mut d1_rx).is_empty());
        assert!(!store.user("v1").unwrap().is_online);
    }

    #[tokio::test]
    async fn test_customer_presence_is_not_announced() {
        let (state, _store) = create_test_state();
        let (_c2, mut c2_rx) = connect_user(&state, "c2").await;
        drain_events(&mut c2_rx);

        let (c1, _c1_rx) = connect_user(&state, "c1").await;
        presence::disconnect(&state, &c1).await;
        assert!(drain_events(&mut c2_rx).is_empty());
    }

    #[tokio::test]
    async fn test_handshake_failure_undoes_registration() {
        let (state, store) = create_test_state();

        // utente sconosciuto alla directory
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let ghost = market_chat_server::ws::Session::new("ghost", tx);
        assert!(presence::connect(&state, &ghost).await.is_err());
        assert!(!state.users_online.is_user_online("ghost"));

        // directory non raggiungibile
        store.set_unavailable(true);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let c1 = market_chat_server::ws::Session::new("c1", tx);
        assert!(presence::connect(&state, &c1).await.is_err());
        assert_eq!(state.users_online.online_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_reconnect_keeps_previous_connection() {
        let (state, store) = create_test_state();
        let (_first, mut first_rx) = connect_user(&state, "c1").await;
        drain_events(&mut first_rx);

        store.set_unavailable(true);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let retry = market_chat_server::ws::Session::new("c1", tx);
        assert!(presence::connect(&state, &retry).await.is_err());
        store.set_unavailable(false);

        assert!(send_to_user(&state, "c1", ServerEvent::error("ping")));
        assert_eq!(drain_events(&mut first_rx).len(), 1);
        assert!(store.user("c1").unwrap().is_online);
    }

    #[tokio::test]
    async fn test_last_connection_wins() {
        let (state, _store) = create_test_state();
        let (first, mut first_rx) = connect_user(&state, "c1").await;
        let (second, mut second_rx) = connect_user(&state, "c1").await;
        drain_events(&mut first_rx);
        drain_events(&mut second_rx);

        assert_eq!(state.users_online.online_count(), 1);
        assert!(send_to_user(&state, "c1", ServerEvent::error("ping")));
        assert!(drain_events(&mut first_rx).is_empty());
        assert_eq!(drain_events(&mut second_rx).len(), 1);

        // la connessione sostituita che chiude non tocca lo stato della nuova
        process_text(&state, &second, &join_with("v1")).await;
        assert!(!presence::disconnect(&state, &first).await);
        assert!(state.users_online.is_user_online("c1"));
        assert!(state.rooms_online.is_member("c1_v1", "c1"));

        assert!(presence::disconnect(&state, &second).await);
        assert!(!state.users_online.is_user_online("c1"));
    }

    // ============================================================
    // Dispatcher
    // ============================================================

    #[tokio::test]
    async fn test_invalid_frames_produce_error_events() {
        let (state, _store) = create_test_state();
        let (c1, mut rx) = connect_user(&state, "c1").await;
        drain_events(&mut rx);

        for frame in [
            "not json",
            "[1,2,3]",
            r#"{"roomId":"c1_v1"}"#,
            r#"{"type":42}"#,
            r#"{"type":"send_message","roomId":"c1_v1"}"#,
            r#"{"type":"typing","roomId":"c1_v1","isTyping":"yes"}"#,
        ] {
            process_text(&state, &c1, frame).await;
            let events = drain_events(&mut rx);
            assert_eq!(
                events,
                vec![json!({"type": "error", "message": "Invalid message format"})],
                "frame {frame}"
            );
        }

        // la connessione resta registrata
        assert!(state.users_online.is_user_online("c1"));
    }

    #[tokio::test]
    async fn test_unknown_type_is_dropped_silently() {
        let (state, _store) = create_test_state();
        let (c1, mut rx) = connect_user(&state, "c1").await;
        drain_events(&mut rx);

        process_text(&state, &c1, r#"{"type":"dance","roomId":"x"}"#).await;
        assert!(drain_events(&mut rx).is_empty());
    }

    // ============================================================
    // Stanze
    // ============================================================

    #[tokio::test]
    async fn test_join_creates_single_room_with_both_participants() {
        let (state, store) = create_test_state();
        let (c1, mut c1_rx) = connect_user(&state, "c1").await;
        let (v1, mut v1_rx) = connect_user(&state, "v1").await;
        drain_events(&mut c1_rx);
        drain_events(&mut v1_rx);

        process_text(&state, &c1, &join_with("v1")).await;
        process_text(&state, &v1, &join_with("c1")).await;
        process_text(&state, &c1, &join_with("v1")).await;

        assert_eq!(store.room_count(), 1);
        let room = state.rooms.find_by_key(&room_key("v1", "c1")).await.unwrap().unwrap();
        assert_eq!(room.participants.len(), 2);
        assert_eq!(room.participant_ids().filter(|id| *id == "c1").count(), 1);
        assert_eq!(room.participant_ids().filter(|id| *id == "v1").count(), 1);
        assert_eq!(room.participant("v1").unwrap().username, "bottega");

        let events = drain_events(&mut c1_rx);
        let joined = of_type(&events, "room_joined");
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0]["roomId"], "c1_v1");
        assert_eq!(joined[0]["messages"], json!([]));
        assert_eq!(joined[0]["participants"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_join_announces_room_to_other_connections() {
        let (state, _store) = create_test_state();
        let (c1, mut c1_rx) = connect_user(&state, "c1").await;
        let (_v1, mut v1_rx) = connect_user(&state, "v1").await;
        let (_c2, mut c2_rx) = connect_user(&state, "c2").await;
        drain_events(&mut c1_rx);
        drain_events(&mut v1_rx);
        drain_events(&mut c2_rx);

        process_text(&state, &c1, &join_with("v1")).await;

        for rx in [&mut v1_rx, &mut c2_rx] {
            let events = drain_events(rx);
            let available = of_type(&events, "room_available");
            assert_eq!(available.len(), 1);
            assert_eq!(available[0]["roomId"], "c1_v1");
            assert_eq!(available[0]["initiator"], json!({"id": "c1", "name": "carla", "roles": ["user"]}));
            assert_eq!(available[0]["participant"], json!({"id": "v1", "name": "bottega", "roles": ["vendor"]}));
        }
        assert!(of_type(&drain_events(&mut c1_rx), "room_available").is_empty());
    }

    #[tokio::test]
    async fn test_join_with_unknown_contact_skips_room_available() {
        let (state, store) = create_test_state();
        let (c1, mut c1_rx) = connect_user(&state, "c1").await;
        let (_c2, mut c2_rx) = connect_user(&state, "c2").await;
        drain_events(&mut c1_rx);
        drain_events(&mut c2_rx);

        process_text(
            &state,
            &c1,
            &json!({"type": "join_room", "contactId": "x9", "contactName": "Nuovo negozio"}).to_string(),
        )
        .await;

        let room = store.find_by_key("c1_x9").await.unwrap().unwrap();
        assert_eq!(room.participant("x9").unwrap().username, "Nuovo negozio");
        assert_eq!(of_type(&drain_events(&mut c1_rx), "room_joined").len(), 1);
        assert!(drain_events(&mut c2_rx).is_empty());
    }

    #[tokio::test]
    async fn test_join_uses_derived_key_over_client_room_id() {
        let (state, store) = create_test_state();
        let (c1, mut rx) = connect_user(&state, "c1").await;
        drain_events(&mut rx);

        process_text(
            &state,
            &c1,
            &json!({"type": "join_room", "roomId": "something_else", "contactId": "v1"}).to_string(),
        )
        .await;

        let events = drain_events(&mut rx);
        assert_eq!(of_type(&events, "room_joined")[0]["roomId"], "c1_v1");
        assert!(store.find_by_key("something_else").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_join_without_contact_requires_existing_room() {
        let (state, _store) = create_test_state();
        let (c1, mut c1_rx) = connect_user(&state, "c1").await;
        let (c2, mut c2_rx) = connect_user(&state, "c2").await;
        drain_events(&mut c1_rx);
        drain_events(&mut c2_rx);

        process_text(&state, &c1, &json!({"type": "join_room", "roomId": "c1_v1"}).to_string()).await;
        assert_eq!(
            drain_events(&mut c1_rx),
            vec![json!({"type": "error", "message": "Room not found"})]
        );

        process_text(&state, &c1, &join_with("v1")).await;
        drain_events(&mut c1_rx);

        // c2 non è partecipante
        process_text(&state, &c2, &json!({"type": "join_room", "roomId": "c1_v1"}).to_string()).await;
        assert_eq!(
            of_type(&drain_events(&mut c2_rx), "error")[0]["message"],
            "Room not found"
        );

        process_text(&state, &c1, &json!({"type": "join_room", "roomId": "c1_v1"}).to_string()).await;
        assert_eq!(of_type(&drain_events(&mut c1_rx), "room_joined").len(), 1);
    }

    #[tokio::test]
    async fn test_join_with_self_is_rejected() {
        let (state, store) = create_test_state();
        let (c1, mut rx) = connect_user(&state, "c1").await;
        drain_events(&mut rx);

        process_text(&state, &c1, &join_with("c1")).await;
        assert_eq!(drain_events(&mut rx), vec![json!({"type": "error", "message": "Invalid message format"})]);
        assert_eq!(store.room_count(), 0);
    }

    #[tokio::test]
    async fn test_colliding_room_key_does_not_open_foreign_room() {
        let (state, store) = create_test_state();
        // id che la directory conosce ma che il JWT rifiuterebbe
        for (id, name) in [("a_b", "anna"), ("c", "carlo"), ("a", "aldo"), ("b_c", "bruno")] {
            store.insert_user(user(id, name, RoleSet::CUSTOMER));
        }
        let (ab, mut ab_rx) = connect_user(&state, "a_b").await;
        let (a, mut a_rx) = connect_user(&state, "a").await;
        let (bc, mut bc_rx) = connect_user(&state, "b_c").await;

        process_text(&state, &ab, &join_with("c")).await;
        process_text(&state, &ab, &send("a_b_c", "private secret")).await;
        drain_events(&mut ab_rx);
        drain_events(&mut a_rx);
        drain_events(&mut bc_rx);

        // contatto con separatore: rifiutato prima di toccare lo store
        process_text(&state, &a, &join_with("b_c")).await;
        assert_eq!(
            drain_events(&mut a_rx),
            vec![json!({"type": "error", "message": "Room not found"})]
        );

        // richiedente con separatore: la chiave esiste ma appartiene ad a_b e c
        process_text(&state, &bc, &join_with("a")).await;
        let events = drain_events(&mut bc_rx);
        assert!(of_type(&events, "room_joined").is_empty());
        assert_eq!(of_type(&events, "error")[0]["message"], "Room not found");
        assert!(!state.rooms_online.is_member("a_b_c", "b_c"));

        process_text(&state, &ab, &send("a_b_c", "still private")).await;
        assert!(of_type(&drain_events(&mut bc_rx), "new_message").is_empty());
        assert!(of_type(&drain_events(&mut a_rx), "new_message").is_empty());

        let room = store.find_by_key("a_b_c").await.unwrap().unwrap();
        let ids: Vec<&str> = room.participant_ids().collect();
        assert_eq!(ids, vec!["a_b", "c"]);
        assert_eq!(store.room_count(), 1);
    }

    #[tokio::test]
    async fn test_leave_room_is_idempotent_and_marks_offline() {
        let (state, store) = create_test_state();
        let (c1, mut c1_rx) = connect_user(&state, "c1").await;
        let (v1, mut v1_rx) = connect_user(&state, "v1").await;
        process_text(&state, &c1, &join_with("v1")).await;
        process_text(&state, &v1, &join_with("c1")).await;
        drain_events(&mut c1_rx);
        drain_events(&mut v1_rx);

        let leave = json!({"type": "leave_room", "roomId": "c1_v1"}).to_string();
        process_text(&state, &v1, &leave).await;
        process_text(&state, &v1, &leave).await;
        assert!(drain_events(&mut v1_rx).is_empty());
        assert!(!state.rooms_online.is_member("c1_v1", "v1"));

        let room = store.find_by_key("c1_v1").await.unwrap().unwrap();
        assert!(!room.participant("v1").unwrap().is_online);
        assert!(room.participant("c1").unwrap().is_online);

        // i typing non arrivano più a chi è uscito
        process_text(
            &state,
            &c1,
            &json!({"type": "typing", "roomId": "c1_v1", "isTyping": true}).to_string(),
        )
        .await;
        assert!(drain_events(&mut v1_rx).is_empty());
    }

    #[tokio::test]
    async fn test_typing_reaches_other_members_only() {
        let (state, _store) = create_test_state();
        let (c1, mut c1_rx) = connect_user(&state, "c1").await;
        let (v1, mut v1_rx) = connect_user(&state, "v1").await;
        process_text(&state, &c1, &join_with("v1")).await;
        process_text(&state, &v1, &join_with("c1")).await;
        drain_events(&mut c1_rx);
        drain_events(&mut v1_rx);

        process_command(
            &state,
            &c1,
            ClientCommand::Typing {
                room_id: "c1_v1".into(),
                is_typing: true,
            },
        )
        .await;

        assert_eq!(
            drain_events(&mut v1_rx),
            vec![json!({"type": "typing", "roomId": "c1_v1", "userId": "c1", "isTyping": true})]
        );
        assert!(drain_events(&mut c1_rx).is_empty());
    }

    // ============================================================
    // Messaggi
    // ============================================================

    #[tokio::test]
    async fn test_hello_scenario() {
        let (state, store) = create_test_state();
        let (c1, mut c1_rx) = connect_user(&state, "c1").await;
        let (v1, mut v1_rx) = connect_user(&state, "v1").await;

        process_text(&state, &c1, &join_with("v1")).await;
        process_text(&state, &v1, &join_with("c1")).await;
        let c1_events = drain_events(&mut c1_rx);
        let joined = of_type(&c1_events, "user_joined");
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0]["userId"], "v1");
        assert_eq!(joined[0]["username"], "bottega");
        drain_events(&mut v1_rx);

        process_text(&state, &c1, &send("c1_v1", "hello")).await;

        let v1_events = drain_events(&mut v1_rx);
        assert_eq!(v1_events.len(), 1);
        let message = &v1_events[0]["message"];
        assert_eq!(v1_events[0]["type"], "new_message");
        assert_eq!(message["content"], "hello");
        assert_eq!(message["senderId"], "c1");
        assert_eq!(message["senderName"], "carla");
        assert_eq!(message["roomId"], "c1_v1");
        assert_eq!(message["status"], "sent");
        assert_eq!(message["messageType"], "text");

        let c1_events = drain_events(&mut c1_rx);
        assert_eq!(
            c1_events,
            vec![json!({"type": "message_sent", "messageId": message["id"], "status": "sent"})]
        );

        let stored = store.read(message["id"].as_i64().unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Delivered);

        let room = store.find_by_key("c1_v1").await.unwrap().unwrap();
        assert_eq!(room.last_message.as_ref().unwrap().content, "hello");
        assert_eq!(room.unread_for("v1"), 1);
        assert_eq!(room.unread_for("c1"), 0);
    }

    #[tokio::test]
    async fn test_new_message_reaches_connected_participant_not_joined() {
        let (state, _store) = create_test_state();
        let (c1, mut c1_rx) = connect_user(&state, "c1").await;
        let (_v1, mut v1_rx) = connect_user(&state, "v1").await;
        process_text(&state, &c1, &join_with("v1")).await;
        drain_events(&mut c1_rx);
        drain_events(&mut v1_rx);

        // v1 è partecipante persistito ma non ha fatto join
        process_text(&state, &c1, &send("c1_v1", "ci sei?")).await;
        let events = drain_events(&mut v1_rx);
        assert_eq!(of_type(&events, "new_message").len(), 1);
    }

    #[tokio::test]
    async fn test_messages_keep_send_order() {
        let (state, store) = create_test_state();
        let (c1, mut rx) = connect_user(&state, "c1").await;
        process_text(&state, &c1, &join_with("v1")).await;

        for i in 0..10 {
            process_text(&state, &c1, &send("c1_v1", &format!("m{i}"))).await;
        }
        drain_events(&mut rx);

        let page = load_page(store.as_ref(), "c1_v1", 1, 50).await.unwrap();
        assert_eq!(page.total, 10);
        let contents: Vec<&str> = page.messages.iter().map(|m| m.content.as_str()).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("m{i}")).collect();
        assert_eq!(contents, expected);
        for pair in page.messages.windows(2) {
            assert!((pair[0].timestamp, pair[0].id) < (pair[1].timestamp, pair[1].id));
        }
    }

    #[tokio::test]
    async fn test_sixty_messages_paged_fifty_then_ten() {
        let (state, store) = create_test_state();
        let (c1, mut c1_rx) = connect_user(&state, "c1").await;
        process_text(&state, &c1, &join_with("v1")).await;
        for i in 0..60 {
            process_text(&state, &c1, &send("c1_v1", &format!("m{i}"))).await;
        }
        drain_events(&mut c1_rx);

        // il join invia la pagina più recente in ordine cronologico
        let (v1, mut v1_rx) = connect_user(&state, "v1").await;
        drain_events(&mut v1_rx);
        process_text(&state, &v1, &join_with("c1")).await;
        let events = drain_events(&mut v1_rx);
        let joined = of_type(&events, "room_joined");
        let history = joined[0]["messages"].as_array().unwrap();
        assert_eq!(history.len(), 50);
        assert_eq!(history[0]["content"], "m10");
        assert_eq!(history[49]["content"], "m59");

        let older = load_page(store.as_ref(), "c1_v1", 2, 50).await.unwrap();
        assert!(!older.has_more);
        let mut all: Vec<String> = older.messages.iter().map(|m| m.content.clone()).collect();
        all.extend(history.iter().map(|m| m["content"].as_str().unwrap().to_string()));
        let expected: Vec<String> = (0..60).map(|i| format!("m{i}")).collect();
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn test_send_message_validation_and_membership() {
        let (state, store) = create_test_state();
        let (c1, mut c1_rx) = connect_user(&state, "c1").await;
        let (c2, mut c2_rx) = connect_user(&state, "c2").await;
        process_text(&state, &c1, &join_with("v1")).await;
        drain_events(&mut c1_rx);
        drain_events(&mut c2_rx);

        process_text(&state, &c2, &send("c1_v1", "intruso")).await;
        assert_eq!(drain_events(&mut c2_rx), vec![json!({"type": "error", "message": "Room not found"})]);

        process_text(&state, &c1, &send("c1_v1", "   ")).await;
        assert_eq!(drain_events(&mut c1_rx), vec![json!({"type": "error", "message": "Invalid message format"})]);

        process_text(&state, &c1, &send("c1_v1", &"x".repeat(5001))).await;
        assert_eq!(of_type(&drain_events(&mut c1_rx), "error").len(), 1);

        assert_eq!(store.count_by_room("c1_v1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_room_summary_failure_still_delivers() {
        let (state, store) = create_test_state();
        let (c1, mut c1_rx) = connect_user(&state, "c1").await;
        let (_v1, mut v1_rx) = connect_user(&state, "v1").await;
        process_text(&state, &c1, &join_with("v1")).await;
        drain_events(&mut c1_rx);
        drain_events(&mut v1_rx);

        store.set_summaries_unavailable(true);
        process_text(&state, &c1, &send("c1_v1", "hello")).await;

        let events = drain_events(&mut c1_rx);
        assert!(of_type(&events, "error").is_empty());
        assert_eq!(of_type(&events, "message_sent").len(), 1);
        let received = drain_events(&mut v1_rx);
        assert_eq!(of_type(&received, "new_message")[0]["message"]["content"], "hello");

        // un solo messaggio persistito, riepilogo rimasto indietro
        assert_eq!(store.count_by_room("c1_v1").await.unwrap(), 1);
        let room = store.find_by_key("c1_v1").await.unwrap().unwrap();
        assert!(room.last_message.is_none());
    }

    #[tokio::test]
    async fn test_persistence_failure_reports_operation() {
        let (state, store) = create_test_state();
        let (c1, mut rx) = connect_user(&state, "c1").await;
        process_text(&state, &c1, &join_with("v1")).await;
        drain_events(&mut rx);

        store.set_unavailable(true);
        process_text(&state, &c1, &send("c1_v1", "hello")).await;
        assert_eq!(drain_events(&mut rx), vec![json!({"type": "error", "message": "Failed to send message"})]);
        store.set_unavailable(false);
    }

    #[tokio::test]
    async fn test_mark_read_twice_keeps_single_receipt() {
        let (state, store) = create_test_state();
        let (c1, mut c1_rx) = connect_user(&state, "c1").await;
        let (v1, mut v1_rx) = connect_user(&state, "v1").await;
        process_text(&state, &c1, &join_with("v1")).await;
        process_text(&state, &v1, &join_with("c1")).await;
        process_text(&state, &c1, &send("c1_v1", "hello")).await;
        drain_events(&mut c1_rx);
        let id = of_type(&drain_events(&mut v1_rx), "new_message")[0]["message"]["id"]
            .as_i64()
            .unwrap();

        let mark = json!({"type": "mark_read", "roomId": "c1_v1", "messageIds": [id, 9999]}).to_string();
        process_text(&state, &v1, &mark).await;
        process_text(&state, &v1, &mark).await;

        let message = store.read(id).await.unwrap().unwrap();
        assert_eq!(message.read_by.len(), 1);
        assert_eq!(message.read_by[0].user_id, "v1");
        assert_eq!(message.status, MessageStatus::Read);

        let events = drain_events(&mut c1_rx);
        let read = of_type(&events, "messages_read");
        assert_eq!(read.len(), 2);
        assert_eq!(read[0]["userId"], "v1");
        assert_eq!(read[0]["messageIds"], json!([id]));

        let room = store.find_by_key("c1_v1").await.unwrap().unwrap();
        assert_eq!(room.unread_for("v1"), 0);
    }

    #[tokio::test]
    async fn test_disconnect_while_joined_then_send() {
        let (state, store) = create_test_state();
        let (c1, mut c1_rx) = connect_user(&state, "c1").await;
        let (v1, mut v1_rx) = connect_user(&state, "v1").await;
        process_text(&state, &c1, &join_with("v1")).await;
        process_text(&state, &c1, &join_with("a1")).await;
        process_text(&state, &v1, &join_with("c1")).await;
        drain_events(&mut c1_rx);
        drain_events(&mut v1_rx);

        assert!(presence::disconnect(&state, &c1).await);
        assert!(state.rooms_online.rooms_of("c1").is_empty());
        assert!(!state.users_online.is_user_online("c1"));
        for key in ["c1_v1", "a1_c1"] {
            let room = store.find_by_key(key).await.unwrap().unwrap();
            assert!(!room.participant("c1").unwrap().is_online);
        }
        assert_eq!(broadcast_to_room(&state, "a1_c1", ServerEvent::error("x"), None), 0);

        process_text(&state, &v1, &send("c1_v1", "sei ancora lì?")).await;
        let events = drain_events(&mut v1_rx);
        let sent = of_type(&events, "message_sent");
        assert_eq!(sent.len(), 1);

        let message = store.read(sent[0]["messageId"].as_i64().unwrap()).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Sent);
        assert_eq!(store.find_by_key("c1_v1").await.unwrap().unwrap().unread_for("c1"), 1);
    }

    // ============================================================
    // Richieste di elenco
    // ============================================================

    #[tokio::test]
    async fn test_request_online_users_lists_staff() {
        let (state, _store) = create_test_state();
        let (c1, mut rx) = connect_user(&state, "c1").await;
        let (_v1, _v1_rx) = connect_user(&state, "v1").await;
        let (_d1, _d1_rx) = connect_user(&state, "d1").await;
        drain_events(&mut rx);

        process_text(&state, &c1, r#"{"type":"request_online_users"}"#).await;
        let events = drain_events(&mut rx);
        let users = events[0]["users"].as_array().unwrap();
        let mut ids: Vec<&str> = users.iter().map(|u| u["id"].as_str().unwrap()).collect();
        ids.sort();
        assert_eq!(events[0]["type"], "online_users_list");
        assert_eq!(ids, vec!["d1", "v1"]);
    }

    #[tokio::test]
    async fn test_request_available_rooms() {
        let (state, _store) = create_test_state();
        let (c1, mut c1_rx) = connect_user(&state, "c1").await;
        let (v1, mut v1_rx) = connect_user(&state, "v1").await;
        process_text(&state, &c1, &join_with("v1")).await;
        process_text(&state, &c1, &send("c1_v1", "primo")).await;
        process_text(&state, &c1, &send("c1_v1", "secondo")).await;
        drain_events(&mut c1_rx);
        drain_events(&mut v1_rx);

        process_text(&state, &v1, r#"{"type":"request_available_rooms"}"#).await;
        let events = drain_events(&mut v1_rx);
        assert_eq!(events[0]["type"], "available_rooms_list");
        let rooms = events[0]["rooms"].as_array().unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0]["roomId"], "c1_v1");
        assert_eq!(rooms[0]["unreadCount"], 2);
        assert_eq!(rooms[0]["lastMessage"]["content"], "secondo");
        assert_eq!(rooms[0]["participants"].as_array().unwrap().len(), 2);
        assert!(rooms[0]["createdAt"].is_string());
    }

    #[tokio::test]
    async fn test_available_rooms_count_unread_from_receipts() {
        let (state, store) = create_test_state();
        let (c1, mut c1_rx) = connect_user(&state, "c1").await;
        let (v1, mut v1_rx) = connect_user(&state, "v1").await;
        process_text(&state, &c1, &join_with("v1")).await;
        for content in ["uno", "due", "tre"] {
            process_text(&state, &c1, &send("c1_v1", content)).await;
        }
        process_text(&state, &v1, &send("c1_v1", "risposta")).await;
        drain_events(&mut c1_rx);
        drain_events(&mut v1_rx);

        let first = load_page(store.as_ref(), "c1_v1", 1, 50).await.unwrap().messages[0].id;
        store
            .mark_read(first, "v1", chrono::Utc::now())
            .await
            .unwrap();

        // lettura fuori dal protocollo: il contatore persistito non se ne accorge
        let room = store.find_by_key("c1_v1").await.unwrap().unwrap();
        assert_eq!(room.unread_for("v1"), 3);
        assert_eq!(store.count_unread("c1_v1", "v1").await.unwrap(), 2);
        assert_eq!(store.count_unread("c1_v1", "c1").await.unwrap(), 1);

        process_text(&state, &v1, r#"{"type":"request_available_rooms"}"#).await;
        let events = drain_events(&mut v1_rx);
        assert_eq!(events[0]["rooms"][0]["unreadCount"], 2);
    }

    #[tokio::test]
    async fn test_directory_flag_follows_connection() {
        let (state, store) = create_test_state();
        let (v1, _rx) = connect_user(&state, "v1").await;
        assert_eq!(store.find_online_staff().await.unwrap().len(), 1);
        presence::disconnect(&state, &v1).await;
        assert!(store.find_online_staff().await.unwrap().is_empty());
    }
}
