//! End-to-end draft flows over real TCP: several clients log in, build a
//! room, and draft to completion against a live server.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use draftden_core::card::Zone;
use draftden_core::cards::CardStore;
use draftden_core::config::{
    Dispensation, DispenseQuantity, DispenserConfig, DraftConfig, PassDirection, RoomSpec,
    RoundConfig,
};
use draftden_net::client::Client;
use draftden_net::protocol::{
    ChairDeckInfo, ClientToServer, OccupantState, RoomStage, RoundInfo, ServerToClient,
};
use draftden_server::hub::{HubConfig, ServerHandle};

const RECV_TIMEOUT: Duration = Duration::from_secs(15);

/// A set with enough distinct commons that 15-card boosters don't look
/// degenerate.
fn store() -> Arc<CardStore> {
    let cards: Vec<String> = (0..60)
        .map(|i| format!("{{\"name\": \"Card {i}\", \"rarity\": \"common\"}}"))
        .collect();
    let json = format!(
        "{{\"sets\": [{{\"code\": \"10E\", \"name\": \"Tenth Edition\", \
         \"booster\": [{}], \"cards\": [{}]}}]}}",
        vec!["\"common\""; 15].join(", "),
        cards.join(", ")
    );
    Arc::new(CardStore::from_json(&json).unwrap())
}

fn booster_spec(
    name: &str,
    chair_count: usize,
    bot_count: usize,
    rounds: usize,
    selection_time_secs: u32,
) -> RoomSpec {
    let directions = [
        PassDirection::Clockwise,
        PassDirection::CounterClockwise,
        PassDirection::Clockwise,
    ];
    RoomSpec {
        name: name.to_string(),
        password: None,
        bot_count,
        draft_config: DraftConfig {
            chair_count,
            rounds: (0..rounds)
                .map(|r| RoundConfig::Booster {
                    selection_time_secs,
                    pass_direction: directions[r % directions.len()],
                    dispensations: vec![Dispensation {
                        dispenser_index: 0,
                        chair_indices: (0..chair_count).collect(),
                        quantity: DispenseQuantity::Count(15),
                    }],
                })
                .collect(),
            dispensers: vec![DispenserConfig {
                booster_set_codes: vec!["10E".into()],
                custom_card_list_index: None,
            }],
            custom_card_lists: vec![],
            post_round_timer_secs: 0,
            version: 1,
        },
    }
}

async fn start_server() -> ServerHandle {
    ServerHandle::start(
        0,
        store(),
        HubConfig {
            server_name: "draftden test".into(),
            ..Default::default()
        },
    )
    .await
    .unwrap()
}

async fn recv(client: &mut Client) -> ServerToClient {
    timeout(RECV_TIMEOUT, client.next_message())
        .await
        .expect("timed out waiting for a message")
        .expect("connection closed unexpectedly")
}

async fn login(server: &ServerHandle, name: &str) -> Client {
    let mut client = Client::connect(server.addr()).await.unwrap();
    assert!(matches!(
        recv(&mut client).await,
        ServerToClient::GreetingInd { .. }
    ));
    client.login(name).await.unwrap();
    match recv(&mut client).await {
        ServerToClient::LoginRsp { result, .. } => assert!(result.is_success()),
        other => panic!("expected LoginRsp, got {other:?}"),
    }
    // Drain the rest of the login burst (the users baseline is last).
    loop {
        if let ServerToClient::UsersInfoInd { .. } = recv(&mut client).await {
            break;
        }
    }
    client
}

async fn join(client: &mut Client, room_id: u32) -> usize {
    client
        .send(ClientToServer::JoinRoomReq {
            room_id,
            password: None,
        })
        .await
        .unwrap();
    loop {
        match recv(client).await {
            ServerToClient::JoinRoomSuccessRspInd {
                rejoin: false,
                chair_idx,
                ..
            } => return chair_idx,
            ServerToClient::RoomsInfoInd { .. }
            | ServerToClient::UsersInfoInd { .. }
            | ServerToClient::RoomOccupantsInfoInd { .. } => continue,
            other => panic!("expected join success, got {other:?}"),
        }
    }
}

async fn create_room(client: &mut Client, spec: RoomSpec) -> u32 {
    client
        .send(ClientToServer::CreateRoomReq { room_config: spec })
        .await
        .unwrap();
    loop {
        match recv(client).await {
            ServerToClient::CreateRoomSuccessRsp { room_id } => return room_id,
            ServerToClient::RoomsInfoInd { .. } | ServerToClient::UsersInfoInd { .. } => {
                continue
            }
            other => panic!("expected create success, got {other:?}"),
        }
    }
}

/// Drive one seat: pick the first card of every pack until the deck-info
/// broadcast lands. Returns the rounds announced and the final hashes.
async fn drive_seat(mut client: Client, expected_hashes: usize) -> (Vec<usize>, Vec<ChairDeckInfo>) {
    let mut rounds = Vec::new();
    loop {
        match recv(&mut client).await {
            ServerToClient::PlayerCurrentPackInd { pack_id, cards } => {
                client
                    .send(ClientToServer::PlayerCardSelectionReq {
                        pack_id,
                        card: cards[0].clone(),
                        zone: Zone::Main,
                    })
                    .await
                    .unwrap();
            }
            ServerToClient::RoomStageInd {
                stage: RoomStage::Running,
                round_info: Some(RoundInfo { round, .. }),
            } => {
                if rounds.last() != Some(&round) {
                    rounds.push(round);
                }
            }
            ServerToClient::RoomChairsDeckInfoInd { chairs }
                if chairs.len() == expected_hashes =>
            {
                return (rounds, chairs)
            }
            _ => continue,
        }
    }
}

#[tokio::test]
async fn four_humans_draft_three_rounds_to_completion() {
    let server = start_server().await;

    let mut alice = login(&server, "alice").await;
    let room_id = create_room(&mut alice, booster_spec("table one", 4, 0, 3, 30)).await;

    let mut clients = vec![alice];
    for name in ["bret", "cleo", "dana"] {
        clients.push(login(&server, name).await);
    }
    for (i, client) in clients.iter_mut().enumerate() {
        let chair = join(client, room_id).await;
        assert_eq!(chair, i);
    }
    for client in &clients {
        client
            .send(ClientToServer::PlayerReadyInd { ready: true })
            .await
            .unwrap();
    }

    let drivers: Vec<_> = clients
        .into_iter()
        .map(|client| tokio::spawn(drive_seat(client, 4)))
        .collect();
    for driver in drivers {
        let (rounds, hashes) = driver.await.unwrap();
        // Every seat saw the rounds begin in order, then got all four
        // deck hashes.
        assert_eq!(rounds, vec![0, 1, 2]);
        assert_eq!(hashes.len(), 4);
        let mut chairs: Vec<usize> = hashes.iter().map(|c| c.chair_index).collect();
        chairs.sort_unstable();
        assert_eq!(chairs, vec![0, 1, 2, 3]);
        assert!(hashes.iter().all(|c| !c.deck_hash.is_empty()));
    }

    server.shutdown();
}

#[tokio::test]
async fn mid_draft_disconnect_departs_and_rejoin_replays_state() {
    let server = start_server().await;

    let mut alice = login(&server, "alice").await;
    let room_id = create_room(&mut alice, booster_spec("table two", 2, 0, 1, 0)).await;
    assert_eq!(join(&mut alice, room_id).await, 0);

    let mut bob = login(&server, "bob").await;
    assert_eq!(join(&mut bob, room_id).await, 1);

    for client in [&alice, &bob] {
        client
            .send(ClientToServer::PlayerReadyInd { ready: true })
            .await
            .unwrap();
    }

    // Remember Alice's opening pack; she sits on it until Bob is gone.
    let alice_pack = loop {
        match recv(&mut alice).await {
            ServerToClient::PlayerCurrentPackInd { pack_id, cards } => {
                break (pack_id, cards[0].clone())
            }
            _ => continue,
        }
    };

    // Bob picks one card, then his connection dies.
    let picked = loop {
        match recv(&mut bob).await {
            ServerToClient::PlayerCurrentPackInd { pack_id, cards } => {
                bob.send(ClientToServer::PlayerCardSelectionReq {
                    pack_id,
                    card: cards[0].clone(),
                    zone: Zone::Main,
                })
                .await
                .unwrap();
            }
            ServerToClient::PlayerCardSelectionRsp { result, card, .. } => {
                assert!(result);
                break card;
            }
            _ => continue,
        }
    };
    bob.disconnect().await;

    // Alice sees the seat go departed.
    loop {
        if let ServerToClient::RoomOccupantsInfoInd { players, .. } = recv(&mut alice).await {
            if let Some(bob_seat) = players.iter().find(|p| p.name == "bob") {
                if bob_seat.state == OccupantState::Departed {
                    break;
                }
            }
        }
    }

    // Alice keeps drafting: one pick passes her residual into Bob's queue.
    alice
        .send(ClientToServer::PlayerCardSelectionReq {
            pack_id: alice_pack.0,
            card: alice_pack.1,
            zone: Zone::Main,
        })
        .await
        .unwrap();
    loop {
        match recv(&mut alice).await {
            ServerToClient::PlayerCardSelectionRsp { result, .. } => {
                assert!(result);
                break;
            }
            _ => continue,
        }
    }

    // Bob returns under the same name and gets the full replay.
    let mut bob = login(&server, "bob").await;
    bob.send(ClientToServer::JoinRoomReq {
        room_id,
        password: None,
    })
    .await
    .unwrap();

    let mut replay = Vec::new();
    loop {
        let msg = recv(&mut bob).await;
        if replay.is_empty() {
            // Directory diffs may land between the relogin and the join.
            match msg {
                ServerToClient::RoomsInfoInd { .. } | ServerToClient::UsersInfoInd { .. } => {
                    continue
                }
                _ => {}
            }
        }
        let is_stage = matches!(msg, ServerToClient::RoomStageInd { .. });
        replay.push(msg);
        if is_stage {
            break;
        }
    }

    match &replay[0] {
        ServerToClient::JoinRoomSuccessRspInd {
            rejoin, chair_idx, ..
        } => {
            assert!(*rejoin);
            assert_eq!(*chair_idx, 1);
        }
        other => panic!("expected rejoin success first, got {other:?}"),
    }

    let inv_pos = replay
        .iter()
        .position(|m| matches!(m, ServerToClient::PlayerInventoryInd { .. }))
        .expect("inventory replayed");
    if let ServerToClient::PlayerInventoryInd { drafted_cards, .. } = &replay[inv_pos] {
        assert_eq!(drafted_cards.len(), 1);
        assert_eq!(drafted_cards[0].card, picked);
    }

    let pack_pos = replay
        .iter()
        .position(|m| matches!(m, ServerToClient::PlayerCurrentPackInd { .. }))
        .expect("current pack replayed");
    let stage_pos = replay.len() - 1;
    match &replay[stage_pos] {
        ServerToClient::RoomStageInd {
            stage: RoomStage::Running,
            round_info: Some(RoundInfo { round: 0, .. }),
        } => {}
        other => panic!("expected running stage last, got {other:?}"),
    }
    assert!(inv_pos < pack_pos && pack_pos < stage_pos);

    server.shutdown();
}

#[tokio::test]
async fn selection_timeout_auto_picks_the_hinted_default() {
    let server = start_server().await;

    let mut alice = login(&server, "alice").await;
    let room_id = create_room(&mut alice, booster_spec("table three", 2, 1, 1, 2)).await;
    join(&mut alice, room_id).await;
    alice
        .send(ClientToServer::PlayerReadyInd { ready: true })
        .await
        .unwrap();

    // Take the first pack indication and then just wait out the timer.
    let (pack_id, first_card) = loop {
        match recv(&mut alice).await {
            ServerToClient::PlayerCurrentPackInd { pack_id, cards } => {
                break (pack_id, cards[0].clone())
            }
            _ => continue,
        }
    };

    loop {
        match recv(&mut alice).await {
            ServerToClient::PlayerAutoCardSelectionInd {
                pack_id: auto_pack,
                card,
            } => {
                assert_eq!(auto_pack, pack_id);
                assert_eq!(card, first_card);
                break;
            }
            ServerToClient::PlayerCurrentPackInd { .. } => {
                panic!("pack replaced before the timer fired")
            }
            _ => continue,
        }
    }

    server.shutdown();
}
