mod support;

// End-to-end websocket flows: join, host handover, zone entry, combat
// feedback. Each test uses fresh room and player ids so runs never share
// state even though they share one server.

use serde_json::json;
use support::{connect_client, join_room, next_of_type, send_json, unique};

#[tokio::test]
async fn when_first_client_joins_then_it_becomes_host() {
    let room_id = unique("room");
    let player_id = unique("p");
    let mut client = connect_client().await;

    let reply = join_room(&mut client, &room_id, &player_id, "Pilot One").await;

    assert_eq!(reply["hostId"], player_id.as_str());
    let players = reply["players"].as_array().expect("players array");
    assert_eq!(players.len(), 1);
    assert_eq!(players[0]["playerId"], player_id.as_str());
    assert_eq!(players[0]["character"], "knight");
}

#[tokio::test]
async fn when_second_client_joins_then_roster_reaches_both_sides() {
    let room_id = unique("room");
    let host_id = unique("p");
    let guest_id = unique("p");

    let mut host = connect_client().await;
    join_room(&mut host, &room_id, &host_id, "Hosting Pilot").await;

    let mut guest = connect_client().await;
    let guest_reply = join_room(&mut guest, &room_id, &guest_id, "Joining Pilot").await;
    assert_eq!(guest_reply["players"].as_array().expect("players").len(), 2);
    // Joining does not reassign the host.
    assert_eq!(guest_reply["hostId"], host_id.as_str());

    let broadcast = next_of_type(&mut host, "room_update").await;
    assert_eq!(broadcast["players"].as_array().expect("players").len(), 2);
}

#[tokio::test]
async fn when_host_leaves_then_survivor_is_promoted() {
    let room_id = unique("room");
    let host_id = unique("p");
    let guest_id = unique("p");

    let mut host = connect_client().await;
    join_room(&mut host, &room_id, &host_id, "Hosting Pilot").await;
    let mut guest = connect_client().await;
    join_room(&mut guest, &room_id, &guest_id, "Joining Pilot").await;

    send_json(&mut host, json!({"type": "leave_room"})).await;

    let left = next_of_type(&mut guest, "player_left").await;
    assert_eq!(left["playerId"], host_id.as_str());
    let promoted = next_of_type(&mut guest, "host_assigned").await;
    assert_eq!(promoted["hostId"], guest_id.as_str());
    let roster = next_of_type(&mut guest, "room_update").await;
    assert_eq!(roster["hostId"], guest_id.as_str());
    assert_eq!(roster["players"].as_array().expect("players").len(), 1);
}

#[tokio::test]
async fn when_host_starts_the_game_then_start_reaches_the_room() {
    let room_id = unique("room");
    let host_id = unique("p");
    let guest_id = unique("p");

    let mut host = connect_client().await;
    join_room(&mut host, &room_id, &host_id, "Hosting Pilot").await;
    let mut guest = connect_client().await;
    join_room(&mut guest, &room_id, &guest_id, "Joining Pilot").await;

    send_json(&mut host, json!({"type": "game_start"})).await;

    next_of_type(&mut guest, "game_start").await;
    next_of_type(&mut host, "game_start").await;
}

#[tokio::test]
async fn when_client_enters_zone_then_reply_carries_resident_entities() {
    let room_id = unique("room");
    let player_id = unique("p");
    let mut client = connect_client().await;
    join_room(&mut client, &room_id, &player_id, "Scout Pilot").await;

    send_json(&mut client, json!({"type": "zone_enter", "zoneId": 1})).await;
    let reply = next_of_type(&mut client, "zone_enter").await;

    assert_eq!(reply["zoneId"], 1);
    assert_eq!(reply["zonePlayers"].as_array().expect("zone players").len(), 0);
    let enemies = reply["enemies"].as_array().expect("enemies array");
    let ids: Vec<&str> = enemies
        .iter()
        .map(|enemy| enemy["id"].as_str().expect("enemy id"))
        .collect();
    assert!(ids.contains(&"slime-0"));
    assert!(ids.contains(&"slime-1"));
    assert!(ids.contains(&"bat-2"));
}

#[tokio::test]
async fn when_damage_claim_lands_then_hp_update_reaches_the_zone() {
    let room_id = unique("room");
    let player_id = unique("p");
    let mut client = connect_client().await;
    join_room(&mut client, &room_id, &player_id, "Combat Pilot").await;

    send_json(&mut client, json!({"type": "zone_enter", "zoneId": 1})).await;
    next_of_type(&mut client, "zone_enter").await;

    send_json(
        &mut client,
        json!({
            "type": "enemy_damage",
            "enemyId": "slime-0",
            "damage": 10,
            "fromX": 100.0,
            "fromY": 100.0,
        }),
    )
    .await;

    let update = next_of_type(&mut client, "enemy_state_update").await;
    assert_eq!(update["enemyId"], "slime-0");
    assert_eq!(update["hp"], 40);
    assert_eq!(update["maxHp"], 50);
}

#[tokio::test]
async fn when_zone_peer_reports_state_then_other_peer_receives_relay() {
    let room_id = unique("room");
    let first_id = unique("p");
    let second_id = unique("p");

    let mut first = connect_client().await;
    join_room(&mut first, &room_id, &first_id, "First Pilot").await;
    let mut second = connect_client().await;
    join_room(&mut second, &room_id, &second_id, "Second Pilot").await;

    // The hub zone has no entities, so only relays flow here.
    send_json(&mut first, json!({"type": "zone_enter", "zoneId": 0})).await;
    next_of_type(&mut first, "zone_enter").await;
    send_json(&mut second, json!({"type": "zone_enter", "zoneId": 0})).await;
    next_of_type(&mut second, "zone_enter").await;

    send_json(
        &mut second,
        json!({
            "type": "player_update",
            "state": {"x": 64.0, "y": 32.0, "zoneLevel": 0, "hp": 100}
        }),
    )
    .await;

    let relay = next_of_type(&mut first, "player_update").await;
    assert_eq!(relay["playerId"], second_id.as_str());
    assert_eq!(relay["state"]["x"], 64.0);
    assert_eq!(relay["state"]["hp"], 100);
}

#[tokio::test]
async fn when_client_asks_for_rooms_in_lobby_then_listing_arrives() {
    let mut client = connect_client().await;
    send_json(&mut client, json!({"type": "list_rooms"})).await;
    let listing = next_of_type(&mut client, "room_list").await;
    assert!(listing["rooms"].is_array());
}
