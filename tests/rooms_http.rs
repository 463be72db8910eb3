mod support;

// Contract tests for the lobby-browsing HTTP endpoint.

#[tokio::test]
async fn when_rooms_are_listed_then_response_is_a_json_array() {
    let base_url = support::ensure_server();

    let response = reqwest::get(format!("{base_url}/rooms"))
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let rooms: serde_json::Value = response.json().await.expect("listing should be json");
    assert!(rooms.is_array());
}

#[tokio::test]
async fn when_room_is_joined_then_listing_shows_it_as_open() {
    let base_url = support::ensure_server();
    let room_id = support::unique("room");
    let player_id = support::unique("p");

    // Keep the socket alive so the room is not torn down before the read.
    let mut client = support::connect_client().await;
    support::join_room(&mut client, &room_id, &player_id, "Listed Pilot").await;

    let response = reqwest::get(format!("{base_url}/rooms"))
        .await
        .expect("request should succeed");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let rooms: serde_json::Value = response.json().await.expect("listing should be json");

    let entry = rooms
        .as_array()
        .expect("listing should be an array")
        .iter()
        .find(|room| room["roomId"] == room_id.as_str())
        .expect("joined room should be listed")
        .clone();
    assert_eq!(entry["playerCount"], 1);
    assert_eq!(entry["capacity"], 4);
    assert_eq!(entry["started"], false);
    assert_eq!(entry["players"][0], "Listed Pilot");
}
