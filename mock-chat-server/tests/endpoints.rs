//! Drives the guild-chat router directly over a locally bound listener:
//! spin up `app()`, hit it with `reqwest`, assert on wire shapes.

use reqwest::{Client, StatusCode};
use serde_json::Value;

async fn spawn() -> (String, Client) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{addr}");
    let app = mock_chat_server::app(base_url.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (base_url, Client::new())
}

#[tokio::test]
async fn fresh_guild_has_no_channels() {
    let (base_url, client) = spawn().await;
    let resp = client.get(format!("{base_url}/guilds/g1/channels")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let channels: Vec<Value> = resp.json().await.unwrap();
    assert!(channels.is_empty());
}

#[tokio::test]
async fn create_channel_then_list_finds_it() {
    let (base_url, client) = spawn().await;
    let created: Value = client
        .post(format!("{base_url}/guilds/g1/channels"))
        .json(&serde_json::json!({"name": "tx", "type": "text"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(created["id"], "g1:tx");

    let channels: Vec<Value> = client.get(format!("{base_url}/guilds/g1/channels")).send().await.unwrap().json().await.unwrap();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0]["name"], "tx");
}

#[tokio::test]
async fn channels_are_scoped_by_guild() {
    let (base_url, client) = spawn().await;
    client
        .post(format!("{base_url}/guilds/g1/channels"))
        .json(&serde_json::json!({"name": "tx", "type": "text"}))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{base_url}/guilds/g2/channels"))
        .json(&serde_json::json!({"name": "tx", "type": "text"}))
        .send()
        .await
        .unwrap();

    let g1: Vec<Value> = client.get(format!("{base_url}/guilds/g1/channels")).send().await.unwrap().json().await.unwrap();
    assert_eq!(g1.len(), 1);
    assert_eq!(g1[0]["id"], "g1:tx");
}

#[tokio::test]
async fn post_message_with_attachment_round_trips_bytes() {
    let (base_url, client) = spawn().await;
    let form = reqwest::multipart::Form::new().part("file0", reqwest::multipart::Part::bytes(b"hello".to_vec()).file_name("tx"));
    let posted: Value = client
        .post(format!("{base_url}/channels/g1:tx/messages"))
        .multipart(form)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let attachments = posted["attachments"].as_array().unwrap();
    assert_eq!(attachments.len(), 1);
    let url = attachments[0]["url"].as_str().unwrap();

    let bytes = client.get(url).send().await.unwrap().bytes().await.unwrap();
    assert_eq!(&bytes[..], b"hello");
}

#[tokio::test]
async fn list_messages_is_newest_first_and_before_cursor_excludes_newer() {
    let (base_url, client) = spawn().await;
    let mut ids = Vec::new();
    for i in 0..3 {
        let form = reqwest::multipart::Form::new().part("file0", reqwest::multipart::Part::bytes(vec![i]).file_name("tx"));
        let posted: Value = client.post(format!("{base_url}/channels/g1:tx/messages")).multipart(form).send().await.unwrap().json().await.unwrap();
        ids.push(posted["id"].as_str().unwrap().to_string());
    }

    let page: Vec<Value> = client.get(format!("{base_url}/channels/g1:tx/messages?limit=10")).send().await.unwrap().json().await.unwrap();
    let page_ids: Vec<&str> = page.iter().map(|m| m["id"].as_str().unwrap()).collect();
    assert_eq!(page_ids, vec![ids[2].as_str(), ids[1].as_str(), ids[0].as_str()]);

    let before: Vec<Value> = client
        .get(format!("{base_url}/channels/g1:tx/messages?limit=10&before={}", ids[1]))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let before_ids: Vec<&str> = before.iter().map(|m| m["id"].as_str().unwrap()).collect();
    assert_eq!(before_ids, vec![ids[0].as_str()]);
}

#[tokio::test]
async fn pin_then_unpin_updates_the_pin_list() {
    let (base_url, client) = spawn().await;
    let form = reqwest::multipart::Form::new().part("file0", reqwest::multipart::Part::bytes(b"x".to_vec()).file_name("tx"));
    let posted: Value = client.post(format!("{base_url}/channels/g1:tx/messages")).multipart(form).send().await.unwrap().json().await.unwrap();
    let id = posted["id"].as_str().unwrap().to_string();

    let resp = client.put(format!("{base_url}/channels/g1:tx/pins/{id}")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let pins: Vec<Value> = client.get(format!("{base_url}/channels/g1:tx/pins")).send().await.unwrap().json().await.unwrap();
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0]["message_id"], id);

    let resp = client.delete(format!("{base_url}/channels/g1:tx/pins/{id}")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let pins: Vec<Value> = client.get(format!("{base_url}/channels/g1:tx/pins")).send().await.unwrap().json().await.unwrap();
    assert!(pins.is_empty());
}

#[tokio::test]
async fn missing_attachment_is_404() {
    let (base_url, client) = spawn().await;
    let resp = client.get(format!("{base_url}/attachments/does-not-exist")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
