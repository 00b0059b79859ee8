//! End-to-end test: real WebSocket clients against a served router

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use lifecycle_server::app::AppState;
use lifecycle_server::config::{Config, GameConfig};
use lifecycle_server::game::map::MapSize;
use lifecycle_server::game::GameLoop;
use lifecycle_server::http::build_router;
use lifecycle_server::ws::protocol::ServerMsg;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn start_server() -> SocketAddr {
    let mut config = Config::from_lookup(|_| None).expect("Default config should load");
    config.game = GameConfig {
        map_size: MapSize::new(640.0, 480.0),
        monster_count: 2,
        world_seed: Some(1234),
        ..GameConfig::default()
    };

    let (game_loop, game) = GameLoop::from_config(&config.game).expect("Game should build");
    tokio::spawn(game_loop.run());

    let router = build_router(AppState::new(config, game));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, name: &str) -> Client {
    let url = format!("ws://{}/ws?name={}", addr, name);
    let (client, _) = connect_async(url).await.expect("WebSocket should connect");
    client
}

/// Next server message matching `pred`, skipping everything else
async fn wait_for<F>(client: &mut Client, mut pred: F) -> ServerMsg
where
    F: FnMut(&ServerMsg) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let frame = client.next().await.expect("stream ended").expect("socket error");
            if let Message::Text(text) = frame {
                let msg: ServerMsg = serde_json::from_str(&text).expect("valid server message");
                if pred(&msg) {
                    return msg;
                }
            }
        }
    })
    .await
    .expect("timed out waiting for message")
}

async fn initial_player_id(client: &mut Client) -> Uuid {
    match wait_for(client, |msg| matches!(msg, ServerMsg::InitialGameState { .. })).await {
        ServerMsg::InitialGameState { player_id, .. } => player_id,
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_session_lifecycle() {
    let addr = start_server().await;

    let mut first = connect(addr, "first").await;
    let first_id = match wait_for(&mut first, |msg| matches!(msg, ServerMsg::InitialGameState { .. })).await {
        ServerMsg::InitialGameState {
            player_id,
            players,
            monsters,
        } => {
            assert_eq!(players[&player_id].name, "first");
            assert_eq!(players[&player_id].last_processed_input_sequence, None);
            assert_eq!(monsters.len(), 2);
            player_id
        }
        _ => unreachable!(),
    };

    // Inputs are acknowledged through GAME_STATE
    for seq in 0..3 {
        let input = format!(
            r#"{{"type":"PLAYER_INPUT","keys":["RIGHT"],"timeDelta":16,"sequenceNumber":{}}}"#,
            seq
        );
        first.send(Message::Text(input)).await.unwrap();
    }
    // Malformed messages are dropped without closing the socket
    first.send(Message::Text("not json".to_string())).await.unwrap();

    wait_for(&mut first, |msg| match msg {
        ServerMsg::GameState { players, .. } => players
            .get(&first_id)
            .is_some_and(|p| p.last_processed_input_sequence == Some(2)),
        _ => false,
    })
    .await;

    // A second player is announced to the first
    let mut second = connect(addr, "second").await;
    let second_id = initial_player_id(&mut second).await;
    match wait_for(&mut first, |msg| matches!(msg, ServerMsg::PlayerJoined { .. })).await {
        ServerMsg::PlayerJoined { player_id, player } => {
            assert_eq!(player_id, second_id);
            assert_eq!(player.name, "second");
        }
        _ => unreachable!(),
    }

    // Restart swaps in a fresh player
    second
        .send(Message::Text(r#"{"type":"RESTART_GAME"}"#.to_string()))
        .await
        .unwrap();
    let restarted_id = initial_player_id(&mut second).await;
    assert_ne!(restarted_id, second_id);

    // Leaving is announced with the final snapshot
    second.close(None).await.unwrap();
    let left = wait_for(&mut first, |msg| {
        matches!(msg, ServerMsg::PlayerLeft { player_id, .. } if *player_id == restarted_id)
    })
    .await;
    assert!(matches!(left, ServerMsg::PlayerLeft { player, .. } if player.name == "second"));
}

#[tokio::test]
async fn test_blank_name_gets_placeholder() {
    let addr = start_server().await;
    let mut client = connect(addr, "").await;

    match wait_for(&mut client, |msg| matches!(msg, ServerMsg::InitialGameState { .. })).await {
        ServerMsg::InitialGameState { player_id, players, .. } => {
            assert!(players[&player_id].name.starts_with("Player_"));
        }
        _ => unreachable!(),
    }
}
